use taskwatch_model::{StreamEventKind, TaskEventEnvelope, TaskUpdate};
use thiserror::Error;

/// A named stream event the layer acts upon.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    TaskCreated(TaskUpdate),
    TaskUpdated(TaskUpdate),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {event} payload: {source}")]
    Json {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} payload has no task id")]
    MissingTaskId(&'static str),
}

/// Decode one SSE frame.
///
/// Keepalives, empty frames and unknown event names yield `Ok(None)`. The
/// `connected` payload is informational and never parsed.
pub fn decode(
    event: &str,
    data: &str,
) -> Result<Option<StreamEvent>, DecodeError> {
    let data = data.trim();
    if data.is_empty() || data == "keepalive" {
        return Ok(None);
    }

    let Some(kind) = StreamEventKind::from_name(event) else {
        log::debug!("Unknown SSE event type: {}", event);
        return Ok(None);
    };

    if kind == StreamEventKind::Connected {
        return Ok(Some(StreamEvent::Connected));
    }

    let envelope: TaskEventEnvelope =
        serde_json::from_str(data).map_err(|source| DecodeError::Json {
            event: kind.as_str(),
            source,
        })?;
    let update = envelope.into_update();
    if update.id.is_empty() {
        return Err(DecodeError::MissingTaskId(kind.as_str()));
    }

    Ok(Some(match kind {
        StreamEventKind::TaskCreated => StreamEvent::TaskCreated(update),
        _ => StreamEvent::TaskUpdated(update),
    }))
}
