use std::fmt::Debug;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::Client;
use reqwest_eventsource::{EventSource, retry};

/// Raw transport-level happenings on one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message { event: String, data: String },
    Error(String),
    Closed,
}

impl From<eventsource_stream::Event> for TransportEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        TransportEvent::Message {
            event: event.event,
            data: event.data,
        }
    }
}

/// Opens one connection attempt to the event stream.
///
/// Each call starts a fresh connection; the returned stream ends (after an
/// `Error` or `Closed`) when that connection is gone. Reconnecting is the
/// caller's job.
pub trait EventTransport: Send + Sync + Debug {
    fn connect(&self) -> BoxStream<'static, TransportEvent>;
}

/// Server-sent events over `reqwest`.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: Client,
    url: String,
}

impl SseTransport {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventTransport for SseTransport {
    fn connect(&self) -> BoxStream<'static, TransportEvent> {
        log::debug!("Creating SSE connection to: {}", self.url);

        let mut source = match EventSource::new(self.client.get(&self.url)) {
            Ok(source) => source,
            Err(err) => {
                return stream::iter([
                    TransportEvent::Error(err.to_string()),
                    TransportEvent::Closed,
                ])
                .boxed();
            }
        };
        // Reconnect policy lives in the stream client.
        source.set_retry_policy(Box::new(retry::Never));

        source
            .map(|event| match event {
                Ok(reqwest_eventsource::Event::Open) => TransportEvent::Open,
                Ok(reqwest_eventsource::Event::Message(message)) => {
                    message.into()
                }
                Err(err) => TransportEvent::Error(err.to_string()),
            })
            .chain(stream::once(async { TransportEvent::Closed }))
            .boxed()
    }
}
