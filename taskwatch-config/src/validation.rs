use taskwatch_core::SyncConfig;
use url::Url;

use crate::ConfigLoadError;

/// Reject settings the sync layer cannot run with.
pub fn validate(config: &SyncConfig) -> Result<(), ConfigLoadError> {
    let url = Url::parse(config.server_url.trim()).map_err(|source| {
        ConfigLoadError::InvalidServerUrl {
            url: config.server_url.clone(),
            source,
        }
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigLoadError::UnsupportedScheme {
            url: config.server_url.clone(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigLoadError::MissingHost {
            url: config.server_url.clone(),
        });
    }

    let durations = [
        ("request_timeout_ms", config.request_timeout_ms),
        ("poll.task_interval_ms", config.poll.task_interval_ms),
        ("poll.type_interval_ms", config.poll.type_interval_ms),
        ("stream.reconnect_base_ms", config.stream.reconnect_base_ms),
        ("stream.reconnect_max_ms", config.stream.reconnect_max_ms),
    ];
    if let Some((field, _)) = durations.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigLoadError::ZeroDuration { field });
    }

    if config.stream.reconnect_base_ms > config.stream.reconnect_max_ms {
        return Err(ConfigLoadError::BackoffBounds {
            base: config.stream.reconnect_base_ms,
            max: config.stream.reconnect_max_ms,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate(&SyncConfig::default()).expect("defaults");
    }

    #[test]
    fn rejects_non_http_urls() {
        let config = SyncConfig {
            server_url: "ftp://tasks.local".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::UnsupportedScheme { scheme, .. }) if scheme == "ftp"
        ));

        let config = SyncConfig {
            server_url: "not a url".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::InvalidServerUrl { .. })
        ));
    }

    #[test]
    fn rejects_zero_intervals_and_inverted_backoff() {
        let mut config = SyncConfig::default();
        config.poll.type_interval_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::ZeroDuration {
                field: "poll.type_interval_ms"
            })
        ));

        let mut config = SyncConfig::default();
        config.stream.reconnect_base_ms = 60_000;
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::BackoffBounds { base: 60_000, .. })
        ));
    }
}
