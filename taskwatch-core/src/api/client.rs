use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use taskwatch_model::{
    BatchDownloadRequest, BatchDownloadSummary, EntityId, TaskAccepted, TaskId,
    TaskType, TaskUpdate,
};
use url::Url;

use super::routes::api;
use super::service::ApiService;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// HTTP client for the task backend.
///
/// Holds two `reqwest` clients: one with the configured request timeout for
/// actions and polls, and one without a total timeout for the long-lived
/// event stream.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    stream_client: Client,
    base_url: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.server_url)?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        info!("[ApiClient] Using task backend at {}", base_url);

        Ok(Self {
            client,
            stream_client,
            base_url,
        })
    }

    /// Build an absolute URL from a route path.
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let path = path.as_ref();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URL for a route template, with the `param` placeholder
    /// replaced by `value` as a single percent-encoded path segment.
    pub fn route_url(
        &self,
        route: &str,
        param: &str,
        value: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                url::ParseError::RelativeUrlWithCannotBeABaseBase
            })?;
            path.pop_if_empty();
            for segment in route.split('/').filter(|part| !part.is_empty()) {
                path.push(if segment == param { value } else { segment });
            }
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn events_url(&self) -> String {
        self.build_url(api::events::STREAM)
    }

    /// Client without a total request timeout, for the event stream.
    pub fn stream_client(&self) -> &Client {
        &self.stream_client
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        Ok(request.send().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.build_url(path))).await?;
        decode_response(response).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response =
            self.send(self.client.post(self.build_url(path))).await?;
        decode_response(response).await
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme =
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
    if with_scheme != raw {
        debug!(
            "[ApiClient] Normalized base URL from '{}' to '{}'",
            raw, with_scheme
        );
    }

    Url::parse(&with_scheme)?;
    Ok(with_scheme)
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(SyncError::Status { status, body });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ApiService for ApiClient {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<Option<TaskUpdate>> {
        let url =
            self.route_url(api::tasks::ITEM, "{task_id}", task_id.as_str())?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("[ApiClient] Task {} not found", task_id);
            return Ok(None);
        }

        let mut update: TaskUpdate = decode_response(response).await?;
        if update.id.is_empty() {
            update.id = task_id.clone();
        }
        Ok(Some(update))
    }

    async fn fetch_running_tasks(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<Vec<TaskUpdate>> {
        let mut request = self.client.get(self.build_url(api::tasks::RUNNING));
        if let Some(task_type) = &task_type {
            request = request
                .query(&[(api::tasks::TASK_TYPE_QUERY, task_type.as_str())]);
        }

        let response = self.send(request).await?;
        let updates: Vec<TaskUpdate> = decode_response(response).await?;
        let (valid, missing_id): (Vec<_>, Vec<_>) =
            updates.into_iter().partition(|update| !update.id.is_empty());
        if !missing_id.is_empty() {
            warn!(
                "[ApiClient] Dropped {} running task(s) without an id",
                missing_id.len()
            );
        }
        Ok(valid)
    }

    async fn start_sync(&self) -> Result<TaskAccepted> {
        self.post_empty(api::sync::START).await
    }

    async fn start_recent_updates_sync(&self) -> Result<TaskAccepted> {
        self.post_empty(api::sync::RECENT_UPDATES).await
    }

    async fn start_download(
        &self,
        entity_id: &EntityId,
    ) -> Result<TaskAccepted> {
        let url = self.route_url(
            api::download::ENTITY,
            "{entity_id}",
            entity_id.as_str(),
        )?;
        let response = self.send(self.client.post(url)).await?;
        decode_response(response).await
    }

    async fn download_batch(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<BatchDownloadSummary> {
        let body = BatchDownloadRequest {
            entity_ids: entity_ids.to_vec(),
        };
        let request = self
            .client
            .post(self.build_url(api::download::BATCH))
            .json(&body);
        let response = self.send(request).await?;
        decode_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server_url: &str) -> ApiClient {
        let config = SyncConfig {
            server_url: server_url.to_string(),
            ..SyncConfig::default()
        };
        ApiClient::new(&config).expect("client")
    }

    #[test]
    fn base_url_gets_scheme_and_loses_trailing_slash() {
        let client = client_for("localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.events_url(), "http://localhost:8000/api/events");
    }

    #[test]
    fn build_url_keeps_absolute_urls() {
        let client = client_for("https://tasks.example.org");
        assert_eq!(
            client.build_url("/api/tasks/abc"),
            "https://tasks.example.org/api/tasks/abc"
        );
        assert_eq!(
            client.build_url("http://other:1/api/events"),
            "http://other:1/api/events"
        );
    }

    #[test]
    fn path_parameters_are_encoded_as_one_segment() {
        let client = client_for("http://localhost:8000");
        let url = client
            .route_url(api::tasks::ITEM, "{task_id}", "a/b?c#d")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/tasks/a%2Fb%3Fc%23d"
        );

        let nested = client_for("https://tasks.example.org/backend/");
        let url = nested
            .route_url(api::download::ENTITY, "{entity_id}", "m 42")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://tasks.example.org/backend/api/download/m%2042"
        );
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let config = SyncConfig {
            server_url: "http://exa mple".to_string(),
            ..SyncConfig::default()
        };
        assert!(matches!(ApiClient::new(&config), Err(SyncError::Url(_))));
    }
}
