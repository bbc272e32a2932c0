//! Docker Engine API client

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::errors::PipelineError;
use crate::models::resource::ContainerState;
use crate::runtime::{ContainerRuntime, LogByteStream, LogQuery};

/// Container summary as returned by `GET /containers/json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    state: String,
}

impl From<ContainerSummary> for ContainerState {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();
        ContainerState {
            id: summary.id,
            name,
            running: summary.state == "running",
        }
    }
}

/// Docker Engine reached over its TCP API
pub struct DockerRuntime {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl DockerRuntime {
    /// Create a new runtime client
    ///
    /// `request_timeout` bounds one-shot calls; follow-mode log streams are
    /// bounded by the caller's session budget instead.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, PipelineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::ConfigError(format!("Invalid runtime URL: {}", e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, PipelineError> {
        self.base_url
            .join(path)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))
    }
}

fn unreachable(e: reqwest::Error) -> PipelineError {
    PipelineError::RuntimeError(format!("runtime unreachable: {}", e))
}

async fn failure(context: &str, response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("{} failed: {} - {}", context, status, body.trim());
    PipelineError::RuntimeError(format!("{}: {} {}", context, status, body.trim()))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerState>, PipelineError> {
        let mut url = self.url("containers/json")?;
        url.query_pairs_mut().append_pair("all", "true");
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(unreachable)?;

        if !response.status().is_success() {
            return Err(failure("List containers", response).await);
        }

        let summaries: Vec<ContainerSummary> = response.json().await.map_err(unreachable)?;
        Ok(summaries.into_iter().map(ContainerState::from).collect())
    }

    async fn follow_logs(
        &self,
        container_id: &str,
        query: &LogQuery,
    ) -> Result<LogByteStream, PipelineError> {
        let mut url = self.url(&format!("containers/{}/logs", container_id))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("follow", "true")
                .append_pair("stdout", "true")
                .append_pair("stderr", "true")
                .append_pair("timestamps", if query.timestamps { "true" } else { "false" });
            if let Some(tail) = query.tail {
                pairs.append_pair("tail", &tail.to_string());
            }
        }
        debug!("GET {} (follow)", url);

        let response = self.client.get(url).send().await.map_err(unreachable)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(PipelineError::NotFound(format!(
                    "container {}",
                    container_id
                )))
            }
            _ => return Err(failure("Follow logs", response).await),
        }

        Ok(response.bytes_stream().map_err(unreachable).boxed())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), PipelineError> {
        let mut url = self.url(&format!("containers/{}", container_id))?;
        url.query_pairs_mut().append_pair("force", "true");
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(unreachable)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(failure("Remove container", response).await),
        }
    }
}
