//! Client progress subscriptions
//!
//! [`ProgressTracker`] is the explicit context object a UI root owns: it
//! tracks which resources are subscribed and exposes an observable map from
//! resource id to [`ActiveDeploy`]. Independent trackers share nothing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::sse::{SseDecoder, SseMessage};
use crate::client::state::ActiveDeploy;
use crate::errors::PipelineError;
use crate::models::event::ProgressEvent;
use crate::stream::{DONE_SENTINEL, END_EVENT};

/// Decoded SSE messages from one upstream progress connection
pub type MessageStream = BoxStream<'static, Result<SseMessage, PipelineError>>;

/// Where progress streams come from
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Open one upstream progress connection for `resource_id`
    async fn open(&self, resource_id: &str) -> Result<MessageStream, PipelineError>;
}

/// Progress source reading a deploywatch server's `/progress` endpoint
pub struct HttpProgressSource {
    client: Client,
    base_url: Url,
}

impl HttpProgressSource {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::ConfigError(format!("Invalid server URL: {}", e)))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ProgressSource for HttpProgressSource {
    async fn open(&self, resource_id: &str) -> Result<MessageStream, PipelineError> {
        let mut url = self
            .base_url
            .join("progress")
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        url.query_pairs_mut().append_pair("resourceId", resource_id);
        debug!("GET {} (progress)", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(PipelineError::NotFound(format!("resource {}", resource_id)))
            }
            StatusCode::BAD_REQUEST => {
                return Err(PipelineError::ValidationError(
                    response.text().await.unwrap_or_default(),
                ))
            }
            status => {
                return Err(PipelineError::ServerError(format!(
                    "progress stream refused: {}",
                    status
                )))
            }
        }

        let bytes = response.bytes_stream();
        let messages = futures::stream::unfold(
            (bytes, SseDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut ready)| async move {
                loop {
                    if let Some(message) = ready.pop_front() {
                        return Some((Ok(message), (bytes, decoder, ready)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => ready.extend(decoder.push(&chunk)),
                        Some(Err(e)) => {
                            return Some((Err(PipelineError::from(e)), (bytes, decoder, ready)))
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(messages.boxed())
    }
}

/// Tracker options
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Local hard timeout, mirroring the server's session budget
    pub session_timeout: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(120),
        }
    }
}

/// How a subscription ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// The stream-end sentinel arrived
    Done,
    /// Upstream closed without a sentinel
    Closed,
    /// Upstream could not be opened or failed mid-stream
    Failed,
    /// The local timeout elapsed
    TimedOut,
    /// Unsubscribed locally
    Cancelled,
}

#[derive(Debug, Clone)]
struct Subscription {
    generation: u64,
    cancel: CancellationToken,
}

/// Subscription registry plus the observable deploy map
pub struct ProgressTracker {
    source: Arc<dyn ProgressSource>,
    options: TrackerOptions,
    deploys: watch::Sender<HashMap<String, ActiveDeploy>>,
    subscriptions: watch::Sender<HashMap<String, Subscription>>,
    generation: AtomicU64,
}

impl ProgressTracker {
    pub fn new(source: Arc<dyn ProgressSource>, options: TrackerOptions) -> Arc<Self> {
        Arc::new(Self {
            source,
            options,
            deploys: watch::Sender::new(HashMap::new()),
            subscriptions: watch::Sender::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Start observing a resource
    ///
    /// Opens exactly one upstream connection per resource; calling it again
    /// while a subscription is live does nothing and returns `false`. A new
    /// subscription starts a fresh [`ActiveDeploy`]. Must be called from
    /// within a Tokio runtime.
    pub fn subscribe(self: &Arc<Self>, resource_id: &str, resource_name: &str) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let opened = self.subscriptions.send_if_modified(|subs| {
            if subs.contains_key(resource_id) {
                return false;
            }
            subs.insert(
                resource_id.to_string(),
                Subscription {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            true
        });
        if !opened {
            debug!("Already subscribed to {}", resource_id);
            return false;
        }

        self.deploys.send_modify(|deploys| {
            deploys.insert(
                resource_id.to_string(),
                ActiveDeploy::new(resource_id, resource_name),
            );
        });

        let tracker = Arc::clone(self);
        let resource_id = resource_id.to_string();
        tokio::spawn(async move {
            let end = tracker.run_subscription(&resource_id, cancel).await;
            info!("Subscription to {} ended: {:?}", resource_id, end);
            tracker.teardown(&resource_id, generation);
        });
        true
    }

    /// Stop observing a resource and forget its state (the UI unmounted)
    pub fn unsubscribe(&self, resource_id: &str) {
        let mut removed = None;
        self.subscriptions.send_if_modified(|subs| {
            removed = subs.remove(resource_id);
            removed.is_some()
        });
        if let Some(subscription) = removed {
            subscription.cancel.cancel();
        }
        self.deploys.send_if_modified(|deploys| deploys.remove(resource_id).is_some());
    }

    pub fn is_subscribed(&self, resource_id: &str) -> bool {
        self.subscriptions.borrow().contains_key(resource_id)
    }

    /// Current state of one deployment
    pub fn get(&self, resource_id: &str) -> Option<ActiveDeploy> {
        self.deploys.borrow().get(resource_id).cloned()
    }

    /// Snapshot of every tracked deployment
    pub fn snapshot(&self) -> HashMap<String, ActiveDeploy> {
        self.deploys.borrow().clone()
    }

    /// Observe the deploy map; the receiver wakes on every change
    pub fn watch(&self) -> watch::Receiver<HashMap<String, ActiveDeploy>> {
        self.deploys.subscribe()
    }

    /// Wait until `resource_id` has no live subscription
    pub async fn wait_idle(&self, resource_id: &str) {
        let mut subs = self.subscriptions.subscribe();
        // the sender lives as long as self, so this only fails if it was dropped
        let _ = subs.wait_for(|subs| !subs.contains_key(resource_id)).await;
    }

    async fn run_subscription(&self, resource_id: &str, cancel: CancellationToken) -> SubscriptionEnd {
        tokio::select! {
            _ = cancel.cancelled() => SubscriptionEnd::Cancelled,
            result = tokio::time::timeout(self.options.session_timeout, self.consume(resource_id)) => {
                match result {
                    Ok(Ok(end)) => end,
                    Ok(Err(e)) => {
                        warn!("Progress stream for {} failed: {}", resource_id, e);
                        SubscriptionEnd::Failed
                    }
                    Err(_) => SubscriptionEnd::TimedOut,
                }
            }
        }
    }

    async fn consume(&self, resource_id: &str) -> Result<SubscriptionEnd, PipelineError> {
        let mut messages = self.source.open(resource_id).await?;

        while let Some(message) = messages.next().await {
            let message = message?;
            if message.data == DONE_SENTINEL || message.event.as_deref() == Some(END_EVENT) {
                return Ok(SubscriptionEnd::Done);
            }

            let event: ProgressEvent = match serde_json::from_str(&message.data) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Discarding malformed progress message for {}: {}", resource_id, e);
                    continue;
                }
            };

            self.deploys.send_if_modified(|deploys| match deploys.get_mut(resource_id) {
                Some(deploy) => {
                    deploy.apply(event);
                    true
                }
                None => false,
            });
        }

        Ok(SubscriptionEnd::Closed)
    }

    /// Drop the subscription bookkeeping but keep the accumulated deploy
    fn teardown(&self, resource_id: &str, generation: u64) {
        self.subscriptions.send_if_modified(|subs| match subs.get(resource_id) {
            Some(sub) if sub.generation == generation => {
                subs.remove(resource_id);
                true
            }
            _ => false,
        });
    }
}
