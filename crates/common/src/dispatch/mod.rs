//! Hand-off of completed requests to the external computation service
//!
//! Provides:
//! - [`ChronoClient`] abstraction with an HTTP implementation
//! - [`DispatchQueue`], a bounded non-blocking queue fed by the lifecycle
//! - [`DispatchWorker`], the background consumer with bounded concurrency
//!
//! Dispatch failures never reach the caller that triggered completion: they
//! are logged and counted, and nothing is retried.

use crate::auth::CallbackCredential;
use crate::db::models::RequestStatus;
use crate::db::Store;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Path of the computation endpoint on the external service
pub const CALCULATE_PATH: &str = "/calculate-chrono";

/// Body sent to the computation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub research_request_id: i64,
    pub auth_token: String,
    pub text_for_analysis: String,
    pub purpose: Option<String>,
    pub user_id: i64,
}

/// Client for the external computation service
#[async_trait]
pub trait ChronoClient: Send + Sync {
    /// Submit one request for computation. Any non-success response is an error.
    async fn calculate(&self, payload: &DispatchPayload) -> Result<()>;
}

/// reqwest-backed client posting to `{service_url}/calculate-chrono`
pub struct HttpChronoClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChronoClient {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", service_url.trim_end_matches('/'), CALCULATE_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChronoClient for HttpChronoClient {
    async fn calculate(&self, payload: &DispatchPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Dependency {
                service: "chrono-service".to_string(),
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Dependency {
                service: "chrono-service".to_string(),
                message: format!("Service error {}: {}", status, body),
            });
        }

        Ok(())
    }
}

/// One queued hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchJob {
    pub job_id: Uuid,
    pub request_id: i64,
}

/// Receiver end of the dispatch queue, owned by the worker
pub type DispatchReceiver = mpsc::Receiver<DispatchJob>;

/// Counters for monitoring dispatch health
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Sent => &self.sent,
            DispatchOutcome::Failed => &self.failed,
            DispatchOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sending side of the dispatch queue.
///
/// `enqueue` never blocks: a full queue drops the job.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<DispatchJob>,
    stats: Arc<DispatchStats>,
    capacity: usize,
}

impl DispatchQueue {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn new(capacity: usize) -> (Self, DispatchReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            stats: Arc::new(DispatchStats::default()),
            capacity: capacity.max(1),
        };
        (queue, receiver)
    }

    /// Queue a completed request for hand-off
    pub fn enqueue(&self, request_id: i64) -> Result<Uuid> {
        let job = DispatchJob {
            job_id: Uuid::new_v4(),
            request_id,
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(request_id, job_id = %job.job_id, "Dispatch queued");
                Ok(job.job_id)
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_dispatch_dropped();
                Err(AppError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(AppError::Internal {
                message: "Dispatch worker has stopped".to_string(),
            }),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

/// Result of processing one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    Skipped,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Background consumer of the dispatch queue
pub struct DispatchWorker {
    store: Arc<dyn Store>,
    client: Arc<dyn ChronoClient>,
    credential: Arc<dyn CallbackCredential>,
    stats: Arc<DispatchStats>,
    concurrency: usize,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn ChronoClient>,
        credential: Arc<dyn CallbackCredential>,
        queue: &DispatchQueue,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            client,
            credential,
            stats: queue.stats(),
            concurrency: concurrency.max(1),
        }
    }

    /// Consume jobs until every sender is dropped and the queue is drained
    pub async fn run(self, receiver: DispatchReceiver) {
        info!(concurrency = self.concurrency, "Dispatch worker started");

        let jobs = futures::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|job| (job, rx))
        });

        let worker = &self;
        jobs.for_each_concurrent(self.concurrency, |job| async move {
            worker.process(job).await;
        })
        .await;

        info!(stats = ?self.stats.snapshot(), "Dispatch worker stopped");
    }

    /// Hand one request to the computation service
    #[instrument(skip(self), fields(job_id = %job.job_id, request_id = job.request_id))]
    pub async fn process(&self, job: DispatchJob) -> DispatchOutcome {
        let start = Instant::now();
        let outcome = match self.build_payload(job.request_id).await {
            Ok(Some(payload)) => match self.client.calculate(&payload).await {
                Ok(()) => {
                    info!("Request dispatched");
                    DispatchOutcome::Sent
                }
                Err(e) => {
                    error!(error = %e, "Dispatch failed");
                    DispatchOutcome::Failed
                }
            },
            Ok(None) => DispatchOutcome::Skipped,
            Err(e) => {
                error!(error = %e, "Failed to load request for dispatch");
                DispatchOutcome::Failed
            }
        };

        self.stats.record(outcome);
        metrics::record_dispatch(start.elapsed().as_secs_f64(), outcome.as_str());
        outcome
    }

    async fn build_payload(&self, request_id: i64) -> Result<Option<DispatchPayload>> {
        let Some(request) = self.store.find_request(request_id).await? else {
            warn!("Request vanished before dispatch");
            return Ok(None);
        };

        let status = request.request_status();
        if !matches!(status, RequestStatus::Formed | RequestStatus::Completed) {
            warn!(status = %status, "Request not eligible for dispatch");
            return Ok(None);
        }

        let text = match request.text_for_analysis {
            Some(ref text) if !text.trim().is_empty() => text.clone(),
            _ => {
                warn!("Request has no text, skipping dispatch");
                return Ok(None);
            }
        };

        Ok(Some(DispatchPayload {
            research_request_id: request.id,
            auth_token: self.credential.token().to_string(),
            text_for_analysis: text,
            purpose: request.purpose,
            user_id: request.user_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedSecret;
    use crate::db::models::ResearchRequest;
    use crate::db::MemoryStore;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use tokio::sync::Mutex;

    /// Records payloads and answers with a fixed status
    #[derive(Default)]
    struct RecordingClient {
        payloads: Mutex<Vec<DispatchPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl ChronoClient for RecordingClient {
        async fn calculate(&self, payload: &DispatchPayload) -> Result<()> {
            self.payloads.lock().await.push(payload.clone());
            if self.fail {
                Err(AppError::Dependency {
                    service: "test".to_string(),
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn request(status: &str, text: Option<&str>) -> ResearchRequest {
        ResearchRequest {
            id: 0,
            user_id: 11,
            moderator_id: None,
            status: status.to_string(),
            created_at: chrono::Utc::now().into(),
            formed_at: None,
            completed_at: None,
            text_for_analysis: text.map(str::to_string),
            purpose: Some("thesis".to_string()),
            result_year_from: None,
            result_year_to: None,
            matched_layer_count: None,
        }
    }

    fn worker(
        store: Arc<MemoryStore>,
        client: Arc<RecordingClient>,
        queue: &DispatchQueue,
    ) -> DispatchWorker {
        DispatchWorker::new(store, client, Arc::new(SharedSecret::new("s3cret")), queue, 2)
    }

    #[test]
    fn test_enqueue_never_blocks() {
        let (queue, _receiver) = DispatchQueue::new(2);

        let results: Vec<_> = (0..5).map(|id| queue.enqueue(id)).collect();

        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[4], Err(AppError::QueueFull { capacity: 2 })));

        let stats = queue.stats().snapshot();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_enqueue_after_worker_gone() {
        let (queue, receiver) = DispatchQueue::new(4);
        drop(receiver);
        assert!(matches!(queue.enqueue(1), Err(AppError::Internal { .. })));
    }

    #[test]
    fn test_client_endpoint() {
        let client = HttpChronoClient::new("http://localhost:9001/", Duration::from_secs(20)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9001/calculate-chrono");
    }

    #[tokio::test]
    async fn test_process_builds_payload() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(RecordingClient::default());
        let (queue, _receiver) = DispatchQueue::new(4);
        let stored = store.insert_request(request("completed", Some("вещати о социализм"))).await;

        let job = DispatchJob {
            job_id: Uuid::new_v4(),
            request_id: stored.id,
        };
        let outcome = worker(store, client.clone(), &queue).process(job).await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        let payloads = client.payloads.lock().await;
        assert_eq!(
            payloads[0],
            DispatchPayload {
                research_request_id: stored.id,
                auth_token: "s3cret".to_string(),
                text_for_analysis: "вещати о социализм".to_string(),
                purpose: Some("thesis".to_string()),
                user_id: 11,
            }
        );
    }

    #[tokio::test]
    async fn test_process_skips_ineligible() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(RecordingClient::default());
        let (queue, _receiver) = DispatchQueue::new(4);

        let empty = store.insert_request(request("formed", Some("   "))).await;
        let draft = store.insert_request(request("draft", Some("текст"))).await;
        let w = worker(store, client.clone(), &queue);

        for id in [empty.id, draft.id, 999] {
            let job = DispatchJob {
                job_id: Uuid::new_v4(),
                request_id: id,
            };
            assert_eq!(w.process(job).await, DispatchOutcome::Skipped);
        }

        assert!(client.payloads.lock().await.is_empty());
        assert_eq!(queue.stats().snapshot().skipped, 3);
    }

    #[tokio::test]
    async fn test_failure_is_counted_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(RecordingClient {
            fail: true,
            ..Default::default()
        });
        let (queue, _receiver) = DispatchQueue::new(4);
        let stored = store.insert_request(request("formed", Some("текст"))).await;

        let job = DispatchJob {
            job_id: Uuid::new_v4(),
            request_id: stored.id,
        };
        let outcome = worker(store, client, &queue).process(job).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(queue.stats().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_then_stops() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(RecordingClient::default());
        let (queue, receiver) = DispatchQueue::new(8);

        for _ in 0..3 {
            let stored = store.insert_request(request("completed", Some("текст"))).await;
            queue.enqueue(stored.id).unwrap();
        }

        let w = worker(store, client.clone(), &queue);
        let stats = queue.stats();
        drop(queue);

        tokio::time::timeout(Duration::from_secs(5), w.run(receiver))
            .await
            .expect("worker should stop once senders are gone");

        assert_eq!(client.payloads.lock().await.len(), 3);
        assert_eq!(stats.snapshot().sent, 3);
    }

    async fn serve(status: StatusCode) -> (String, Arc<Mutex<Vec<DispatchPayload>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route(
                CALCULATE_PATH,
                post(
                    move |State(received): State<Arc<Mutex<Vec<DispatchPayload>>>>,
                          Json(payload): Json<DispatchPayload>| async move {
                        received.lock().await.push(payload);
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), received)
    }

    fn payload() -> DispatchPayload {
        DispatchPayload {
            research_request_id: 7,
            auth_token: "s3cret".to_string(),
            text_for_analysis: "чудо".to_string(),
            purpose: None,
            user_id: 3,
        }
    }

    #[tokio::test]
    async fn test_http_client_posts_payload() {
        let (url, received) = serve(StatusCode::OK).await;
        let client = HttpChronoClient::new(&url, Duration::from_secs(5)).unwrap();

        client.calculate(&payload()).await.unwrap();

        assert_eq!(received.lock().await.as_slice(), &[payload()]);
    }

    #[tokio::test]
    async fn test_http_client_non_success_is_dependency_error() {
        let (url, _received) = serve(StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = HttpChronoClient::new(&url, Duration::from_secs(5)).unwrap();

        let err = client.calculate(&payload()).await.unwrap_err();
        assert!(matches!(err, AppError::Dependency { .. }));
    }

    #[tokio::test]
    async fn test_http_client_unreachable_is_dependency_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpChronoClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = client.calculate(&payload()).await.unwrap_err();
        assert!(matches!(err, AppError::Dependency { .. }));
    }
}
