//! Research request lifecycle
//!
//! Owns every status transition (`draft -> formed -> completed`,
//! `draft -> deleted`) plus draft editing. Each transition checks the caller
//! and the current status up front for precise errors, then performs a write
//! conditional on that status; a lost race surfaces as `InvalidState`.

use crate::auth::Caller;
use crate::config::CompletionStrategy;
use crate::db::models::{RequestLayer, RequestStatus, ResearchRequest};
use crate::db::store::{Completion, DraftPatch, RequestFilter, Transition};
use crate::db::Store;
use crate::dispatch::DispatchQueue;
use crate::errors::{AppError, Result};
use crate::matching::match_layers;
use crate::metrics;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Status reported back after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionResult {
    pub id: i64,
    pub status: RequestStatus,
}

/// The caller's current draft, as shown by the cart icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub request_id: Option<i64>,
    pub count: u64,
}

/// A request together with its layer links
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: ResearchRequest,
    pub layers: Vec<RequestLayer>,
}

/// Drives request status transitions against a [`Store`]
pub struct RequestLifecycle {
    store: Arc<dyn Store>,
    strategy: CompletionStrategy,
    dispatcher: Option<DispatchQueue>,
}

impl RequestLifecycle {
    pub fn new(store: Arc<dyn Store>, strategy: CompletionStrategy) -> Self {
        Self {
            store,
            strategy,
            dispatcher: None,
        }
    }

    /// Attach the queue used when the strategy delegates
    pub fn with_dispatcher(mut self, dispatcher: DispatchQueue) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// `draft -> formed`, owner only
    #[instrument(skip(self), fields(user_id = caller.user_id))]
    pub async fn form_request(&self, caller: Caller, id: i64) -> Result<TransitionResult> {
        let request = self.load(id).await?;
        require_owner(&caller, &request)?;
        expect_status(&request, RequestStatus::Draft)?;

        if !self
            .store
            .transition(id, Transition::Form { at: now() })
            .await?
        {
            return Err(self.conflict(id, RequestStatus::Draft).await);
        }

        info!(request_id = id, "Request formed");
        Ok(TransitionResult {
            id,
            status: RequestStatus::Formed,
        })
    }

    /// `draft -> deleted`, owner only
    #[instrument(skip(self), fields(user_id = caller.user_id))]
    pub async fn delete_request(&self, caller: Caller, id: i64) -> Result<TransitionResult> {
        let request = self.load(id).await?;
        require_owner(&caller, &request)?;
        expect_status(&request, RequestStatus::Draft)?;

        if !self.store.transition(id, Transition::Delete).await? {
            return Err(self.conflict(id, RequestStatus::Draft).await);
        }

        info!(request_id = id, "Request deleted");
        Ok(TransitionResult {
            id,
            status: RequestStatus::Deleted,
        })
    }

    /// `formed -> completed`, moderators only.
    ///
    /// With a local strategy the result is matched here and written in the
    /// same conditional update; with a delegating strategy the request is
    /// queued for the external service after the transition commits. Neither
    /// queueing nor the later hand-off can fail this call.
    #[instrument(skip(self), fields(user_id = caller.user_id, strategy = self.strategy.as_str()))]
    pub async fn complete_request(&self, caller: Caller, id: i64) -> Result<TransitionResult> {
        caller.require_moderator()?;
        let request = self.load(id).await?;
        expect_status(&request, RequestStatus::Formed)?;

        let text = match request.text_for_analysis.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                metrics::record_completion(self.strategy.as_str(), "missing_text", None);
                return Err(AppError::MissingText { id });
            }
        };

        let outcome = if self.strategy.runs_locally() {
            let layers = self.store.active_layers().await?;
            Some(match_layers(text, &layers))
        } else {
            None
        };
        let matched = outcome.as_ref().map(|o| o.matched_count);

        let completion = Completion {
            moderator_id: caller.user_id,
            completed_at: now(),
            outcome,
        };

        if !self.store.complete(id, &completion).await? {
            metrics::record_completion(self.strategy.as_str(), "conflict", None);
            return Err(self.conflict(id, RequestStatus::Formed).await);
        }

        metrics::record_completion(self.strategy.as_str(), "completed", matched);
        info!(request_id = id, matched_layers = ?matched, "Request completed");

        if self.strategy.delegates() {
            self.dispatch(id);
        }

        Ok(TransitionResult {
            id,
            status: RequestStatus::Completed,
        })
    }

    fn dispatch(&self, id: i64) {
        match &self.dispatcher {
            Some(queue) => {
                if let Err(e) = queue.enqueue(id) {
                    warn!(request_id = id, error = %e, "Dispatch dropped");
                }
            }
            None => warn!(request_id = id, "No dispatcher configured, skipping hand-off"),
        }
    }

    /// Current draft id and its layer count
    pub async fn cart(&self, caller: Caller) -> Result<CartSummary> {
        match self.store.find_draft(caller.user_id).await? {
            Some(draft) => Ok(CartSummary {
                request_id: Some(draft.id),
                count: self.store.count_links(draft.id).await?,
            }),
            None => Ok(CartSummary {
                request_id: None,
                count: 0,
            }),
        }
    }

    /// Add an active layer to the caller's draft, creating the draft if needed
    #[instrument(skip(self), fields(user_id = caller.user_id))]
    pub async fn add_layer_to_draft(&self, caller: Caller, layer_id: i64) -> Result<CartSummary> {
        if self.store.find_active_layer(layer_id).await?.is_none() {
            return Err(AppError::LayerNotFound { id: layer_id });
        }

        let draft = self.store.ensure_draft(caller.user_id, now()).await?;
        if !self.store.attach_layer(draft.id, layer_id).await? {
            return Err(self.conflict(draft.id, RequestStatus::Draft).await);
        }

        Ok(CartSummary {
            request_id: Some(draft.id),
            count: self.store.count_links(draft.id).await?,
        })
    }

    /// Edit text and purpose while the request is still a draft
    #[instrument(skip(self, patch), fields(user_id = caller.user_id))]
    pub async fn update_draft(
        &self,
        caller: Caller,
        id: i64,
        patch: DraftPatch,
    ) -> Result<ResearchRequest> {
        let request = self.load(id).await?;
        require_owner(&caller, &request)?;
        expect_status(&request, RequestStatus::Draft)?;

        if !self.store.update_draft(id, &patch).await? {
            return Err(self.conflict(id, RequestStatus::Draft).await);
        }

        self.load(id).await
    }

    /// Detach a layer from a draft
    pub async fn remove_layer(&self, caller: Caller, id: i64, layer_id: i64) -> Result<()> {
        let request = self.load(id).await?;
        require_owner(&caller, &request)?;
        expect_status(&request, RequestStatus::Draft)?;

        if !self.store.detach_layer(id, layer_id).await? {
            return Err(link_not_found(id, layer_id));
        }
        Ok(())
    }

    /// Set or clear the comment on a request's layer link
    pub async fn comment_layer(
        &self,
        caller: Caller,
        id: i64,
        layer_id: i64,
        comment: Option<String>,
    ) -> Result<()> {
        let request = self.load_visible(caller, id).await?;

        if !self.store.set_link_comment(request.id, layer_id, comment).await? {
            return Err(link_not_found(id, layer_id));
        }
        Ok(())
    }

    /// Submitted requests, newest first; non-moderators only see their own
    pub async fn list_requests(
        &self,
        caller: Caller,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ResearchRequest>> {
        let filter = RequestFilter {
            user_id: (!caller.is_moderator).then_some(caller.user_id),
            status,
        };
        self.store.list_requests(&filter).await
    }

    /// One request with its links, for its owner or a moderator
    pub async fn request_detail(&self, caller: Caller, id: i64) -> Result<RequestDetail> {
        let request = self.load_visible(caller, id).await?;
        let layers = self.store.request_links(id).await?;
        Ok(RequestDetail { request, layers })
    }

    async fn load(&self, id: i64) -> Result<ResearchRequest> {
        self.store
            .find_request(id)
            .await?
            .ok_or(AppError::RequestNotFound { id })
    }

    // Deleted requests are hidden from reads
    async fn load_visible(&self, caller: Caller, id: i64) -> Result<ResearchRequest> {
        let request = self.load(id).await?;
        if request.request_status() == RequestStatus::Deleted {
            return Err(AppError::RequestNotFound { id });
        }
        if !caller.can_view(request.user_id) {
            return Err(AppError::Forbidden {
                message: format!("Request {} belongs to another user", id),
            });
        }
        Ok(request)
    }

    /// Error for a conditional write that matched no row
    async fn conflict(&self, id: i64, expected: RequestStatus) -> AppError {
        match self.store.find_request(id).await {
            Ok(Some(current)) => AppError::InvalidState {
                id,
                current: current.status,
                expected: expected.to_string(),
            },
            Ok(None) => AppError::RequestNotFound { id },
            Err(e) => e,
        }
    }
}

fn now() -> DateTimeWithTimeZone {
    chrono::Utc::now().into()
}

fn require_owner(caller: &Caller, request: &ResearchRequest) -> Result<()> {
    if request.is_owned_by(caller.user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            message: format!("Request {} belongs to another user", request.id),
        })
    }
}

fn expect_status(request: &ResearchRequest, expected: RequestStatus) -> Result<()> {
    if request.request_status() == expected {
        Ok(())
    } else {
        Err(AppError::InvalidState {
            id: request.id,
            current: request.status.clone(),
            expected: expected.to_string(),
        })
    }
}

fn link_not_found(request_id: i64, layer_id: i64) -> AppError {
    AppError::NotFound {
        resource_type: "request_layer".to_string(),
        id: format!("{}/{}", request_id, layer_id),
    }
}
