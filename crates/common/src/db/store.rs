//! Storage traits the completion engine is written against
//!
//! Every lifecycle write is conditional on the current status, so the store
//! is the single serialization point: a `false` return means the guarded
//! row was not in the expected state (or does not exist) and nothing changed.

use crate::db::models::{Layer, RequestLayer, RequestStatus, ResearchRequest};
use crate::errors::Result;
use crate::matching::MatchOutcome;
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

/// Fields for a new layer; status is always `active` on creation
#[derive(Debug, Clone)]
pub struct NewLayer {
    pub name: String,
    pub description: Option<String>,
    pub year_from: i32,
    pub year_to: i32,
    pub words: String,
}

/// Partial layer update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub words: Option<String>,
}

/// Partial draft update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct DraftPatch {
    pub text_for_analysis: Option<String>,
    pub purpose: Option<String>,
}

/// Filter for listing submitted (formed or completed) requests
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Restrict to one owner
    pub user_id: Option<i64>,
    /// Restrict to one status; must be formed or completed to match anything
    pub status: Option<RequestStatus>,
}

/// Simple status transitions guarded by the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// draft -> formed, stamping `formed_at`
    Form { at: DateTimeWithTimeZone },
    /// draft -> deleted
    Delete,
}

impl Transition {
    pub fn from_status(&self) -> RequestStatus {
        RequestStatus::Draft
    }

    pub fn to_status(&self) -> RequestStatus {
        match self {
            Transition::Form { .. } => RequestStatus::Formed,
            Transition::Delete => RequestStatus::Deleted,
        }
    }
}

/// Everything written by a formed -> completed transition
#[derive(Debug, Clone)]
pub struct Completion {
    pub moderator_id: i64,
    pub completed_at: DateTimeWithTimeZone,
    /// Locally computed result; `None` when the computation is delegated
    pub outcome: Option<MatchOutcome>,
}

/// Externally computed result fields; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPatch {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub matched_layers: Option<i32>,
}

/// Read access to layers plus catalogue maintenance
#[async_trait]
pub trait LexiconStore: Send + Sync {
    /// Active layers ordered by id
    async fn active_layers(&self) -> Result<Vec<Layer>>;

    async fn find_active_layer(&self, id: i64) -> Result<Option<Layer>>;

    async fn create_layer(&self, layer: NewLayer) -> Result<Layer>;

    /// Update an active layer; `None` when no active layer has this id
    async fn update_layer(&self, id: i64, patch: LayerPatch) -> Result<Option<Layer>>;

    /// Soft delete; `false` when no active layer has this id
    async fn delete_layer(&self, id: i64) -> Result<bool>;
}

/// Research requests and their layer links
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: i64) -> Result<Option<ResearchRequest>>;

    /// Formed and completed requests, newest first
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ResearchRequest>>;

    async fn find_draft(&self, user_id: i64) -> Result<Option<ResearchRequest>>;

    /// Return the user's draft, creating it if none exists. At most one draft
    /// per user survives concurrent calls.
    async fn ensure_draft(&self, user_id: i64, now: DateTimeWithTimeZone) -> Result<ResearchRequest>;

    /// Update draft fields, only while the request is still a draft
    async fn update_draft(&self, id: i64, patch: &DraftPatch) -> Result<bool>;

    /// `UPDATE ... WHERE id = ? AND status = <from>`
    async fn transition(&self, id: i64, transition: Transition) -> Result<bool>;

    /// Atomically move formed -> completed (only if the text is non-empty),
    /// write the result fields and upsert one link per matched layer.
    /// Year bounds are written only when something matched.
    async fn complete(&self, id: i64, completion: &Completion) -> Result<bool>;

    /// Overwrite only the present result fields, regardless of status.
    /// `false` when the request does not exist.
    async fn apply_result(&self, id: i64, patch: &ResultPatch) -> Result<bool>;

    async fn request_links(&self, request_id: i64) -> Result<Vec<RequestLayer>>;

    async fn count_links(&self, request_id: i64) -> Result<u64>;

    /// Link a layer with `match_count = 0` while the request is a draft; an
    /// existing link is left as is. `false` when the request is not a draft.
    async fn attach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool>;

    async fn detach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool>;

    async fn set_link_comment(
        &self,
        request_id: i64,
        layer_id: i64,
        comment: Option<String>,
    ) -> Result<bool>;
}

/// Full storage collaborator
pub trait Store: LexiconStore + RequestStore {}

impl<T: LexiconStore + RequestStore> Store for T {}
