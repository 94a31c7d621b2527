//! Application of externally computed results
//!
//! A result overwrites only the fields it carries and never changes the
//! request status, so replays and late arrivals are harmless.

use crate::auth::CallbackCredential;
use crate::db::store::ResultPatch;
use crate::db::Store;
use crate::errors::{AppError, Result};
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Acknowledgement returned to the computation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReceipt {
    pub status: &'static str,
    pub request_id: i64,
}

pub struct ResultIngestion {
    store: Arc<dyn Store>,
    credential: Arc<dyn CallbackCredential>,
}

impl ResultIngestion {
    pub fn new(store: Arc<dyn Store>, credential: Arc<dyn CallbackCredential>) -> Self {
        Self { store, credential }
    }

    /// Verify the presented token, check the payload, then write the present
    /// result fields. Nothing about the payload is judged before the token.
    #[instrument(skip(self, token))]
    pub async fn apply_result(
        &self,
        request_id: i64,
        patch: ResultPatch,
        token: &str,
    ) -> Result<IngestionReceipt> {
        if !self.credential.verify(token) {
            warn!("Async result rejected: bad callback token");
            metrics::record_ingestion("rejected");
            return Err(AppError::InvalidCallbackToken);
        }

        if patch.matched_layers.is_some_and(|n| n < 0) {
            metrics::record_ingestion("invalid");
            return Err(AppError::Validation {
                message: "matched_layers must not be negative".to_string(),
                field: Some("matched_layers".to_string()),
            });
        }

        if !self.store.apply_result(request_id, &patch).await? {
            metrics::record_ingestion("not_found");
            return Err(AppError::RequestNotFound { id: request_id });
        }

        metrics::record_ingestion("updated");
        info!(request_id, "Async result applied");

        Ok(IngestionReceipt {
            status: "updated",
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedSecret;
    use crate::db::models::{RequestStatus, ResearchRequest};
    use crate::db::{MemoryStore, RequestStore};
    use tokio_test::{assert_err, assert_ok};

    async fn setup(status: &str) -> (Arc<MemoryStore>, ResultIngestion, i64) {
        let store = Arc::new(MemoryStore::new());
        let request = store
            .insert_request(ResearchRequest {
                id: 0,
                user_id: 1,
                moderator_id: Some(2),
                status: status.to_string(),
                created_at: chrono::Utc::now().into(),
                formed_at: None,
                completed_at: None,
                text_for_analysis: Some("чудо".to_string()),
                purpose: None,
                result_year_from: None,
                result_year_to: None,
                matched_layer_count: None,
            })
            .await;
        let ingestion = ResultIngestion::new(store.clone(), Arc::new(SharedSecret::new("111517")));
        (store, ingestion, request.id)
    }

    fn full() -> ResultPatch {
        ResultPatch {
            year_from: Some(1450),
            year_to: Some(1917),
            matched_layers: Some(2),
        }
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let (store, ingestion, id) = setup("completed").await;

        let receipt = ingestion.apply_result(id, full(), "111517").await.unwrap();
        assert_eq!(
            receipt,
            IngestionReceipt {
                status: "updated",
                request_id: id
            }
        );
        let once = store.find_request(id).await.unwrap().unwrap();

        ingestion.apply_result(id, full(), "111517").await.unwrap();
        let twice = store.find_request(id).await.unwrap().unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_matched_only_keeps_years() {
        let (store, ingestion, id) = setup("completed").await;
        ingestion.apply_result(id, full(), "111517").await.unwrap();

        let patch = ResultPatch {
            matched_layers: Some(4),
            ..Default::default()
        };
        ingestion.apply_result(id, patch, "111517").await.unwrap();

        let stored = store.find_request(id).await.unwrap().unwrap();
        assert_eq!(stored.result_year_from, Some(1450));
        assert_eq!(stored.result_year_to, Some(1917));
        assert_eq!(stored.matched_layer_count, Some(4));
    }

    #[tokio::test]
    async fn test_status_is_untouched() {
        let (store, ingestion, id) = setup("formed").await;
        assert_ok!(ingestion.apply_result(id, full(), "111517").await);

        let stored = store.find_request(id).await.unwrap().unwrap();
        assert_eq!(stored.request_status(), RequestStatus::Formed);
        assert_eq!(stored.matched_layer_count, Some(2));
    }

    #[tokio::test]
    async fn test_bad_token_rejected_without_writes() {
        let (store, ingestion, id) = setup("completed").await;
        let writes = store.write_count();

        let err = assert_err!(ingestion.apply_result(id, full(), "wrong").await);

        assert!(matches!(err, AppError::InvalidCallbackToken));
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_negative_match_count_rejected_after_token() {
        let (store, ingestion, id) = setup("completed").await;
        let writes = store.write_count();
        let negative = ResultPatch {
            matched_layers: Some(-1),
            ..Default::default()
        };

        let err = assert_err!(ingestion.apply_result(id, negative.clone(), "wrong").await);
        assert!(matches!(err, AppError::InvalidCallbackToken));

        let err = assert_err!(ingestion.apply_result(id, negative, "111517").await);
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let (_store, ingestion, _id) = setup("completed").await;
        let err = ingestion.apply_result(555, full(), "111517").await.unwrap_err();
        assert!(matches!(err, AppError::RequestNotFound { id: 555 }));
    }
}
