//! Postgres repository implementing the store traits
//!
//! Lifecycle writes are raw statements so the status guard, the completion
//! transaction and the link upsert stay single round-trip and atomic. The
//! schema provides:
//! - `request_layers` primary key `(research_request_id, layer_id)`
//! - a partial unique index on `research_requests (user_id) WHERE status = 'draft'`
//! - a partial unique index on `layers (name) WHERE status = 'active'`

use crate::db::models::*;
use crate::db::store::{
    Completion, DraftPatch, LayerPatch, LexiconStore, NewLayer, RequestFilter, RequestStore,
    ResultPatch, Transition,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, Statement,
    TransactionTrait,
};
use tracing::debug;

/// Repository for data access operations
// sea-orm's `mock` feature (test-only) makes DatabaseConnection non-Clone
#[cfg_attr(not(test), derive(Clone))]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl LexiconStore for Repository {
    async fn active_layers(&self) -> Result<Vec<Layer>> {
        LayerEntity::find()
            .filter(LayerColumn::Status.eq(LayerStatus::Active.as_str()))
            .order_by_asc(LayerColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_active_layer(&self, id: i64) -> Result<Option<Layer>> {
        LayerEntity::find_by_id(id)
            .filter(LayerColumn::Status.eq(LayerStatus::Active.as_str()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn create_layer(&self, layer: NewLayer) -> Result<Layer> {
        let name = layer.name.clone();
        let model = LayerActiveModel {
            id: NotSet,
            name: Set(layer.name),
            description: Set(layer.description),
            year_from: Set(layer.year_from),
            year_to: Set(layer.year_to),
            status: Set(LayerStatus::Active.as_str().to_string()),
            words: Set(layer.words),
        };

        model
            .insert(self.write_conn())
            .await
            .map_err(|e| name_conflict(e, &name))
    }

    async fn update_layer(&self, id: i64, patch: LayerPatch) -> Result<Option<Layer>> {
        let Some(existing) = LayerEntity::find_by_id(id)
            .filter(LayerColumn::Status.eq(LayerStatus::Active.as_str()))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        let mut layer: LayerActiveModel = existing.into();
        let name = patch.name.clone().unwrap_or_default();
        if let Some(name) = patch.name {
            layer.name = Set(name);
        }
        if let Some(description) = patch.description {
            layer.description = Set(Some(description));
        }
        if let Some(year_from) = patch.year_from {
            layer.year_from = Set(year_from);
        }
        if let Some(year_to) = patch.year_to {
            layer.year_to = Set(year_to);
        }
        if let Some(words) = patch.words {
            layer.words = Set(words);
        }

        layer
            .update(self.write_conn())
            .await
            .map(Some)
            .map_err(|e| name_conflict(e, &name))
    }

    async fn delete_layer(&self, id: i64) -> Result<bool> {
        let result = LayerEntity::update_many()
            .col_expr(LayerColumn::Status, Expr::value(LayerStatus::Deleted.as_str()))
            .filter(LayerColumn::Id.eq(id))
            .filter(LayerColumn::Status.eq(LayerStatus::Active.as_str()))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl RequestStore for Repository {
    // Guards read what the conditional write will see, so never the replica
    async fn find_request(&self, id: i64) -> Result<Option<ResearchRequest>> {
        ResearchRequestEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ResearchRequest>> {
        let mut query = ResearchRequestEntity::find().filter(ResearchRequestColumn::Status.is_in([
            RequestStatus::Formed.as_str(),
            RequestStatus::Completed.as_str(),
        ]));

        if let Some(user_id) = filter.user_id {
            query = query.filter(ResearchRequestColumn::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(ResearchRequestColumn::Status.eq(status.as_str()));
        }

        query
            .order_by_desc(ResearchRequestColumn::CreatedAt)
            .order_by_desc(ResearchRequestColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_draft(&self, user_id: i64) -> Result<Option<ResearchRequest>> {
        ResearchRequestEntity::find()
            .filter(ResearchRequestColumn::UserId.eq(user_id))
            .filter(ResearchRequestColumn::Status.eq(RequestStatus::Draft.as_str()))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn ensure_draft(&self, user_id: i64, now: DateTimeWithTimeZone) -> Result<ResearchRequest> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO research_requests (user_id, status, created_at)
            VALUES ($1, 'draft', $2)
            ON CONFLICT (user_id) WHERE status = 'draft' DO NOTHING
            "#,
            vec![user_id.into(), now.into()],
        );
        self.write_conn().execute(stmt).await?;

        self.find_draft(user_id)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("draft for user {} vanished after insert", user_id),
            })
    }

    async fn update_draft(&self, id: i64, patch: &DraftPatch) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE research_requests
            SET text_for_analysis = COALESCE($2, text_for_analysis),
                purpose = COALESCE($3, purpose)
            WHERE id = $1 AND status = 'draft'
            "#,
            vec![
                id.into(),
                patch.text_for_analysis.clone().into(),
                patch.purpose.clone().into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition(&self, id: i64, transition: Transition) -> Result<bool> {
        let formed_at = match transition {
            Transition::Form { at } => Some(at),
            Transition::Delete => None,
        };

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE research_requests
            SET status = $3,
                formed_at = COALESCE($4, formed_at)
            WHERE id = $1 AND status = $2
            "#,
            vec![
                id.into(),
                transition.from_status().as_str().into(),
                transition.to_status().as_str().into(),
                formed_at.into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: i64, completion: &Completion) -> Result<bool> {
        let outcome = completion.outcome.as_ref();
        let matched_count = outcome.map(|o| o.matched_count);
        let (year_from, year_to) = match outcome {
            Some(o) if o.matched_count > 0 => (o.year_from, o.year_to),
            _ => (None, None),
        };

        let txn = self.write_conn().begin().await?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE research_requests
            SET status = 'completed',
                completed_at = $2,
                moderator_id = $3,
                matched_layer_count = COALESCE($4, matched_layer_count),
                result_year_from = COALESCE($5, result_year_from),
                result_year_to = COALESCE($6, result_year_to)
            WHERE id = $1
              AND status = 'formed'
              AND COALESCE(BTRIM(text_for_analysis), '') <> ''
            "#,
            vec![
                id.into(),
                completion.completed_at.into(),
                completion.moderator_id.into(),
                matched_count.into(),
                year_from.into(),
                year_to.into(),
            ],
        );

        if txn.execute(stmt).await?.rows_affected() == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        if let Some(outcome) = outcome {
            for m in outcome.matches() {
                let upsert = Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    r#"
                    INSERT INTO request_layers (research_request_id, layer_id, match_count)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (research_request_id, layer_id)
                    DO UPDATE SET match_count = EXCLUDED.match_count
                    "#,
                    vec![id.into(), m.layer_id.into(), m.match_count.into()],
                );
                txn.execute(upsert).await?;
            }
        }

        txn.commit().await?;
        debug!(request_id = id, "Completion committed");
        Ok(true)
    }

    async fn apply_result(&self, id: i64, patch: &ResultPatch) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE research_requests
            SET result_year_from = COALESCE($2, result_year_from),
                result_year_to = COALESCE($3, result_year_to),
                matched_layer_count = COALESCE($4, matched_layer_count)
            WHERE id = $1
            "#,
            vec![
                id.into(),
                patch.year_from.into(),
                patch.year_to.into(),
                patch.matched_layers.into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn request_links(&self, request_id: i64) -> Result<Vec<RequestLayer>> {
        RequestLayerEntity::find()
            .filter(RequestLayerColumn::ResearchRequestId.eq(request_id))
            .order_by_asc(RequestLayerColumn::LayerId)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn count_links(&self, request_id: i64) -> Result<u64> {
        RequestLayerEntity::find()
            .filter(RequestLayerColumn::ResearchRequestId.eq(request_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn attach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool> {
        // FOR SHARE holds off a concurrent form/delete until the link is in
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            WITH draft AS (
                SELECT id FROM research_requests
                WHERE id = $1 AND status = 'draft'
                FOR SHARE
            ), linked AS (
                INSERT INTO request_layers (research_request_id, layer_id, match_count)
                SELECT id, $2, 0 FROM draft
                ON CONFLICT (research_request_id, layer_id) DO NOTHING
            )
            SELECT COUNT(*) AS drafts FROM draft
            "#,
            vec![request_id.into(), layer_id.into()],
        );

        let drafts = match self.write_conn().query_one(stmt).await? {
            Some(row) => row.try_get::<i64>("", "drafts")?,
            None => 0,
        };
        Ok(drafts > 0)
    }

    async fn detach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool> {
        let result = RequestLayerEntity::delete_many()
            .filter(RequestLayerColumn::ResearchRequestId.eq(request_id))
            .filter(RequestLayerColumn::LayerId.eq(layer_id))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn set_link_comment(
        &self,
        request_id: i64,
        layer_id: i64,
        comment: Option<String>,
    ) -> Result<bool> {
        let result = RequestLayerEntity::update_many()
            .col_expr(RequestLayerColumn::Comment, Expr::value(comment))
            .filter(RequestLayerColumn::ResearchRequestId.eq(request_id))
            .filter(RequestLayerColumn::LayerId.eq(layer_id))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

/// Map the active-name unique index violation to a domain error
fn name_conflict(err: DbErr, name: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::LayerNameTaken {
            name: name.to_string(),
        },
        _ => err.into(),
    }
}
