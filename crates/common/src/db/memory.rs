//! In-process store with the same conditional-write semantics as Postgres
//!
//! All tables live behind one lock, so every guarded update is atomic. Used
//! by tests and by local runs without a database.

use super::models::{Layer, LayerStatus, RequestLayer, RequestStatus, ResearchRequest};
use super::store::{
    Completion, DraftPatch, LayerPatch, LexiconStore, NewLayer, RequestFilter, RequestStore,
    ResultPatch, Transition,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    layers: BTreeMap<i64, Layer>,
    requests: BTreeMap<i64, ResearchRequest>,
    links: BTreeMap<(i64, i64), RequestLayer>,
    next_layer_id: i64,
    next_request_id: i64,
}

impl Tables {
    fn next_layer_id(&mut self) -> i64 {
        self.next_layer_id += 1;
        self.next_layer_id
    }

    fn next_request_id(&mut self) -> i64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Active layer names are unique; `except` is the layer being renamed
    fn check_name_free(&self, name: &str, except: Option<i64>) -> Result<()> {
        let taken = self
            .layers
            .values()
            .any(|l| l.is_active() && l.name == name && Some(l.id) != except);
        if taken {
            return Err(AppError::LayerNameTaken {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Memory-backed [`Store`](super::store::Store)
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Seed a request as-is (id 0 assigns the next id)
    pub async fn insert_request(&self, mut request: ResearchRequest) -> ResearchRequest {
        let mut tables = self.tables.write().await;
        if request.id == 0 {
            request.id = tables.next_request_id();
        } else {
            tables.next_request_id = tables.next_request_id.max(request.id);
        }
        tables.requests.insert(request.id, request.clone());
        request
    }

    /// Seed a layer as-is (id 0 assigns the next id)
    pub async fn insert_layer(&self, mut layer: Layer) -> Layer {
        let mut tables = self.tables.write().await;
        if layer.id == 0 {
            layer.id = tables.next_layer_id();
        } else {
            tables.next_layer_id = tables.next_layer_id.max(layer.id);
        }
        tables.layers.insert(layer.id, layer.clone());
        layer
    }
}

#[async_trait]
impl LexiconStore for MemoryStore {
    async fn active_layers(&self) -> Result<Vec<Layer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .layers
            .values()
            .filter(|l| l.is_active())
            .cloned()
            .collect())
    }

    async fn find_active_layer(&self, id: i64) -> Result<Option<Layer>> {
        let tables = self.tables.read().await;
        Ok(tables.layers.get(&id).filter(|l| l.is_active()).cloned())
    }

    async fn create_layer(&self, layer: NewLayer) -> Result<Layer> {
        let mut tables = self.tables.write().await;
        tables.check_name_free(&layer.name, None)?;
        let id = tables.next_layer_id();
        let model = Layer {
            id,
            name: layer.name,
            description: layer.description,
            year_from: layer.year_from,
            year_to: layer.year_to,
            status: LayerStatus::Active.as_str().to_string(),
            words: layer.words,
        };
        tables.layers.insert(id, model.clone());
        self.record_write();
        Ok(model)
    }

    async fn update_layer(&self, id: i64, patch: LayerPatch) -> Result<Option<Layer>> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &patch.name {
            tables.check_name_free(name, Some(id))?;
        }
        let Some(layer) = tables.layers.get_mut(&id).filter(|l| l.is_active()) else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            layer.name = name;
        }
        if let Some(description) = patch.description {
            layer.description = Some(description);
        }
        if let Some(year_from) = patch.year_from {
            layer.year_from = year_from;
        }
        if let Some(year_to) = patch.year_to {
            layer.year_to = year_to;
        }
        if let Some(words) = patch.words {
            layer.words = words;
        }

        let updated = layer.clone();
        self.record_write();
        Ok(Some(updated))
    }

    async fn delete_layer(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.layers.get_mut(&id).filter(|l| l.is_active()) {
            Some(layer) => {
                layer.status = LayerStatus::Deleted.as_str().to_string();
                self.record_write();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_request(&self, id: i64) -> Result<Option<ResearchRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.requests.get(&id).cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ResearchRequest>> {
        let tables = self.tables.read().await;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|r| {
                matches!(
                    r.request_status(),
                    RequestStatus::Formed | RequestStatus::Completed
                )
            })
            .filter(|r| filter.user_id.map_or(true, |uid| r.user_id == uid))
            .filter(|r| filter.status.map_or(true, |s| r.request_status() == s))
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn find_draft(&self, user_id: i64) -> Result<Option<ResearchRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .values()
            .find(|r| r.user_id == user_id && r.request_status() == RequestStatus::Draft)
            .cloned())
    }

    async fn ensure_draft(&self, user_id: i64, now: DateTimeWithTimeZone) -> Result<ResearchRequest> {
        let mut tables = self.tables.write().await;
        if let Some(draft) = tables
            .requests
            .values()
            .find(|r| r.user_id == user_id && r.request_status() == RequestStatus::Draft)
        {
            return Ok(draft.clone());
        }

        let id = tables.next_request_id();
        let draft = ResearchRequest {
            id,
            user_id,
            moderator_id: None,
            status: RequestStatus::Draft.as_str().to_string(),
            created_at: now,
            formed_at: None,
            completed_at: None,
            text_for_analysis: None,
            purpose: None,
            result_year_from: None,
            result_year_to: None,
            matched_layer_count: None,
        };
        tables.requests.insert(id, draft.clone());
        self.record_write();
        Ok(draft)
    }

    async fn update_draft(&self, id: i64, patch: &DraftPatch) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables
            .requests
            .get_mut(&id)
            .filter(|r| r.request_status() == RequestStatus::Draft)
        else {
            return Ok(false);
        };

        if let Some(text) = &patch.text_for_analysis {
            request.text_for_analysis = Some(text.clone());
        }
        if let Some(purpose) = &patch.purpose {
            request.purpose = Some(purpose.clone());
        }
        self.record_write();
        Ok(true)
    }

    async fn transition(&self, id: i64, transition: Transition) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables
            .requests
            .get_mut(&id)
            .filter(|r| r.request_status() == transition.from_status())
        else {
            return Ok(false);
        };

        request.status = transition.to_status().as_str().to_string();
        if let Transition::Form { at } = transition {
            request.formed_at = Some(at);
        }
        self.record_write();
        Ok(true)
    }

    async fn complete(&self, id: i64, completion: &Completion) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables
            .requests
            .get_mut(&id)
            .filter(|r| r.request_status() == RequestStatus::Formed && r.has_text())
        else {
            return Ok(false);
        };

        request.status = RequestStatus::Completed.as_str().to_string();
        request.completed_at = Some(completion.completed_at);
        request.moderator_id = Some(completion.moderator_id);

        if let Some(outcome) = &completion.outcome {
            request.matched_layer_count = Some(outcome.matched_count);
            if outcome.matched_count > 0 {
                request.result_year_from = outcome.year_from;
                request.result_year_to = outcome.year_to;
            }

            for m in outcome.matches() {
                tables
                    .links
                    .entry((id, m.layer_id))
                    .and_modify(|link| link.match_count = m.match_count)
                    .or_insert(RequestLayer {
                        research_request_id: id,
                        layer_id: m.layer_id,
                        match_count: m.match_count,
                        comment: None,
                    });
            }
        }

        self.record_write();
        Ok(true)
    }

    async fn apply_result(&self, id: i64, patch: &ResultPatch) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables.requests.get_mut(&id) else {
            return Ok(false);
        };

        if let Some(year_from) = patch.year_from {
            request.result_year_from = Some(year_from);
        }
        if let Some(year_to) = patch.year_to {
            request.result_year_to = Some(year_to);
        }
        if let Some(matched) = patch.matched_layers {
            request.matched_layer_count = Some(matched);
        }
        self.record_write();
        Ok(true)
    }

    async fn request_links(&self, request_id: i64) -> Result<Vec<RequestLayer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .range((request_id, i64::MIN)..=(request_id, i64::MAX))
            .map(|(_, link)| link.clone())
            .collect())
    }

    async fn count_links(&self, request_id: i64) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .range((request_id, i64::MIN)..=(request_id, i64::MAX))
            .count() as u64)
    }

    async fn attach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let is_draft = tables
            .requests
            .get(&request_id)
            .is_some_and(|r| r.request_status() == RequestStatus::Draft);
        if !is_draft {
            return Ok(false);
        }

        if !tables.links.contains_key(&(request_id, layer_id)) {
            tables.links.insert(
                (request_id, layer_id),
                RequestLayer {
                    research_request_id: request_id,
                    layer_id,
                    match_count: 0,
                    comment: None,
                },
            );
            self.record_write();
        }
        Ok(true)
    }

    async fn detach_layer(&self, request_id: i64, layer_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.links.remove(&(request_id, layer_id)).is_some();
        if removed {
            self.record_write();
        }
        Ok(removed)
    }

    async fn set_link_comment(
        &self,
        request_id: i64,
        layer_id: i64,
        comment: Option<String>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.links.get_mut(&(request_id, layer_id)) {
            Some(link) => {
                link.comment = comment;
                self.record_write();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
