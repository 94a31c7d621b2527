//! Layer entity: a dated lexicon of a historical language era

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Layer status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Active,
    Deleted,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerStatus::Active => "active",
            LayerStatus::Deleted => "deleted",
        }
    }
}

impl From<&str> for LayerStatus {
    fn from(s: &str) -> Self {
        match s {
            "active" => LayerStatus::Active,
            _ => LayerStatus::Deleted,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "layers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub year_from: i32,

    pub year_to: i32,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Raw lexicon as entered by moderators ("word, word; word")
    #[sea_orm(column_type = "Text")]
    pub words: String,
}

impl Model {
    /// Get the layer status as an enum
    pub fn layer_status(&self) -> LayerStatus {
        LayerStatus::from(self.status.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.layer_status() == LayerStatus::Active
    }

    /// Lexicon derived from the raw `words` column on every call
    pub fn lexicon(&self) -> HashSet<String> {
        crate::matching::parse_lexicon(&self.words)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_layer::Entity")]
    RequestLayers,
}

impl Related<super::request_layer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestLayers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
