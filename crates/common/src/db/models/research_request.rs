//! Research request entity and its lifecycle status

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Formed,
    Completed,
    Deleted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Formed => "formed",
            RequestStatus::Completed => "completed",
            RequestStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RequestStatus::Draft),
            "formed" => Some(RequestStatus::Formed),
            "completed" => Some(RequestStatus::Completed),
            "deleted" => Some(RequestStatus::Deleted),
            _ => None,
        }
    }
}

// Unknown values read as deleted so no transition can start from them.
impl From<&str> for RequestStatus {
    fn from(s: &str) -> Self {
        RequestStatus::parse(s).unwrap_or(RequestStatus::Deleted)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "research_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i64,

    pub moderator_id: Option<i64>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub formed_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub text_for_analysis: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub purpose: Option<String>,

    pub result_year_from: Option<i32>,

    pub result_year_to: Option<i32>,

    pub matched_layer_count: Option<i32>,
}

impl Model {
    /// Get the request status as an enum
    pub fn request_status(&self) -> RequestStatus {
        RequestStatus::from(self.status.as_str())
    }

    /// Text is present and not just whitespace
    pub fn has_text(&self) -> bool {
        self.text_for_analysis
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_layer::Entity", on_delete = "Cascade")]
    RequestLayers,
}

impl Related<super::request_layer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestLayers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
