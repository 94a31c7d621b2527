//! Request-layer link: which layers a request touches and how strongly

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_layers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub research_request_id: i64,

    #[sea_orm(primary_key, auto_increment = false)]
    pub layer_id: i64,

    /// Distinct lexicon words of the layer found in the request text
    pub match_count: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::research_request::Entity",
        from = "Column::ResearchRequestId",
        to = "super::research_request::Column::Id",
        on_delete = "Cascade"
    )]
    ResearchRequest,

    #[sea_orm(
        belongs_to = "super::layer::Entity",
        from = "Column::LayerId",
        to = "super::layer::Column::Id"
    )]
    Layer,
}

impl Related<super::research_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResearchRequest.def()
    }
}

impl Related<super::layer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Layer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
