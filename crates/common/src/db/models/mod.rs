//! SeaORM entity models
//!
//! Database entities for Chronoscope

mod layer;
mod research_request;
mod request_layer;

pub use layer::{
    Entity as LayerEntity,
    Model as Layer,
    ActiveModel as LayerActiveModel,
    Column as LayerColumn,
    LayerStatus,
};

pub use research_request::{
    Entity as ResearchRequestEntity,
    Model as ResearchRequest,
    ActiveModel as ResearchRequestActiveModel,
    Column as ResearchRequestColumn,
    RequestStatus,
};

pub use request_layer::{
    Entity as RequestLayerEntity,
    Model as RequestLayer,
    ActiveModel as RequestLayerActiveModel,
    Column as RequestLayerColumn,
};
