//! API handlers module

pub mod chrono;
pub mod health;
pub mod layers;
