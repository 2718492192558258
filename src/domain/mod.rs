//! Domain layer types and rules.

pub mod models;
pub mod tracking;
