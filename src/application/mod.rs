//! Application services: tracking dispatch and post summaries.

pub mod analytics;
pub mod error;
pub mod summary;
pub mod tracking;
