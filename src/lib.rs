//! Weblog backend: email-open tracking pixel and AI post summaries.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
