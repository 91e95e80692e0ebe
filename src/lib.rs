//! Expiry-driven response caching for producer pipelines.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod pipeline;
