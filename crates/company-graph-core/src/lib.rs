//! Core infrastructure for the public-company knowledge graph pipeline.
//!
//! This crate provides the shared plumbing every pipeline stage depends on:
//! error types, environment-driven configuration, the namespaced artifact
//! cache, the per-source rate-limiter registry, domain validation against
//! the Public Suffix List, thread-safe execution statistics, and the
//! bounded worker pool used for per-entity parallelism.

pub mod cache;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod models;
pub mod parallel;
pub mod rate_limiter;
pub mod security;
pub mod stats;

pub use cache::AppCache;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{CompanyListing, CompanyProperties, CompanyResult, DomainResult};
pub use rate_limiter::RateLimiter;
pub use stats::ExecutionStats;
