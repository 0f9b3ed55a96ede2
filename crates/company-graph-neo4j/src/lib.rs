//! Graph persistence: parameterized Cypher over Bolt, with batched
//! idempotent loaders, constraint provisioning, and strict allow-list
//! gates on every label, relationship type, and property name that is
//! ever interpolated into a query string. Values always travel as
//! parameters.

pub mod bootstrap;
pub mod client;
pub mod constraints;
pub mod loader;
pub mod queries;
pub mod types;

pub use client::GraphClient;
pub use types::{NodeLabel, RelationshipType};
