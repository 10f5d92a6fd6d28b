//! Application services: indexing, queries and event routing.

pub mod error;
pub mod indexer;
pub mod query;
pub mod repos;
pub mod router;
