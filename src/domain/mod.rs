//! Domain layer types and invariants.

pub mod availability;
pub mod entities;
pub mod error;
pub mod ids;
pub mod pricing;
pub mod types;
