//! Shared utilities for paperflow integration tests.
//!
//! - `TestHarness` for an isolated data directory and in-memory database
//! - Builders and test doubles for configs, rules and collaborators

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
