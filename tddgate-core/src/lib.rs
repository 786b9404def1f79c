//! tddgate core - evidence-gated Test-Driven Development workflow engine
//!
//! This crate tracks each project scope through the Red-Green-Refactor
//! cycle and only lets it advance when test runs prove the required
//! failure or success.

pub mod config;
pub mod error;
pub mod git;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
