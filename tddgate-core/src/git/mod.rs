//! Git operations for tddgate
//!
//! This module provides repository detection and the changed-file view used
//! to find the intent test.

mod changes;
mod repo;

pub use changes::{changed_test_files, is_test_path, ChangeSource, GitChanges};
pub use repo::GitRepo;
