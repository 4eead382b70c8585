//! Retire stale container image versions from a registry.
//!
//! A run lists every version in one repository, classifies each one as keep
//! or delete from its tags, age and manifest-list relationships, then deletes
//! (or, in dry-run mode, only reports) the expired versions.

pub mod cli;
pub mod error;
pub mod executor;
pub mod graph;
pub mod models;
pub mod output;
pub mod planner;
pub mod policy;
pub mod registry;
pub mod settings;
