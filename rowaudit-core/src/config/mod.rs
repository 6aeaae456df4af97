//! Resolved configuration for a quality stage.
//!
//! - `StageConfig`: the full stage configuration (rules, verdict output,
//!   dirty-data limit, identity, job mode, flush targets)
//! - `RuleInfo`: one configured rule keyed by rule id
//! - `StoreConfig`: shared metric store settings
//!
//! The raw configuration document can be checked against the embedded JSON
//! Schema in [`crate::config_schema`] before it is deserialized here.

mod rules;
mod stage;
mod store;

pub use rules::{RuleInfo, RuleInfos};
pub use stage::{
    DEFAULT_FLUSH_INTERVAL_SECS, JobMode, MAX_FLUSH_INTERVAL_SECS, StageConfig, StageIdentity,
};
pub use store::{DEFAULT_MAX_MERGE_ATTEMPTS, StoreConfig};
