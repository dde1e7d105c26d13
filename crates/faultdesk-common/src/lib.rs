//! Faultdesk Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Faultdesk
//! components:
//! - Error types
//! - Fault summary data model
//! - Text cleaning helpers
//! - Uploader identity resolution

pub mod error;
pub mod identity;
pub mod model;
pub mod text;

// Re-exports for convenience
pub use error::FaultdeskError;
pub use identity::{AddressSource, IdentityEntry, IdentityMap, RequesterIdentity};
pub use model::{FaultCount, OwnerSummary, Row};
pub use text::{clean_text, normalize_upload_filename, pick_value};

/// Report type for plain uploaded reports
pub const REPORT_TYPE_NORMAL: &str = "normal";

/// Report type for the single consolidated "latest report per uploader" record
pub const REPORT_TYPE_AGGREGATE_LATEST_ALL: &str = "aggregate_latest_all";

/// Filename stored on the consolidated aggregate record
pub const AGGREGATE_REPORT_FILENAME: &str = "汇总";
