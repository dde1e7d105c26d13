//! Faultdesk Persistence - Report store
//!
//! Append-only report records with one singleton-update exception: the
//! consolidated aggregate record, which is created once and mutated in place
//! thereafter. Backed by SQLite through SeaORM.

pub mod entity;
pub mod model;
pub mod store;

pub use model::ReportView;
pub use store::{NewReport, ReportStore, uploader_identity_key};
