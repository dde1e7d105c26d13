//! Faultdesk Core - Report ingestion and aggregation orchestration
//!
//! Ties the ingest pipeline to the report store:
//! - Runtime configuration and identity-table loading
//! - Upload/path ingestion with size validation and archive backup
//! - The consolidated "latest report per uploader" rebuild

pub mod config;
pub mod service;

pub use config::{AppConfig, load_identity_map};
pub use service::report::ReportService;
