//! Faultdesk Ingest - From raw upload bytes to a fault summary
//!
//! This crate owns the format-sensitive half of the pipeline:
//! - Archive member resolution (zip and the tar family)
//! - Multi-encoding tabular parsing (xlsx/xls/csv)
//! - Per-owner fault aggregation and cross-report summary merging

pub mod aggregate;
pub mod archive;
pub mod table;

pub use aggregate::{
    FAULT_KEYS, OWNER_KEYS, aggregate_rows, merge_summary_entries, parse_report_summary,
};
pub use archive::{AnalysisSource, TARGET_ARCHIVE_MEMBER, is_archive_filename, resolve_analysis_source};
pub use table::{file_suffix, parse_table_rows};
