//! Report entity
//!
//! One row per ingested report, plus at most one consolidated aggregate row
//! (`report_type = aggregate_latest_all`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Original upload filename (or the fixed aggregate filename)
    pub filename: String,
    /// Assigned by the store at insert/update time
    pub created_at: DateTimeUtc,
    /// Fault summary, serialized as JSON text
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    /// Opaque JSON metadata (row count, archive member, backup path; for the
    /// aggregate row, the list of contributing reports)
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_data: Option<String>,
    pub uploader_user: Option<String>,
    pub uploader_uid: Option<i64>,
    /// Normalized client address the upload arrived from
    pub uploader_ip: Option<String>,
    pub report_type: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
