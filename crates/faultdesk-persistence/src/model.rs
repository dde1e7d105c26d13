//! Read-side payload model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::report;

/// A report as handed to external callers: identical to the stored row, with
/// the summary JSON deserialized back into structured form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportView {
    pub id: i64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub summary: Value,
    pub uploader_user: Option<String>,
    pub uploader_uid: Option<i64>,
    pub uploader_ip: Option<String>,
    pub report_type: String,
}

impl From<report::Model> for ReportView {
    fn from(model: report::Model) -> Self {
        let summary = serde_json::from_str(&model.summary).unwrap_or(Value::Null);
        ReportView {
            id: model.id,
            filename: model.filename,
            created_at: model.created_at,
            summary,
            uploader_user: model.uploader_user,
            uploader_uid: model.uploader_uid,
            uploader_ip: model.uploader_ip,
            report_type: model.report_type,
        }
    }
}
