//! Report ingestion and aggregation orchestration
//!
//! One upload: resolve the archive member if applicable, parse rows,
//! aggregate, persist. The insert and the raw-metadata patch share one
//! transaction so readers never observe a half-written report; the archive
//! backup itself is a best-effort filesystem side effect outside it.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local, Utc};
use regex::Regex;
use serde::Serialize;

use faultdesk_common::{
    FaultdeskError, REPORT_TYPE_NORMAL, RequesterIdentity, normalize_upload_filename,
};
use faultdesk_ingest::{
    aggregate_rows, file_suffix, is_archive_filename, merge_summary_entries,
    parse_report_summary, parse_table_rows, resolve_analysis_source,
};
use faultdesk_persistence::entity::report;
use faultdesk_persistence::{NewReport, ReportStore};

use crate::config::AppConfig;

static UNSAFE_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("invalid regex pattern"));

/// Raw metadata stored alongside a normal report.
#[derive(Serialize)]
struct UploadRawData {
    #[serde(rename = "rowCount")]
    row_count: usize,
    archive_member: Option<String>,
    archive_backup_path: Option<String>,
}

#[derive(Serialize)]
struct SourceReportRef {
    id: i64,
    filename: String,
    created_at: DateTime<Utc>,
    uploader_user: Option<String>,
    uploader_uid: Option<i64>,
    uploader_ip: Option<String>,
}

/// Raw metadata stored on the aggregate record: which reports contributed.
#[derive(Serialize)]
struct AggregateRawData {
    aggregation_type: &'static str,
    source_count: usize,
    source_reports: Vec<SourceReportRef>,
}

pub struct ReportService {
    store: ReportStore,
    config: AppConfig,
    deployment_root: PathBuf,
}

impl ReportService {
    pub fn new(store: ReportStore, config: AppConfig, deployment_root: impl Into<PathBuf>) -> Self {
        ReportService {
            store,
            config,
            deployment_root: deployment_root.into(),
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Create the backup directory at startup when backups are enabled.
    pub fn ensure_backup_dir(&self) -> std::io::Result<()> {
        if !self.config.archive_backup_enabled {
            return Ok(());
        }
        std::fs::create_dir_all(self.config.backup_dir(&self.deployment_root))
    }

    /// Ingest one uploaded file. Size and emptiness are validated before any
    /// parsing or store write happens.
    pub async fn ingest_upload(
        &self,
        filename: &str,
        content: &[u8],
        identity: &RequesterIdentity,
    ) -> anyhow::Result<report::Model> {
        let filename = normalize_upload_filename(Some(filename));

        if content.is_empty() {
            return Err(FaultdeskError::EmptyUpload.into());
        }
        if content.len() as u64 > self.config.max_upload_size_bytes() {
            return Err(FaultdeskError::FileTooLarge {
                max_mb: self.config.max_upload_size_mb,
            }
            .into());
        }

        self.analyze_and_store(&filename, content, identity).await
    }

    /// Ingest a server-local file by path, with the same size ceiling.
    pub async fn ingest_path(
        &self,
        file_path: &str,
        identity: &RequesterIdentity,
    ) -> anyhow::Result<report::Model> {
        let trimmed = file_path.trim();
        let path = Path::new(trimmed);
        if !path.is_file() {
            return Err(FaultdeskError::PathNotFound(trimmed.to_string()).into());
        }

        let size = std::fs::metadata(path)?.len();
        if size == 0 {
            return Err(FaultdeskError::EmptyUpload.into());
        }
        if size > self.config.max_upload_size_bytes() {
            return Err(FaultdeskError::FileTooLarge {
                max_mb: self.config.max_upload_size_mb,
            }
            .into());
        }

        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| trimmed.to_string());
        self.analyze_and_store(&filename, &content, identity).await
    }

    async fn analyze_and_store(
        &self,
        filename: &str,
        content: &[u8],
        identity: &RequesterIdentity,
    ) -> anyhow::Result<report::Model> {
        let source = resolve_analysis_source(filename, content)?;
        let rows = parse_table_rows(&source.content, &file_suffix(&source.filename))?;
        let summary = aggregate_rows(&rows);

        let mut raw_data = UploadRawData {
            row_count: rows.len(),
            archive_member: source.archive_member.clone(),
            archive_backup_path: None,
        };

        let tx = self.store.begin().await?;
        let report_id = self
            .store
            .insert_report(
                &tx,
                NewReport {
                    filename: filename.to_string(),
                    summary_json: serde_json::to_string(&summary)?,
                    raw_data_json: Some(serde_json::to_string(&raw_data)?),
                    uploader_user: identity.username().map(str::to_string),
                    uploader_uid: identity.uid(),
                    uploader_ip: identity.client_ip.clone(),
                    report_type: REPORT_TYPE_NORMAL.to_string(),
                },
            )
            .await?;

        raw_data.archive_backup_path = self.backup_archive(filename, content, identity, report_id);
        self.store
            .patch_raw_data(&tx, report_id, serde_json::to_string(&raw_data)?)
            .await?;
        tx.commit().await?;

        let report = self.store.get_by_id(report_id).await?.ok_or_else(|| {
            FaultdeskError::StoreInconsistency(format!(
                "report {report_id} not readable after insert"
            ))
        })?;

        tracing::info!(
            report_id,
            filename,
            rows = rows.len(),
            uploader = identity.username().unwrap_or("unknown"),
            "report ingested"
        );
        Ok(report)
    }

    /// Copy the original archive bytes to a per-uploader backup directory.
    /// Best-effort: the report row is the source of truth, a failed write
    /// only costs the backup path.
    fn backup_archive(
        &self,
        filename: &str,
        content: &[u8],
        identity: &RequesterIdentity,
        report_id: i64,
    ) -> Option<String> {
        if !is_archive_filename(filename) || !self.config.archive_backup_enabled {
            return None;
        }

        let safe_username =
            sanitize_component(identity.username().unwrap_or("unknown_user"), "unknown_user");
        let base_name = Path::new(filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let safe_name = sanitize_component(&base_name, "archive_upload.bin");

        let user_dir = self
            .config
            .backup_dir(&self.deployment_root)
            .join(&safe_username);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let backup_path = user_dir.join(format!("{timestamp}_report_{report_id}_{safe_name}"));

        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&user_dir)?;
            std::fs::write(&backup_path, content)
        };
        match write() {
            Ok(()) => {
                tracing::info!(report_id, path = %backup_path.display(), "archive backup written");
                Some(backup_path.to_string_lossy().into_owned())
            }
            Err(err) => {
                tracing::warn!(report_id, error = %err, "archive backup failed");
                None
            }
        }
    }

    /// Rebuild the consolidated aggregate record from the most recent report
    /// of every distinct uploader.
    pub async fn rebuild_latest_aggregate(&self) -> anyhow::Result<report::Model> {
        let latest = self.store.list_latest_per_uploader().await?;
        if latest.is_empty() {
            return Err(FaultdeskError::NoReportsAvailable.into());
        }

        let mut entries = Vec::new();
        let mut source_reports = Vec::new();
        for row in &latest {
            entries.extend(parse_report_summary(&row.summary));
            source_reports.push(SourceReportRef {
                id: row.id,
                filename: row.filename.clone(),
                created_at: row.created_at,
                uploader_user: row.uploader_user.clone(),
                uploader_uid: row.uploader_uid,
                uploader_ip: row.uploader_ip.clone(),
            });
        }

        let merged = merge_summary_entries(entries);
        let raw_data = AggregateRawData {
            aggregation_type: "latest_report_per_uploader",
            source_count: source_reports.len(),
            source_reports,
        };

        let aggregate_id = self
            .store
            .upsert_aggregate(
                serde_json::to_string(&merged)?,
                serde_json::to_string(&raw_data)?,
            )
            .await?;

        let report = self.store.get_by_id(aggregate_id).await?.ok_or_else(|| {
            FaultdeskError::StoreInconsistency(format!(
                "aggregate report {aggregate_id} not readable after upsert"
            ))
        })?;

        tracing::info!(
            aggregate_id,
            sources = latest.len(),
            "latest-per-uploader aggregate rebuilt"
        );
        Ok(report)
    }
}

fn sanitize_component(raw: &str, fallback: &str) -> String {
    let safe = UNSAFE_PATH_CHARS.replace_all(raw.trim(), "_").into_owned();
    if safe.is_empty() {
        fallback.to_string()
    } else {
        safe
    }
}
