//! End-to-end ingestion and aggregation flows against in-memory SQLite.

use std::io::Write;

use sea_orm::{ConnectOptions, Database};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use faultdesk_common::{
    FaultdeskError, REPORT_TYPE_AGGREGATE_LATEST_ALL, RequesterIdentity,
};
use faultdesk_core::{AppConfig, ReportService};
use faultdesk_persistence::ReportStore;

async fn memory_store() -> ReportStore {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // In-memory SQLite is per-connection; the pool must not fan out.
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    let store = ReportStore::new(db);
    store.init_schema().await.unwrap();
    store
}

async fn service_with(config: AppConfig, root: &TempDir) -> ReportService {
    ReportService::new(memory_store().await, config, root.path())
}

async fn default_service(root: &TempDir) -> ReportService {
    service_with(AppConfig::default(), root).await
}

fn identity_for(ip: &str, user: Option<&str>) -> RequesterIdentity {
    let mut entries = Vec::new();
    if let Some(user) = user {
        entries.push(serde_json::json!({"ip": ip, "user": user, "uid": 42}));
    }
    let map = faultdesk_common::IdentityMap::from_entries(&entries);
    RequesterIdentity::resolve(Some(ip), None, None, &map)
}

fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default();
        for (name, data) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

const SIMPLE_CSV: &[u8] = b"owner,desc\nalice,disk\nalice,disk\nbob,net\n";

#[tokio::test]
async fn test_ingest_csv_upload() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let report = service
        .ingest_upload("daily.csv", SIMPLE_CSV, &identity_for("10.0.0.1", Some("alice")))
        .await
        .unwrap();

    assert_eq!(report.filename, "daily.csv");
    assert_eq!(report.uploader_user.as_deref(), Some("alice"));
    assert_eq!(report.uploader_uid, Some(42));
    assert_eq!(report.uploader_ip.as_deref(), Some("10.0.0.1"));
    assert_eq!(report.report_type, "normal");

    let summary: serde_json::Value = serde_json::from_str(&report.summary).unwrap();
    assert_eq!(summary[0]["owner"], "alice");
    assert_eq!(summary[0]["total"], 2);
    assert_eq!(summary[1]["owner"], "bob");

    let raw: serde_json::Value = serde_json::from_str(report.raw_data.as_deref().unwrap()).unwrap();
    assert_eq!(raw["rowCount"], 3);
    assert_eq!(raw["archive_member"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_ingest_gbk_csv_upload() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let (encoded, _, _) = encoding_rs::GBK.encode("负责人,故障描述\n张三,磁盘故障\n");
    let report = service
        .ingest_upload("cjk.csv", &encoded, &RequesterIdentity::anonymous())
        .await
        .unwrap();

    let summary: serde_json::Value = serde_json::from_str(&report.summary).unwrap();
    assert_eq!(summary[0]["owner"], "张三");
    assert_eq!(summary[0]["faults"][0]["name"], "磁盘故障");
}

#[tokio::test]
async fn test_header_only_csv_rejected() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let err = service
        .ingest_upload("empty.csv", b"owner,desc\n", &RequesterIdentity::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FaultdeskError>(),
        Some(FaultdeskError::NoDataRows)
    ));
    assert!(service.store().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_any_write() {
    let root = TempDir::new().unwrap();
    let config = AppConfig {
        max_upload_size_mb: 1,
        ..AppConfig::default()
    };
    let service = service_with(config, &root).await;

    let oversized = vec![b'x'; 1024 * 1024 + 1];
    let err = service
        .ingest_upload("big.csv", &oversized, &RequesterIdentity::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FaultdeskError>(),
        Some(FaultdeskError::FileTooLarge { max_mb: 1 })
    ));

    // Nothing parsed, stored, or backed up.
    assert!(service.store().list_all().await.unwrap().is_empty());
    assert!(!root.path().join("archive_backups").exists());
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let err = service
        .ingest_upload("empty.csv", b"", &RequesterIdentity::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FaultdeskError>(),
        Some(FaultdeskError::EmptyUpload)
    ));
}

#[tokio::test]
async fn test_zip_upload_extracts_shallowest_member_and_backs_up() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let data = build_zip(&[
        ("b/c/alarm_local.csv", b"owner,desc\na,x\nb,y\nc,z\nd,w\ne,v\n" as &[u8]),
        ("a/alarm_local.csv", b"owner,desc\nalice,disk\nbob,net\n"),
    ]);
    let report = service
        .ingest_upload("bundle 1.zip", &data, &identity_for("10.0.0.1", Some("alice")))
        .await
        .unwrap();

    let raw: serde_json::Value = serde_json::from_str(report.raw_data.as_deref().unwrap()).unwrap();
    assert_eq!(raw["archive_member"], "a/alarm_local.csv");
    assert_eq!(raw["rowCount"], 2);

    // Backup written under the sanitized uploader directory, original bytes
    // intact, and its path patched into the stored metadata.
    let backup_path = raw["archive_backup_path"].as_str().unwrap();
    assert!(backup_path.contains(&format!("report_{}_bundle_1.zip", report.id)));
    assert!(backup_path.contains("/alice/"));
    assert_eq!(std::fs::read(backup_path).unwrap(), data);
}

#[tokio::test]
async fn test_backup_disabled_leaves_no_path() {
    let root = TempDir::new().unwrap();
    let config = AppConfig {
        archive_backup_enabled: false,
        ..AppConfig::default()
    };
    let service = service_with(config, &root).await;

    let data = build_zip(&[("alarm_local.csv", b"owner\nalice\n" as &[u8])]);
    let report = service
        .ingest_upload("bundle.zip", &data, &RequesterIdentity::anonymous())
        .await
        .unwrap();

    let raw: serde_json::Value = serde_json::from_str(report.raw_data.as_deref().unwrap()).unwrap();
    assert_eq!(raw["archive_backup_path"], serde_json::Value::Null);
    assert!(!root.path().join("archive_backups").exists());
}

#[tokio::test]
async fn test_ingest_path_and_not_found() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let file_path = root.path().join("local.csv");
    std::fs::write(&file_path, SIMPLE_CSV).unwrap();

    let report = service
        .ingest_path(file_path.to_str().unwrap(), &RequesterIdentity::anonymous())
        .await
        .unwrap();
    assert_eq!(report.filename, "local.csv");

    let err = service
        .ingest_path("/no/such/file.csv", &RequesterIdentity::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FaultdeskError>(),
        Some(FaultdeskError::PathNotFound(_))
    ));
}

#[tokio::test]
async fn test_rebuild_aggregate_requires_reports() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    let err = service.rebuild_latest_aggregate().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FaultdeskError>(),
        Some(FaultdeskError::NoReportsAvailable)
    ));
}

#[tokio::test]
async fn test_rebuild_aggregate_latest_per_uploader() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    // Two uploads from the same anonymous IP: only the newer contributes.
    service
        .ingest_upload(
            "old.csv",
            b"owner,desc\nstale,stale-fault\n",
            &identity_for("10.0.0.1", None),
        )
        .await
        .unwrap();
    service
        .ingest_upload("new.csv", SIMPLE_CSV, &identity_for("10.0.0.1", None))
        .await
        .unwrap();
    // A named uploader from another address.
    service
        .ingest_upload(
            "named.csv",
            b"owner,desc\nalice,disk\n",
            &identity_for("10.0.0.2", Some("carol")),
        )
        .await
        .unwrap();

    let aggregate = service.rebuild_latest_aggregate().await.unwrap();
    assert_eq!(aggregate.report_type, REPORT_TYPE_AGGREGATE_LATEST_ALL);
    assert_eq!(aggregate.filename, "汇总");
    assert_eq!(aggregate.uploader_user.as_deref(), Some("system"));
    assert!(aggregate.uploader_ip.is_none());

    let summary: serde_json::Value = serde_json::from_str(&aggregate.summary).unwrap();
    // alice: 2 disk from new.csv + 1 disk from named.csv; stale.csv dropped.
    assert_eq!(summary[0]["owner"], "alice");
    assert_eq!(summary[0]["total"], 3);
    let owners: Vec<&str> = summary
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["owner"].as_str().unwrap())
        .collect();
    assert!(!owners.contains(&"stale"));

    let raw: serde_json::Value =
        serde_json::from_str(aggregate.raw_data.as_deref().unwrap()).unwrap();
    assert_eq!(raw["aggregation_type"], "latest_report_per_uploader");
    assert_eq!(raw["source_count"], 2);
}

#[tokio::test]
async fn test_rebuild_aggregate_is_idempotent_singleton() {
    let root = TempDir::new().unwrap();
    let service = default_service(&root).await;

    service
        .ingest_upload("a.csv", SIMPLE_CSV, &identity_for("10.0.0.1", None))
        .await
        .unwrap();

    let first = service.rebuild_latest_aggregate().await.unwrap();
    let second = service.rebuild_latest_aggregate().await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.summary, second.summary);

    let aggregates: Vec<_> = service
        .store()
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.report_type == REPORT_TYPE_AGGREGATE_LATEST_ALL)
        .collect();
    assert_eq!(aggregates.len(), 1);
}
