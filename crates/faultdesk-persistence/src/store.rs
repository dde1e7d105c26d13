//! Report store
//!
//! Wraps a SeaORM `DatabaseConnection` with the keyed operations the
//! orchestrator needs. Insert-then-patch flows run inside a caller-scoped
//! transaction; the aggregate upsert scopes its own.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

use faultdesk_common::{
    AGGREGATE_REPORT_FILENAME, REPORT_TYPE_AGGREGATE_LATEST_ALL, clean_text,
};

use crate::entity::report;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    created_at TEXT NOT NULL,
    summary TEXT NOT NULL,
    raw_data TEXT,
    uploader_user TEXT,
    uploader_uid INTEGER,
    uploader_ip TEXT,
    report_type TEXT NOT NULL DEFAULT 'normal'
)
"#;

/// Field set for a report about to be inserted.
#[derive(Clone, Debug)]
pub struct NewReport {
    pub filename: String,
    pub summary_json: String,
    pub raw_data_json: Option<String>,
    pub uploader_user: Option<String>,
    pub uploader_uid: Option<i64>,
    pub uploader_ip: Option<String>,
    pub report_type: String,
}

/// The aggregate-record slot, made explicit: either no aggregate row exists
/// yet, or exactly one should — anything beyond the first is damage to heal.
enum AggregateSlot {
    Absent,
    Present { id: i64, extras: Vec<i64> },
}

/// Uploader identity key used to deduplicate reports per uploader.
pub fn uploader_identity_key(row: &report::Model) -> String {
    let user = clean_text(row.uploader_user.as_deref().unwrap_or(""), "");
    if !user.is_empty() {
        return format!("user:{user}");
    }
    let ip = clean_text(row.uploader_ip.as_deref().unwrap_or(""), "");
    if !ip.is_empty() {
        return format!("ip:{ip}");
    }
    "unknown:unknown".to_string()
}

pub struct ReportStore {
    db: DatabaseConnection,
}

impl ReportStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the reports table when it does not exist yet.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        self.db.execute_unprepared(SCHEMA).await?;
        Ok(())
    }

    /// Open a transaction for a caller-scoped insert-then-patch sequence.
    pub async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        self.db.begin().await
    }

    /// Insert a report and return its assigned id. Generic over the
    /// connection so it can run inside a caller transaction.
    pub async fn insert_report<C: ConnectionTrait>(
        &self,
        conn: &C,
        new: NewReport,
    ) -> anyhow::Result<i64> {
        let active = report::ActiveModel {
            id: NotSet,
            filename: Set(new.filename),
            created_at: Set(Utc::now()),
            summary: Set(new.summary_json),
            raw_data: Set(new.raw_data_json),
            uploader_user: Set(new.uploader_user),
            uploader_uid: Set(new.uploader_uid),
            uploader_ip: Set(new.uploader_ip),
            report_type: Set(new.report_type),
        };
        let result = report::Entity::insert(active).exec(conn).await?;
        Ok(result.last_insert_id)
    }

    /// Overwrite the raw metadata of an existing report.
    pub async fn patch_raw_data<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        raw_data_json: String,
    ) -> anyhow::Result<()> {
        let active = report::ActiveModel {
            id: Set(id),
            raw_data: Set(Some(raw_data_json)),
            ..Default::default()
        };
        report::Entity::update(active).exec(conn).await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<report::Model>> {
        Ok(report::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// All reports, most recent first (ties broken by id descending).
    pub async fn list_all(&self) -> anyhow::Result<Vec<report::Model>> {
        Ok(report::Entity::find()
            .order_by_desc(report::Column::CreatedAt)
            .order_by_desc(report::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn delete_by_id(&self, id: i64) -> anyhow::Result<bool> {
        let result = report::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// The most recent non-aggregate report per distinct uploader identity
    /// key, preserving overall recency order.
    pub async fn list_latest_per_uploader(&self) -> anyhow::Result<Vec<report::Model>> {
        let rows = report::Entity::find()
            .filter(report::Column::ReportType.ne(REPORT_TYPE_AGGREGATE_LATEST_ALL))
            .order_by_desc(report::Column::CreatedAt)
            .order_by_desc(report::Column::Id)
            .all(&self.db)
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut latest = Vec::new();
        for row in rows {
            if seen.insert(uploader_identity_key(&row)) {
                latest.push(row);
            }
        }
        Ok(latest)
    }

    /// Write the consolidated aggregate record: update the existing row in
    /// place when present (healing any duplicates), insert otherwise. Runs
    /// as a single transaction so concurrent rebuilds cannot fork the
    /// singleton.
    pub async fn upsert_aggregate(
        &self,
        summary_json: String,
        raw_data_json: String,
    ) -> anyhow::Result<i64> {
        let tx = self.db.begin().await?;

        let id = match aggregate_slot(&tx).await? {
            AggregateSlot::Present { id, extras } => {
                let active = report::ActiveModel {
                    id: Set(id),
                    filename: Set(AGGREGATE_REPORT_FILENAME.to_string()),
                    created_at: Set(Utc::now()),
                    summary: Set(summary_json),
                    raw_data: Set(Some(raw_data_json)),
                    uploader_user: Set(Some("system".to_string())),
                    uploader_uid: Set(None),
                    uploader_ip: Set(None),
                    report_type: Set(REPORT_TYPE_AGGREGATE_LATEST_ALL.to_string()),
                };
                report::Entity::update(active).exec(&tx).await?;

                if !extras.is_empty() {
                    tracing::warn!(
                        kept = id,
                        removed = extras.len(),
                        "healed duplicate aggregate records"
                    );
                    report::Entity::delete_many()
                        .filter(report::Column::Id.is_in(extras))
                        .exec(&tx)
                        .await?;
                }
                id
            }
            AggregateSlot::Absent => {
                let active = report::ActiveModel {
                    id: NotSet,
                    filename: Set(AGGREGATE_REPORT_FILENAME.to_string()),
                    created_at: Set(Utc::now()),
                    summary: Set(summary_json),
                    raw_data: Set(Some(raw_data_json)),
                    uploader_user: Set(Some("system".to_string())),
                    uploader_uid: Set(None),
                    uploader_ip: Set(None),
                    report_type: Set(REPORT_TYPE_AGGREGATE_LATEST_ALL.to_string()),
                };
                report::Entity::insert(active).exec(&tx).await?.last_insert_id
            }
        };

        tx.commit().await?;
        Ok(id)
    }
}

/// Locate the aggregate record(s); the oldest id is the canonical slot.
async fn aggregate_slot<C: ConnectionTrait>(conn: &C) -> Result<AggregateSlot, DbErr> {
    let ids: Vec<i64> = report::Entity::find()
        .select_only()
        .column(report::Column::Id)
        .filter(report::Column::ReportType.eq(REPORT_TYPE_AGGREGATE_LATEST_ALL))
        .order_by_asc(report::Column::Id)
        .into_tuple()
        .all(conn)
        .await?;

    match ids.split_first() {
        None => Ok(AggregateSlot::Absent),
        Some((&id, extras)) => Ok(AggregateSlot::Present {
            id,
            extras: extras.to_vec(),
        }),
    }
}
