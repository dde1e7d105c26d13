//! Fault aggregation and summary merging
//!
//! `aggregate_rows` groups raw table rows into per-owner fault counts;
//! `merge_summary_entries` re-aggregates previously stored summaries for the
//! cross-report view, tolerating partially corrupt historical JSON.

use std::collections::BTreeMap;

use serde_json::Value;

use faultdesk_common::{OwnerSummary, Row, clean_text, pick_value};

/// Column-name aliases probed for the responsible owner, in order.
pub const OWNER_KEYS: [&str; 5] = ["pkgs", "owner", "负责人", "处理人", "责任人"];

/// Column-name aliases probed for the fault description, in order.
pub const FAULT_KEYS: [&str; 6] = ["desc", "fault", "fault_desc", "故障", "故障描述", "问题描述"];

const UNKNOWN_OWNER: &str = "Unknown";
const UNKNOWN_FAULT: &str = "Unknown Fault";

/// Group rows into an owner -> fault -> count summary.
///
/// Pure and order-independent in its result: grouping is commutative, only
/// the final sort is significant.
pub fn aggregate_rows(rows: &[Row]) -> Vec<OwnerSummary> {
    let mut grouped: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for row in rows {
        let owner = pick_value(row, &OWNER_KEYS, UNKNOWN_OWNER);
        let fault = pick_value(row, &FAULT_KEYS, UNKNOWN_FAULT);
        *grouped.entry(owner).or_default().entry(fault).or_insert(0) += 1;
    }
    build_summary(grouped)
}

/// A stored summary entry after tolerant classification.
enum SummaryEntry {
    Valid {
        owner: String,
        faults: Vec<(String, u64)>,
    },
    Malformed,
}

/// Re-aggregate owner/fault entries taken from multiple stored summaries.
///
/// Malformed entries (non-objects, bad counts, non-string fields) are
/// skipped silently; a partially corrupt history must never fail the merge.
pub fn merge_summary_entries<I>(entries: I) -> Vec<OwnerSummary>
where
    I: IntoIterator<Item = Value>,
{
    let mut grouped: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for entry in entries {
        match classify_entry(&entry) {
            SummaryEntry::Valid { owner, faults } => {
                let owner_faults = grouped.entry(owner).or_default();
                for (name, count) in faults {
                    *owner_faults.entry(name).or_insert(0) += count;
                }
            }
            SummaryEntry::Malformed => continue,
        }
    }
    build_summary(grouped)
}

/// Tolerant re-parse of a stored summary column. Anything that is not a JSON
/// list contributes nothing; non-object elements are dropped.
pub fn parse_report_summary(raw: &str) -> Vec<Value> {
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    let Value::Array(items) = parsed else {
        return Vec::new();
    };
    items.into_iter().filter(|item| item.is_object()).collect()
}

fn classify_entry(entry: &Value) -> SummaryEntry {
    let Some(object) = entry.as_object() else {
        return SummaryEntry::Malformed;
    };

    let owner = object
        .get("owner")
        .and_then(Value::as_str)
        .map(|raw| clean_text(raw, UNKNOWN_OWNER))
        .unwrap_or_else(|| UNKNOWN_OWNER.to_string());

    // An owner entry with an unusable fault list still registers the owner,
    // it just contributes no counts.
    let mut faults = Vec::new();
    if let Some(items) = object.get("faults").and_then(Value::as_array) {
        for item in items {
            let Some(fault) = item.as_object() else {
                continue;
            };
            let name = fault
                .get("name")
                .and_then(Value::as_str)
                .map(|raw| clean_text(raw, UNKNOWN_FAULT))
                .unwrap_or_else(|| UNKNOWN_FAULT.to_string());
            let Some(count) = coerce_count(fault.get("count")) else {
                continue;
            };
            faults.push((name, count));
        }
    }

    SummaryEntry::Valid { owner, faults }
}

/// Coerce a JSON count to a positive integer; anything else is rejected.
fn coerce_count(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    let count = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                // Integral floats are accepted the way a loose integer
                // coercion would accept them.
                let f = n.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                f.trunc() as i64
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if count <= 0 { None } else { Some(count as u64) }
}

fn build_summary(grouped: BTreeMap<String, BTreeMap<String, u64>>) -> Vec<OwnerSummary> {
    let mut result: Vec<OwnerSummary> = grouped
        .into_iter()
        .map(|(owner, counts)| OwnerSummary::from_counts(owner, counts))
        .collect();
    // Total descending; owner ascending keeps equal totals deterministic.
    result.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.owner.cmp(&b.owner)));
    result
}
