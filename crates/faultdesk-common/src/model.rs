//! Fault summary data model
//!
//! A summary is an ordered list of per-owner groups, each holding the fault
//! descriptions attributed to that owner with their occurrence counts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One parsed table row: column name mapped to its textual cell value.
pub type Row = HashMap<String, String>;

/// A single fault description and how often it occurred.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCount {
    pub name: String,
    pub count: u64,
}

/// All faults attributed to one owner.
///
/// Invariants: fault names are unique within the group, `faults` is sorted by
/// count descending, and `total` equals the sum of all counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner: String,
    pub faults: Vec<FaultCount>,
    pub total: u64,
}

impl OwnerSummary {
    /// Build a group from an unordered fault->count mapping, applying the
    /// sort and total invariants.
    pub fn from_counts(owner: String, counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut faults: Vec<FaultCount> = counts
            .into_iter()
            .map(|(name, count)| FaultCount { name, count })
            .collect();
        faults.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        let total = faults.iter().map(|f| f.count).sum();
        OwnerSummary {
            owner,
            faults,
            total,
        }
    }
}
