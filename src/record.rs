use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::speed::format_speed;
use crate::violation::Violation;

/// Latest known state of one identity, replaced wholesale on every update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub id: u32,
    /// Resolved plate or the not-detected placeholder
    pub plate: String,
    pub speed: f64,
    pub unit: String,
    pub violation: Violation,
}

/// The shape handed out by the reporting interface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub id: u32,
    pub plate: String,
    /// e.g. `"84.12 km/h"`
    pub speed: String,
    pub violation: String,
}

impl From<&ViolationRecord> for ReportEntry {
    fn from(r: &ViolationRecord) -> Self {
        Self {
            id: r.id,
            plate: r.plate.clone(),
            speed: format_speed(r.speed, &r.unit),
            violation: r.violation.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    records: Vec<ViolationRecord>,
    index: HashMap<u32, usize>,
}

/// Records keyed by identity, iterated in first-insertion order.
///
/// A writer replaces a record under the write lock and readers copy under the
/// read lock, so no reader ever sees a half-updated record. Records of evicted
/// tracks stay until the session ends.
#[derive(Debug, Default)]
pub struct RecordTable {
    inner: RwLock<Table>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: ViolationRecord) {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        match table.index.get(&record.id).copied() {
            Some(pos) => table.records[pos] = record,
            None => {
                let pos = table.records.len();
                table.index.insert(record.id, pos);
                table.records.push(record);
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<ViolationRecord> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.index.get(&id).map(|&pos| table.records[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ViolationRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn report(&self) -> Vec<ReportEntry> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .map(Into::into)
            .collect()
    }
}
