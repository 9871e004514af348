//! Shared dataset abstraction backing the built-in plugins.
//!
//! A dataset is a named container with one of four shapes: a keyed table of
//! column maps, a string key-value table, an append-only event stream, or a
//! time-partitioned file set. Datasets are created on first write; reads of
//! a dataset that does not exist yet fail with `DATASET_NOT_FOUND`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::{Record, Value};

/// One event in a stream dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub timestamp_millis: i64,
}

/// A keyed row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Storage shared by every stage of a deployment.
///
/// All operations are atomic per call; writers hold the store lock only for
/// the duration of one call.
pub trait DatasetStore: Send + Sync {
    /// Write a row, merging columns into any existing row under `key`.
    ///
    /// # Errors
    ///
    /// Fails if `dataset` exists with a non-table shape.
    fn put_row(&self, dataset: &str, key: Vec<u8>, columns: Row) -> Result<(), ConnectorError>;

    /// # Errors
    ///
    /// Fails if the dataset is missing or not a table.
    fn get_row(&self, dataset: &str, key: &[u8]) -> Result<Option<Row>, ConnectorError>;

    /// All rows in key order.
    ///
    /// # Errors
    ///
    /// Fails if the dataset is missing or not a table.
    fn scan_rows(&self, dataset: &str) -> Result<Vec<(Vec<u8>, Row)>, ConnectorError>;

    /// # Errors
    ///
    /// Fails if `dataset` exists with a non-kv shape.
    fn put_kv(&self, dataset: &str, key: &str, value: &str) -> Result<(), ConnectorError>;

    /// # Errors
    ///
    /// Fails if the dataset is missing or not a kv table.
    fn lookup(&self, dataset: &str, key: &str) -> Result<Option<String>, ConnectorError>;

    /// # Errors
    ///
    /// Fails if `dataset` exists with a non-stream shape.
    fn append_event(&self, dataset: &str, event: StreamEvent) -> Result<(), ConnectorError>;

    /// Events in append order.
    ///
    /// # Errors
    ///
    /// Fails if the dataset is missing or not a stream.
    fn read_events(&self, dataset: &str) -> Result<Vec<StreamEvent>, ConnectorError>;

    /// Add a partition of records at `time_millis`.
    ///
    /// # Errors
    ///
    /// Fails if `dataset` exists with a non-fileset shape.
    fn add_partition(
        &self,
        dataset: &str,
        time_millis: i64,
        records: Vec<Record>,
    ) -> Result<(), ConnectorError>;

    /// Records from partitions with `start < time <= end`.
    ///
    /// # Errors
    ///
    /// Fails if the dataset is missing or not a fileset.
    fn partitions_in_range(
        &self,
        dataset: &str,
        start_exclusive: i64,
        end_inclusive: i64,
    ) -> Result<Vec<Record>, ConnectorError>;
}

enum DatasetEntry {
    Table(BTreeMap<Vec<u8>, Row>),
    Kv(BTreeMap<String, String>),
    Stream(Vec<StreamEvent>),
    Fileset(BTreeMap<i64, Vec<Record>>),
}

impl DatasetEntry {
    fn shape(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Kv(_) => "kv",
            Self::Stream(_) => "stream",
            Self::Fileset(_) => "fileset",
        }
    }
}

fn not_found(dataset: &str) -> ConnectorError {
    ConnectorError::config("DATASET_NOT_FOUND", format!("dataset '{dataset}' does not exist"))
}

fn wrong_shape(dataset: &str, wanted: &str, entry: &DatasetEntry) -> ConnectorError {
    ConnectorError::config(
        "DATASET_SHAPE_MISMATCH",
        format!(
            "dataset '{dataset}' is a {} dataset, expected {wanted}",
            entry.shape()
        ),
    )
}

/// In-memory, lock-guarded dataset store.
pub struct InMemoryDatasetStore {
    entries: Mutex<HashMap<String, DatasetEntry>>,
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, DatasetEntry>) -> Result<T, ConnectorError>,
    ) -> Result<T, ConnectorError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ConnectorError::transient("LOCK_POISONED", "dataset store lock poisoned"))?;
        f(&mut entries)
    }
}

impl Default for InMemoryDatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore for InMemoryDatasetStore {
    fn put_row(&self, dataset: &str, key: Vec<u8>, columns: Row) -> Result<(), ConnectorError> {
        self.with_entries(|entries| {
            let entry = entries
                .entry(dataset.to_string())
                .or_insert_with(|| DatasetEntry::Table(BTreeMap::new()));
            match entry {
                DatasetEntry::Table(rows) => {
                    rows.entry(key).or_default().extend(columns);
                    Ok(())
                }
                other => Err(wrong_shape(dataset, "table", other)),
            }
        })
    }

    fn get_row(&self, dataset: &str, key: &[u8]) -> Result<Option<Row>, ConnectorError> {
        self.with_entries(|entries| match entries.get(dataset) {
            None => Err(not_found(dataset)),
            Some(DatasetEntry::Table(rows)) => Ok(rows.get(key).cloned()),
            Some(other) => Err(wrong_shape(dataset, "table", other)),
        })
    }

    fn scan_rows(&self, dataset: &str) -> Result<Vec<(Vec<u8>, Row)>, ConnectorError> {
        self.with_entries(|entries| match entries.get(dataset) {
            None => Err(not_found(dataset)),
            Some(DatasetEntry::Table(rows)) => Ok(rows
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            Some(other) => Err(wrong_shape(dataset, "table", other)),
        })
    }

    fn put_kv(&self, dataset: &str, key: &str, value: &str) -> Result<(), ConnectorError> {
        self.with_entries(|entries| {
            let entry = entries
                .entry(dataset.to_string())
                .or_insert_with(|| DatasetEntry::Kv(BTreeMap::new()));
            match entry {
                DatasetEntry::Kv(map) => {
                    map.insert(key.to_string(), value.to_string());
                    Ok(())
                }
                other => Err(wrong_shape(dataset, "kv", other)),
            }
        })
    }

    fn lookup(&self, dataset: &str, key: &str) -> Result<Option<String>, ConnectorError> {
        self.with_entries(|entries| match entries.get(dataset) {
            None => Err(not_found(dataset)),
            Some(DatasetEntry::Kv(map)) => Ok(map.get(key).cloned()),
            Some(other) => Err(wrong_shape(dataset, "kv", other)),
        })
    }

    fn append_event(&self, dataset: &str, event: StreamEvent) -> Result<(), ConnectorError> {
        self.with_entries(|entries| {
            let entry = entries
                .entry(dataset.to_string())
                .or_insert_with(|| DatasetEntry::Stream(Vec::new()));
            match entry {
                DatasetEntry::Stream(events) => {
                    events.push(event);
                    Ok(())
                }
                other => Err(wrong_shape(dataset, "stream", other)),
            }
        })
    }

    fn read_events(&self, dataset: &str) -> Result<Vec<StreamEvent>, ConnectorError> {
        self.with_entries(|entries| match entries.get(dataset) {
            None => Err(not_found(dataset)),
            Some(DatasetEntry::Stream(events)) => Ok(events.clone()),
            Some(other) => Err(wrong_shape(dataset, "stream", other)),
        })
    }

    fn add_partition(
        &self,
        dataset: &str,
        time_millis: i64,
        records: Vec<Record>,
    ) -> Result<(), ConnectorError> {
        self.with_entries(|entries| {
            let entry = entries
                .entry(dataset.to_string())
                .or_insert_with(|| DatasetEntry::Fileset(BTreeMap::new()));
            match entry {
                DatasetEntry::Fileset(partitions) => {
                    partitions.entry(time_millis).or_default().extend(records);
                    Ok(())
                }
                other => Err(wrong_shape(dataset, "fileset", other)),
            }
        })
    }

    fn partitions_in_range(
        &self,
        dataset: &str,
        start_exclusive: i64,
        end_inclusive: i64,
    ) -> Result<Vec<Record>, ConnectorError> {
        use std::ops::Bound;

        self.with_entries(|entries| match entries.get(dataset) {
            None => Err(not_found(dataset)),
            // BTreeMap::range panics on an inverted range; an inverted
            // window simply selects nothing.
            Some(DatasetEntry::Fileset(_)) if end_inclusive <= start_exclusive => Ok(Vec::new()),
            Some(DatasetEntry::Fileset(partitions)) => Ok(partitions
                .range((
                    Bound::Excluded(start_exclusive),
                    Bound::Included(end_inclusive),
                ))
                .flat_map(|(_, records)| records.iter().cloned())
                .collect()),
            Some(other) => Err(wrong_shape(dataset, "fileset", other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use aqueduct_types::schema::{Field, FieldType, Schema};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_table_put_merges_columns() {
        let store = InMemoryDatasetStore::new();
        store
            .put_row("t", b"k1".to_vec(), row(&[("a", Value::Int(1))]))
            .unwrap();
        store
            .put_row("t", b"k1".to_vec(), row(&[("b", Value::Int(2))]))
            .unwrap();

        let merged = store.get_row("t", b"k1").unwrap().unwrap();
        assert_eq!(merged["a"], Value::Int(1));
        assert_eq!(merged["b"], Value::Int(2));
    }

    #[test]
    fn test_scan_rows_key_order() {
        let store = InMemoryDatasetStore::new();
        store.put_row("t", b"b".to_vec(), row(&[])).unwrap();
        store.put_row("t", b"a".to_vec(), row(&[])).unwrap();
        let rows = store.scan_rows("t").unwrap();
        assert_eq!(rows[0].0, b"a".to_vec());
        assert_eq!(rows[1].0, b"b".to_vec());
    }

    #[test]
    fn test_missing_dataset_read_fails() {
        let store = InMemoryDatasetStore::new();
        let err = store.scan_rows("missing").unwrap_err();
        assert_eq!(err.code, "DATASET_NOT_FOUND");
        assert!(store.lookup("missing", "k").is_err());
        assert!(store.read_events("missing").is_err());
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let store = InMemoryDatasetStore::new();
        store.put_kv("d", "k", "v").unwrap();
        let err = store.put_row("d", b"k".to_vec(), row(&[])).unwrap_err();
        assert_eq!(err.code, "DATASET_SHAPE_MISMATCH");
        assert!(err.message.contains("kv"));
    }

    #[test]
    fn test_kv_lookup() {
        let store = InMemoryDatasetStore::new();
        store.put_kv("lookupTable", "Bob", "123").unwrap();
        assert_eq!(
            store.lookup("lookupTable", "Bob").unwrap(),
            Some("123".to_string())
        );
        assert_eq!(store.lookup("lookupTable", "Alice").unwrap(), None);
    }

    #[test]
    fn test_stream_append_order() {
        let store = InMemoryDatasetStore::new();
        for i in 0..3 {
            store
                .append_event(
                    "s",
                    StreamEvent {
                        headers: BTreeMap::new(),
                        body: format!("e{i}").into_bytes(),
                        timestamp_millis: i,
                    },
                )
                .unwrap();
        }
        let events = store.read_events("s").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].body, b"e0".to_vec());
        assert_eq!(events[2].body, b"e2".to_vec());
    }

    #[test]
    fn test_partition_window_bounds() {
        let schema = Arc::new(
            Schema::record_of("e", vec![Field::of("id", FieldType::Int)]).unwrap(),
        );
        let rec = |id: i32| {
            Record::builder(Arc::clone(&schema))
                .set("id", Value::Int(id))
                .unwrap()
                .build()
                .unwrap()
        };

        let store = InMemoryDatasetStore::new();
        store.add_partition("fs", 100, vec![rec(1)]).unwrap();
        store.add_partition("fs", 200, vec![rec(2)]).unwrap();
        store.add_partition("fs", 300, vec![rec(3)]).unwrap();

        // Lower bound exclusive, upper inclusive.
        let records = store.partitions_in_range("fs", 100, 300).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&Value::Int(2)));
        assert_eq!(records[1].get("id"), Some(&Value::Int(3)));

        // Disjoint window sees nothing.
        assert!(store.partitions_in_range("fs", 300, 400).unwrap().is_empty());

        // Inverted and empty windows select nothing rather than panicking.
        assert!(store.partitions_in_range("fs", 300, 100).unwrap().is_empty());
        assert!(store.partitions_in_range("fs", 200, 200).unwrap().is_empty());
    }
}
