//! In-memory columnar event table.
//!
//! The dataset is immutable once built: all derived values live in the
//! column graph, never here. Per-event deterministic seeds are derived from
//! the `(run, luminosityBlock, event)` identifier columns when present, so
//! any tie-break downstream is reproducible across runs and thread counts.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use jc_core::{Error, Result};
use twox_hash::XxHash64;

use crate::column::{ColumnData, ColumnType, ColumnValue, Jagged};

/// Canonical identifier column names.
const RUN_COL: &str = "run";
const LUMI_COL: &str = "luminosityBlock";
const EVENT_COL: &str = "event";

/// A typed, immutable columnar event table.
#[derive(Debug, Clone)]
pub struct EventDataset {
    columns: Vec<(String, ColumnData)>,
    index: HashMap<String, usize>,
    n_events: usize,
    /// Column indices of (run, luminosityBlock, event), when all present.
    id_columns: Option<(usize, usize, usize)>,
}

impl EventDataset {
    /// Start building a dataset.
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Iterate `(name, type)` over the source schema.
    pub fn schema(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d.column_type()))
    }

    /// Whether a source column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Index of a source column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Type of a source column.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.index.get(name).map(|&i| self.columns[i].1.column_type())
    }

    /// Materialize one event's value for a source column.
    pub fn value_at(&self, event: usize, column: usize) -> ColumnValue {
        self.columns[column].1.value_at(event)
    }

    /// Deterministic per-event seed.
    ///
    /// Hash of the `(run, luminosityBlock, event)` identifiers when the
    /// dataset carries them, otherwise of the row index. Stable across
    /// partitionings and runs.
    pub fn event_seed(&self, event: usize) -> u64 {
        let mut h = XxHash64::with_seed(0);
        match self.id_columns {
            Some((r, l, e)) => {
                for col in [r, l, e] {
                    let v = match &self.columns[col].1 {
                        ColumnData::I64(v) => v[event],
                        ColumnData::F64(v) => v[event] as i64,
                        _ => 0,
                    };
                    h.write_i64(v);
                }
            }
            None => h.write_u64(event as u64),
        }
        h.finish()
    }

    /// Run number of an event, when the dataset carries a `run` column.
    pub fn run_number(&self, event: usize) -> Option<u32> {
        let (r, _, _) = self.id_columns?;
        match &self.columns[r].1 {
            ColumnData::I64(v) => Some(v[event] as u32),
            ColumnData::F64(v) => Some(v[event] as u32),
            _ => None,
        }
    }
}

/// Source of event tables; the on-disk format behind it is opaque.
pub trait DatasetReader: Send + Sync {
    /// Load the listed files into one concatenated table.
    fn read_columns(&self, file_list: &[String]) -> Result<Arc<EventDataset>>;
}

/// Reader over pre-loaded tables, keyed by file name.
///
/// Stands in for the real I/O layer in tests and small jobs; requesting
/// several files returns the first match (tables are pre-concatenated).
#[derive(Debug, Default)]
pub struct InMemoryReader {
    tables: HashMap<String, Arc<EventDataset>>,
}

impl InMemoryReader {
    /// Register a table under a file name.
    pub fn insert(&mut self, file: &str, dataset: Arc<EventDataset>) {
        self.tables.insert(file.to_string(), dataset);
    }
}

impl DatasetReader for InMemoryReader {
    fn read_columns(&self, file_list: &[String]) -> Result<Arc<EventDataset>> {
        file_list
            .iter()
            .find_map(|f| self.tables.get(f))
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no table registered for {file_list:?}"),
                ))
            })
    }
}

/// Builder for [`EventDataset`].
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    columns: Vec<(String, ColumnData)>,
}

impl DatasetBuilder {
    fn push(mut self, name: &str, data: ColumnData) -> Self {
        self.columns.push((name.to_string(), data));
        self
    }

    /// Add a scalar float column.
    pub fn f64(self, name: &str, values: Vec<f64>) -> Self {
        self.push(name, ColumnData::F64(values))
    }

    /// Add a scalar integer column.
    pub fn i64(self, name: &str, values: Vec<i64>) -> Self {
        self.push(name, ColumnData::I64(values))
    }

    /// Add a scalar boolean column.
    pub fn bool(self, name: &str, values: Vec<bool>) -> Self {
        self.push(name, ColumnData::Bool(values))
    }

    /// Add a jagged float column from per-event rows.
    pub fn jagged_f64(self, name: &str, rows: Vec<Vec<f64>>) -> Self {
        self.push(name, ColumnData::VecF64(Jagged::from_rows(rows)))
    }

    /// Add a jagged integer column from per-event rows.
    pub fn jagged_i64(self, name: &str, rows: Vec<Vec<i64>>) -> Self {
        self.push(name, ColumnData::VecI64(Jagged::from_rows(rows)))
    }

    /// Add a jagged boolean column from per-event rows.
    pub fn jagged_bool(self, name: &str, rows: Vec<Vec<bool>>) -> Self {
        self.push(name, ColumnData::VecBool(Jagged::from_rows(rows)))
    }

    /// Validate column lengths and build.
    pub fn build(self) -> Result<EventDataset> {
        let mut index = HashMap::new();
        let mut n_events = None;
        for (i, (name, data)) in self.columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::NameCollision(name.clone()));
            }
            let n = data.n_events();
            match n_events {
                None => n_events = Some(n),
                Some(expected) if expected != n => {
                    return Err(Error::TypeMismatch(format!(
                        "column '{name}' has {n} events, expected {expected}"
                    )));
                }
                _ => {}
            }
        }
        let id_columns = match (
            index.get(RUN_COL).copied(),
            index.get(LUMI_COL).copied(),
            index.get(EVENT_COL).copied(),
        ) {
            (Some(r), Some(l), Some(e)) => Some((r, l, e)),
            _ => None,
        };
        Ok(EventDataset {
            columns: self.columns,
            index,
            n_events: n_events.unwrap_or(0),
            id_columns,
        })
    }
}
