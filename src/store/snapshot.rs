// src/store/snapshot.rs
// Catalog over a JSON export of the IndexedDB object stores.
//
// The Chromium LevelDB + V8 value decoding is owned by an external extractor
// that maintains a JSON export next to the live database directory
// (`<db_path>.json`). The export maps database name -> store name -> records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{LinearFastError, Result};

use super::{Catalog, Database};

pub struct SnapshotCatalog {
    db_path: PathBuf,
    export_path: PathBuf,
}

impl SnapshotCatalog {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let export_path = PathBuf::from(format!("{}.json", db_path.display()));
        Self {
            db_path,
            export_path,
        }
    }

    /// Use an explicit export file instead of the `<db_path>.json` sibling.
    pub fn with_export_path(mut self, export_path: impl Into<PathBuf>) -> Self {
        self.export_path = export_path.into();
        self
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }
}

#[derive(Debug)]
struct SnapshotDatabase {
    name: String,
    stores: BTreeMap<String, Vec<Value>>,
}

impl Database for SnapshotDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn records(&self, store: &str) -> Result<Box<dyn Iterator<Item = Value> + '_>> {
        let records = self.stores.get(store).cloned().unwrap_or_default();
        Ok(Box::new(records.into_iter()))
    }
}

impl Catalog for SnapshotCatalog {
    fn databases(&self) -> Result<Vec<Box<dyn Database>>> {
        if !self.db_path.exists() {
            return Err(LinearFastError::DatabaseNotFound(
                self.db_path.display().to_string(),
            ));
        }

        let raw = std::fs::read_to_string(&self.export_path).map_err(|e| {
            LinearFastError::Store(format!(
                "no store export at {}: {}",
                self.export_path.display(),
                e
            ))
        })?;
        let parsed: BTreeMap<String, BTreeMap<String, Vec<Value>>> = serde_json::from_str(&raw)
            .map_err(|e| {
                LinearFastError::Store(format!(
                    "invalid store export at {}: {}",
                    self.export_path.display(),
                    e
                ))
            })?;

        Ok(parsed
            .into_iter()
            .map(|(name, stores)| {
                Box::new(SnapshotDatabase { name, stores }) as Box<dyn Database>
            })
            .collect())
    }
}
