// src/store/fixture.rs
// In-memory catalog used by tests and local experiments.

use serde_json::Value;

use super::{Catalog, Database};
use crate::error::Result;

/// An in-memory database: named stores holding JSON records in order.
#[derive(Debug, Clone, Default)]
pub struct FixtureDatabase {
    name: String,
    stores: Vec<(String, Vec<Value>)>,
}

impl FixtureDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stores: Vec::new(),
        }
    }

    pub fn with_store(mut self, store: impl Into<String>, records: Vec<Value>) -> Self {
        self.stores.push((store.into(), records));
        self
    }
}

impl Database for FixtureDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.iter().map(|(name, _)| name.clone()).collect()
    }

    fn records(&self, store: &str) -> Result<Box<dyn Iterator<Item = Value> + '_>> {
        let records = self
            .stores
            .iter()
            .find(|(name, _)| name == store)
            .map(|(_, records)| records.clone())
            .unwrap_or_default();
        Ok(Box::new(records.into_iter()))
    }
}

/// Catalog over a fixed set of in-memory databases.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    databases: Vec<FixtureDatabase>,
}

impl FixtureCatalog {
    pub fn new(databases: Vec<FixtureDatabase>) -> Self {
        Self { databases }
    }

    pub fn single(database: FixtureDatabase) -> Self {
        Self {
            databases: vec![database],
        }
    }
}

impl Catalog for FixtureCatalog {
    fn databases(&self) -> Result<Vec<Box<dyn Database>>> {
        Ok(self
            .databases
            .iter()
            .cloned()
            .map(|db| Box::new(db) as Box<dyn Database>)
            .collect())
    }
}
