//! In-memory persistence service.
//!
//! Behaves like the hosted backend for the operations the services use:
//! ids and `created_at` are assigned on insert, patches merge, filters apply.
//! Used by tests and by local runs without a backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;
use ulid::Ulid;

use crate::store::{Filter, Row, Store, StoreError, Table};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row verbatim. Non-object values are ignored.
    #[must_use]
    pub fn with_row(self, table: Table, row: Value) -> Self {
        if let Value::Object(row) = row {
            self.tables().entry(table).or_default().push(row);
        }
        self
    }

    /// Makes every operation fail with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get` and `list` calls served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `insert`, `update` and `delete` calls served.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a table.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables().get(&table).cloned().unwrap_or_default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<Table, Vec<Row>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, counter: &AtomicUsize) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "memory store switched off".to_string(),
            });
        }
        Ok(())
    }
}

fn has_id(row: &Row, id: &str) -> bool {
    row.get("id").and_then(Value::as_str) == Some(id)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: Table, id: &str) -> Result<Option<Row>, StoreError> {
        self.check(&self.reads)?;
        Ok(self
            .tables()
            .get(&table)
            .and_then(|rows| rows.iter().find(|r| has_id(r, id)).cloned()))
    }

    async fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.check(&self.reads)?;
        Ok(self
            .tables()
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, StoreError> {
        self.check(&self.writes)?;
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Ulid::new().to_string().to_lowercase(),
        };
        row.insert("id".to_string(), Value::from(id.clone()));
        row.entry("created_at")
            .or_insert_with(|| Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)));

        let mut tables = self.tables();
        let rows = tables.entry(table).or_default();
        if rows.iter().any(|r| has_id(r, &id)) {
            return Err(StoreError::Rejected {
                reason: format!("duplicate id '{id}'"),
            });
        }
        rows.push(row.clone());
        debug!(%table, %id, "row inserted");
        Ok(row)
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Option<Row>, StoreError> {
        self.check(&self.writes)?;
        let mut tables = self.tables();
        let Some(row) = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| has_id(r, id)))
        else {
            return Ok(None);
        };
        for (column, value) in patch {
            if column != "id" {
                row.insert(column, value);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool, StoreError> {
        self.check(&self.writes)?;
        let mut tables = self.tables();
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| !has_id(r, id));
        Ok(rows.len() < before)
    }
}
