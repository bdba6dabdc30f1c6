use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use super::client::TableStore;
use super::error::{TableStoreError, TableStoreResult};

#[derive(Default)]
pub struct MockTableStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    fail_requests: AtomicBool,
}

impl MockTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row without going through `insert`.
    pub fn seed(&self, table: &str, row: Value) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Rows currently in a table.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    /// Makes every subsequent operation fail with a 503.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::Relaxed);
    }

    fn check_available(&self, table: &str) -> TableStoreResult<()> {
        if self.fail_requests.load(Ordering::Relaxed) {
            return Err(TableStoreError::Http {
                table: table.to_string(),
                status: 503,
                message: "mock unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn matches_filters(row: &Value, filters: &[(&str, &str)]) -> bool {
    filters.iter().all(|(column, expected)| {
        match row.get(*column) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Bool(b)) => b.to_string() == *expected,
            Some(Value::Number(n)) => n.to_string() == *expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        }
    })
}

fn merge_patch(row: &mut Value, patch: &Value) {
    if let (Some(row_map), Some(patch_map)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_map {
            row_map.insert(key.clone(), value.clone());
        }
    }
}

impl TableStore for MockTableStore {
    async fn select(&self, table: &str, filters: &[(&str, &str)]) -> TableStoreResult<Vec<Value>> {
        self.check_available(table)?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filters(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn select_one(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> TableStoreResult<Option<Value>> {
        Ok(self.select(table, filters).await?.into_iter().next())
    }

    async fn insert(&self, table: &str, row: Value) -> TableStoreResult<()> {
        self.check_available(table)?;
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        filters: &[(&str, &str)],
        patch: Value,
    ) -> TableStoreResult<u64> {
        self.check_available(table)?;
        let mut tables = self.tables.write();
        let mut changed = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut() {
                if matches_filters(row, filters) {
                    merge_patch(row, &patch);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn delete(&self, table: &str, filters: &[(&str, &str)]) -> TableStoreResult<()> {
        self.check_available(table)?;
        let mut tables = self.tables.write();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !matches_filters(row, filters));
        }
        Ok(())
    }
}
