use std::collections::HashMap;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{LedgerMethod, LedgerQuery, LedgerReply, LedgerStore, SortOrder};

type Row = Map<String, Value>;

/// In-process ledger with the same query subset as the REST store. Rows are
/// stamped with `created_at` on insert and `id` is unique per table.
#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    #[cfg(test)]
    failures: RwLock<HashMap<(String, LedgerMethod), String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row currently stored in `table`.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Makes every `method` call on `table` fail with `message`.
    #[cfg(test)]
    pub async fn fail_on(&self, table: &str, method: LedgerMethod, message: &str) {
        self.failures
            .write()
            .await
            .insert((table.to_string(), method), message.to_string());
    }

    #[cfg(test)]
    pub async fn recover(&self) {
        self.failures.write().await.clear();
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Row, query: &LedgerQuery) -> bool {
    query.filters().iter().all(|(column, expected)| {
        let actual = row.get(column).unwrap_or(&Value::Null);
        cell_text(actual) == *expected
    })
}

fn project(row: &Row, query: &LedgerQuery) -> Value {
    match query.columns() {
        None => Value::Object(row.clone()),
        Some(columns) => Value::Object(
            columns
                .into_iter()
                .filter_map(|column| row.get(column).map(|v| (column.to_string(), v.clone())))
                .collect(),
        ),
    }
}

fn object_rows(body: Option<&Value>) -> Result<Vec<Row>, anyhow::Error> {
    match body {
        Some(Value::Object(row)) => Ok(vec![row.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .cloned()
                    .ok_or_else(|| anyhow!("Row must be a JSON object."))
            })
            .collect(),
        _ => bail!("Request body is required."),
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn fetch(
        &self,
        table: &str,
        method: LedgerMethod,
        body: Option<&Value>,
        query: &LedgerQuery,
    ) -> Result<LedgerReply, anyhow::Error> {
        #[cfg(test)]
        if let Some(message) = self.failures.read().await.get(&(table.to_string(), method)) {
            bail!("{}", message);
        }

        match method {
            LedgerMethod::Get => {
                let tables = self.tables.read().await;
                let mut rows: Vec<&Row> = tables
                    .get(table)
                    .map(|rows| rows.iter().filter(|row| matches(row, query)).collect())
                    .unwrap_or_default();

                if let Some((column, order)) = query.ordering() {
                    rows.sort_by_key(|row| row.get(column).map(cell_text).unwrap_or_default());
                    if order == SortOrder::Desc {
                        rows.reverse();
                    }
                }

                Ok(LedgerReply::from_rows(
                    rows.into_iter().map(|row| project(row, query)).collect(),
                ))
            }
            LedgerMethod::Post => {
                let new_rows = object_rows(body)?;
                let mut tables = self.tables.write().await;
                let stored = tables.entry(table.to_string()).or_default();

                let mut inserted = Vec::with_capacity(new_rows.len());
                for mut row in new_rows {
                    if let Some(id) = row.get("id").filter(|id| !id.is_null()) {
                        if stored.iter().any(|existing| existing.get("id") == Some(id)) {
                            bail!(
                                "duplicate key value violates unique constraint \"{}_pkey\"",
                                table
                            );
                        }
                    }
                    row.entry("created_at")
                        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
                    inserted.push(project(&row, query));
                    stored.push(row);
                }

                Ok(LedgerReply::from_rows(inserted))
            }
            LedgerMethod::Patch => {
                let changes = match body {
                    Some(Value::Object(changes)) => changes.clone(),
                    _ => bail!("Request body is required."),
                };
                let mut tables = self.tables.write().await;

                let mut updated = Vec::new();
                if let Some(rows) = tables.get_mut(table) {
                    for row in rows.iter_mut().filter(|row| matches(row, query)) {
                        for (column, value) in &changes {
                            row.insert(column.clone(), value.clone());
                        }
                        updated.push(project(row, query));
                    }
                }

                Ok(LedgerReply::from_rows(updated))
            }
        }
    }
}
