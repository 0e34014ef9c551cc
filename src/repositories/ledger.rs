use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

mod memory;
mod supabase;

pub use memory::MemoryLedger;
pub use supabase::SupabaseLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerMethod {
    Get,
    Post,
    Patch,
}

impl fmt::Display for LedgerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerMethod::Get => f.write_str("GET"),
            LedgerMethod::Post => f.write_str("POST"),
            LedgerMethod::Patch => f.write_str("PATCH"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// PostgREST style row filter: `eq` filters, a column projection and an
/// optional ordering.
#[derive(Clone, Debug, Default)]
pub struct LedgerQuery {
    filters: Vec<(String, String)>,
    select: Option<String>,
    order: Option<(String, SortOrder)>,
}

impl LedgerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    pub fn columns(&self) -> Option<Vec<&str>> {
        match self.select.as_deref() {
            None | Some("*") => None,
            Some(columns) => Some(columns.split(',').map(str::trim).collect()),
        }
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order.as_ref().map(|(column, order)| (column.as_str(), *order))
    }

    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|(column, value)| format!("{}=eq.{}", column, value))
            .collect();

        parts.push(format!("select={}", self.select.as_deref().unwrap_or("*")));

        if let Some((column, order)) = &self.order {
            let direction = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            parts.push(format!("order={}.{}", column, direction));
        }

        format!("?{}", parts.join("&"))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LedgerReply {
    Rows(Vec<Value>),
    /// 2xx with an empty or non-JSON body.
    Success,
}

impl LedgerReply {
    pub fn from_rows(rows: Vec<Value>) -> Self {
        if rows.is_empty() {
            LedgerReply::Success
        } else {
            LedgerReply::Rows(rows)
        }
    }

    pub fn into_rows(self) -> Vec<Value> {
        match self {
            LedgerReply::Rows(rows) => rows,
            LedgerReply::Success => Vec::new(),
        }
    }
}

/// Narrow access contract to the durable store holding balances and audit rows.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn fetch(
        &self,
        table: &str,
        method: LedgerMethod,
        body: Option<&Value>,
        query: &LedgerQuery,
    ) -> Result<LedgerReply, anyhow::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_renders_postgrest_filters() {
        let query = LedgerQuery::new()
            .eq("user_id", 12)
            .select("amount,status,created_at")
            .order("created_at", SortOrder::Desc);

        assert_eq!(
            query.to_query_string(),
            "?user_id=eq.12&select=amount,status,created_at&order=created_at.desc"
        );
    }

    #[test]
    fn query_defaults_to_all_columns() {
        let query = LedgerQuery::new().eq("id", 1);

        assert_eq!(query.to_query_string(), "?id=eq.1&select=*");
        assert!(query.columns().is_none());
    }

    #[test]
    fn empty_row_set_collapses_to_success() {
        assert_eq!(LedgerReply::from_rows(vec![]), LedgerReply::Success);
        assert!(LedgerReply::Success.into_rows().is_empty());
    }
}
