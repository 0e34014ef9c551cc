use anyhow::bail;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::{LedgerMethod, LedgerQuery, LedgerReply, LedgerStore};

/// Ledger backed by the Supabase REST API.
pub struct SupabaseLedger {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SupabaseLedger {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LedgerStore for SupabaseLedger {
    async fn fetch(
        &self,
        table: &str,
        method: LedgerMethod,
        body: Option<&Value>,
        query: &LedgerQuery,
    ) -> Result<LedgerReply, anyhow::Error> {
        if self.url.is_empty() || self.api_key.is_empty() {
            bail!("Supabase environment variables are not configured.");
        }

        log::debug!("Ledger {} {}{}", method, table, query.to_query_string());
        let method = match method {
            LedgerMethod::Get => Method::GET,
            LedgerMethod::Post => Method::POST,
            LedgerMethod::Patch => Method::PATCH,
        };
        let url = format!("{}/rest/v1/{}{}", self.url, table, query.to_query_string());

        let mut request = self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(match serde_json::from_str::<Value>(&text) {
                Ok(Value::Array(rows)) => LedgerReply::from_rows(rows),
                Ok(row @ Value::Object(_)) => LedgerReply::Rows(vec![row]),
                _ => LedgerReply::Success,
            });
        }

        let fallback = format!(
            "Supabase error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        );
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(fallback);

        bail!(message)
    }
}
