use std::sync::Arc;

use serde::Serialize;

use super::ledger::{LedgerMethod, LedgerQuery, LedgerStore};
use crate::models::{
    history::{AdView, Commission, SpinRequest, SpinResult},
    withdrawals::NewWithdrawal,
};

/// Append-only audit tables plus the withdrawal queue.
#[derive(Clone)]
pub struct RewardRepository {
    ledger: Arc<dyn LedgerStore>,
}

impl RewardRepository {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    async fn append<T: Serialize>(
        &self,
        table: &str,
        row: &T,
        returning: &str,
    ) -> Result<(), anyhow::Error> {
        let body = serde_json::to_value(row)?;

        self.ledger
            .fetch(
                table,
                LedgerMethod::Post,
                Some(&body),
                &LedgerQuery::new().select(returning),
            )
            .await?;

        Ok(())
    }

    pub async fn record_ad_view(&self, view: &AdView) -> Result<(), anyhow::Error> {
        self.append("ads_history", view, "user_id").await
    }

    pub async fn record_spin_request(&self, request: &SpinRequest) -> Result<(), anyhow::Error> {
        self.append("spin_requests", request, "user_id").await
    }

    pub async fn record_spin_result(&self, result: &SpinResult) -> Result<(), anyhow::Error> {
        self.append("spin_results", result, "user_id").await
    }

    pub async fn record_commission(&self, commission: &Commission) -> Result<(), anyhow::Error> {
        self.append("commission_history", commission, "referrer_id")
            .await
    }

    pub async fn insert_withdrawal(&self, withdrawal: &NewWithdrawal) -> Result<(), anyhow::Error> {
        self.append("withdrawals", withdrawal, "user_id").await
    }
}
