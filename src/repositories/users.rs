use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;

use super::ledger::{LedgerMethod, LedgerQuery, LedgerStore, SortOrder};
use crate::models::{
    users::{User, UserUpdate},
    withdrawals::WithdrawalEntry,
};

const USERS: &str = "users";
const WITHDRAWALS: &str = "withdrawals";

#[derive(Clone)]
pub struct UserRepository {
    ledger: Arc<dyn LedgerStore>,
}

impl UserRepository {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error> {
        let rows = self
            .ledger
            .fetch(
                USERS,
                LedgerMethod::Get,
                None,
                &LedgerQuery::new().eq("id", user_id).select("*"),
            )
            .await?
            .into_rows();

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let rows = self
            .ledger
            .fetch(
                USERS,
                LedgerMethod::Get,
                None,
                &LedgerQuery::new().eq("id", user_id).select("id"),
            )
            .await?
            .into_rows();

        Ok(!rows.is_empty())
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), anyhow::Error> {
        let body = serde_json::to_value(user)?;

        self.ledger
            .fetch(
                USERS,
                LedgerMethod::Post,
                Some(&body),
                &LedgerQuery::new().select("id"),
            )
            .await?;

        Ok(())
    }

    pub async fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<(), anyhow::Error> {
        let body = serde_json::to_value(update)?;
        if body.as_object().map(|fields| fields.is_empty()).unwrap_or(true) {
            return Err(anyhow!("Refusing to send an empty update for user {}", user_id));
        }

        self.ledger
            .fetch(
                USERS,
                LedgerMethod::Patch,
                Some(&body),
                &LedgerQuery::new().eq("id", user_id),
            )
            .await?;

        Ok(())
    }

    pub async fn count_referrals(&self, user_id: i64) -> Result<usize, anyhow::Error> {
        let rows = self
            .ledger
            .fetch(
                USERS,
                LedgerMethod::Get,
                None,
                &LedgerQuery::new().eq("ref_by", user_id).select("id"),
            )
            .await?
            .into_rows();

        Ok(rows.len())
    }

    pub async fn withdrawal_history(
        &self,
        user_id: i64,
    ) -> Result<Vec<WithdrawalEntry>, anyhow::Error> {
        let rows = self
            .ledger
            .fetch(
                WITHDRAWALS,
                LedgerMethod::Get,
                None,
                &LedgerQuery::new()
                    .eq("user_id", user_id)
                    .select("amount,status,created_at")
                    .order("created_at", SortOrder::Desc),
            )
            .await?
            .into_rows();

        rows.into_iter()
            .map(|row: Value| serde_json::from_value(row).map_err(anyhow::Error::from))
            .collect()
    }
}
