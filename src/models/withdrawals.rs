use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Only `Pending` is ever written here; payout tooling moves rows to
/// their terminal states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum WithdrawalStatus {
    Pending,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewWithdrawal {
    pub user_id: i64,
    pub binance_id: Option<String>,
    pub amount: f64,
    pub status: WithdrawalStatus,
}

/// Row shape returned in a user's withdrawal history.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WithdrawalEntry {
    pub amount: f64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}
