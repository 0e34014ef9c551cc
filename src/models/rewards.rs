use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Registration {
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AdReward {
    pub new_balance: f64,
    pub new_ads_count: i64,
    pub actual_reward: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommissionOutcome {
    Credited { new_referrer_balance: f64 },
    Skipped { message: String },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SpinGrant {
    pub new_spins_today: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SpinPrize {
    pub new_balance: f64,
    pub actual_prize: f64,
    pub prize_index: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WithdrawalReceipt {
    pub new_balance: f64,
}
