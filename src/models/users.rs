use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::withdrawals::WithdrawalEntry;

/// Reads an absent or `null` column as the type's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub balance: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ads_watched_today: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spins_today: i64,
    pub last_ad_time: Option<DateTime<Utc>>,
    pub last_spin_time: Option<DateTime<Utc>>,
    pub ref_by: Option<i64>,
}

impl User {
    /// Fresh row as written by `register`: zeroed counters, no timestamps.
    pub fn new(id: i64, ref_by: Option<i64>) -> Self {
        Self {
            id,
            balance: 0.0,
            ads_watched_today: 0,
            spins_today: 0,
            last_ad_time: None,
            last_spin_time: None,
            ref_by,
        }
    }
}

/// Partial update sent as a PATCH body. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ads_watched_today: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spins_today: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ad_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_spin_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UserSnapshot {
    pub balance: f64,
    pub ads_watched_today: i64,
    pub spins_today: i64,
    pub referrals_count: usize,
    pub withdrawal_history: Vec<WithdrawalEntry>,
}
