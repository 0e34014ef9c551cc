use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::settings;

/// Reward amounts, gates and opt-in hardening switches for every executor.
#[derive(Clone, Debug)]
pub struct RewardPolicy {
    pub reward_per_ad: f64,
    pub commission_rate: f64,
    pub cooldown: Duration,
    pub wheel: PrizeWheel,
    pub min_withdrawal: f64,
    pub currency: String,
    pub serialize_per_user: bool,
    pub require_spin_ticket: bool,
    pub spin_ticket_ttl: Duration,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            reward_per_ad: 3.0,
            commission_rate: 0.05,
            cooldown: Duration::milliseconds(30_000),
            wheel: PrizeWheel::new(vec![5.0, 10.0, 15.0, 20.0, 5.0]),
            min_withdrawal: 400.0,
            currency: "SHIB".to_string(),
            serialize_per_user: false,
            require_spin_ticket: false,
            spin_ticket_ttl: Duration::milliseconds(60_000),
        }
    }
}

impl From<&settings::Rewards> for RewardPolicy {
    fn from(rewards: &settings::Rewards) -> Self {
        Self {
            reward_per_ad: rewards.reward_per_ad,
            commission_rate: rewards.commission_rate,
            cooldown: Duration::milliseconds(rewards.cooldown_ms),
            wheel: PrizeWheel::new(rewards.spin_sectors.clone()),
            min_withdrawal: rewards.min_withdrawal,
            currency: rewards.currency.clone(),
            serialize_per_user: rewards.serialize_per_user,
            require_spin_ticket: rewards.require_spin_ticket,
            spin_ticket_ttl: Duration::milliseconds(rewards.spin_ticket_ttl_ms),
        }
    }
}

impl RewardPolicy {
    /// Commission is always computed from the fixed ad reward.
    pub fn commission_amount(&self) -> f64 {
        self.reward_per_ad * self.commission_rate
    }

    /// Whole seconds left before the action may be granted again, rounded up.
    /// `None` when the gate is open. A missing timestamp counts as the epoch.
    pub fn cooldown_remaining(
        &self,
        last_action: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let last_ms = last_action.map(|at| at.timestamp_millis()).unwrap_or(0);
        let elapsed_ms = now.timestamp_millis() - last_ms;
        let cooldown_ms = self.cooldown.num_milliseconds();

        if elapsed_ms < cooldown_ms {
            let remaining_ms = cooldown_ms - elapsed_ms;
            Some((remaining_ms + 999) / 1000)
        } else {
            None
        }
    }
}

/// Fixed prize table. Equal values on different sectors stay distinct because
/// the client animates to the returned index.
#[derive(Clone, Debug)]
pub struct PrizeWheel {
    sectors: Vec<f64>,
}

impl PrizeWheel {
    pub fn new(sectors: Vec<f64>) -> Self {
        Self { sectors }
    }

    pub fn sectors(&self) -> &[f64] {
        &self.sectors
    }

    /// Uniformly picks a sector, returning `(index, prize)`.
    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> (usize, f64) {
        let index = rng.gen_range(0..self.sectors.len());
        (index, self.sectors[index])
    }
}
