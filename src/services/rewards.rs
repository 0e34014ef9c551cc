use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, OwnedMutexGuard};

use super::{clock::Clock, RequestHandler, Service, ServiceError, WithdrawalRejection};
use crate::models::{
    history::{AdView, Commission, SpinRequest, SpinResult},
    rewards::{AdReward, CommissionOutcome, Registration, SpinGrant, SpinPrize, WithdrawalReceipt},
    users::{User, UserSnapshot, UserUpdate},
    withdrawals::{NewWithdrawal, WithdrawalStatus},
};
use crate::repositories::{ledger::LedgerStore, rewards::RewardRepository, users::UserRepository};

mod guard;
mod policy;

use guard::{SpinTickets, UserLocks};
pub use policy::RewardPolicy;

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

pub enum RewardRequest {
    GetUserData {
        user_id: i64,
        response: Reply<UserSnapshot>,
    },
    Register {
        user_id: i64,
        ref_by: Option<i64>,
        response: Reply<Registration>,
    },
    WatchAd {
        user_id: i64,
        response: Reply<AdReward>,
    },
    Commission {
        referrer_id: Option<i64>,
        referee_id: Option<i64>,
        response: Reply<CommissionOutcome>,
    },
    Spin {
        user_id: i64,
        response: Reply<SpinGrant>,
    },
    SpinResult {
        user_id: i64,
        response: Reply<SpinPrize>,
    },
    Withdraw {
        user_id: i64,
        binance_id: Option<String>,
        amount: Option<Value>,
        response: Reply<WithdrawalReceipt>,
    },
}

fn upstream(context: &'static str) -> impl Fn(anyhow::Error) -> ServiceError {
    move |e| {
        log::error!("{}: {}", context, e);
        ServiceError::Upstream {
            context,
            message: e.to_string(),
        }
    }
}

fn user_not_found() -> ServiceError {
    ServiceError::NotFound("User not found.".to_string())
}

/// Executes the reward-granting actions against the ledger.
///
/// Every action is a plain read-modify-write: the user row is read, the gate
/// is checked on that snapshot and the new values are written back
/// unconditionally. Unless `serialize_per_user` is set, two concurrent calls
/// for the same user can both pass the gate.
#[derive(Clone)]
pub struct RewardRequestHandler {
    users: UserRepository,
    rewards: RewardRepository,
    policy: Arc<RewardPolicy>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
    tickets: SpinTickets,
}

impl RewardRequestHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>, policy: RewardPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: UserRepository::new(ledger.clone()),
            rewards: RewardRepository::new(ledger),
            policy: Arc::new(policy),
            clock,
            locks: UserLocks::default(),
            tickets: SpinTickets::default(),
        }
    }

    async fn serialize(&self, user_id: i64) -> Option<OwnedMutexGuard<()>> {
        if self.policy.serialize_per_user {
            Some(self.locks.lock(user_id).await)
        } else {
            None
        }
    }

    async fn require_user(&self, user_id: i64, context: &'static str) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(user_id)
            .await
            .map_err(upstream(context))?
            .ok_or_else(user_not_found)
    }

    pub async fn get_user_data(&self, user_id: i64) -> Result<UserSnapshot, ServiceError> {
        const CONTEXT: &str = "Failed to retrieve user data";

        let Some(user) = self
            .users
            .get_user_by_id(user_id)
            .await
            .map_err(upstream(CONTEXT))?
        else {
            return Ok(UserSnapshot::default());
        };

        let referrals_count = self
            .users
            .count_referrals(user_id)
            .await
            .map_err(upstream(CONTEXT))?;
        let withdrawal_history = self
            .users
            .withdrawal_history(user_id)
            .await
            .map_err(upstream(CONTEXT))?;

        Ok(UserSnapshot {
            balance: user.balance,
            ads_watched_today: user.ads_watched_today,
            spins_today: user.spins_today,
            referrals_count,
            withdrawal_history,
        })
    }

    /// Creates the user unless a row with that id already exists.
    pub async fn register(
        &self,
        user_id: i64,
        ref_by: Option<i64>,
    ) -> Result<Registration, ServiceError> {
        const CONTEXT: &str = "Registration failed";
        let _guard = self.serialize(user_id).await;

        let exists = self
            .users
            .user_exists(user_id)
            .await
            .map_err(upstream(CONTEXT))?;
        if !exists {
            self.users
                .insert_user(&User::new(user_id, ref_by))
                .await
                .map_err(upstream(CONTEXT))?;
            log::info!("Registered user {} (referred by {:?}).", user_id, ref_by);
        }

        Ok(Registration {
            message: "User registered or already exists.".to_string(),
        })
    }

    pub async fn watch_ad(&self, user_id: i64) -> Result<AdReward, ServiceError> {
        const CONTEXT: &str = "WatchAd failed";
        let _guard = self.serialize(user_id).await;

        let user = self.require_user(user_id, CONTEXT).await?;
        let now = self.clock.now();
        if let Some(remaining_secs) = self.policy.cooldown_remaining(user.last_ad_time, now) {
            return Err(ServiceError::Cooldown {
                remaining_secs,
                activity: "watching another ad",
            });
        }

        let reward = self.policy.reward_per_ad;
        let new_balance = user.balance + reward;
        let new_ads_count = user.ads_watched_today + 1;

        self.users
            .update_user(
                user_id,
                &UserUpdate {
                    balance: Some(new_balance),
                    ads_watched_today: Some(new_ads_count),
                    last_ad_time: Some(now),
                    ..Default::default()
                },
            )
            .await
            .map_err(upstream(CONTEXT))?;
        self.rewards
            .record_ad_view(&AdView { user_id, reward })
            .await
            .map_err(upstream(CONTEXT))?;

        Ok(AdReward {
            new_balance,
            new_ads_count,
            actual_reward: reward,
        })
    }

    /// Best-effort referral payout: an unknown referrer is acknowledged, not failed.
    pub async fn commission(
        &self,
        referrer_id: Option<i64>,
        referee_id: Option<i64>,
    ) -> Result<CommissionOutcome, ServiceError> {
        const CONTEXT: &str = "Commission failed";

        let (Some(referrer_id), Some(referee_id)) = (referrer_id, referee_id) else {
            return Ok(CommissionOutcome::Skipped {
                message: "Invalid commission data received but acknowledged.".to_string(),
            });
        };
        let _guard = self.serialize(referrer_id).await;

        let source_reward = self.policy.reward_per_ad;
        let amount = self.policy.commission_amount();

        let Some(referrer) = self
            .users
            .get_user_by_id(referrer_id)
            .await
            .map_err(upstream(CONTEXT))?
        else {
            log::info!("Referrer {} not found, commission skipped.", referrer_id);
            return Ok(CommissionOutcome::Skipped {
                message: "Referrer not found, commission aborted.".to_string(),
            });
        };

        let new_balance = referrer.balance + amount;
        self.users
            .update_user(
                referrer_id,
                &UserUpdate {
                    balance: Some(new_balance),
                    ..Default::default()
                },
            )
            .await
            .map_err(upstream(CONTEXT))?;
        self.rewards
            .record_commission(&Commission {
                referrer_id,
                referee_id,
                amount,
                source_reward,
            })
            .await
            .map_err(upstream(CONTEXT))?;

        Ok(CommissionOutcome::Credited {
            new_referrer_balance: new_balance,
        })
    }

    /// First phase of a spin: gates and counts it, the prize comes from `spin_result`.
    pub async fn spin(&self, user_id: i64) -> Result<SpinGrant, ServiceError> {
        const CONTEXT: &str = "Spin request failed";
        let _guard = self.serialize(user_id).await;

        let user = self.require_user(user_id, CONTEXT).await?;
        let now = self.clock.now();
        if let Some(remaining_secs) = self.policy.cooldown_remaining(user.last_spin_time, now) {
            return Err(ServiceError::Cooldown {
                remaining_secs,
                activity: "spinning again",
            });
        }

        let new_spins_today = user.spins_today + 1;
        self.users
            .update_user(
                user_id,
                &UserUpdate {
                    spins_today: Some(new_spins_today),
                    last_spin_time: Some(now),
                    ..Default::default()
                },
            )
            .await
            .map_err(upstream(CONTEXT))?;
        self.rewards
            .record_spin_request(&SpinRequest { user_id })
            .await
            .map_err(upstream(CONTEXT))?;

        if self.policy.require_spin_ticket {
            self.tickets.issue(user_id, now);
        }

        Ok(SpinGrant { new_spins_today })
    }

    pub async fn spin_result(&self, user_id: i64) -> Result<SpinPrize, ServiceError> {
        const CONTEXT: &str = "Spin result failed";
        let _guard = self.serialize(user_id).await;

        let user = self.require_user(user_id, CONTEXT).await?;

        let ticket = if self.policy.require_spin_ticket {
            let issued_at = self
                .tickets
                .redeem(user_id, self.clock.now(), self.policy.spin_ticket_ttl)
                .ok_or_else(|| {
                    ServiceError::Forbidden("No pending spin. Call spin first.".to_string())
                })?;
            Some(issued_at)
        } else {
            None
        };

        let (prize_index, prize) = self.policy.wheel.spin(&mut rand::thread_rng());
        let new_balance = user.balance + prize;

        let credited = self
            .users
            .update_user(
                user_id,
                &UserUpdate {
                    balance: Some(new_balance),
                    ..Default::default()
                },
            )
            .await;
        if let Err(e) = credited {
            // Nothing was paid out, the spin stays redeemable.
            if let Some(issued_at) = ticket {
                self.tickets.issue(user_id, issued_at);
            }
            return Err(upstream(CONTEXT)(e));
        }
        self.rewards
            .record_spin_result(&SpinResult { user_id, prize })
            .await
            .map_err(upstream(CONTEXT))?;

        Ok(SpinPrize {
            new_balance,
            actual_prize: prize,
            prize_index,
        })
    }

    pub async fn withdraw(
        &self,
        user_id: i64,
        binance_id: Option<String>,
        amount: Option<&Value>,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        const CONTEXT: &str = "Withdrawal failed";

        let amount = amount
            .and_then(Value::as_f64)
            .filter(|amount| amount.is_finite() && *amount > 0.0)
            .ok_or(WithdrawalRejection::InvalidAmount)?;
        let _guard = self.serialize(user_id).await;

        let user = self.require_user(user_id, CONTEXT).await?;
        if amount < self.policy.min_withdrawal {
            return Err(WithdrawalRejection::BelowMinimum {
                minimum: self.policy.min_withdrawal,
                currency: self.policy.currency.clone(),
            }
            .into());
        }
        if amount > user.balance {
            return Err(WithdrawalRejection::InsufficientFunds.into());
        }

        let new_balance = user.balance - amount;
        self.users
            .update_user(
                user_id,
                &UserUpdate {
                    balance: Some(new_balance),
                    ..Default::default()
                },
            )
            .await
            .map_err(upstream(CONTEXT))?;
        self.rewards
            .insert_withdrawal(&NewWithdrawal {
                user_id,
                binance_id,
                amount,
                status: WithdrawalStatus::Pending,
            })
            .await
            .map_err(upstream(CONTEXT))?;

        log::info!("User {} requested a withdrawal of {}.", user_id, amount);
        Ok(WithdrawalReceipt { new_balance })
    }
}

#[async_trait]
impl RequestHandler<RewardRequest> for RewardRequestHandler {
    async fn handle_request(&self, request: RewardRequest) {
        match request {
            RewardRequest::GetUserData { user_id, response } => {
                let _ = response.send(self.get_user_data(user_id).await);
            }
            RewardRequest::Register {
                user_id,
                ref_by,
                response,
            } => {
                let _ = response.send(self.register(user_id, ref_by).await);
            }
            RewardRequest::WatchAd { user_id, response } => {
                let _ = response.send(self.watch_ad(user_id).await);
            }
            RewardRequest::Commission {
                referrer_id,
                referee_id,
                response,
            } => {
                let _ = response.send(self.commission(referrer_id, referee_id).await);
            }
            RewardRequest::Spin { user_id, response } => {
                let _ = response.send(self.spin(user_id).await);
            }
            RewardRequest::SpinResult { user_id, response } => {
                let _ = response.send(self.spin_result(user_id).await);
            }
            RewardRequest::Withdraw {
                user_id,
                binance_id,
                amount,
                response,
            } => {
                let result = self.withdraw(user_id, binance_id, amount.as_ref()).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct RewardService;

impl RewardService {
    pub fn new() -> Self {
        RewardService {}
    }
}

#[async_trait]
impl Service<RewardRequest, RewardRequestHandler> for RewardService {}
