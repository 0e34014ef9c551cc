use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub bot_token: String,
    pub session_ttl_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    pub backend: LedgerBackend,
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rewards {
    pub reward_per_ad: f64,
    pub commission_rate: f64,
    pub cooldown_ms: i64,
    pub spin_sectors: Vec<f64>,
    pub min_withdrawal: f64,
    pub currency: String,
    pub serialize_per_user: bool,
    pub require_spin_ticket: bool,
    pub spin_ticket_ttl_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub telegram: Telegram,
    pub ledger: Ledger,
    pub rewards: Rewards,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.listen", "0.0.0.0:8080")?
            .set_default("telegram.bot_token", "")?
            // 1300 s, not 30 min.
            .set_default("telegram.session_ttl_ms", 1_300_000_i64)?
            .set_default("ledger.backend", "supabase")?
            .set_default("ledger.url", "")?
            .set_default("ledger.api_key", "")?
            .set_default("rewards.reward_per_ad", 3.0)?
            .set_default("rewards.commission_rate", 0.05)?
            .set_default("rewards.cooldown_ms", 30_000_i64)?
            .set_default("rewards.spin_sectors", vec![5.0, 10.0, 15.0, 20.0, 5.0])?
            .set_default("rewards.min_withdrawal", 400.0)?
            .set_default("rewards.currency", "SHIB")?
            .set_default("rewards.serialize_per_user", false)?
            .set_default("rewards.require_spin_ticket", false)?
            .set_default("rewards.spin_ticket_ttl_ms", 60_000_i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("REWARDS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rewards.spin_sectors.is_empty() {
            return Err(ConfigError::Message(
                "rewards.spin_sectors must hold at least one prize".to_string(),
            ));
        }

        if self.ledger.backend == LedgerBackend::Supabase
            && (self.ledger.url.is_empty() || self.ledger.api_key.is_empty())
        {
            log::warn!("Ledger url or api_key is empty, every ledger call will fail.");
        }

        if self.telegram.bot_token.is_empty() {
            log::warn!("telegram.bot_token is empty, every session check will fail.");
        }

        Ok(())
    }
}
