use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::ledger::{LedgerStore, MemoryLedger, SupabaseLedger};
use crate::settings::{LedgerBackend, Settings};

pub mod clock;
pub mod http;
pub mod rewards;
pub mod session;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WithdrawalRejection {
    #[error("Invalid withdrawal amount.")]
    InvalidAmount,
    #[error("Minimum withdrawal is {minimum} {currency}.")]
    BelowMinimum { minimum: f64, currency: String },
    #[error("Insufficient balance.")]
    InsufficientFunds,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid or expired initData. Security check failed.")]
    Unauthorized,
    #[error(transparent)]
    Withdrawal(#[from] WithdrawalRejection),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Please wait {remaining_secs} seconds before {activity}.")]
    Cooldown {
        remaining_secs: i64,
        activity: &'static str,
    },
    #[error("Method {0} not allowed. Only POST is supported.")]
    MethodNotAllowed(String),
    #[error("{context}: {message}")]
    Upstream {
        context: &'static str,
        message: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

fn build_ledger(settings: &Settings) -> Arc<dyn LedgerStore> {
    match settings.ledger.backend {
        LedgerBackend::Supabase => Arc::new(SupabaseLedger::new(
            settings.ledger.url.clone(),
            settings.ledger.api_key.clone(),
        )),
        LedgerBackend::Memory => {
            log::warn!("Using the in-memory ledger, balances will not survive a restart.");
            Arc::new(MemoryLedger::new())
        }
    }
}

pub async fn start_services(settings: Settings) -> Result<(), anyhow::Error> {
    let (reward_tx, mut reward_rx) = mpsc::channel(512);

    let ledger = build_ledger(&settings);
    let policy = rewards::RewardPolicy::from(&settings.rewards);
    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);
    let mut reward_service = rewards::RewardService::new();

    log::info!("Starting reward service.");
    let handler = rewards::RewardRequestHandler::new(ledger, policy, clock.clone());
    tokio::spawn(async move {
        reward_service.run(handler, &mut reward_rx).await;
    });

    log::info!("Starting HTTP server.");
    let verifier = session::SessionVerifier::new(
        settings.telegram.bot_token.clone(),
        settings.telegram.session_ttl_ms,
    );
    http::start_http_server(&settings.server.listen, reward_tx, verifier, clock).await
}
