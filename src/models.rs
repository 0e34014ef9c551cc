pub mod envelope;
pub mod history;
pub mod rewards;
pub mod users;
pub mod withdrawals;
