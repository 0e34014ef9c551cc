pub mod ledger;
pub mod rewards;
pub mod users;
