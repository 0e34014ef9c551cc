use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct AdView {
    pub user_id: i64,
    pub reward: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpinRequest {
    pub user_id: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpinResult {
    pub user_id: i64,
    pub prize: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Commission {
    pub referrer_id: i64,
    pub referee_id: i64,
    pub amount: f64,
    pub source_reward: f64,
}
