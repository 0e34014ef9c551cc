use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::AppState;
use crate::models::envelope::{ActionPayload, ActionType, ApiResponse, IdField};
use crate::services::{rewards::RewardRequest, ServiceError};

pub async fn handle_action(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse>) {
    let request_id = Uuid::new_v4().hyphenated().to_string();

    let result = route_action(&state, &body, &request_id).await;
    if let Err(e) = &result {
        log::warn!("[{}] Request rejected: {}", request_id, e);
    }

    super::reply(result)
}

async fn dispatch<T, F>(state: &AppState, build: F) -> Result<Value, ServiceError>
where
    T: Serialize,
    F: FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> RewardRequest,
{
    let (response_tx, response_rx) = oneshot::channel();

    state
        .reward_channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to process request: {}", e)))?;

    let outcome = response_rx
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to receive response: {}", e)))??;

    serde_json::to_value(outcome).map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Validates the envelope in order (JSON, `type`, session, `user_id`) and
/// hands it to exactly one executor.
async fn route_action(
    state: &AppState,
    body: &[u8],
    request_id: &str,
) -> Result<Value, ServiceError> {
    let payload = ActionPayload::from_slice(body)
        .map_err(|_| ServiceError::BadRequest("Invalid JSON payload.".to_string()))?;

    let Some(kind) = payload.action_type() else {
        return Err(ServiceError::BadRequest(
            "Missing \"type\" field in the request body.".to_string(),
        ));
    };

    let now_ms = state.clock.now().timestamp_millis();
    let verified = payload
        .init_data()
        .map(|init_data| state.verifier.verify(init_data, now_ms))
        .unwrap_or(false);
    if !verified {
        return Err(ServiceError::Unauthorized);
    }

    let action = kind.parse::<ActionType>().ok();
    let needs_user = action.map_or(true, |action| action.requires_user_id());
    let user_id = match payload.id_field("user_id") {
        IdField::Id(id) => Some(id),
        IdField::Invalid if needs_user => {
            return Err(ServiceError::BadRequest(
                "Invalid user_id in the request body.".to_string(),
            ))
        }
        IdField::Missing if needs_user => {
            return Err(ServiceError::BadRequest(
                "Missing user_id in the request body.".to_string(),
            ))
        }
        _ => None,
    };

    let Some(action) = action else {
        return Err(ServiceError::BadRequest(format!(
            "Unknown action type: {}",
            kind
        )));
    };
    let require_user = || {
        user_id.ok_or_else(|| {
            ServiceError::BadRequest("Missing user_id in the request body.".to_string())
        })
    };

    log::info!("[{}] {} for user {:?}", request_id, action, user_id);

    match action {
        ActionType::GetUserData => {
            let user_id = require_user()?;
            dispatch(state, |response| RewardRequest::GetUserData { user_id, response }).await
        }
        ActionType::Register => {
            let user_id = require_user()?;
            let ref_by = payload.id_field("ref_by").id();
            dispatch(state, |response| RewardRequest::Register {
                user_id,
                ref_by,
                response,
            })
            .await
        }
        ActionType::WatchAd => {
            let user_id = require_user()?;
            dispatch(state, |response| RewardRequest::WatchAd { user_id, response }).await
        }
        ActionType::Commission => {
            let referrer_id = payload.id_field("referrer_id").id();
            let referee_id = payload.id_field("referee_id").id();
            dispatch(state, |response| RewardRequest::Commission {
                referrer_id,
                referee_id,
                response,
            })
            .await
        }
        ActionType::Spin => {
            let user_id = require_user()?;
            dispatch(state, |response| RewardRequest::Spin { user_id, response }).await
        }
        ActionType::SpinResult => {
            let user_id = require_user()?;
            dispatch(state, |response| RewardRequest::SpinResult { user_id, response }).await
        }
        ActionType::Withdraw => {
            let user_id = require_user()?;
            let binance_id = payload.str_field("binanceId");
            let amount = payload.get("amount").cloned();
            dispatch(state, |response| RewardRequest::Withdraw {
                user_id,
                binance_id,
                amount,
                response,
            })
            .await
        }
    }
}
