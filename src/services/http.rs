use std::sync::Arc;

use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{
    clock::Clock, rewards::RewardRequest, session::SessionVerifier, ServiceError,
    WithdrawalRejection,
};
use crate::models::envelope::ApiResponse;

mod actions;

#[derive(Clone)]
pub struct AppState {
    reward_channel: mpsc::Sender<RewardRequest>,
    verifier: SessionVerifier,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        reward_channel: mpsc::Sender<RewardRequest>,
        verifier: SessionVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reward_channel,
            verifier,
            clock,
        }
    }
}

pub fn status_code(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::Withdrawal(WithdrawalRejection::InvalidAmount) => StatusCode::BAD_REQUEST,
        ServiceError::Withdrawal(_) | ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        ServiceError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
        ServiceError::Upstream { .. } | ServiceError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reply(result: Result<Value, ServiceError>) -> (StatusCode, Json<ApiResponse>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => (status_code(&e), Json(ApiResponse::failure(e.to_string()))),
    }
}

async fn method_not_allowed(method: Method) -> impl IntoResponse {
    reply(Err(ServiceError::MethodNotAllowed(method.to_string())))
}

/// Preflight answered with the usual envelope. `CorsLayer` would reply with
/// an empty body, so the headers are set here.
async fn preflight() -> impl IntoResponse {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
        reply(Ok(json!({}))),
    )
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // The CORS layer only wraps what is registered before it, OPTIONS stays
    // with `preflight`.
    let action_routes = post(actions::handle_action)
        .fallback(method_not_allowed)
        .layer(cors)
        .options(preflight);

    Router::new()
        .route("/", action_routes.clone())
        .route("/api", action_routes)
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    reward_channel: mpsc::Sender<RewardRequest>,
    verifier: SessionVerifier,
    clock: Arc<dyn Clock>,
) -> Result<(), anyhow::Error> {
    let app = router(AppState::new(reward_channel, verifier, clock));

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::ledger::{LedgerMethod, MemoryLedger};
    use crate::services::{
        clock::FixedClock,
        rewards::{RewardPolicy, RewardRequestHandler, RewardService},
        session::tests::{sign, BOT_TOKEN},
        Service,
    };
    use axum::{body::Body, http::Request};
    use chrono::DateTime;
    use serde_json::json;
    use tower::ServiceExt;

    const NOW_SECS: i64 = 1_700_000_000;

    fn app() -> Router {
        app_on(Arc::new(MemoryLedger::new()))
    }

    fn app_on(ledger: Arc<MemoryLedger>) -> Router {
        let clock = Arc::new(FixedClock::at(
            DateTime::from_timestamp(NOW_SECS, 0).unwrap(),
        ));
        let handler = RewardRequestHandler::new(ledger, RewardPolicy::default(), clock.clone());
        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move {
            RewardService::new().run(handler, &mut rx).await;
        });

        router(AppState::new(
            tx,
            SessionVerifier::new(BOT_TOKEN.to_string(), 1_300_000),
            clock,
        ))
    }

    fn init_data() -> String {
        let auth_date = NOW_SECS.to_string();
        sign(
            &[("auth_date", auth_date.as_str()), ("user", r#"{"id":1001}"#)],
            BOT_TOKEN,
        )
    }

    async fn call(app: &Router, method: Method, body: &str) -> (StatusCode, Value, Option<String>) {
        let request = Request::builder()
            .method(method)
            .uri("/api")
            .header(header::ORIGIN, "https://web.telegram.org")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let allow_origin = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, json, allow_origin)
    }

    async fn post_action(app: &Router, body: Value) -> (StatusCode, Value) {
        let (status, json, _) = call(app, Method::POST, &body.to_string()).await;
        (status, json)
    }

    #[tokio::test]
    async fn non_post_methods_are_rejected() {
        let app = app();

        let (status, body, allow_origin) = call(&app, Method::GET, "").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(
            body["error"],
            json!("Method GET not allowed. Only POST is supported.")
        );
        assert_eq!(allow_origin.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn options_is_answered_with_cors_headers() {
        let app = app();

        let (status, body, allow_origin) = call(&app, Method::OPTIONS, "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "data": {}}));
        assert_eq!(allow_origin.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn preflight_keeps_the_json_envelope() {
        let app = app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "https://web.telegram.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"ok": true, "data": {}}));
    }

    #[tokio::test]
    async fn malformed_envelopes_are_rejected_before_dispatch() {
        let app = app();

        let (status, body, _) = call(&app, Method::POST, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Invalid JSON payload."));

        let (status, body) = post_action(&app, json!({"initData": init_data()})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Missing \"type\" field in the request body."));

        let (status, body) =
            post_action(&app, json!({"type": "register", "initData": init_data()})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Missing user_id in the request body."));
    }

    #[tokio::test]
    async fn bad_sessions_are_unauthorized() {
        let app = app();
        let forged = init_data().replace("1001", "1002");

        for envelope in [
            json!({"type": "register", "user_id": 1001}),
            json!({"type": "register", "user_id": 1001, "initData": forged}),
        ] {
            let (status, body) = post_action(&app, envelope).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                body["error"],
                json!("Invalid or expired initData. Security check failed.")
            );
        }
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let app = app();

        let (status, body) = post_action(
            &app,
            json!({"type": "refund", "user_id": 1001, "initData": init_data()}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Unknown action type: refund"));
    }

    #[tokio::test]
    async fn reward_flow_over_http() {
        let app = app();
        let envelope = |kind: &str| json!({"type": kind, "user_id": "1001", "initData": init_data()});

        let (status, body) = post_action(&app, envelope("register")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], json!("User registered or already exists."));

        let (status, body) = post_action(&app, envelope("watchAd")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["new_ads_count"], json!(1));

        let (status, body) = post_action(&app, envelope("watchAd")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["ok"], json!(false));

        let (status, body) = post_action(&app, envelope("spinResult")).await;
        assert_eq!(status, StatusCode::OK);
        let index = body["data"]["prize_index"].as_u64().unwrap();
        assert!(index < 5);

        let (status, body) = post_action(&app, envelope("getUserData")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ads_watched_today"], json!(1));
        assert_eq!(body["data"]["referrals_count"], json!(0));
    }

    #[tokio::test]
    async fn withdraw_failures_map_to_distinct_statuses() {
        let app = app();
        let withdraw = |amount: Value| {
            json!({
                "type": "withdraw",
                "user_id": 1001,
                "binanceId": "b-1",
                "amount": amount,
                "initData": init_data(),
            })
        };
        post_action(
            &app,
            json!({"type": "register", "user_id": 1001, "initData": init_data()}),
        )
        .await;

        let (status, _) = post_action(&app, withdraw(json!("500"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_action(&app, withdraw(json!(100))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], json!("Minimum withdrawal is 400 SHIB."));

        let (status, body) = post_action(&app, withdraw(json!(400))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], json!("Insufficient balance."));
    }

    #[tokio::test]
    async fn commission_needs_no_user_id() {
        let app = app();

        let (status, body) = post_action(
            &app,
            json!({
                "type": "commission",
                "referrer_id": 55,
                "referee_id": 1001,
                "initData": init_data(),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["message"],
            json!("Referrer not found, commission aborted.")
        );
    }

    #[tokio::test]
    async fn ledger_failures_surface_as_server_errors() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .fail_on("users", LedgerMethod::Get, "Supabase error: 503 Service Unavailable")
            .await;
        let app = app_on(ledger);

        let (status, body) = post_action(
            &app,
            json!({"type": "watchAd", "user_id": 1001, "initData": init_data()}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(
            body["error"],
            json!("WatchAd failed: Supabase error: 503 Service Unavailable")
        );
    }
}
