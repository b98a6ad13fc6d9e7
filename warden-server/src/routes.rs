use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::debug;
use warden_core::TaskContext;
use warden_core::model::BrokerIdentity;

use crate::wiring::Runtime;

/// Header carrying the identity the broker authenticated the caller as.
pub const BROKER_IDENTITY_HEADER: &str = "x-broker-identity";

pub fn router(runtime: Runtime) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{operation}", post(invoke_task))
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

async fn healthz(State(runtime): State<Runtime>) -> Json<Value> {
    Json(json!({ "status": "ok", "mode": runtime.mode.to_string() }))
}

async fn list_tasks(State(runtime): State<Runtime>) -> Json<Vec<&'static str>> {
    Json(runtime.tasks.operations())
}

async fn invoke_task(
    State(runtime): State<Runtime>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(caller) = headers
        .get(BROKER_IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return rejection(
            StatusCode::UNAUTHORIZED,
            format!("missing {BROKER_IDENTITY_HEADER} header"),
        );
    };

    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(args) => args,
            Err(err) => {
                return rejection(StatusCode::BAD_REQUEST, format!("invalid JSON body: {err}"));
            }
        }
    };

    debug!(%operation, caller, "task received");
    let status = if runtime.tasks.contains(&operation) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let ctx = TaskContext::new(BrokerIdentity::new(caller));
    let envelope = runtime.tasks.invoke(&operation, &ctx, args).await;
    (status, Json(envelope)).into_response()
}

fn rejection(status: StatusCode, message: String) -> Response {
    (status, Json(json!([-1, message]))).into_response()
}
