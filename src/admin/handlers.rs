use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::address::ClientAddress;
use crate::admin::AdminState;
use crate::gateway::{evaluate, Decision};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub upstream: String,
    pub store: String,
}

#[derive(Serialize)]
pub struct PolicySnapshot {
    pub store: String,
    pub ttl_secs: u64,
    pub loaded: bool,
    pub fresh: bool,
    pub age_secs: Option<u64>,
    pub expires_in_secs: Option<u64>,
    pub rules: Vec<String>,
}

#[derive(Serialize)]
pub struct RefreshResult {
    pub refreshed: bool,
    pub rules: usize,
}

#[derive(Deserialize)]
pub struct CheckParams {
    pub ip: String,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub ip: String,
    pub normalized: String,
    pub decision: &'static str,
    pub rule: Option<String>,
}

/// `degraded` until a rule set has been loaded at least once.
pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let cache = state.gateway.cache();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if cache.snapshot().is_some() { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        upstream: state.gateway.forwarder().origin(),
        store: cache.store_description(),
    })
}

/// The cached rule set as requests currently see it. Never refreshes.
pub async fn get_policy(State(state): State<AdminState>) -> Json<PolicySnapshot> {
    let cache = state.gateway.cache();
    let snapshot = cache.snapshot();

    Json(PolicySnapshot {
        store: cache.store_description(),
        ttl_secs: cache.ttl().as_secs(),
        loaded: snapshot.is_some(),
        fresh: snapshot.as_ref().is_some_and(|s| s.is_fresh()),
        age_secs: snapshot.as_ref().map(|s| s.age().as_secs()),
        expires_in_secs: snapshot.as_ref().map(|s| s.expires_in().as_secs()),
        rules: snapshot.map(|s| s.rules().to_vec()).unwrap_or_default(),
    })
}

pub async fn refresh_policy(State(state): State<AdminState>) -> Response {
    match state.gateway.cache().force_refresh().await {
        Ok(rules) => {
            tracing::info!(rules = rules.len(), "Allow list refreshed by operator");
            Json(RefreshResult {
                refreshed: true,
                rules: rules.len(),
            })
            .into_response()
        }
        Err(e) => unavailable(e.to_string()),
    }
}

/// Evaluate an address against the current rules without forwarding anything.
pub async fn check_address(
    State(state): State<AdminState>,
    Query(params): Query<CheckParams>,
) -> Response {
    let Some(client) = ClientAddress::from_raw(&params.ip) else {
        let body = serde_json::json!({
            "error": "Bad Request",
            "message": "ip must not be empty",
        });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let rules = match state.gateway.cache().get().await {
        Ok(rules) => rules,
        Err(e) => return unavailable(e.to_string()),
    };

    let normalized = client.to_string();
    let (decision, rule) = match evaluate(client, &rules) {
        Decision::Allow { rule, .. } => ("allow", Some(rule)),
        Decision::Deny(_) => ("deny", None),
    };

    Json(CheckResult {
        ip: params.ip,
        normalized,
        decision,
        rule,
    })
    .into_response()
}

fn unavailable(message: String) -> Response {
    let body = serde_json::json!({
        "error": "Allowlist Unavailable",
        "message": message,
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}
