//! Admin API for credential management
//!
//! Every endpoint requires the operator bearer token; without it requests
//! are rejected with 401 before reaching any handler. Secrets never appear
//! in responses — credential views carry a masked rendering only.
//!
//! Endpoints:
//! - GET    /admin/credentials              — list credentials (optional ?provider= filter)
//! - POST   /admin/credentials              — add a credential
//! - PATCH  /admin/credentials/{id}         — update active/priority/daily_limit
//! - DELETE /admin/credentials/{id}         — remove a credential
//! - POST   /admin/credentials/{id}/test    — probe the provider with this one key
//! - POST   /admin/providers/{name}/test    — probe via the full fallback path
//! - POST   /admin/reactivate               — run a reactivation sweep now
//! - GET    /admin/pool                     — pool health summary

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Secret, mask_secret};
use scrape_credentials::{CallResult, Credential, CredentialUpdate, epoch_day, now_millis};
use scrape_pool::{CallError, Pool, classify_status, reactivate_eligible};

use crate::config::ProviderConfig;
use crate::metrics;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    pool: Arc<Pool>,
    providers: Arc<HashMap<String, ProviderConfig>>,
    http_client: reqwest::Client,
    operator_token: Arc<Secret<String>>,
    cooldown: Duration,
}

impl AdminState {
    pub fn new(
        pool: Arc<Pool>,
        providers: Vec<ProviderConfig>,
        http_client: reqwest::Client,
        operator_token: Secret<String>,
        cooldown: Duration,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            pool,
            providers: Arc::new(providers),
            http_client,
            operator_token: Arc::new(operator_token),
            cooldown,
        }
    }
}

/// Build the admin axum router with all credential management endpoints.
///
/// The token check is a layer over the whole router, so any new route added
/// here is protected by default.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/credentials",
            get(list_credentials).post(create_credential),
        )
        .route(
            "/admin/credentials/{id}",
            patch(update_credential).delete(delete_credential),
        )
        .route("/admin/credentials/{id}/test", post(test_credential))
        .route("/admin/providers/{name}/test", post(test_provider))
        .route("/admin/reactivate", post(reactivate_now))
        .route("/admin/pool", get(pool_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_operator,
        ))
        .with_state(state)
}

/// Reject any request without the operator bearer token.
async fn require_operator(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let authorized = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.operator_token.expose().as_str());

    if !authorized {
        warn!(path = %request.uri().path(), "admin request rejected: missing or invalid token");
        metrics::record_admin_request(401, &method);
        return json_response(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "missing or invalid operator token" }),
        );
    }

    let response = next.run(request).await;
    metrics::record_admin_request(response.status().as_u16(), &method);
    response
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Operator-facing rendering of a credential. The secret is masked and the
/// daily counter is shown as of today (the lazy reset applied for display).
#[derive(Serialize)]
struct CredentialView {
    id: String,
    provider: String,
    secret: String,
    active: bool,
    priority: i32,
    daily_limit: Option<u32>,
    daily_usage: u32,
    usage_count: u64,
    last_used_at: Option<u64>,
    last_result: Option<CallResult>,
    deactivated_at: Option<u64>,
    created_at: u64,
}

impl From<Credential> for CredentialView {
    fn from(c: Credential) -> Self {
        let today = epoch_day(now_millis());
        Self {
            secret: mask_secret(&c.secret),
            daily_usage: c.effective_daily_usage(today),
            id: c.id,
            provider: c.provider,
            active: c.active,
            priority: c.priority,
            daily_limit: c.daily_limit,
            usage_count: c.usage_count,
            last_used_at: c.last_used_at,
            last_result: c.last_result,
            deactivated_at: c.deactivated_at,
            created_at: c.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ListQuery {
    provider: Option<String>,
}

/// GET /admin/credentials — list credentials, optionally for one provider.
async fn list_credentials(
    State(state): State<AdminState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let credentials = state.pool.store().list().await;
    let views: Vec<CredentialView> = credentials
        .into_iter()
        .filter(|c| query.provider.as_deref().is_none_or(|p| c.provider == p))
        .map(CredentialView::from)
        .collect();
    let count = views.len();

    json_response(
        StatusCode::OK,
        serde_json::json!({ "credentials": views, "count": count }),
    )
}

#[derive(Deserialize)]
struct CreateRequest {
    provider: String,
    secret: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    daily_limit: Option<u32>,
}

/// POST /admin/credentials — add a key to a provider's pool.
///
/// New keys enter active with zeroed counters and are immediately eligible
/// for selection.
async fn create_credential(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<CreateRequest>,
) -> Response {
    if body.provider.trim().is_empty() || body.secret.trim().is_empty() {
        return json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({ "error": "provider and secret must be non-empty" }),
        );
    }

    let id = format!("cred_{}", uuid::Uuid::new_v4().as_simple());
    let credential = Credential::new(
        id.clone(),
        body.provider.trim().to_string(),
        body.secret,
        body.priority,
        body.daily_limit,
    );
    let view = CredentialView::from(credential.clone());

    match state.pool.store().insert(credential).await {
        Ok(()) => {
            info!(credential_id = %id, provider = %view.provider, "credential added");
            json_response(StatusCode::CREATED, serde_json::json!({ "credential": view }))
        }
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

#[derive(Deserialize)]
struct UpdateRequest {
    active: Option<bool>,
    priority: Option<i32>,
    daily_limit: Option<u32>,
    /// Remove the daily limit entirely. Mutually exclusive with `daily_limit`.
    #[serde(default)]
    clear_daily_limit: bool,
}

/// PATCH /admin/credentials/{id} — update mutable fields.
///
/// Reactivating a key this way clears its `deactivated_at`, same as the
/// sweeper would.
async fn update_credential(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    axum::Json(body): axum::Json<UpdateRequest>,
) -> Response {
    if body.clear_daily_limit && body.daily_limit.is_some() {
        return json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({ "error": "daily_limit and clear_daily_limit are mutually exclusive" }),
        );
    }

    let update = CredentialUpdate {
        active: body.active,
        priority: body.priority,
        daily_limit: body.daily_limit,
        clear_daily_limit: body.clear_daily_limit,
    };

    match state.pool.store().update(&id, update).await {
        Ok(credential) => {
            info!(credential_id = %id, "credential updated");
            json_response(
                StatusCode::OK,
                serde_json::json!({ "credential": CredentialView::from(credential) }),
            )
        }
        Err(scrape_credentials::Error::NotFound(_)) => json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("credential not found: {id}") }),
        ),
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

/// DELETE /admin/credentials/{id} — remove a key permanently.
async fn delete_credential(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.pool.store().remove(&id).await {
        Ok(Some(_)) => {
            info!(credential_id = %id, "credential removed");
            json_response(
                StatusCode::OK,
                serde_json::json!({ "id": id, "status": "removed" }),
            )
        }
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("credential not found: {id}") }),
        ),
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

/// POST /admin/credentials/{id}/test — make one real probe call with this key.
///
/// The outcome is fed through the same recorder as production traffic, so a
/// probe that hits an auth or quota failure retires the key exactly as a
/// production call would. The endpoint itself returns 200 whenever the probe
/// ran; the probe's verdict is in the body.
async fn test_credential(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    let Some(credential) = state.pool.store().get(&id).await else {
        return json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("credential not found: {id}") }),
        );
    };

    let Some(provider) = state.providers.get(&credential.provider) else {
        return json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({
                "error": format!("no test endpoint configured for provider '{}'", credential.provider)
            }),
        );
    };

    let result = state
        .http_client
        .get(&provider.test_url)
        .header(provider.secret_header.as_str(), credential.secret.clone())
        .timeout(state.pool.call_timeout())
        .send()
        .await;

    let verdict = match result {
        Ok(response) if response.status().is_success() => {
            state.pool.record_success(&id).await;
            serde_json::json!({
                "credential_id": id,
                "outcome": "success",
                "status": response.status().as_u16(),
            })
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let kind = classify_status(status);
            // A single manual probe never retires a key for a server fault;
            // transient upstream trouble is exactly what operators probe for.
            let terminal = kind != scrape_pool::FailureKind::Server;
            state.pool.record_failure(&id, kind, terminal).await;
            serde_json::json!({
                "credential_id": id,
                "outcome": kind.label(),
                "status": status,
                "deactivated": terminal,
            })
        }
        Err(e) => {
            let error = CallError::from_transport(&e);
            state
                .pool
                .record_failure(&id, error.kind, false)
                .await;
            serde_json::json!({
                "credential_id": id,
                "outcome": error.kind.label(),
                "error": error.message,
                "deactivated": false,
            })
        }
    };

    json_response(StatusCode::OK, verdict)
}

/// POST /admin/providers/{name}/test — probe a provider through the full
/// fallback path, exactly as a production call would run.
async fn test_provider(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    let Some(provider) = state.providers.get(&name).cloned() else {
        return json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("unknown provider: {name}") }),
        );
    };

    let client = state.http_client.clone();
    let result = state
        .pool
        .call_with_fallback(&name, move |secret| {
            let client = client.clone();
            let provider = provider.clone();
            async move {
                let response = client
                    .get(&provider.test_url)
                    .header(provider.secret_header.as_str(), secret)
                    .send()
                    .await
                    .map_err(|e| CallError::from_transport(&e))?;
                let status = response.status();
                if status.is_success() {
                    Ok(status.as_u16())
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(CallError::from_status(status.as_u16(), &body))
                }
            }
        })
        .await;

    match result {
        Ok(outcome) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "provider": name,
                "credential_id": outcome.credential_id,
                "attempts": outcome.attempts,
                "status": outcome.payload,
            }),
        ),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "provider": name,
                "error": "temporarily_unavailable",
                "detail": e.to_string(),
                "attempts": e.attempts(),
            }),
        ),
    }
}

#[derive(Deserialize, Default)]
struct ReactivateRequest {
    /// Override the configured cooldown for this one sweep.
    cooldown_days: Option<u64>,
}

/// POST /admin/reactivate — run a reactivation sweep immediately.
///
/// Same operation the background sweeper runs on its interval; here an
/// operator triggers it on demand, optionally with a shorter cooldown.
async fn reactivate_now(
    State(state): State<AdminState>,
    body: Option<axum::Json<ReactivateRequest>>,
) -> Response {
    let request = body.map(|axum::Json(b)| b).unwrap_or_default();
    let cooldown = request
        .cooldown_days
        .map(|days| Duration::from_secs(days * 24 * 3600))
        .unwrap_or(state.cooldown);

    match reactivate_eligible(state.pool.store(), cooldown).await {
        Ok(reactivated) => {
            let count = reactivated.len();
            info!(count, "manual reactivation sweep completed");
            json_response(
                StatusCode::OK,
                serde_json::json!({ "reactivated": reactivated, "count": count }),
            )
        }
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

/// GET /admin/pool — per-provider pool health summary.
async fn pool_status(State(state): State<AdminState>) -> Response {
    json_response(StatusCode::OK, state.pool.health().await)
}
