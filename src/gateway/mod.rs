//! Webhook gateway.
//!
//! Receives provider webhook callbacks over HTTP and feeds the raw JSON
//! payloads into the relay buffer. Handlers never touch the conversation
//! store directly; normalization and merging happen on the engine's
//! relay-drain loop.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::{UniboxError, UniboxResult};
use crate::providers::Provider;
use crate::relay::RelayBuffer;

type HmacSha256 = Hmac<Sha256>;

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

/// Per-provider webhook credentials derived from config.
#[derive(Clone)]
struct WebhookAuth {
    enabled: bool,
    /// Token echoed back during the subscription handshake.
    verify_token: String,
    /// HMAC secret for payload signatures. `None` disables the check.
    app_secret: Option<String>,
}

/// Shared state between the HTTP handlers and the relay buffer.
#[derive(Clone)]
pub struct GatewayState {
    relay: Arc<RelayBuffer>,
    hooks: Arc<HashMap<Provider, WebhookAuth>>,
}

impl GatewayState {
    pub fn from_config(config: &Config, relay: Arc<RelayBuffer>) -> Self {
        let mut hooks = HashMap::new();
        for provider in Provider::all() {
            let settings = config.providers.get(provider);
            hooks.insert(
                provider,
                WebhookAuth {
                    enabled: settings.enabled,
                    verify_token: settings.verify_token.clone(),
                    app_secret: if settings.app_secret.trim().is_empty() {
                        None
                    } else {
                        Some(settings.app_secret.clone())
                    },
                },
            );
        }
        Self {
            relay,
            hooks: Arc::new(hooks),
        }
    }
}

/// Build the gateway router.
fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(
            "/webhook/{provider}",
            get(verify_handler).post(ingest_handler),
        )
        .route("/health", get(health_handler))
        .with_state(state)
}

/// GET /health — health check endpoint.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// GET /webhook/{provider} — the Meta subscription handshake.
///
/// Echoes `hub.challenge` back when `hub.mode` is "subscribe" and
/// `hub.verify_token` matches the configured token.
async fn verify_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some((provider, hook)) = lookup_hook(&state, &name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    if mode == Some("subscribe")
        && !hook.verify_token.is_empty()
        && token == Some(hook.verify_token.as_str())
    {
        info!("{} webhook subscription verified", provider);
        let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("{} webhook verification failed (mode={:?})", provider, mode);
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /webhook/{provider} — receive a webhook event batch.
async fn ingest_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some((provider, hook)) = lookup_hook(&state, &name) else {
        debug!("webhook: no enabled provider at path {}", name);
        return StatusCode::NOT_FOUND.into_response();
    };

    if body.len() > WEBHOOK_MAX_BODY {
        warn!(
            "{} webhook: payload too large ({} bytes)",
            provider,
            body.len()
        );
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if let Some(secret) = &hook.app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("{} webhook: missing signature header", provider);
            return StatusCode::FORBIDDEN.into_response();
        };
        if !validate_webhook_signature(secret, signature, &body) {
            warn!("{} webhook: invalid signature", provider);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("{} webhook: invalid JSON payload: {}", provider, e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    debug!("{} webhook: queued payload ({} bytes)", provider, body.len());
    state.relay.push(provider, payload);
    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

/// Resolve a path segment to an enabled provider hook.
fn lookup_hook<'a>(state: &'a GatewayState, name: &str) -> Option<(Provider, &'a WebhookAuth)> {
    let provider = name.parse::<Provider>().ok()?;
    let hook = state.hooks.get(&provider)?;
    if !hook.enabled {
        debug!("webhook: {} is not enabled", provider);
        return None;
    }
    Some((provider, hook))
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let result = mac.finalize();
    let expected = hex::encode(result.into_bytes());

    // Support both raw hex and the "sha256=..." prefix Meta actually sends
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// Start the gateway server. Returns the serve task's join handle.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> UniboxResult<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| UniboxError::Config(format!("failed to bind {}: {}", addr, e)))?;
    info!("webhook gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("webhook gateway server error: {}", e);
        }
    });

    Ok(handle)
}
