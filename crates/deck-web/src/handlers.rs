//! Request handlers. Each one is a thin wrapper over a `PanelController`
//! method; success bodies carry `"success": true` next to the payload.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use deck_panel::PanelController;
use deck_types::config::{ChannelKind, GatewayDocument};
use deck_types::edit::{ChannelDraft, ProviderDraft, SetPrimaryRequest};
use deck_types::probe::{ProbeOutcome, ProbeRequest};
use deck_types::wizard::WizardInput;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

pub type Panel = State<Arc<PanelController>>;
pub type ApiResult = Result<Json<Value>, ApiError>;

const DEFAULT_LOG_LINES: usize = 200;
const MAX_LOG_LINES: usize = 5000;

fn ok(data: impl Serialize) -> ApiResult {
    let value = serde_json::to_value(data).map_err(|e| ApiError::internal(e.to_string()))?;
    let body = match value {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        Value::Null => json!({ "success": true }),
        other => json!({ "success": true, "data": other }),
    };
    Ok(Json(body))
}

pub async fn status(State(panel): Panel) -> ApiResult {
    ok(panel.overview().await)
}

// ─── Gateway lifecycle ────────────────────────────────────────────────────────

pub async fn start_gateway(State(panel): Panel) -> ApiResult {
    let readiness = panel.start_gateway().await?;
    ok(json!({ "readiness": readiness, "gateway": panel.gateway_snapshot() }))
}

pub async fn stop_gateway(State(panel): Panel) -> ApiResult {
    let was_running = panel.stop_gateway();
    ok(json!({ "wasRunning": was_running, "gateway": panel.gateway_snapshot() }))
}

pub async fn restart_gateway(State(panel): Panel) -> ApiResult {
    let readiness = panel.restart_gateway().await?;
    ok(json!({ "readiness": readiness, "gateway": panel.gateway_snapshot() }))
}

// ─── Configuration ────────────────────────────────────────────────────────────

pub async fn get_config(State(panel): Panel) -> ApiResult {
    ok(json!({ "exists": panel.config_exists(), "config": panel.get_config() }))
}

pub async fn save_config(State(panel): Panel, ApiJson(doc): ApiJson<GatewayDocument>) -> ApiResult {
    panel.save_config(&doc)?;
    ok(())
}

pub async fn read_config_raw(State(panel): Panel) -> ApiResult {
    let content = panel.read_config_raw()?;
    ok(json!({ "content": content }))
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub content: String,
}

pub async fn write_config_raw(State(panel): Panel, ApiJson(raw): ApiJson<RawConfig>) -> ApiResult {
    panel.write_config_raw(&raw.content)?;
    ok(())
}

/// Runs the wizard and persists the result. Secrets are written to the env
/// file and never echoed back.
pub async fn generate_config(State(panel): Panel, ApiJson(input): ApiJson<WizardInput>) -> ApiResult {
    let generated = panel.complete_wizard(&input)?;
    ok(json!({
        "config": generated.config,
        "secrets": generated.env_vars.keys().collect::<Vec<_>>(),
    }))
}

// ─── Providers and channels ───────────────────────────────────────────────────

pub async fn add_provider(State(panel): Panel, ApiJson(draft): ApiJson<ProviderDraft>) -> ApiResult {
    panel.add_provider(&draft)?;
    ok(json!({ "config": panel.get_config() }))
}

pub async fn delete_provider(State(panel): Panel, Path(id): Path<String>) -> ApiResult {
    panel.delete_provider(&id)?;
    ok(json!({ "config": panel.get_config() }))
}

pub async fn set_primary(
    State(panel): Panel,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SetPrimaryRequest>,
) -> ApiResult {
    let primary = panel.set_primary(&id, request.model_id.as_deref())?;
    ok(json!({ "primary": primary }))
}

pub async fn add_channel(State(panel): Panel, ApiJson(draft): ApiJson<ChannelDraft>) -> ApiResult {
    panel.add_channel(&draft)?;
    ok(json!({ "config": panel.get_config() }))
}

pub async fn delete_channel(State(panel): Panel, Path(kind): Path<String>) -> ApiResult {
    let kind: ChannelKind = kind.parse().map_err(ApiError::bad_request)?;
    let removed = panel.delete_channel(kind)?;
    ok(json!({ "removed": removed }))
}

// ─── Diagnostics ──────────────────────────────────────────────────────────────

/// Probe results are always 200; `success` reflects the outcome.
pub async fn test_connection(
    State(panel): Panel,
    ApiJson(request): ApiJson<ProbeRequest>,
) -> ApiResult {
    let outcome = panel.test_connection(&request).await;
    let note = match &outcome {
        ProbeOutcome::ReachableWithCaveat { note } => Some(note.clone()),
        _ => None,
    };
    Ok(Json(json!({
        "success": outcome.is_success(),
        "error": outcome.error_message(),
        "note": note,
        "outcome": outcome,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

pub async fn logs(State(panel): Panel, ApiQuery(query): ApiQuery<LogsQuery>) -> ApiResult {
    let lines = query
        .lines
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LOG_LINES)
        .min(MAX_LOG_LINES);
    ok(panel.recent_logs(lines).await)
}

pub async fn endpoint(State(panel): Panel) -> ApiResult {
    ok(panel.gateway_endpoint())
}
