use serde::{Deserialize, Serialize};

/// Host and gateway facts shown on the panel's status page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub panel_version: String,
    pub os: String,
    pub platform: String,
    pub arch: String,
    pub hostname: String,
    pub cpus: usize,
    /// `None` when the gateway binary is not installed.
    pub gateway_version: Option<String>,
    pub gateway_uptime_seconds: Option<i64>,
}

/// Everything the status page shows in one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelOverview {
    pub gateway: crate::gateway::GatewaySnapshot,
    pub service: crate::gateway::ServiceStatus,
    pub model: ModelSummary,
    pub providers: usize,
    pub channels: Vec<String>,
    pub system: SystemInfo,
    pub config_exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub primary: Option<String>,
    pub fallbacks: Vec<String>,
}
