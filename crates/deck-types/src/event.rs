use serde::{Deserialize, Serialize};

use crate::gateway::GatewayStatus;

/// Supervisor → presentation layer. Published on the panel's event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PanelEvent {
    /// The gateway moved to a new lifecycle state.
    GatewayStatus { status: GatewayStatus },
    /// A raw chunk of combined stdout/stderr from the gateway.
    GatewayLog { chunk: String },
}

impl PanelEvent {
    /// Event name used on the wire (SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            Self::GatewayStatus { .. } => "gateway-status",
            Self::GatewayLog { .. } => "gateway-log",
        }
    }
}
