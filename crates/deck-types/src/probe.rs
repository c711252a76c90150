use serde::{Deserialize, Serialize};

use crate::config::ApiFormat;

/// Parameters of a connectivity test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    #[serde(default)]
    pub base_url: String,
    pub api_key: String,
    pub api_format: ApiFormat,
}

/// Classification of a probe response. Derived from the HTTP status only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProbeOutcome {
    /// 200 or 201.
    Reachable,
    /// 400: the service answered and accepted the credential format, but
    /// rejected the minimal payload.
    ReachableWithCaveat { note: String },
    /// 401 or 403.
    CredentialRejected { status: u16 },
    /// Any other status; `body` is truncated.
    HttpError { status: u16, body: String },
    /// Connection failure or timeout.
    Network { message: String },
    /// The format tag has no probe shape.
    UnsupportedFormat { format: String },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reachable | Self::ReachableWithCaveat { .. })
    }

    /// Human-readable message for the failure cases.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Reachable | Self::ReachableWithCaveat { .. } => None,
            Self::CredentialRejected { status } => Some(format!(
                "Authentication failed (HTTP {status}); check the API key"
            )),
            Self::HttpError { status, body } => Some(format!("HTTP {status}: {body}")),
            Self::Network { message } => Some(format!("Connection failed: {message}")),
            Self::UnsupportedFormat { format } => Some(format!("Unknown API format: {format}")),
        }
    }
}
