use serde::{Deserialize, Serialize};

use crate::config::{ApiFormat, ChannelKind};

/// A provider added from the structured editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDraft {
    pub id: String,
    #[serde(default)]
    pub api_format: ApiFormat,
    pub base_url: String,
    pub api_key: String,
    /// Declared model for non-Anthropic formats, and the model used when
    /// `set_primary` is requested.
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub set_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPrimaryRequest {
    /// Needed when the provider declares no models.
    #[serde(default)]
    pub model_id: Option<String>,
}

/// A channel added from the structured editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDraft {
    pub kind: ChannelKind,
    pub token: String,
    /// Telegram only.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}
