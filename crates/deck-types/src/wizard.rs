use serde::{Deserialize, Serialize};

use crate::config::{ApiFormat, GatewayDocument, ModelCost, SecretMap};

/// Everything the setup wizard collects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardInput {
    #[serde(default)]
    pub models: Vec<ModelChoice>,
    #[serde(default)]
    pub channels: Vec<ChannelChoice>,
}

/// One model selection. Order matters: the first becomes the primary model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelChoice {
    /// A third-party relay with its own base URL and key.
    Proxy(ProxyModel),
    /// A gateway-native provider; the key goes to the env file.
    Official(OfficialModel),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyModel {
    pub provider_id: String,
    #[serde(default)]
    pub api_format: Option<ApiFormat>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub primary_model_id: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialModel {
    /// Symbolic reference used verbatim, e.g. `anthropic/claude-opus-4-6`.
    pub model_ref: String,
    pub env_key: String,
    #[serde(default)]
    pub api_key: String,
}

/// A model declared in the wizard; missing fields get defaults when the
/// document is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reasoning: Option<bool>,
    #[serde(default)]
    pub input: Option<Vec<String>>,
    #[serde(default)]
    pub cost: Option<ModelCost>,
    #[serde(default)]
    pub context_window: Option<u64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelChoice {
    #[serde(rename_all = "camelCase")]
    Telegram {
        #[serde(default)]
        bot_token: String,
        #[serde(default)]
        allowed_users: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Discord {
        #[serde(default)]
        bot_token: String,
    },
    /// Channel types this panel does not know yet; skipped.
    #[serde(other)]
    Unknown,
}

/// What the builder produces: the document plus the env-file secrets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConfig {
    pub config: GatewayDocument,
    pub env_vars: SecretMap,
}
