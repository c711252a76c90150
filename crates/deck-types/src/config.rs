use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default port the managed gateway listens on when the document omits it.
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;

/// The gateway's configuration document (`openclaw.json`).
///
/// Every section is optional because the raw editor can produce any subset.
/// Keys the typed model does not know about are kept in `extra` so that a
/// structured edit never drops hand-written settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<AgentsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordChannel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<AgentDefaults>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagents: Option<SubagentDefaults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    /// Per-model overrides; opaque to the panel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Primary model plus ordered fallbacks, each `"<providerId>/<modelId>"`
/// or a bare official reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelSelection {
    /// Every referenced model, primary first.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.primary
            .as_deref()
            .into_iter()
            .chain(self.fallbacks.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<GatewayAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `models.providers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_auth_mode")]
    pub auth: String,
    #[serde(default)]
    pub api: ApiFormat,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_header: bool,
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_auth_mode() -> String {
    "api-key".to_string()
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api: ApiFormat) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Some(api_key.into()),
            auth: default_auth_mode(),
            api,
            headers: BTreeMap::new(),
            auth_header: false,
            models: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Whether this provider can back a primary/fallback reference.
    /// Anthropic-style providers discover their models at runtime; every
    /// other format needs at least one declared model.
    pub fn is_routable(&self) -> bool {
        self.api.discovers_models() || !self.models.is_empty()
    }
}

/// A model declared on a provider. Fields are optional on disk so that
/// hand-written entries survive a round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<ModelCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

/// Wire format a provider speaks. Unknown tags from hand-edited documents
/// are carried through as `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApiFormat {
    #[default]
    AnthropicMessages,
    OpenaiResponses,
    OpenaiChat,
    Gemini,
    Zhipu,
    Other(String),
}

impl ApiFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::OpenaiResponses => "openai-responses",
            Self::OpenaiChat => "openai-chat",
            Self::Gemini => "gemini",
            Self::Zhipu => "zhipu",
            Self::Other(tag) => tag,
        }
    }

    /// Anthropic-style providers leave their model list empty; the gateway
    /// discovers the models itself.
    pub fn discovers_models(&self) -> bool {
        matches!(self, Self::AnthropicMessages)
    }
}

impl From<String> for ApiFormat {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "anthropic-messages" => Self::AnthropicMessages,
            "openai-responses" => Self::OpenaiResponses,
            "openai-chat" => Self::OpenaiChat,
            "gemini" => Self::Gemini,
            "zhipu" => Self::Zhipu,
            _ => Self::Other(tag),
        }
    }
}

impl From<ApiFormat> for String {
    fn from(format: ApiFormat) -> Self {
        match format {
            ApiFormat::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ApiFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannel {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordChannel {
    #[serde(default)]
    pub token: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The channel sub-documents the panel knows how to edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Discord,
}

impl ChannelKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Telegram => "Telegram",
            Self::Discord => "Discord",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "discord" => Ok(Self::Discord),
            other => Err(format!("Unknown channel: {other}")),
        }
    }
}

impl GatewayDocument {
    pub fn model_selection(&self) -> Option<&ModelSelection> {
        self.agents.as_ref()?.defaults.as_ref()?.model.as_ref()
    }

    /// Mutable access to `agents.defaults.model`, creating the path if needed.
    pub fn model_selection_mut(&mut self) -> &mut ModelSelection {
        self.agents
            .get_or_insert_with(Default::default)
            .defaults
            .get_or_insert_with(Default::default)
            .model
            .get_or_insert_with(Default::default)
    }

    pub fn primary_model(&self) -> Option<&str> {
        self.model_selection()?.primary.as_deref()
    }

    pub fn fallback_models(&self) -> &[String] {
        self.model_selection()
            .map(|m| m.fallbacks.as_slice())
            .unwrap_or(&[])
    }

    pub fn providers(&self) -> Option<&BTreeMap<String, ProviderConfig>> {
        self.models.as_ref().map(|m| &m.providers)
    }

    /// Mutable access to `models.providers`, creating the section if needed.
    pub fn providers_mut(&mut self) -> &mut BTreeMap<String, ProviderConfig> {
        &mut self
            .models
            .get_or_insert_with(|| ModelsSection {
                mode: Some("merge".to_string()),
                ..Default::default()
            })
            .providers
    }

    pub fn provider_count(&self) -> usize {
        self.providers().map(BTreeMap::len).unwrap_or(0)
    }

    pub fn has_channel(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Telegram => self.telegram.is_some(),
            ChannelKind::Discord => self.discord.is_some(),
        }
    }

    /// Display names of the enabled channels. WebChat is built into the
    /// gateway and always listed.
    pub fn channel_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.telegram.is_some() {
            labels.push(ChannelKind::Telegram.label());
        }
        if self.discord.is_some() {
            labels.push(ChannelKind::Discord.label());
        }
        labels.push("WebChat");
        labels
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway
            .as_ref()
            .and_then(|g| g.port)
            .unwrap_or(DEFAULT_GATEWAY_PORT)
    }

    pub fn gateway_token(&self) -> Option<&str> {
        self.gateway.as_ref()?.auth.as_ref()?.token.as_deref()
    }
}

/// Provider id portion of a `"<providerId>/<modelId>"` reference.
pub fn provider_of(model_ref: &str) -> Option<&str> {
    model_ref.split_once('/').map(|(provider, _)| provider)
}

/// Valid provider ids are non-empty and contain only ASCII letters, digits
/// and hyphens.
pub fn is_valid_provider_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Environment-variable name → credential, persisted to the `.env` file.
pub type SecretMap = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_format_tags_roundtrip() {
        for tag in ["anthropic-messages", "openai-responses", "openai-chat", "gemini", "zhipu"] {
            let format: ApiFormat = tag.parse().unwrap();
            assert!(!matches!(format, ApiFormat::Other(_)));
            assert_eq!(String::from(format), tag);
        }
        let custom: ApiFormat = "google-generative-ai".parse().unwrap();
        assert_eq!(custom, ApiFormat::Other("google-generative-ai".into()));
        assert_eq!(custom.to_string(), "google-generative-ai");
    }

    #[test]
    fn unknown_keys_survive_roundtrip() {
        let raw = json!({
            "agents": { "defaults": { "model": { "primary": "a/b", "fallbacks": [] }, "thinking": "high" } },
            "models": { "mode": "merge", "providers": {
                "acme": { "baseUrl": "https://x", "api": "openai-chat", "models": [{ "id": "m1", "vision": true }] }
            }},
            "plugins": { "enabled": ["x"] }
        });
        let doc: GatewayDocument = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.extra["plugins"], raw["plugins"]);
        let defaults = doc.agents.as_ref().unwrap().defaults.as_ref().unwrap();
        assert_eq!(defaults.extra["thinking"], "high");
        let acme = &doc.providers().unwrap()["acme"];
        assert_eq!(acme.models[0].extra["vision"], true);

        let back = serde_json::to_value(&doc).unwrap();
        let reparsed: GatewayDocument = serde_json::from_value(back).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn null_primary_reads_as_none() {
        let doc: GatewayDocument = serde_json::from_value(json!({
            "agents": { "defaults": { "model": { "primary": null, "fallbacks": [] } } }
        }))
        .unwrap();
        assert_eq!(doc.primary_model(), None);
        assert!(doc.fallback_models().is_empty());
    }

    #[test]
    fn model_selection_mut_creates_path() {
        let mut doc = GatewayDocument::default();
        doc.model_selection_mut().primary = Some("acme/m1".into());
        assert_eq!(doc.primary_model(), Some("acme/m1"));
    }

    #[test]
    fn provider_id_pattern() {
        assert!(is_valid_provider_id("acme-relay-2"));
        assert!(!is_valid_provider_id(""));
        assert!(!is_valid_provider_id("acme/relay"));
        assert!(!is_valid_provider_id("acme relay"));
        assert!(!is_valid_provider_id("acme_relay"));
    }

    #[test]
    fn routable_providers() {
        let anthropic = ProviderConfig::new("https://x", "k", ApiFormat::AnthropicMessages);
        assert!(anthropic.is_routable());
        let mut openai = ProviderConfig::new("https://x", "k", ApiFormat::OpenaiChat);
        assert!(!openai.is_routable());
        openai.models.push(ModelDescriptor { id: "gpt".into(), ..Default::default() });
        assert!(openai.is_routable());
    }

    #[test]
    fn channel_labels_always_include_webchat() {
        let mut doc = GatewayDocument::default();
        assert_eq!(doc.channel_labels(), vec!["WebChat"]);
        doc.discord = Some(DiscordChannel { token: "t".into(), ..Default::default() });
        assert_eq!(doc.channel_labels(), vec!["Discord", "WebChat"]);
    }

    #[test]
    fn gateway_port_defaults() {
        let doc = GatewayDocument::default();
        assert_eq!(doc.gateway_port(), DEFAULT_GATEWAY_PORT);
        assert_eq!(doc.gateway_token(), None);
    }
}
