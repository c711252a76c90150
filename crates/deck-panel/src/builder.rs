//! Wizard input → gateway document.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Map;

use deck_types::config::{
    is_valid_provider_id, AgentDefaults, AgentsSection, CompactionSettings, DiscordChannel,
    GatewayAuth, GatewayDocument, GatewaySection, ModelDescriptor, ModelSelection, ModelsSection,
    ProviderConfig, SecretMap, SubagentDefaults, TelegramChannel, DEFAULT_GATEWAY_PORT,
};
use deck_types::wizard::{
    ChannelChoice, GeneratedConfig, ModelChoice, ModelSpec, OfficialModel, ProxyModel, WizardInput,
};

use crate::error::ConfigError;

const TOKEN_BYTES: usize = 24;
const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;
const DEFAULT_MAX_TOKENS: u64 = 32_768;

/// A fresh gateway auth token: 24 random bytes from the OS, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Turns wizard answers into a complete document. Holds only the workspace
/// path to record; everything else comes from the input.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    workspace: String,
}

impl ConfigBuilder {
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn build(&self, input: &WizardInput) -> Result<GeneratedConfig, ConfigError> {
        self.build_with_token(input, generate_token())
    }

    /// Same as [`build`](Self::build) with a caller-chosen token.
    pub fn build_with_token(
        &self,
        input: &WizardInput,
        token: String,
    ) -> Result<GeneratedConfig, ConfigError> {
        let mut doc = self.skeleton(token);
        let mut env_vars = SecretMap::new();
        let mut references = Vec::new();

        for choice in &input.models {
            match choice {
                ModelChoice::Proxy(proxy) => {
                    if !is_valid_provider_id(&proxy.provider_id) {
                        return Err(ConfigError::InvalidProviderId(proxy.provider_id.clone()));
                    }
                    let providers = doc.providers_mut();
                    if providers.contains_key(&proxy.provider_id) {
                        return Err(ConfigError::DuplicateProvider(proxy.provider_id.clone()));
                    }
                    let (provider, reference) = proxy_provider(proxy);
                    providers.insert(proxy.provider_id.clone(), provider);
                    references.extend(reference);
                }
                ModelChoice::Official(OfficialModel {
                    model_ref,
                    env_key,
                    api_key,
                }) => {
                    if !env_key.is_empty() {
                        env_vars.insert(env_key.clone(), api_key.clone());
                    }
                    if !model_ref.is_empty() {
                        references.push(model_ref.clone());
                    }
                }
                ModelChoice::Unknown => {}
            }
        }

        let selection = doc.model_selection_mut();
        for reference in references {
            match &selection.primary {
                None => selection.primary = Some(reference),
                Some(primary) if *primary == reference => {}
                Some(_) => selection.fallbacks.push(reference),
            }
        }

        for channel in &input.channels {
            match channel {
                ChannelChoice::Telegram {
                    bot_token,
                    allowed_users,
                } => {
                    doc.telegram = Some(TelegramChannel {
                        token: bot_token.clone(),
                        allowed_users: allowed_users.clone(),
                        extra: Map::new(),
                    });
                }
                ChannelChoice::Discord { bot_token } => {
                    doc.discord = Some(DiscordChannel {
                        token: bot_token.clone(),
                        extra: Map::new(),
                    });
                }
                ChannelChoice::Unknown => {}
            }
        }

        Ok(GeneratedConfig {
            config: doc,
            env_vars,
        })
    }

    fn skeleton(&self, token: String) -> GatewayDocument {
        GatewayDocument {
            agents: Some(AgentsSection {
                defaults: Some(AgentDefaults {
                    max_concurrent: Some(4),
                    subagents: Some(SubagentDefaults {
                        max_concurrent: Some(8),
                        ..Default::default()
                    }),
                    compaction: Some(CompactionSettings {
                        mode: Some("safeguard".to_string()),
                        ..Default::default()
                    }),
                    workspace: Some(self.workspace.clone()),
                    model: Some(ModelSelection::default()),
                    models: Some(Map::new()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            gateway: Some(GatewaySection {
                mode: Some("local".to_string()),
                auth: Some(GatewayAuth {
                    mode: Some("token".to_string()),
                    token: Some(token),
                    ..Default::default()
                }),
                port: Some(DEFAULT_GATEWAY_PORT),
                bind: Some("loopback".to_string()),
                ..Default::default()
            }),
            models: Some(ModelsSection {
                mode: Some("merge".to_string()),
                providers: BTreeMap::new(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Provider entry for a proxy selection plus the reference it contributes,
/// if any.
fn proxy_provider(proxy: &ProxyModel) -> (ProviderConfig, Option<String>) {
    let api = proxy.api_format.clone().unwrap_or_default();
    let mut provider = ProviderConfig::new(&proxy.base_url, &proxy.api_key, api);
    if !provider.api.discovers_models() {
        provider.models = proxy.models.iter().map(normalize_model).collect();
    }

    let model_id = proxy
        .primary_model_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .or_else(|| proxy.models.first().map(|m| m.id.as_str()));
    let reference = model_id.map(|id| format!("{}/{id}", proxy.provider_id));
    (provider, reference)
}

fn normalize_model(spec: &ModelSpec) -> ModelDescriptor {
    ModelDescriptor {
        id: spec.id.clone(),
        name: Some(spec.name.clone().unwrap_or_else(|| spec.id.clone())),
        reasoning: Some(spec.reasoning.unwrap_or(false)),
        input: Some(
            spec.input
                .clone()
                .unwrap_or_else(|| vec!["text".to_string()]),
        ),
        cost: Some(spec.cost.unwrap_or_default()),
        context_window: Some(spec.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW)),
        max_tokens: Some(spec.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        extra: Map::new(),
    }
}
