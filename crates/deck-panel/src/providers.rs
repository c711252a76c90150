//! Structured edits of providers, the model selection and channels.
//!
//! Each function mutates a document in place and leaves it untouched when
//! it returns an error. Persisting is the caller's job (see
//! `ConfigStore::update`).

use serde_json::Map;

use deck_types::config::{
    is_valid_provider_id, provider_of, ChannelKind, DiscordChannel, GatewayDocument, ModelDescriptor,
    ProviderConfig, TelegramChannel,
};
use deck_types::edit::{ChannelDraft, ProviderDraft};

use crate::error::ConfigError;

const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;
const DEFAULT_MAX_TOKENS: u64 = 32_768;

/// Add a provider. With `set_primary`, its model becomes the primary and
/// the previous primary moves to the front of the fallbacks.
pub fn add_provider(doc: &mut GatewayDocument, draft: &ProviderDraft) -> Result<(), ConfigError> {
    if !is_valid_provider_id(&draft.id) {
        return Err(ConfigError::InvalidProviderId(draft.id.clone()));
    }
    if draft.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("Base URL is required".into()));
    }
    if draft.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("API key is required".into()));
    }
    if doc.providers().is_some_and(|p| p.contains_key(&draft.id)) {
        return Err(ConfigError::DuplicateProvider(draft.id.clone()));
    }

    let model_id = draft.model_id.as_deref().map(str::trim).filter(|m| !m.is_empty());
    if draft.set_primary && model_id.is_none() {
        return Err(ConfigError::ModelRequired(draft.id.clone()));
    }

    let mut provider = ProviderConfig::new(
        draft.base_url.trim(),
        draft.api_key.trim(),
        draft.api_format.clone(),
    );
    if !provider.api.discovers_models() {
        if let Some(id) = model_id {
            provider.models.push(ModelDescriptor {
                id: id.to_string(),
                name: Some(id.to_string()),
                reasoning: Some(true),
                input: Some(vec!["text".to_string(), "image".to_string()]),
                context_window: Some(DEFAULT_CONTEXT_WINDOW),
                max_tokens: Some(DEFAULT_MAX_TOKENS),
                ..Default::default()
            });
        }
    }
    doc.providers_mut().insert(draft.id.clone(), provider);

    if let (true, Some(id)) = (draft.set_primary, model_id) {
        promote(doc, format!("{}/{id}", draft.id));
    }
    Ok(())
}

/// Remove a provider and every reference to it. If the primary pointed at
/// it, the first remaining fallback is promoted.
pub fn delete_provider(doc: &mut GatewayDocument, id: &str) -> Result<(), ConfigError> {
    let removed = doc
        .models
        .as_mut()
        .and_then(|m| m.providers.remove(id));
    if removed.is_none() {
        return Err(ConfigError::UnknownProvider(id.to_string()));
    }

    if let Some(selection) = doc
        .agents
        .as_mut()
        .and_then(|a| a.defaults.as_mut())
        .and_then(|d| d.model.as_mut())
    {
        selection.fallbacks.retain(|f| provider_of(f) != Some(id));
        if selection.primary.as_deref().and_then(provider_of) == Some(id) {
            selection.primary = if selection.fallbacks.is_empty() {
                None
            } else {
                Some(selection.fallbacks.remove(0))
            };
        }
    }
    Ok(())
}

/// Make `<id>/<model>` the primary. `model_id` defaults to the provider's
/// first declared model, and must be one of its declared models unless the
/// provider discovers them at runtime. Returns the new primary reference.
pub fn set_primary(
    doc: &mut GatewayDocument,
    id: &str,
    model_id: Option<&str>,
) -> Result<String, ConfigError> {
    let provider = doc
        .providers()
        .and_then(|p| p.get(id))
        .ok_or_else(|| ConfigError::UnknownProvider(id.to_string()))?;
    if !provider.is_routable() {
        return Err(ConfigError::ModelRequired(id.to_string()));
    }

    let model = model_id
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| provider.models.first().map(|m| m.id.clone()))
        .ok_or_else(|| ConfigError::ModelRequired(id.to_string()))?;
    if !provider.api.discovers_models() && !provider.models.iter().any(|m| m.id == model) {
        return Err(ConfigError::UnknownModel {
            provider: id.to_string(),
            model,
        });
    }

    let reference = format!("{id}/{model}");
    promote(doc, reference.clone());
    Ok(reference)
}

/// New primary; the old one (if different) goes to the front of the
/// fallbacks, and the new one is removed from them.
fn promote(doc: &mut GatewayDocument, reference: String) {
    let selection = doc.model_selection_mut();
    selection.fallbacks.retain(|f| *f != reference);
    if let Some(old) = selection.primary.take() {
        if old != reference {
            selection.fallbacks.retain(|f| *f != old);
            selection.fallbacks.insert(0, old);
        }
    }
    selection.primary = Some(reference);
}

pub fn add_channel(doc: &mut GatewayDocument, draft: &ChannelDraft) -> Result<(), ConfigError> {
    if doc.has_channel(draft.kind) {
        return Err(ConfigError::ChannelExists(draft.kind.label()));
    }
    let token = draft.token.trim();
    if token.is_empty() {
        return Err(ConfigError::Invalid(format!("{} token is required", draft.kind.label())));
    }
    match draft.kind {
        ChannelKind::Telegram => {
            doc.telegram = Some(TelegramChannel {
                token: token.to_string(),
                allowed_users: draft
                    .allowed_users
                    .iter()
                    .map(|u| u.trim())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect(),
                extra: Map::new(),
            });
        }
        ChannelKind::Discord => {
            doc.discord = Some(DiscordChannel {
                token: token.to_string(),
                extra: Map::new(),
            });
        }
    }
    Ok(())
}

/// Returns whether the channel was configured.
pub fn delete_channel(doc: &mut GatewayDocument, kind: ChannelKind) -> bool {
    match kind {
        ChannelKind::Telegram => doc.telegram.take().is_some(),
        ChannelKind::Discord => doc.discord.take().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_types::config::ApiFormat;

    fn draft(id: &str, api: ApiFormat, model: Option<&str>, set_primary: bool) -> ProviderDraft {
        ProviderDraft {
            id: id.to_string(),
            api_format: api,
            base_url: format!("https://{id}.example"),
            api_key: "key".to_string(),
            model_id: model.map(str::to_string),
            set_primary,
        }
    }

    fn doc_with(primary: &str, fallbacks: &[&str], providers: &[&str]) -> GatewayDocument {
        let mut doc = GatewayDocument::default();
        for id in providers {
            let mut p = ProviderConfig::new("https://x", "k", ApiFormat::OpenaiChat);
            p.models.push(ModelDescriptor {
                id: "m1".into(),
                ..Default::default()
            });
            doc.providers_mut().insert(id.to_string(), p);
        }
        let sel = doc.model_selection_mut();
        sel.primary = Some(primary.to_string());
        sel.fallbacks = fallbacks.iter().map(|s| s.to_string()).collect();
        doc
    }

    #[test]
    fn anthropic_provider_as_primary() {
        let mut doc = doc_with("openai/gpt-5", &[], &[]);
        add_provider(
            &mut doc,
            &draft("acme", ApiFormat::AnthropicMessages, Some("claude-opus-4-6"), true),
        )
        .unwrap();

        let acme = &doc.providers().unwrap()["acme"];
        assert!(acme.models.is_empty());
        assert_eq!(doc.primary_model(), Some("acme/claude-opus-4-6"));
        assert_eq!(doc.fallback_models(), ["openai/gpt-5"]);
    }

    #[test]
    fn other_formats_get_one_declared_model() {
        let mut doc = GatewayDocument::default();
        add_provider(&mut doc, &draft("relay", ApiFormat::OpenaiChat, Some("gpt-5"), false)).unwrap();
        let model = &doc.providers().unwrap()["relay"].models[0];
        assert_eq!(model.id, "gpt-5");
        assert_eq!(model.reasoning, Some(true));
        assert_eq!(model.context_window, Some(128_000));
        assert_eq!(doc.primary_model(), None);
    }

    #[test]
    fn add_provider_rejects_bad_input() {
        let mut doc = doc_with("relay/m1", &[], &["relay"]);
        let before = doc.clone();

        let dup = add_provider(&mut doc, &draft("relay", ApiFormat::OpenaiChat, Some("x"), false));
        assert!(matches!(dup, Err(ConfigError::DuplicateProvider(_))));

        let bad = add_provider(&mut doc, &draft("a/b", ApiFormat::OpenaiChat, Some("x"), false));
        assert!(matches!(bad, Err(ConfigError::InvalidProviderId(_))));

        let mut no_key = draft("new", ApiFormat::OpenaiChat, Some("x"), false);
        no_key.api_key = "  ".into();
        assert!(add_provider(&mut doc, &no_key).is_err());

        let no_model = add_provider(&mut doc, &draft("new", ApiFormat::AnthropicMessages, None, true));
        assert!(matches!(no_model, Err(ConfigError::ModelRequired(_))));

        assert_eq!(doc, before);
    }

    #[test]
    fn delete_promotes_first_remaining_fallback() {
        let mut doc = doc_with("a/m1", &["b/m1", "c/m1"], &["a", "b", "c"]);
        delete_provider(&mut doc, "a").unwrap();
        assert_eq!(doc.primary_model(), Some("b/m1"));
        assert_eq!(doc.fallback_models(), ["c/m1"]);
        assert!(!doc.providers().unwrap().contains_key("a"));
    }

    #[test]
    fn delete_skips_fallbacks_of_the_same_provider() {
        let mut doc = doc_with("a/m1", &["a/m2", "b/m1"], &["a", "b"]);
        delete_provider(&mut doc, "a").unwrap();
        assert_eq!(doc.primary_model(), Some("b/m1"));
        assert!(doc.fallback_models().is_empty());
    }

    #[test]
    fn delete_last_reference_clears_primary() {
        let mut doc = doc_with("a/m1", &[], &["a"]);
        delete_provider(&mut doc, "a").unwrap();
        assert_eq!(doc.primary_model(), None);
    }

    #[test]
    fn delete_leaves_official_references_alone() {
        let mut doc = doc_with("anthropic/claude-opus-4-6", &["a/m1"], &["a"]);
        delete_provider(&mut doc, "a").unwrap();
        assert_eq!(doc.primary_model(), Some("anthropic/claude-opus-4-6"));
        assert!(doc.fallback_models().is_empty());
    }

    #[test]
    fn delete_unknown_provider_fails() {
        let mut doc = GatewayDocument::default();
        assert!(matches!(
            delete_provider(&mut doc, "ghost"),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn set_primary_reorders_without_duplicates() {
        let mut doc = doc_with("a/m1", &["b/m1", "c/m1"], &["a", "b", "c"]);
        let r = set_primary(&mut doc, "c", None).unwrap();
        assert_eq!(r, "c/m1");
        assert_eq!(doc.primary_model(), Some("c/m1"));
        assert_eq!(doc.fallback_models(), ["a/m1", "b/m1"]);

        // setting the current primary again changes nothing
        set_primary(&mut doc, "c", Some("m1")).unwrap();
        assert_eq!(doc.fallback_models(), ["a/m1", "b/m1"]);
    }

    #[test]
    fn set_primary_needs_a_model() {
        let mut doc = GatewayDocument::default();
        doc.providers_mut().insert(
            "acme".into(),
            ProviderConfig::new("https://x", "k", ApiFormat::AnthropicMessages),
        );
        assert!(matches!(
            set_primary(&mut doc, "acme", None),
            Err(ConfigError::ModelRequired(_))
        ));
        assert_eq!(set_primary(&mut doc, "acme", Some("claude-opus-4-6")).unwrap(), "acme/claude-opus-4-6");
        assert!(matches!(
            set_primary(&mut doc, "nope", Some("x")),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn set_primary_requires_a_declared_model() {
        let mut doc = doc_with("a/m1", &[], &["a"]);
        doc.providers_mut().insert(
            "relay".into(),
            ProviderConfig::new("https://x", "k", ApiFormat::OpenaiChat),
        );
        let before = doc.clone();

        assert!(matches!(
            set_primary(&mut doc, "relay", Some("ghost")),
            Err(ConfigError::ModelRequired(_))
        ));
        assert!(matches!(
            set_primary(&mut doc, "a", Some("ghost")),
            Err(ConfigError::UnknownModel { .. })
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn delete_matches_whole_provider_ids() {
        let mut doc = doc_with("ab/m1", &["a/m1"], &["a", "ab"]);
        delete_provider(&mut doc, "a").unwrap();
        assert_eq!(doc.primary_model(), Some("ab/m1"));
        assert!(doc.fallback_models().is_empty());
    }

    #[test]
    fn channels_add_and_delete() {
        let mut doc = GatewayDocument::default();
        let telegram = ChannelDraft {
            kind: ChannelKind::Telegram,
            token: "123:abc".into(),
            allowed_users: vec![" 42 ".into(), "".into()],
        };
        add_channel(&mut doc, &telegram).unwrap();
        assert_eq!(doc.telegram.as_ref().unwrap().allowed_users, vec!["42"]);
        assert!(matches!(
            add_channel(&mut doc, &telegram),
            Err(ConfigError::ChannelExists("Telegram"))
        ));

        assert!(delete_channel(&mut doc, ChannelKind::Telegram));
        assert!(!delete_channel(&mut doc, ChannelKind::Telegram));
        assert!(doc.telegram.is_none());
    }
}
