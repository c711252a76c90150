pub mod builder;
pub mod cmd;
pub mod config;
pub mod error;
pub mod events;
pub mod logs;
pub mod probe;
pub mod providers;
pub mod readiness;
pub mod supervisor;
pub mod system;

pub use builder::ConfigBuilder;
pub use config::{ConfigStore, PanelPaths};
pub use error::{ConfigError, PanelError, Result, SupervisorError};
pub use events::EventBus;
pub use probe::ConnectivityProbe;
pub use readiness::{MarkerPolicy, ReadinessPolicy, Verdict};
pub use supervisor::{GatewayCommand, Supervisor, SupervisorOptions};

use std::future::Future;

use tokio::sync::{broadcast, watch};
use tracing::info;

use deck_types::{
    config::{ChannelKind, GatewayDocument, SecretMap, DEFAULT_GATEWAY_PORT},
    edit::{ChannelDraft, ProviderDraft},
    event::PanelEvent,
    gateway::{GatewayEndpoint, GatewaySnapshot, GatewayStatus, LogExcerpt, Readiness, ServiceStatus},
    probe::{ProbeOutcome, ProbeRequest},
    system::{ModelSummary, PanelOverview, SystemInfo},
    wizard::{GeneratedConfig, WizardInput},
};

use logs::LogSources;

/// How to build a [`PanelController`].
#[derive(Debug, Clone)]
pub struct PanelOptions {
    pub paths: PanelPaths,
    pub supervisor: SupervisorOptions,
    /// CLI used for `--version` and `gateway status`.
    pub gateway_bin: String,
    /// systemd unit consulted first for logs; `None` skips the journal.
    pub journal_unit: Option<String>,
}

impl PanelOptions {
    pub fn new(paths: PanelPaths) -> Self {
        Self {
            paths,
            supervisor: SupervisorOptions::default(),
            gateway_bin: GatewayCommand::default_program().to_string(),
            journal_unit: Some(logs::DEFAULT_JOURNAL_UNIT.to_string()),
        }
    }

    /// Use `bin` both for launching the gateway and for status queries.
    pub fn with_gateway_bin(mut self, bin: impl Into<String>) -> Self {
        let bin = bin.into();
        self.supervisor.command = GatewayCommand::foreground(bin.clone());
        self.gateway_bin = bin;
        self
    }
}

/// The panel core. Every user action in either front end maps to one
/// method here; asynchronous status and output arrive on the event bus.
pub struct PanelController {
    store: ConfigStore,
    builder: ConfigBuilder,
    supervisor: Supervisor,
    probe: ConnectivityProbe,
    logs: LogSources,
    gateway_bin: String,
    event_bus: EventBus,
    closing: watch::Sender<bool>,
}

impl PanelController {
    /// Create a controller. This does NOT start the gateway.
    pub fn new(options: PanelOptions) -> Self {
        let event_bus = EventBus::new();
        let supervisor = Supervisor::new(options.supervisor, event_bus.clone());
        let workspace = options.paths.workspace().to_string_lossy().into_owned();
        let logs = LogSources::new(options.journal_unit, options.paths.log_files());

        Self {
            store: ConfigStore::new(options.paths),
            builder: ConfigBuilder::new(workspace),
            supervisor,
            probe: ConnectivityProbe::new(),
            logs,
            gateway_bin: options.gateway_bin,
            event_bus,
            closing: watch::Sender::new(false),
        }
    }

    /// Subscribe to gateway status transitions and output chunks.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PanelEvent> {
        self.event_bus.subscribe()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    /// Long-lived event consumers select on it so they can finish.
    pub fn closing(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    pub fn paths(&self) -> &PanelPaths {
        self.store.paths()
    }

    // ─── Configuration ────────────────────────────────────────────────────────

    /// The current document, `None` if missing or unreadable.
    pub fn get_config(&self) -> Option<GatewayDocument> {
        self.store.read()
    }

    pub fn config_exists(&self) -> bool {
        self.store.exists()
    }

    /// Replace the whole document.
    pub fn save_config(&self, doc: &GatewayDocument) -> Result<()> {
        self.store.write(doc)?;
        info!("Config saved");
        Ok(())
    }

    pub fn save_secrets(&self, secrets: &SecretMap) -> Result<()> {
        self.store.write_secrets(secrets)?;
        Ok(())
    }

    pub fn read_config_raw(&self) -> Result<String> {
        Ok(self.store.read_raw()?)
    }

    /// Validate and persist text from the raw editor.
    pub fn write_config_raw(&self, text: &str) -> Result<()> {
        Ok(self.store.write_raw(text)?)
    }

    // ─── Wizard ───────────────────────────────────────────────────────────────

    /// Build a document from wizard answers without persisting it.
    pub fn generate_config(&self, input: &WizardInput) -> Result<GeneratedConfig> {
        Ok(self.builder.build(input)?)
    }

    /// Build and persist: the document, plus the secrets file when any
    /// official model contributed a credential.
    pub fn complete_wizard(&self, input: &WizardInput) -> Result<GeneratedConfig> {
        let generated = self.builder.build(input)?;
        self.store.write(&generated.config)?;
        if generated.env_vars.values().any(|v| !v.is_empty()) {
            self.store.write_secrets(&generated.env_vars)?;
        }
        info!(
            providers = generated.config.provider_count(),
            secrets = generated.env_vars.len(),
            "Wizard completed"
        );
        Ok(generated)
    }

    // ─── Structured edits ─────────────────────────────────────────────────────

    pub fn add_provider(&self, draft: &ProviderDraft) -> Result<()> {
        self.store.update(|doc| providers::add_provider(doc, draft))?;
        info!(provider = %draft.id, format = %draft.api_format, "Provider added");
        Ok(())
    }

    /// Remove a provider; a primary that pointed at it falls back to the
    /// first remaining fallback.
    pub fn delete_provider(&self, id: &str) -> Result<()> {
        self.store.update(|doc| providers::delete_provider(doc, id))?;
        info!(provider = %id, "Provider deleted");
        Ok(())
    }

    /// Returns the new primary reference.
    pub fn set_primary(&self, id: &str, model_id: Option<&str>) -> Result<String> {
        let reference = self
            .store
            .update(|doc| providers::set_primary(doc, id, model_id))?;
        info!(primary = %reference, "Primary model changed");
        Ok(reference)
    }

    pub fn add_channel(&self, draft: &ChannelDraft) -> Result<()> {
        self.store.update(|doc| providers::add_channel(doc, draft))?;
        info!(channel = draft.kind.label(), "Channel added");
        Ok(())
    }

    /// Returns whether the channel had been configured.
    pub fn delete_channel(&self, kind: ChannelKind) -> Result<bool> {
        Ok(self
            .store
            .update(|doc| Ok(providers::delete_channel(doc, kind)))?)
    }

    // ─── Gateway process ──────────────────────────────────────────────────────

    pub async fn start_gateway(&self) -> Result<Readiness> {
        Ok(self.supervisor.start().await?)
    }

    /// Idempotent. Returns whether a process was running.
    pub fn stop_gateway(&self) -> bool {
        self.supervisor.stop()
    }

    pub async fn restart_gateway(&self) -> Result<Readiness> {
        Ok(self.supervisor.restart().await?)
    }

    pub fn gateway_status(&self) -> GatewayStatus {
        self.supervisor.status()
    }

    pub fn gateway_snapshot(&self) -> GatewaySnapshot {
        self.supervisor.snapshot()
    }

    /// Where clients reach the managed gateway, from the current document.
    pub fn gateway_endpoint(&self) -> GatewayEndpoint {
        let doc = self.store.read();
        let port = doc
            .as_ref()
            .map(GatewayDocument::gateway_port)
            .unwrap_or(DEFAULT_GATEWAY_PORT);
        let token = doc
            .as_ref()
            .and_then(GatewayDocument::gateway_token)
            .unwrap_or_default()
            .to_string();
        GatewayEndpoint {
            port,
            token,
            url: format!("http://127.0.0.1:{port}"),
        }
    }

    /// What `gateway status` reports. Advisory; never feeds `gateway_status`.
    pub async fn service_status(&self) -> ServiceStatus {
        system::service_status(&self.gateway_bin).await
    }

    pub async fn recent_logs(&self, lines: usize) -> LogExcerpt {
        let captured = self.supervisor.recent_output(lines);
        self.logs.recent(lines, captured).await
    }

    pub async fn system_info(&self) -> SystemInfo {
        let uptime = self.supervisor.snapshot().uptime_seconds;
        system::system_info(&self.gateway_bin, uptime).await
    }

    /// Everything the status page shows.
    pub async fn overview(&self) -> PanelOverview {
        let doc = self.store.read().unwrap_or_default();
        let (service, system) = tokio::join!(self.service_status(), self.system_info());
        PanelOverview {
            gateway: self.supervisor.snapshot(),
            service,
            model: ModelSummary {
                primary: doc.primary_model().map(str::to_string),
                fallbacks: doc.fallback_models().to_vec(),
            },
            providers: doc.provider_count(),
            channels: doc.channel_labels().into_iter().map(str::to_string).collect(),
            system,
            config_exists: self.store.exists(),
        }
    }

    // ─── Connectivity ─────────────────────────────────────────────────────────

    pub async fn test_connection(&self, request: &ProbeRequest) -> ProbeOutcome {
        self.probe.check(request).await
    }

    /// Stop the gateway and release event consumers before the panel exits.
    pub fn shutdown(&self) {
        if self.supervisor.stop() {
            info!("Gateway stopped on shutdown");
        }
        self.closing.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_types::config::ApiFormat;
    use deck_types::wizard::{ModelChoice, ModelSpec, OfficialModel, ProxyModel};
    use tempfile::TempDir;

    fn controller() -> (TempDir, PanelController) {
        let dir = TempDir::new().unwrap();
        let mut options = PanelOptions::new(PanelPaths::new(dir.path().join("home")))
            .with_gateway_bin("/nonexistent/openclaw");
        options.journal_unit = None;
        (dir, PanelController::new(options))
    }

    fn wizard() -> WizardInput {
        WizardInput {
            models: vec![
                ModelChoice::Proxy(ProxyModel {
                    provider_id: "relay".into(),
                    api_format: Some(ApiFormat::OpenaiChat),
                    base_url: "https://relay.example".into(),
                    api_key: "k".into(),
                    primary_model_id: None,
                    models: vec![ModelSpec {
                        id: "gpt-5".into(),
                        ..Default::default()
                    }],
                }),
                ModelChoice::Official(OfficialModel {
                    model_ref: "anthropic/claude-opus-4-6".into(),
                    env_key: "ANTHROPIC_API_KEY".into(),
                    api_key: "sk-ant".into(),
                }),
            ],
            channels: vec![],
        }
    }

    #[test]
    fn generate_does_not_persist() {
        let (_dir, panel) = controller();
        panel.generate_config(&wizard()).unwrap();
        assert!(!panel.config_exists());
    }

    #[test]
    fn wizard_persists_document_and_secrets() {
        let (_dir, panel) = controller();
        let generated = panel.complete_wizard(&wizard()).unwrap();

        assert_eq!(panel.get_config().unwrap(), generated.config);
        let secrets = std::fs::read_to_string(panel.paths().secrets_file()).unwrap();
        assert_eq!(secrets, "ANTHROPIC_API_KEY=sk-ant\n");

        let endpoint = panel.gateway_endpoint();
        assert_eq!(endpoint.port, 18789);
        assert_eq!(endpoint.token.len(), 48);
        assert_eq!(endpoint.url, "http://127.0.0.1:18789");
    }

    #[test]
    fn endpoint_defaults_without_config() {
        let (_dir, panel) = controller();
        let endpoint = panel.gateway_endpoint();
        assert_eq!(endpoint.port, 18789);
        assert_eq!(endpoint.token, "");
    }

    #[test]
    fn provider_edits_round_trip_through_the_file() {
        let (_dir, panel) = controller();
        panel.complete_wizard(&wizard()).unwrap();

        panel
            .add_provider(&ProviderDraft {
                id: "acme".into(),
                api_format: ApiFormat::AnthropicMessages,
                base_url: "https://acme.example".into(),
                api_key: "k".into(),
                model_id: Some("claude-opus-4-6".into()),
                set_primary: true,
            })
            .unwrap();
        let doc = panel.get_config().unwrap();
        assert_eq!(doc.primary_model(), Some("acme/claude-opus-4-6"));
        assert_eq!(doc.fallback_models(), ["relay/gpt-5", "anthropic/claude-opus-4-6"]);

        panel.delete_provider("acme").unwrap();
        let doc = panel.get_config().unwrap();
        assert_eq!(doc.primary_model(), Some("relay/gpt-5"));
        assert_eq!(doc.fallback_models(), ["anthropic/claude-opus-4-6"]);

        assert_eq!(panel.set_primary("relay", None).unwrap(), "relay/gpt-5");
        assert!(matches!(
            panel.delete_provider("acme"),
            Err(PanelError::Config(ConfigError::UnknownProvider(_)))
        ));
    }

    #[test]
    fn structured_edit_refuses_corrupt_file() {
        let (_dir, panel) = controller();
        std::fs::create_dir_all(panel.paths().home()).unwrap();
        std::fs::write(panel.paths().config_file(), "{ broken").unwrap();

        let result = panel.add_channel(&ChannelDraft {
            kind: ChannelKind::Discord,
            token: "t".into(),
            allowed_users: vec![],
        });
        assert!(matches!(result, Err(PanelError::Config(ConfigError::Corrupt { .. }))));
        assert_eq!(panel.read_config_raw().unwrap(), "{ broken");
    }

    #[test]
    fn channel_edits() {
        let (_dir, panel) = controller();
        let draft = ChannelDraft {
            kind: ChannelKind::Discord,
            token: "t".into(),
            allowed_users: vec![],
        };
        panel.add_channel(&draft).unwrap();
        assert!(panel.add_channel(&draft).is_err());
        assert!(panel.delete_channel(ChannelKind::Discord).unwrap());
        assert!(!panel.delete_channel(ChannelKind::Discord).unwrap());
    }

    #[tokio::test]
    async fn overview_without_config_or_cli() {
        let (_dir, panel) = controller();
        let overview = panel.overview().await;
        assert!(!overview.config_exists);
        assert_eq!(overview.gateway.status, GatewayStatus::Stopped);
        assert_eq!(overview.providers, 0);
        assert_eq!(overview.channels, vec!["WebChat"]);
        assert_eq!(overview.system.gateway_version, None);
    }

    #[tokio::test]
    async fn start_with_missing_binary_reports_launch_error() {
        let (_dir, panel) = controller();
        let err = panel.start_gateway().await.unwrap_err();
        assert!(matches!(err, PanelError::Supervisor(SupervisorError::Spawn { .. })));
        assert_eq!(panel.gateway_status(), GatewayStatus::Stopped);
        assert!(!panel.stop_gateway());
    }

    #[tokio::test]
    async fn logs_fall_back_to_placeholder() {
        let (_dir, panel) = controller();
        let excerpt = panel.recent_logs(50).await;
        assert_eq!(excerpt.content, logs::NO_LOGS);
    }

    #[tokio::test]
    async fn shutdown_releases_closing_waiters() {
        let (_dir, panel) = controller();
        let early = panel.closing();
        let waiter = tokio::spawn(early);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        panel.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // subscribing after shutdown resolves at once
        tokio::time::timeout(std::time::Duration::from_secs(1), panel.closing())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn gateway_lifecycle_through_controller() {
        let dir = TempDir::new().unwrap();
        let mut options = PanelOptions::new(PanelPaths::new(dir.path()));
        options.journal_unit = None;
        options.supervisor.command =
            GatewayCommand::new("sh", ["-c", "echo 'Gateway listening'; exec sleep 30"]);
        let panel = PanelController::new(options);
        let mut events = panel.subscribe_events();

        assert_eq!(panel.start_gateway().await.unwrap(), Readiness::Observed);
        assert_eq!(panel.gateway_status(), GatewayStatus::Running);
        assert_eq!(
            events.recv().await.unwrap(),
            PanelEvent::GatewayStatus { status: GatewayStatus::Starting }
        );

        let excerpt = panel.recent_logs(10).await;
        assert_eq!(excerpt.source, "captured");
        assert!(excerpt.content.contains("Gateway listening"));

        panel.shutdown();
        assert_eq!(panel.gateway_status(), GatewayStatus::Stopped);
    }
}
