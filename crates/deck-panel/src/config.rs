//! On-disk configuration: per-user paths and the `ConfigStore`.
//!
//! The store performs no in-process locking. The panel is the only writer
//! and is driven interactively, so read-modify-write sequences are assumed
//! to come from one caller at a time; two concurrent writers would race and
//! the last rename wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use deck_types::config::{GatewayDocument, SecretMap};

use crate::error::ConfigError;

/// Environment variable that overrides the gateway home directory.
pub const HOME_ENV: &str = "OPENCLAW_HOME";

/// Locations of everything the panel reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelPaths {
    home: PathBuf,
}

impl PanelPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `$OPENCLAW_HOME` if set, otherwise `~/.openclaw/`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(home));
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(Self::new(home.join(".openclaw")))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `openclaw.json`
    pub fn config_file(&self) -> PathBuf {
        self.home.join("openclaw.json")
    }

    /// `.env` holding official-provider credentials.
    pub fn secrets_file(&self) -> PathBuf {
        self.home.join(".env")
    }

    pub fn workspace(&self) -> PathBuf {
        self.home.join("workspace")
    }

    /// Gateway log files, in lookup order.
    pub fn log_files(&self) -> Vec<PathBuf> {
        vec![
            self.home.join("logs").join("gateway.log"),
            self.home.join("gateway.log"),
        ]
    }
}

/// Durable storage for the configuration document and the secrets file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: PanelPaths,
}

impl ConfigStore {
    pub fn new(paths: PanelPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PanelPaths {
        &self.paths
    }

    pub fn exists(&self) -> bool {
        self.paths.config_file().is_file()
    }

    /// The current document, or `None` if it is missing *or* unparseable.
    /// Use [`exists`](Self::exists) or [`load`](Self::load) when the two
    /// cases must be told apart.
    pub fn read(&self) -> Option<GatewayDocument> {
        match self.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring unreadable config: {e}");
                None
            }
        }
    }

    /// Strict read: `Ok(None)` only when the file does not exist.
    pub fn load(&self) -> Result<Option<GatewayDocument>, ConfigError> {
        let path = self.paths.config_file();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let doc = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::Corrupt { path, source })?;
        Ok(Some(doc))
    }

    /// Serialize and persist the whole document.
    pub fn write(&self, doc: &GatewayDocument) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(doc).map_err(ConfigError::Serialize)?;
        let path = self.paths.config_file();
        write_atomic(&path, json.as_bytes(), None)?;
        debug!(path = %path.display(), "Config written");
        Ok(())
    }

    /// Read-modify-write. Starts from an empty document when the file is
    /// absent, but refuses to touch a file that exists and does not parse.
    /// Nothing is written if `edit` fails.
    pub fn update<T>(
        &self,
        edit: impl FnOnce(&mut GatewayDocument) -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let mut doc = self.load()?.unwrap_or_default();
        let out = edit(&mut doc)?;
        self.write(&doc)?;
        Ok(out)
    }

    /// Persist secrets as `KEY=value` lines. Empty values are skipped and
    /// the file is owner-only where the platform supports it.
    pub fn write_secrets(&self, secrets: &SecretMap) -> Result<(), ConfigError> {
        let mut contents = String::new();
        for (key, value) in secrets.iter().filter(|(_, v)| !v.is_empty()) {
            validate_secret(key, value)?;
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }
        let path = self.paths.secrets_file();
        write_atomic(&path, contents.as_bytes(), Some(0o600))?;
        info!(path = %path.display(), "Secrets written");
        Ok(())
    }

    /// The config file's exact text, for the raw editor.
    pub fn read_raw(&self) -> Result<String, ConfigError> {
        let path = self.paths.config_file();
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound(path)),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Replace the config file with `text` verbatim, after checking that it
    /// parses as a gateway document. Invalid text is never written.
    pub fn write_raw(&self, text: &str) -> Result<(), ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        serde_json::from_str::<GatewayDocument>(text).map_err(ConfigError::InvalidJson)?;
        let path = self.paths.config_file();
        write_atomic(&path, text.as_bytes(), None)?;
        info!(path = %path.display(), "Raw config written");
        Ok(())
    }
}

fn validate_secret(key: &str, value: &str) -> Result<(), ConfigError> {
    if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("Invalid environment variable name: {key:?}")));
    }
    if value.contains('\n') || value.contains('\r') {
        return Err(ConfigError::Invalid(format!("Value for {key} contains a line break")));
    }
    Ok(())
}

/// Write to a sibling temp file, then rename over `path`. A crash leaves
/// either the old file or the new one, never a truncated mix.
fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write { path: path.to_path_buf(), source };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = open_for_write(&tmp, mode)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        restrict_permissions(path, mode)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(unix)]
fn open_for_write(path: &Path, mode: Option<u32>) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if let Some(mode) = mode {
        options.mode(mode);
    }
    options.open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _mode: Option<u32>) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

// `mode` on open only applies to newly created files; a stale temp file
// from an earlier crash keeps its old bits, so set them explicitly.
#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_types::config::{ApiFormat, ModelDescriptor, ProviderConfig, TelegramChannel};
    use tempfile::TempDir;

    fn store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(PanelPaths::new(dir.path().join("home")));
        (dir, store)
    }

    fn sample() -> GatewayDocument {
        let mut doc = GatewayDocument::default();
        let mut provider = ProviderConfig::new("https://relay", "k", ApiFormat::OpenaiChat);
        provider.models.push(ModelDescriptor {
            id: "gpt-5".into(),
            context_window: Some(128_000),
            ..Default::default()
        });
        doc.providers_mut().insert("relay".into(), provider);
        let sel = doc.model_selection_mut();
        sel.primary = Some("relay/gpt-5".into());
        sel.fallbacks = vec!["anthropic/claude-opus-4-6".into()];
        doc.telegram = Some(TelegramChannel {
            token: "123:abc".into(),
            allowed_users: vec!["42".into()],
            ..Default::default()
        });
        doc.extra.insert("plugins".into(), serde_json::json!({ "x": 1 }));
        doc
    }

    #[test]
    fn paths_live_under_home() {
        let paths = PanelPaths::new("/h");
        assert_eq!(paths.config_file(), PathBuf::from("/h/openclaw.json"));
        assert_eq!(paths.secrets_file(), PathBuf::from("/h/.env"));
        assert_eq!(paths.log_files()[0], PathBuf::from("/h/logs/gateway.log"));
    }

    #[test]
    fn read_missing_is_none() {
        let (_dir, store) = store();
        assert!(!store.exists());
        assert!(store.read().is_none());
        assert!(matches!(store.read_raw(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let (_dir, store) = store();
        let doc = sample();
        store.write(&doc).unwrap();
        assert!(store.exists());
        assert_eq!(store.read().unwrap(), doc);
        // no temp file left behind
        let leftovers: Vec<_> = fs::read_dir(store.paths().home())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_reads_as_absent_but_load_reports_it() {
        let (_dir, store) = store();
        fs::create_dir_all(store.paths().home()).unwrap();
        fs::write(store.paths().config_file(), "{ not json").unwrap();
        assert!(store.exists());
        assert!(store.read().is_none());
        assert!(matches!(store.load(), Err(ConfigError::Corrupt { .. })));
    }

    #[test]
    fn update_refuses_to_overwrite_corrupt_file() {
        let (_dir, store) = store();
        fs::create_dir_all(store.paths().home()).unwrap();
        fs::write(store.paths().config_file(), "{ not json").unwrap();
        let result = store.update(|doc| {
            doc.discord = Some(Default::default());
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.read_raw().unwrap(), "{ not json");
    }

    #[test]
    fn update_does_not_write_when_edit_fails() {
        let (_dir, store) = store();
        store.write(&sample()).unwrap();
        let before = store.read_raw().unwrap();
        let result: Result<(), _> = store.update(|doc| {
            doc.telegram = None;
            Err(ConfigError::Invalid("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read_raw().unwrap(), before);
    }

    #[test]
    fn write_raw_rejects_invalid_and_keeps_previous() {
        let (_dir, store) = store();
        store.write(&sample()).unwrap();
        let before = store.read_raw().unwrap();

        let err = store.write_raw("{\"gateway\": ").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJson(_)));
        assert!(err.to_string().starts_with("Invalid config JSON"));

        // well-formed JSON with the wrong shape is rejected too
        assert!(store.write_raw(r#"{"gateway": {"port": "eighty"}}"#).is_err());
        assert!(matches!(store.write_raw("   "), Err(ConfigError::Empty)));

        assert_eq!(store.read_raw().unwrap(), before);
        assert_eq!(store.read().unwrap(), sample());
    }

    #[test]
    fn write_raw_keeps_text_verbatim() {
        let (_dir, store) = store();
        let text = "{\n    \"gateway\": { \"port\": 19000 }\n}\n";
        store.write_raw(text).unwrap();
        assert_eq!(store.read_raw().unwrap(), text);
        assert_eq!(store.read().unwrap().gateway_port(), 19000);
    }

    #[test]
    fn secrets_skip_empty_values() {
        let (_dir, store) = store();
        let mut secrets = SecretMap::new();
        secrets.insert("ANTHROPIC_API_KEY".into(), "sk-1".into());
        secrets.insert("OPENAI_API_KEY".into(), String::new());
        secrets.insert("GEMINI_API_KEY".into(), "g-2".into());
        store.write_secrets(&secrets).unwrap();

        let text = fs::read_to_string(store.paths().secrets_file()).unwrap();
        assert_eq!(text, "ANTHROPIC_API_KEY=sk-1\nGEMINI_API_KEY=g-2\n");
    }

    #[test]
    fn secrets_reject_line_breaks() {
        let (_dir, store) = store();
        let mut secrets = SecretMap::new();
        secrets.insert("KEY".into(), "a\nEVIL=1".into());
        assert!(store.write_secrets(&secrets).is_err());
        assert!(!store.paths().secrets_file().exists());
    }

    #[cfg(unix)]
    #[test]
    fn secrets_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        let mut secrets = SecretMap::new();
        secrets.insert("KEY".into(), "v".into());
        store.write_secrets(&secrets).unwrap();
        let mode = fs::metadata(store.paths().secrets_file())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
