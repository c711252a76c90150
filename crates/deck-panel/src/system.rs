//! Host facts and what the gateway CLI says about itself.

use std::time::Duration;

use tracing::debug;

use deck_types::gateway::{ServiceState, ServiceStatus};
use deck_types::system::SystemInfo;

use crate::cmd;

const CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// First line of `<bin> --version`, or `None` if the CLI is missing.
pub async fn gateway_version(bin: &str) -> Option<String> {
    match cmd::run_with_timeout(bin, &["--version"], CLI_TIMEOUT).await {
        Ok(out) if out.success => out
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string),
        Ok(_) => None,
        Err(e) => {
            debug!(bin, "Gateway CLI unavailable: {e}");
            None
        }
    }
}

/// `<bin> gateway status`, classified. Independent of the supervisor.
pub async fn service_status(bin: &str) -> ServiceStatus {
    match cmd::run_with_timeout(bin, &["gateway", "status"], CLI_TIMEOUT).await {
        Ok(out) => {
            let raw = out.combined();
            ServiceStatus {
                state: classify_service_output(out.success, &raw),
                raw,
            }
        }
        Err(e) => ServiceStatus {
            state: ServiceState::Stopped,
            raw: e.to_string(),
        },
    }
}

/// Keyword match on the CLI's own status output, case-insensitive.
pub fn classify_service_output(success: bool, text: &str) -> ServiceState {
    let text = text.to_lowercase();
    // "not running" must be checked before "running"
    if text.contains("not running") {
        ServiceState::Stopped
    } else if ["running", "online", "listening"].iter().any(|k| text.contains(k)) {
        ServiceState::Running
    } else if ["stopped", "inactive"].iter().any(|k| text.contains(k)) || !success {
        ServiceState::Stopped
    } else {
        ServiceState::Unknown
    }
}

pub async fn system_info(bin: &str, gateway_uptime_seconds: Option<i64>) -> SystemInfo {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();

    SystemInfo {
        panel_version: env!("CARGO_PKG_VERSION").to_string(),
        os: os_description().await,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname,
        cpus: num_cpus::get(),
        gateway_version: gateway_version(bin).await,
        gateway_uptime_seconds,
    }
}

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    }
}

#[cfg(unix)]
async fn os_description() -> String {
    match cmd::run_with_timeout("uname", &["-r"], Duration::from_secs(2)).await {
        Ok(out) if out.success => format!("{} {}", os_name(), out.stdout.trim()),
        _ => os_name().to_string(),
    }
}

#[cfg(not(unix))]
async fn os_description() -> String {
    os_name().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_service_keywords() {
        assert_eq!(classify_service_output(true, "Gateway is Running (pid 42)"), ServiceState::Running);
        assert_eq!(classify_service_output(true, "status: online"), ServiceState::Running);
        assert_eq!(classify_service_output(true, "Gateway not running"), ServiceState::Stopped);
        assert_eq!(classify_service_output(true, "service inactive"), ServiceState::Stopped);
        assert_eq!(classify_service_output(false, "command failed"), ServiceState::Stopped);
        assert_eq!(classify_service_output(true, "hmm"), ServiceState::Unknown);
    }

    #[tokio::test]
    async fn missing_cli_reads_as_not_installed_and_stopped() {
        let bin = "/nonexistent/openclaw";
        assert_eq!(gateway_version(bin).await, None);
        assert_eq!(service_status(bin).await.state, ServiceState::Stopped);
    }

    #[tokio::test]
    async fn system_info_reports_host() {
        let info = system_info("/nonexistent/openclaw", Some(5)).await;
        assert!(info.cpus >= 1);
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert!(info.os.starts_with(os_name()));
        assert_eq!(info.gateway_uptime_seconds, Some(5));
        assert_eq!(info.gateway_version, None);
    }
}
