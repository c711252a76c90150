use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use deck_panel::{PanelController, PanelOptions, PanelPaths};
use deck_types::config::ApiFormat;
use deck_types::event::PanelEvent;
use deck_types::gateway::GatewayStatus;
use deck_types::probe::ProbeRequest;
use deck_types::wizard::WizardInput;

#[derive(Parser)]
#[command(name = "clawdeck", version, about = "clawdeck: control panel for the OpenClaw gateway")]
struct Cli {
    /// Gateway home directory (default: ~/.openclaw)
    #[arg(long, global = true, env = "OPENCLAW_HOME")]
    home: Option<PathBuf>,

    /// Gateway CLI executable
    #[arg(long, global = true, env = "OPENCLAW_BIN")]
    gateway_bin: Option<String>,

    /// Control panel listen address (loopback only)
    #[arg(long, global = true, env = "OPENCLAW_PANEL_BIND", default_value = deck_web::DEFAULT_BIND)]
    bind: IpAddr,

    #[arg(long, global = true, env = "OPENCLAW_PANEL_PORT", default_value_t = deck_web::DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web control panel (default)
    Serve,
    /// Show configuration and gateway status
    Status,
    /// Run the gateway in the foreground, streaming its output
    Run,
    /// Check that a provider endpoint accepts a key
    Probe {
        #[arg(long, default_value = "anthropic-messages")]
        format: String,
        #[arg(long, default_value = "")]
        base_url: String,
        #[arg(long, env = "PROBE_API_KEY")]
        api_key: String,
    },
    /// Generate a configuration from a wizard answers file (JSON)
    Wizard {
        input: PathBuf,
        /// Print the generated document instead of writing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = match cli.home {
        Some(home) => PanelPaths::new(home),
        None => PanelPaths::from_env().context("Failed to resolve the gateway home directory")?,
    };
    let mut options = PanelOptions::new(paths);
    if let Some(bin) = cli.gateway_bin {
        options = options.with_gateway_bin(bin);
    }
    let panel = Arc::new(PanelController::new(options));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => deck_web::run(SocketAddr::new(cli.bind, cli.port), panel).await,
        Commands::Status => status(&panel).await,
        Commands::Run => run_foreground(&panel).await,
        Commands::Probe {
            format,
            base_url,
            api_key,
        } => {
            let request = ProbeRequest {
                base_url,
                api_key,
                api_format: ApiFormat::from(format),
            };
            let outcome = panel.test_connection(&request).await;
            match outcome.error_message() {
                None => {
                    println!("OK: {}", serde_json::to_string(&outcome)?);
                    Ok(())
                }
                Some(message) => anyhow::bail!(message),
            }
        }
        Commands::Wizard { input, dry_run } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let answers: WizardInput =
                serde_json::from_str(&text).context("Invalid wizard answers")?;
            if dry_run {
                let generated = panel.generate_config(&answers)?;
                println!("{}", serde_json::to_string_pretty(&generated.config)?);
            } else {
                panel.complete_wizard(&answers)?;
                println!("Config written to {}", panel.paths().config_file().display());
            }
            Ok(())
        }
    }
}

async fn status(panel: &PanelController) -> Result<()> {
    let overview = panel.overview().await;
    println!("clawdeck v{}", overview.system.panel_version);
    println!(
        "Gateway CLI: {}",
        overview.system.gateway_version.as_deref().unwrap_or("not installed")
    );
    println!("Service: {:?}", overview.service.state);
    println!("Config: {}", panel.paths().config_file().display());
    if !overview.config_exists {
        println!("  (not created yet; run the wizard)");
        return Ok(());
    }
    println!(
        "Primary model: {}",
        overview.model.primary.as_deref().unwrap_or("none")
    );
    if !overview.model.fallbacks.is_empty() {
        println!("Fallbacks: {}", overview.model.fallbacks.join(", "));
    }
    println!("Providers: {}", overview.providers);
    println!("Channels: {}", overview.channels.join(", "));
    let endpoint = panel.gateway_endpoint();
    println!("Gateway URL: {}", endpoint.url);
    Ok(())
}

/// Start the gateway under supervision and mirror its output until it exits
/// or Ctrl-C is pressed.
async fn run_foreground(panel: &PanelController) -> Result<()> {
    let mut events = panel.subscribe_events();
    let readiness = panel.start_gateway().await?;
    eprintln!("Gateway is running ({readiness:?}); press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PanelEvent::GatewayLog { chunk }) => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(chunk.as_bytes())?;
                    out.flush()?;
                }
                Ok(PanelEvent::GatewayStatus { status: GatewayStatus::Stopped }) => {
                    eprintln!("Gateway exited.");
                    return Ok(());
                }
                Ok(PanelEvent::GatewayStatus { .. }) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {n} output events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    panel.shutdown();
    Ok(())
}
