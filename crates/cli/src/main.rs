use std::{sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wagate_config::WagateConfig,
    wagate_session::{CredentialStore, SessionConfig, SessionManager},
    wagate_store::{MemoryCredentialStore, SledCredentialStore},
    wagate_transport::{Transport, ws::WsTransport},
    wagate_web::ControlState,
};

#[derive(Parser)]
#[command(name = "wagate", about = "wagate — messaging-network session daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the session daemon and its control surface.
    Serve {
        /// Bind address; overrides the config file.
        #[arg(long)]
        bind: Option<String>,
        /// Control-surface port; overrides the config file.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Drop stored credentials so the next serve pairs fresh.
    Reset,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn credential_store(config: &WagateConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if config.session.ephemeral {
        warn!("ephemeral mode: credentials held in memory only");
        return Ok(Arc::new(MemoryCredentialStore::new()));
    }

    let path = config
        .session
        .credential_path
        .clone()
        .unwrap_or_else(|| wagate_config::data_dir().join("credentials"));
    let store = SledCredentialStore::open(&path)?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wagate starting");

    match cli.command {
        Commands::Serve { bind, port } => serve(bind, port).await,
        Commands::Reset => reset().await,
    }
}

async fn reset() -> anyhow::Result<()> {
    let config = wagate_config::discover_and_load();
    let store = credential_store(&config)?;
    store.reset().await?;
    println!("credentials cleared");
    Ok(())
}

async fn serve(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = wagate_config::discover_and_load();

    let Some(auth_token) = config.server.resolve_auth_token() else {
        anyhow::bail!(
            "no control token configured; set WAGATE_TOKEN or server.auth_token in the config file"
        );
    };

    let store = credential_store(&config)?;
    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(&config.transport.url));
    let manager = SessionManager::new(
        transport,
        store,
        SessionConfig {
            reconnect_delay: Duration::from_millis(config.session.reconnect_delay_ms),
        },
    );
    manager.start().await;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let state = Arc::new(ControlState {
        manager,
        auth_token,
    });
    wagate_web::serve(&bind, port, state).await
}
