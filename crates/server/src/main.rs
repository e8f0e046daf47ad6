use anyhow::Context;
use bureau_engine::EngineConfig;
use bureau_server::store::{Store, DEFAULT_KEEP_EVENTS};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

/// Serve the live office scene.
#[derive(Debug, Parser)]
#[command(name = "bureau-server", version)]
struct Args {
    /// Address to bind. Only loopback and Tailscale peers are served.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    #[arg(long, default_value_t = 39480)]
    port: u16,

    /// SQLite file holding the latest snapshot, presence and usage inputs.
    /// Defaults to ~/.bureau/bureau.db.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Engine config (YAML). Missing keys fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event-log rows to keep; older rows are trimmed as new ones arrive.
    #[arg(long, default_value_t = DEFAULT_KEEP_EVENTS)]
    keep_events: i64,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("BUREAU_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if std::env::var("DEBUG").is_ok() {
            "bureau_engine=debug,bureau_server=debug,info"
        } else {
            "bureau_engine=info,bureau_server=info,warn"
        })
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_ansi(false)).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match args.config.as_deref() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let db_path = match args.db {
        Some(p) => p,
        None => dirs::home_dir()
            .context("no home directory; pass --db")?
            .join(".bureau")
            .join("bureau.db"),
    };

    let addr = SocketAddr::new(args.bind, args.port);
    info!(%addr, db = %db_path.display(), "starting");
    let store = Store::new(db_path).with_keep_events(args.keep_events);
    bureau_server::serve(addr, store, config).await
}
