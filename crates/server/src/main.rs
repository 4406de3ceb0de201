// crosswalkd - Crosswalk linking service daemon

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use crosswalk_server::config::{default_config_path, ConfigError, ServerConfig};
use crosswalk_server::server::LinkServer;
use crosswalk_server::service::{LinkingService, SystemClock};
use crosswalk_store::{KeyRegistry, LinkStore, Store};

#[derive(Parser)]
#[command(name = "crosswalkd")]
#[command(about = "Crosswalk linking service daemon")]
#[command(version)]
struct Args {
    /// Path to a TOML config file (default: ~/.config/crosswalk/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long)]
    listen: Option<String>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Shared-secret bearer token clients must present
    #[arg(long, env = "CROSSWALK_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("crosswalkd: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = args
        .config
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from("crosswalk.toml"));
    let mut config = ServerConfig::load(&config_path)?;

    // Flags and CROSSWALK_TOKEN override the file field-by-field.
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(token) = args.token {
        config.token = Some(token);
    }

    let token = config.token.clone().ok_or(ConfigError::MissingToken)?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Store::open(&config.db_path)?;
    log::info!("database open at {}", config.db_path.display());

    let service = Arc::new(LinkingService::new(
        LinkStore::new(Arc::clone(&db)),
        KeyRegistry::new(db),
        Arc::new(SystemClock),
    ));

    let mut server = LinkServer::new();
    server.start(&config.listen, token, service)?;

    // The listener runs on its own thread; nothing left to do here.
    loop {
        std::thread::park();
    }
}
