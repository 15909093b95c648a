//! bubu-do API server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (`--config <path>` or `config/default.toml`)
//!   3. Init logger at the configured level
//!   4. Load or create the token signing key
//!   5. Open the SQLite store
//!   6. Build the LLM provider
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Serve the API until shutdown

use tokio_util::sync::CancellationToken;
use tracing::info;

use bubu_do::error::AppError;
use bubu_do::state::AppState;
use bubu_do::store::Store;
use bubu_do::{api, auth, config, llm, logger};

struct CliArgs {
    config_path: Option<String>,
    log_level: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut config_path = None;
    let mut log_level = None;
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => config_path = iter.next(),
            "-v" => log_level = Some("debug".to_string()),
            "-vv" => log_level = Some("trace".to_string()),
            "--help" | "-h" => {
                eprintln!("usage: bubu-do [--config <path>] [-v | -vv]");
                std::process::exit(0);
            }
            other => eprintln!("warning: ignoring unknown argument '{other}'"),
        }
    }

    CliArgs { config_path, log_level }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.as_deref().unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, config.log_file.as_deref())?;

    info!(
        app_name = %config.app_name,
        work_dir = %config.work_dir.display(),
        log_level = %effective_log_level,
        llm_provider = %config.llm.provider,
        "config loaded"
    );

    let keys = auth::keys::setup(&config.key_dir())?;
    info!(key_id = %keys.key_id, "signing key ready");

    let store = match config.db_path() {
        Some(path) => {
            std::fs::create_dir_all(&config.work_dir)?;
            Store::open(&path)?
        }
        None => Store::open_in_memory()?,
    };

    let provider = llm::providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;

    let bind = config.server.bind.clone();
    let state = AppState::new(config, keys, store, provider);

    // Ctrl-C cancels the token; the server drains and returns.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    api::serve(state, &bind, shutdown).await
}
