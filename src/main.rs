//! SLOTS — browser slot machine server
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the account ledger, and serves the game until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use slots::config;
use slots::engine::{RandomGrid, SpinEngine};
use slots::ledger;
use slots::web::{self, SlotsState};

const BANNER: &str = r#"
 ____  _     ___ _____ ____
/ ___|| |   / _ \_   _/ ___|
\___ \| |  | | | || | \___ \
 ___) | |__| |_| || |  ___) |
|____/|_____\___/ |_| |____/

  Five reels, three rows, one house.
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Initialise structured logging
    init_logging();

    // Load configuration from TOML, then let the environment override it
    let config_path = std::env::var("SLOTS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut cfg = config::AppConfig::load_or_default(&config_path)?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    let rules = cfg.game.rules()?;

    println!("{BANNER}");
    info!(
        bind = %cfg.server.bind_addr(),
        backend = ?cfg.storage.backend,
        starting_balance = %rules.starting_balance,
        min_bet = %rules.min_bet_size,
        max_bet = %rules.max_bet_size,
        seeded = cfg.game.rng_seed.is_some(),
        "SLOTS starting up"
    );

    // -- Initialise components -------------------------------------------

    let ledger = ledger::open_ledger(&cfg.storage, rules.clone()).await?;
    info!(
        backend = ledger.name(),
        machine_balance = %ledger.machine_balance().await?,
        "Ledger ready"
    );

    let engine = SpinEngine::new(ledger, Box::new(RandomGrid::from_seed(cfg.game.rng_seed)));
    let state = Arc::new(SlotsState::new(engine, rules));

    let mut router = web::build_router(state);
    if let Some(origin) = cfg.server.cors_origin.as_deref() {
        router = web::with_cors(router, origin)?;
        info!(origin, "CORS enabled");
    }

    web::serve(router, &cfg.server.bind_addr()).await?;

    info!("SLOTS shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("slots=info,tower_http=info"));

    let json_logging = std::env::var("SLOTS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
