//! Shop Schedule
//!
//! Serves the weekly production board, or prints board views from the command
//! line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Local;
use clap::Parser;
use shop_schedule::board::{Board, LoadMode};
use shop_schedule::cli::{BoardArgs, Cli, Command};
use shop_schedule::config::{Config, ConfigLoader};
use shop_schedule::dashboard::{DashboardServer, start_server_with_retry};
use shop_schedule::dates::{get_monday, parse_date};
use shop_schedule::format::{
    OutputFormat, format_plan_markdown, format_summaries_markdown, format_week_markdown,
};
use shop_schedule::logging::{self, LogTarget};
use shop_schedule::poller::spawn_poller;
use shop_schedule::preferences::{PreferenceStore, resolve_selection, stored_selection};
use shop_schedule::refresh::RefreshHub;
use shop_schedule::sources::{ServiceAccountKey, SheetsClient, StoreClient, TokenProvider};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // SAFETY: set at startup before any other threads are spawned.
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("SHOP_SCHEDULE_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    if let Some(path) = loader.config_path() {
        info!(path = %path.display(), "Loaded configuration");
    }

    if let Some(port) = cli.port {
        loader.config_mut().ui.port = port;
    }
    let config = loader.into_config();

    let board = build_board(&config)?;
    let prefs = PreferenceStore::new(config.ui.preferences_path.clone());

    match cli.command {
        Some(Command::Serve) | None => run_server(config, board, prefs).await?,
        Some(Command::Tasks) => {
            board.reload(LoadMode::Foreground).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&board.snapshot().tasks)?
            );
        }
        Some(Command::Board(args)) => run_board(&board, &prefs, args).await?,
        Some(Command::Search { query }) => {
            board.reload(LoadMode::Foreground).await?;
            print!("{}", format_summaries_markdown(&board.search(&query)));
        }
        Some(Command::Plan { project }) => {
            board.reload(LoadMode::Foreground).await?;
            print!("{}", format_plan_markdown(&board.build_plan(&project)?));
        }
    }

    Ok(())
}

/// Wire the remote sources into a board.
fn build_board(config: &Config) -> Result<Arc<Board>> {
    config.validate_sources()?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("shop-schedule/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let tokens = match &config.service_account.key_path {
        Some(path) => {
            let key = ServiceAccountKey::from_file(path)?;
            info!(client = %key.client_email, "Using service account for sheet writes");
            Some(Arc::new(TokenProvider::new(http.clone(), key)))
        }
        None => {
            info!("No service account configured; description edits will not sync");
            None
        }
    };

    let sheets = Arc::new(SheetsClient::new(http.clone(), &config.sheets, tokens)?);
    let store = Arc::new(StoreClient::new(http, &config.store)?);
    let hub = RefreshHub::new(config.refresh.channel_capacity, config.refresh.source.clone())
        .with_relay(store.clone());

    Ok(Arc::new(Board::new(
        sheets.clone(),
        store,
        sheets,
        hub,
        config.board.clone(),
    )))
}

async fn run_server(config: Config, board: Arc<Board>, prefs: PreferenceStore) -> Result<()> {
    // A failed first load leaves an empty board with the error banner set.
    if let Err(e) = board.reload(LoadMode::Foreground).await {
        warn!(error = %e, "Initial load failed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = Duration::from_secs(config.refresh.poll_interval_secs.max(1));
    let poller = spawn_poller(Arc::clone(&board), interval, shutdown_rx);

    let state = DashboardServer::new(
        board,
        Arc::new(prefs),
        config.editing.password.clone(),
        config.ui.port,
    );
    let handle = start_server_with_retry(state, &config.ui);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    handle.shutdown();
    let _ = shutdown_tx.send(true);
    let _ = poller.await;
    Ok(())
}

async fn run_board(board: &Board, prefs: &PreferenceStore, args: BoardArgs) -> Result<()> {
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow!("Unknown format '{}': expected json or markdown", args.format))?;

    board.reload(LoadMode::Foreground).await?;

    let saved = prefs.load();
    let selection = resolve_selection(args.departments.as_deref(), &saved);
    if args.departments.is_some() {
        prefs.update(|p| p.selected_departments = stored_selection(&selection))?;
    }

    let today = Local::now().date_naive();
    let view = match &args.week {
        Some(raw) => {
            let date = parse_date(raw).ok_or_else(|| anyhow!("Invalid date: {}", raw))?;
            let monday = get_monday(date);
            board
                .week_view_at(&selection, today, monday)
                .ok_or_else(|| anyhow!("No week starting {} on the board", monday))?
        }
        None => board.week_view(&selection, today, saved.current_week_index),
    };

    let week = view
        .week
        .as_ref()
        .ok_or_else(|| anyhow!("The board has no weeks"))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(week)?),
        OutputFormat::Markdown => print!("{}", format_week_markdown(week)),
    }
    Ok(())
}
