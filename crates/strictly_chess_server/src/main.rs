//! Strictly Chess - shared chess sessions over REST.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use strictly_chess::{ChessSession, MoveOutcome, ShakmatyEngine};
use strictly_chess_server::{
    Backoff, Cli, Command, MemoryStore, RestGameClient, ServerConfig, SessionManager,
    SnapshotPoller, SqliteStore, StateStore, StoreKind, render_snapshot, render_view, router,
};
use tokio::io::AsyncBufReadExt;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strictly_chess=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            store,
            db_path,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config = config.with_host(host);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(store) = store {
                config = config.with_store(store);
            }
            if let Some(db_path) = db_path {
                config = config.with_db_path(db_path);
            }
            run_server(config).await
        }
        Command::Play { fen } => run_local(fen),
        Command::Remote {
            server_url,
            game,
            moves,
        } => run_remote(server_url, game, moves).await,
        Command::Watch { server_url, game } => run_watch(config, server_url, game).await,
    }
}

/// Builds the configured store.
#[instrument(skip(config))]
fn open_store(config: &ServerConfig) -> Result<Arc<dyn StateStore>> {
    Ok(match config.store() {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Sqlite => Arc::new(
            SqliteStore::open(config.db_path()).context("Failed to open SQLite store")?,
        ),
    })
}

/// Run the REST game server
#[instrument(skip(config))]
async fn run_server(config: ServerConfig) -> Result<()> {
    let store = open_store(&config)?;
    let manager = SessionManager::new(ShakmatyEngine::new(), store)
        .with_max_conflict_retries(*config.max_conflict_retries())
        .with_recheck_interval(config.poll_min());
    let app = router(manager, config.long_poll_timeout());

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), store = %config.store(), "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Play a hot-seat game on stdin
#[instrument]
fn run_local(fen: Option<String>) -> Result<()> {
    let engine = ShakmatyEngine::new();
    let mut session = match fen {
        Some(fen) => ChessSession::from_fen(engine, &fen).context("Invalid FEN")?,
        None => ChessSession::new(engine),
    };

    println!("Enter moves like e2e4 or e2-e4; 'restart' to start over, 'quit' to leave.");
    print!("{}", render_snapshot(&session.snapshot()));

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "quit" | "exit" => break,
            "restart" => session.reset(),
            token => {
                if session.apply_move(token) == MoveOutcome::Unchanged && session.is_over() {
                    println!("The game is over. Type 'restart' for a new one.");
                }
            }
        }
        print!("{}", render_snapshot(&session.snapshot()));
    }
    Ok(())
}

/// Submit moves to a server-side game
#[instrument(skip(moves))]
async fn run_remote(server_url: String, game: String, moves: Vec<String>) -> Result<()> {
    let client = RestGameClient::new(&server_url);
    let view = client.open(&game).await?;
    print!("{}", render_view(&view));

    if !moves.is_empty() {
        for mv in moves {
            submit(&client, &game, &mv).await?;
        }
        return Ok(());
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "quit" | "exit" => break,
            "restart" => print!("{}", render_view(&client.restart(&game).await?)),
            mv => submit(&client, &game, mv).await?,
        }
    }
    Ok(())
}

async fn submit(client: &RestGameClient, game: &str, mv: &str) -> Result<()> {
    let reply = client.submit_move(game, mv).await?;
    println!("{} -> {:?}", mv, reply.outcome);
    print!("{}", render_view(&reply.game));
    Ok(())
}

/// Follow a server-side game
#[instrument(skip(config))]
async fn run_watch(config: ServerConfig, server_url: String, game: String) -> Result<()> {
    let client = RestGameClient::new(&server_url);
    let backoff = Backoff::new(config.poll_min(), config.poll_max());
    let mut poller = SnapshotPoller::new(client, game, backoff);

    loop {
        match poller.next_change().await {
            Ok(view) => print!("{}", render_view(&view)),
            Err(e) if e.is_not_found() => return Err(e).context("Game not found"),
            Err(e) => warn!(error = %e, "Refresh failed, retrying"),
        }
    }
}
