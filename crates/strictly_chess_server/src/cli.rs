//! Command-line interface for strictly_chess.

use crate::config::StoreKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Chess - shared chess sessions with authoritative move validation
#[derive(Parser, Debug)]
#[command(name = "strictly_chess_server")]
#[command(about = "Shared chess sessions over a REST API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the server config file (optional)
    #[arg(long, global = true, default_value = "strictly_chess.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the REST game server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Session store backend
        #[arg(long, value_enum)]
        store: Option<StoreKind>,

        /// SQLite database file
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Play a local hot-seat game in the terminal
    Play {
        /// Start from this FEN instead of the standard position
        #[arg(long)]
        fen: Option<String>,
    },

    /// Submit moves to a game on a running server
    Remote {
        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server_url: String,

        /// Game identifier
        #[arg(short, long)]
        game: String,

        /// Moves to submit in order; reads stdin when none are given
        moves: Vec<String>,
    },

    /// Follow a game on a running server, printing every change
    Watch {
        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server_url: String,

        /// Game identifier
        #[arg(short, long)]
        game: String,
    },
}
