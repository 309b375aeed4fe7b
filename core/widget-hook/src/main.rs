//! widget-hook: CLI host for the habit widget engine.
//!
//! Widget extensions and scripts that cannot link the library talk to the
//! shared namespace through this binary.
//!
//! ## Subcommands
//!
//! - `serve`: Line-delimited JSON requests on stdin, responses on stdout
//! - `save` / `configure`: Store a habit document read from stdin
//! - `toggle`, `complete`, `render`: Widget-side actions
//! - `drain`, `sync`, `delete`, `map`, `unmap`: App-side housekeeping

mod dispatch;
mod logging;
mod serve;

use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use widget_core::{StorageConfig, WidgetEngine};
use widget_protocol::Command;

#[derive(Parser)]
#[command(name = "widget-hook")]
#[command(about = "Habit widget state host")]
#[command(version)]
struct Cli {
    /// Namespace root directory (defaults to $WIDGET_SYNC_ROOT, then the platform data dir)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON requests from stdin until it closes
    Serve,

    /// Store a habit document (reads JSON from stdin)
    Save {
        #[arg(value_name = "HABIT_ID")]
        habit_id: String,
    },

    /// Bind a surface to the habit document read from stdin
    Configure {
        #[arg(value_name = "SURFACE_ID")]
        surface_id: String,
    },

    /// Advance today's completion for a habit
    Toggle {
        #[arg(value_name = "HABIT_ID")]
        habit_id: String,
    },

    /// Handle a tap on a widget surface
    Complete {
        #[arg(value_name = "SURFACE_ID")]
        surface_id: String,
    },

    /// Print what a widget surface should draw
    Render {
        #[arg(value_name = "SURFACE_ID")]
        surface_id: String,
    },

    /// Print and clear the pending habit ids
    Drain,

    /// Delete every habit not listed
    Sync {
        #[arg(value_name = "HABIT_ID")]
        valid_ids: Vec<String>,
    },

    /// Delete a habit and unbind its surfaces
    Delete {
        #[arg(value_name = "HABIT_ID")]
        habit_id: String,
    },

    /// Bind a surface to a habit
    Map {
        #[arg(value_name = "SURFACE_ID")]
        surface_id: String,
        #[arg(value_name = "HABIT_ID")]
        habit_id: String,
    },

    /// Unbind a surface
    Unmap {
        #[arg(value_name = "SURFACE_ID")]
        surface_id: String,
    },
}

fn resolve_storage(root: Option<PathBuf>) -> Result<StorageConfig, String> {
    match root {
        Some(root) => Ok(StorageConfig::with_root(root)),
        None => StorageConfig::resolve().map_err(String::from),
    }
}

fn read_stdin() -> Result<String, String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;
    if input.trim().is_empty() {
        return Err("Expected a habit JSON document on stdin".to_string());
    }
    Ok(input)
}

/// `None` for `serve`, which is a loop rather than a single command.
fn to_command(command: Commands) -> Result<Option<Command>, String> {
    Ok(Some(match command {
        Commands::Serve => return Ok(None),
        Commands::Save { habit_id } => Command::SaveHabitData {
            habit_id,
            json: read_stdin()?,
        },
        Commands::Configure { surface_id } => Command::ConfigureSurface {
            surface_id,
            json: read_stdin()?,
        },
        Commands::Toggle { habit_id } => Command::ToggleCompletion { habit_id },
        Commands::Complete { surface_id } => Command::OnUserComplete { surface_id },
        Commands::Render { surface_id } => Command::RenderData { surface_id },
        Commands::Drain => Command::DrainPendingActions,
        Commands::Sync { valid_ids } => Command::SyncValidIds { valid_ids },
        Commands::Delete { habit_id } => Command::DeleteHabit { habit_id },
        Commands::Map {
            surface_id,
            habit_id,
        } => Command::SetWidgetMapping {
            surface_id,
            habit_id,
        },
        Commands::Unmap { surface_id } => Command::RemoveMapping { surface_id },
    }))
}

fn run(command: Commands, storage: StorageConfig) -> Result<(), String> {
    let engine = WidgetEngine::with_storage(storage.clone()).map_err(|e| e.to_string())?;

    let Some(command) = to_command(command)? else {
        let stdin = io::stdin();
        let stdout = io::stdout();
        return serve::run(&engine, &storage, stdin.lock(), stdout.lock());
    };

    let data = dispatch::execute(&engine, &storage, command)
        .map_err(|e| format!("{}: {}", e.code, e.message))?;
    let rendered =
        serde_json::to_string_pretty(&data).map_err(|e| format!("Failed to encode output: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let storage = match resolve_storage(cli.root) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("widget-hook: {}", e);
            std::process::exit(1);
        }
    };
    let logging_guard = logging::init(&storage);

    if let Err(e) = run(cli.command, storage) {
        tracing::error!(error = %e, "widget-hook failed");
        eprintln!("widget-hook: {}", e);
        // exit() skips destructors; flush the log writer first.
        drop(logging_guard);
        std::process::exit(1);
    }
}
