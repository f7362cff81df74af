//! `process-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the API server.
//! - `migrate`: run pending database migrations.
//! - `validate`: check a process graph JSON file.
//! - `compile`: compile a process graph JSON file and print the tasks.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::models::ProcessGraph;
use engine::{EngineConfig, MemoryRepository, PgRepository, ProcessEngine, ProcessRepository};
use services::mock::{LogSink, PassthroughDirectory, StaticDirectory};
use services::{User, UserDirectory};

#[derive(Parser)]
#[command(
    name = "process-engine",
    about = "Process template compiler and instance execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Postgres URL. Without one, state lives in memory only.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[arg(long, default_value_t = 10)]
        max_connections: u32,
        /// JSON file with an array of `{id, name, organization?}` users.
        #[arg(long)]
        directory: Option<PathBuf>,
        #[command(flatten)]
        tuning: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a process graph JSON file.
    Validate {
        /// Path to the graph JSON file.
        path: PathBuf,
    },
    /// Compile a process graph JSON file and print the task templates.
    Compile {
        path: PathBuf,
        #[command(flatten)]
        tuning: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Maximum task instances per template at start.
    #[arg(long, default_value_t = EngineConfig::default().max_fan_out)]
    max_fan_out: usize,
    /// Do not chain edge-less graphs automatically.
    #[arg(long)]
    no_auto_linearize: bool,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            auto_linearize: !self.no_auto_linearize,
            max_fan_out: self.max_fan_out,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            database_url,
            max_connections,
            directory,
            tuning,
        } => {
            let repo: Arc<dyn ProcessRepository> = match database_url {
                Some(url) => {
                    let pool = db::create_pool(&url, max_connections)
                        .await
                        .context("failed to connect to database")?;
                    Arc::new(PgRepository::new(pool))
                }
                None => {
                    info!("no DATABASE_URL given, using the in-memory store");
                    Arc::new(MemoryRepository::new())
                }
            };

            let directory: Arc<dyn UserDirectory> = match directory {
                Some(path) => Arc::new(load_directory(&path)?),
                None => Arc::new(PassthroughDirectory),
            };

            let engine = ProcessEngine::new(repo, directory, Arc::new(LogSink), tuning.config());
            api::serve(bind, api::AppState::new(Arc::new(engine)))
                .await
                .context("API server failed")?;
        }
        Command::Migrate { database_url } => {
            let pool = db::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Command::Validate { path } => {
            let graph = read_graph(&path)?;
            let report = engine::validate_graph(&graph);
            if report.is_valid() {
                println!("✅ Graph is valid: {} tasks.", graph.task_nodes().count());
            } else {
                eprintln!("❌ Validation failed:");
                for violation in &report.violations {
                    eprintln!("  - {violation}");
                }
                std::process::exit(1);
            }
        }
        Command::Compile { path, tuning } => {
            let graph = read_graph(&path)?;
            match engine::compile_with(&graph, &tuning.config()) {
                Ok(compiled) => {
                    println!("{}", serde_json::to_string_pretty(&compiled.tasks)?);
                }
                Err(e) => {
                    eprintln!("❌ {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn read_graph(path: &Path) -> Result<ProcessGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid graph JSON in {}", path.display()))
}

fn load_directory(path: &Path) -> Result<StaticDirectory> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read directory file {}", path.display()))?;
    let users: Vec<User> = serde_json::from_str(&content)
        .with_context(|| format!("invalid directory JSON in {}", path.display()))?;
    info!(users = users.len(), "user directory loaded");
    Ok(StaticDirectory::new(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["process-engine", "serve"]).unwrap();
        match cli.command {
            Command::Serve { bind, max_connections, tuning, .. } => {
                assert_eq!(bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
                assert_eq!(max_connections, 10);
                let config = tuning.config();
                assert!(config.auto_linearize);
                assert_eq!(config.max_fan_out, 64);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn compile_flags() {
        let cli = Cli::try_parse_from([
            "process-engine",
            "compile",
            "graph.json",
            "--no-auto-linearize",
            "--max-fan-out",
            "8",
        ])
        .unwrap();
        match cli.command {
            Command::Compile { path, tuning } => {
                assert_eq!(path, PathBuf::from("graph.json"));
                assert!(!tuning.config().auto_linearize);
                assert_eq!(tuning.config().max_fan_out, 8);
            }
            _ => panic!("expected compile"),
        }
    }
}
