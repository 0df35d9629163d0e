// packages/engine/src/main.rs
//! Hookwire Engine Launcher
//!
//! Runs a command with the interception library preloaded, so its HTTP
//! traffic carries the configured correlation headers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookwire_engine::interception::syscall_interceptor::{
    parse_header_arg, PreloadConfig, PreloadLauncher,
};
use hookwire_engine::observability::{init_metrics, init_tracing};
use hookwire_engine::utils::config::EngineConfig;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hookwire-engine")]
#[command(version, about = "Socket-level HTTP header interception", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Preload library to inject
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Header injected into outgoing messages, as NAME=VALUE
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    /// Intercept read/write on every descriptor, not only tracked sockets
    #[arg(long, global = true)]
    track_all: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with interception enabled
    Run {
        /// Command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Print the environment a preloaded process needs
    Env,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = EngineConfig::load_from(cli.config.as_deref())
        .context("failed to load engine configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging);
    init_metrics();

    let static_headers = cli
        .headers
        .iter()
        .map(|arg| parse_header_arg(arg))
        .collect::<hookwire_engine::Result<Vec<_>>>()?;

    let launcher = PreloadLauncher::new(PreloadConfig {
        library_path: cli.library.clone(),
        config_path: cli.config.clone(),
        static_headers,
        track_all_descriptors: cli.track_all,
    });
    let env_vars = launcher.env_vars()?;

    match cli.command {
        Commands::Env => {
            for (key, value) in &env_vars {
                println!("{}={}", key, value);
            }
            Ok(())
        }
        Commands::Run { command } => {
            let code = run(&command, &env_vars).await?;
            std::process::exit(code);
        }
    }
}

/// Spawn `command` with the preload environment and wait for it.
/// Ctrl-C kills the child.
async fn run(command: &[String], env_vars: &[(String, String)]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("no command given")?;

    info!("Starting {} with interception v{}", program, hookwire_engine::VERSION);

    let mut child = Command::new(program)
        .args(args)
        .envs(env_vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received interrupt, stopping {}", program);
            child.kill().await?;
            child.wait().await?
        }
    };

    info!("{} exited with {}", program, status);
    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
