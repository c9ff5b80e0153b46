// Declare modules
pub mod cli;
pub mod config;
pub mod envfs;
pub mod formatter;
pub mod matcher;
pub mod models;
pub mod placeholder;
pub mod scanner;
pub mod server;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::io::{self, Read, Write};
use std::sync::Arc;

use self::cli::Cli;
use self::config::resolve_config;
use self::envfs::{DirFileSystem, EnvFileSystem, FallbackFileSystem, FileSystem};
use self::formatter::OutputGenerator;
use self::matcher::PathFilter;
use self::models::RuntimeConfig;
use self::placeholder::ProcessEnv;
use self::scanner::{ScanError, Scanner};

/// Initializes components and orchestrates data flow.
pub fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    // 2. Resolve Configuration
    let config = resolve_config(args)?;
    init_logging(&config.log_level);
    log::debug!("Logging level: {}", log::max_level());

    // 3. Check placeholders before accepting traffic
    check_environment(&config)?;
    if config.check_only {
        return Ok(());
    }

    // 4. Wrap the served tree
    log::info!("Serving files from {}", config.root.display());
    let dir = DirFileSystem::new(&config.root);
    let fs: Arc<dyn FileSystem> = match config.fallback.as_deref() {
        Some(default_path) => {
            log::debug!("Fallback path set to {}", default_path);
            Arc::new(EnvFileSystem::new(FallbackFileSystem::new(dir, default_path)))
        }
        None => Arc::new(EnvFileSystem::new(dir)),
    };

    if let Some(name) = config.render.as_deref() {
        return render(fs.as_ref(), name);
    }

    // 5. Serve
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::run(config.server_options(), fs))
}

/// Maps `--log-level` onto the logger; `RUST_LOG` still takes precedence.
fn init_logging(level: &str) {
    let filter = match level {
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        _ => None,
    };
    env_logger::Builder::new()
        .filter_level(filter.unwrap_or(LevelFilter::Info))
        .parse_default_env()
        .init();
    if filter.is_none() {
        log::warn!("Unknown log level {:?}, using info", level);
    }
}

/// Fails startup on unresolvable placeholders unless they are tolerated.
fn check_environment(config: &RuntimeConfig) -> Result<()> {
    let filter = PathFilter::new(config.include.as_slice(), config.exclude.as_slice());
    let missing = Scanner::new(&config.root, filter)?.scan(&ProcessEnv)?;

    match missing.into_result() {
        Ok(()) => Ok(()),
        Err(err @ ScanError::MissingVars(_)) if config.allow_missing_env => {
            log::warn!("{}, starting with warnings", err);
            Ok(())
        }
        Err(err) => Err(err).context("Missing required environment variables"),
    }
}

fn render(fs: &dyn FileSystem, name: &str) -> Result<()> {
    let mut file = fs
        .open(name)
        .with_context(|| format!("Failed to open {}", name))?;

    let mut stdout = io::stdout().lock();
    if file.is_dir() {
        let entries = file.read_dir()?;
        writeln!(stdout, "{}", OutputGenerator::generate_listing(&entries))?;
    } else {
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .with_context(|| format!("Failed to read {}", name))?;
        stdout.write_all(&content)?;
    }
    file.close()?;
    stdout.flush()?;

    Ok(())
}
