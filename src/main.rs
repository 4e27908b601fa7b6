use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use gator::app::App;
use gator::cli::{Cli, Command};
use gator::commands;
use gator::config::Config;
use gator::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

/// Create the directory if needed, user-only on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(dir, perms) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // clap prints its own usage errors and exits with status 2
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    if let Command::SetDb { path } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        return commands::set_db(&mut config, &config_path, path, &mut stdout);
    }

    // Relative db paths resolve next to whichever config file is in use
    let base_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or(config_dir);
    let db_path = config.resolve_db_path(&base_dir);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_private_dir(parent)?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!(
                "The database at '{}' is locked by another gator process. Stop it and try again.",
                db_path.display()
            );
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open database '{}'", db_path.display()));
        }
    };

    let mut app = App::new(db, config, config_path).context("Failed to create application")?;
    let mut stdout = std::io::stdout().lock();
    commands::run(&mut app, cli.command, &mut stdout).await
}
