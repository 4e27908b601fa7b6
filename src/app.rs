use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::storage::{Database, User};

// ============================================================================
// Application State
// ============================================================================

/// Everything a command needs, built once in `main` and passed by reference.
pub struct App {
    pub db: Database,
    pub fetcher: FeedFetcher,
    pub config: Config,
    /// Where `config` is written back when the current user changes.
    pub config_path: PathBuf,
}

impl App {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config.user_agent, config.fetch_timeout())
            .context("Failed to build HTTP client")?;
        Ok(Self {
            db,
            fetcher,
            config,
            config_path,
        })
    }

    /// The logged-in user.
    ///
    /// # Errors
    ///
    /// If nobody is logged in, or the configured user no longer exists
    /// (for instance after `reset`).
    pub async fn current_user(&self) -> Result<User> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .context("Not logged in: run `gator login <name>` or `gator register <name>` first")?;
        self.db
            .get_user_by_name(name)
            .await
            .context("Failed to look up current user")?
            .with_context(|| format!("Current user '{}' does not exist, log in again", name))
    }

    /// Switch the logged-in user and persist the choice.
    pub fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config.save(&self.config_path).with_context(|| {
            format!(
                "Failed to save config to '{}'",
                self.config_path.display()
            )
        })?;
        tracing::debug!(user = %name, "Current user set");
        Ok(())
    }
}
