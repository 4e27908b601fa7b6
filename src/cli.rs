use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::parse_interval;

#[derive(Parser, Debug)]
#[command(
    name = "gator",
    version,
    about = "RSS aggregator: follow feeds, collect their posts, browse what's new"
)]
pub struct Cli {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Log in as an existing user
    Login { name: String },

    /// List all users
    Users,

    /// Delete every user, feed and post
    Reset,

    /// Point gator at a different database file (saved to the config)
    SetDb { path: PathBuf },

    /// Register a feed and follow it
    Addfeed { name: String, url: String },

    /// List all registered feeds
    Feeds,

    /// Follow an already registered feed
    Follow { url: String },

    /// List the feeds you follow
    Following,

    /// Stop following a feed
    Unfollow { url: String },

    /// Show the newest posts from the feeds you follow
    Browse {
        #[arg(long, short = 'l', default_value_t = 2, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },

    /// Poll feeds every INTERVAL (e.g. 30s, 1m, 1h30m) until Ctrl-C
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
}
