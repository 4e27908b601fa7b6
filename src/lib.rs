//! gator: a multi-user RSS aggregator.
//!
//! Users register feeds and follow them; `gator agg` polls the registered
//! feeds round-robin and stores their posts, which `gator browse` lists.
//!
//! - [`storage`] - SQLite persistence
//! - [`feed`] - fetching, RSS parsing and date normalization
//! - [`aggregator`] - the polling cycle and its driver
//! - [`commands`] - subcommand handlers over an [`app::App`] context

pub mod aggregator;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
