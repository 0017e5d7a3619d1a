//! Command-line interface definitions for blogrank.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Provider credentials can also come from environment variables.

use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the blogrank application.
///
/// # Examples
///
/// ```sh
/// # Discover bloggers for a store and write the tiered report
/// blogrank discover --region 강남 --category 안경원 --store-name 밝은안경 -j ./json
///
/// # Rebuild the report for a stored profile
/// blogrank report --store-id 3 -m ./markdown
///
/// # Show what is known about one blog
/// blogrank lookup https://blog.naver.com/someone
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Optional vocabulary YAML replacing the built-in table
    #[arg(long, global = true)]
    pub vocabulary: Option<String>,

    /// Path of the JSON ledger holding stores, profiles and exposure facts
    #[arg(short, long, global = true, default_value = "data/ledger.json")]
    pub data: String,

    /// Output directory for JSON reports
    #[arg(short, long, global = true)]
    pub json_output_dir: Option<String>,

    /// Output directory for Markdown reports
    #[arg(short, long, global = true)]
    pub markdown_output_dir: Option<String>,

    /// Stream progress events to stdout as JSON lines
    #[arg(long, global = true)]
    pub progress_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search, score and verify bloggers for a store, then write its report
    Discover(DiscoverArgs),

    /// Rebuild the tiered report from persisted exposure facts
    Report {
        #[arg(long)]
        store_id: u64,
    },

    /// Show the stored profile and recent exposure of one blog
    Lookup {
        /// Blog URL or blogger id
        target: String,

        /// Days of exposure history to show
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Region text, e.g. "강남"
    #[arg(long)]
    pub region: String,

    /// Store category, e.g. "안경원"
    #[arg(long, default_value = "")]
    pub category: String,

    /// Topic used when the category is empty
    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub place_url: Option<String>,

    #[arg(long)]
    pub store_name: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// Search API client id
    #[arg(long, env = "NAVER_CLIENT_ID", hide_env_values = true)]
    pub client_id: String,

    /// Search API client secret
    #[arg(long, env = "NAVER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,
}
