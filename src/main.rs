//! # blogrank
//!
//! Finds the local bloggers worth contacting for a store's marketing
//! campaign, judged by how visible their posts are in blog search.
//!
//! ## Features
//!
//! - Builds seed, region-power, broad and verification query sets from a
//!   store profile and a versioned vocabulary table
//! - Fetches blog search results concurrently with a run-scoped cache,
//!   per-attempt timeouts and retry with backoff
//! - Aggregates candidate bloggers, scores them, and verifies their ranking
//!   on ten fixed keywords
//! - Persists daily exposure facts to a JSON ledger
//! - Builds a tiered report (top tier plus a food-quota operational pool) as
//!   JSON and Markdown
//!
//! ## Usage
//!
//! ```sh
//! blogrank discover --region 강남 --category 안경원 -j ./json -m ./markdown
//! blogrank report --store-id 1 -m ./markdown
//! blogrank lookup https://blog.naver.com/someone
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: seed → region power → broad searches feed one candidate pool
//! 2. **Scoring**: bias rates and a base score rank the pool
//! 3. **Verification**: the top candidates are checked against ten keywords
//! 4. **Persistence**: profiles and exposure facts are committed once per run
//! 5. **Reporting**: facts in the trailing window are tiered and written out

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod analyzer;
mod blogger_id;
mod cli;
mod config;
mod error;
mod fetcher;
mod keywords;
mod models;
mod outputs;
mod progress;
mod reporting;
mod scoring;
mod search;
mod store;
mod utils;

use analyzer::BloggerAnalyzer;
use blogger_id::{blog_url_from_id, extract_blogger_id};
use cli::{Cli, Command, DiscoverArgs};
use config::{Settings, Vocabulary};
use models::{StoreProfile, TieredReport};
use outputs::{json, markdown};
use progress::{JsonLinesSink, LogSink, ProgressSink};
use reporting::build_tiered_report;
use search::naver::NaverBlogClient;
use search::retry::RetrySearch;
use store::ExposureStore;
use store::json::JsonFileStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("blogrank starting up");

    let args = Cli::parse();
    debug!(?args.json_output_dir, ?args.markdown_output_dir, data = %args.data, "Parsed CLI arguments");

    // Early check: output dirs must be writable before any provider call
    for dir in [&args.json_output_dir, &args.markdown_output_dir].into_iter().flatten() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }

    let settings = Settings::load(args.config.as_deref().map(Path::new))?;
    let vocabulary = Vocabulary::load(args.vocabulary.as_deref().map(Path::new))?;
    let mut store = JsonFileStore::open(&args.data).await?;
    debug!(path = %store.path().display(), "Ledger ready");

    let progress: Box<dyn ProgressSink> = if args.progress_json {
        Box::new(JsonLinesSink::new(io::stdout()))
    } else {
        Box::new(LogSink)
    };

    match &args.command {
        Command::Discover(discover) => {
            run_discover(&args, discover, &settings, &vocabulary, &mut store, progress.as_ref()).await?;
        }
        Command::Report { store_id } => {
            let report = build_tiered_report(&store, *store_id, &settings.report, &vocabulary).await?;
            write_outputs(&args, *store_id, &report).await?;
        }
        Command::Lookup { target, days } => {
            run_lookup(&store, target, *days).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(region = %discover.region, category = %discover.category))]
async fn run_discover(
    args: &Cli,
    discover: &DiscoverArgs,
    settings: &Settings,
    vocabulary: &Vocabulary,
    store: &mut JsonFileStore,
    progress: &dyn ProgressSink,
) -> Result<(), Box<dyn Error>> {
    let profile = StoreProfile::new(
        &discover.region,
        &discover.category,
        discover.topic.as_deref(),
        discover.place_url.as_deref(),
        discover.store_name.as_deref(),
        discover.address.as_deref(),
    )?;

    let client = NaverBlogClient::new(discover.client_id.clone(), discover.client_secret.clone());
    let provider = RetrySearch::from_settings(client, &settings.fetch);
    let analyzer = BloggerAnalyzer::new(provider, vocabulary, settings);

    let outcome = analyzer.run_discovery(&profile, store, progress).await?;
    info!(
        store_id = outcome.store_id,
        seed_calls = outcome.seed_call_count,
        exposure_calls = outcome.exposure_call_count,
        found = outcome.candidates_found,
        saved = outcome.candidates_saved,
        "Discovery finished"
    );

    let report = build_tiered_report(&*store, outcome.store_id, &settings.report, vocabulary).await?;
    write_outputs(args, outcome.store_id, &report).await
}

/// Write the report to every configured output; print Markdown when none is set.
async fn write_outputs(args: &Cli, store_id: u64, report: &TieredReport) -> Result<(), Box<dyn Error>> {
    let date = Local::now().date_naive();

    if let Some(dir) = &args.json_output_dir {
        json::write_report(dir, store_id, date, report).await?;
    }
    if let Some(dir) = &args.markdown_output_dir {
        markdown::write_markdown(dir, store_id, date, report).await?;
    }
    if args.json_output_dir.is_none() && args.markdown_output_dir.is_none() && !args.progress_json {
        println!("{}", markdown::report_to_markdown(report));
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(input = %input, days = days))]
async fn run_lookup(store: &JsonFileStore, input: &str, days: i64) -> Result<(), Box<dyn Error>> {
    let Some(blogger_id) = extract_blogger_id(input) else {
        return Err(error::Error::InvalidInput(format!("not a blog URL or id: {input}")).into());
    };
    let blog_url = blog_url_from_id(&blogger_id);
    let profile = store.candidate_profile(&blogger_id).await?;
    let facts = store.read_blogger_facts(&blogger_id, days).await?;
    info!(blogger_id = %blogger_id, known = profile.is_some(), facts = facts.len(), "Lookup done");

    let out = serde_json::json!({
        "blogger_id": blogger_id,
        "blog_url": blog_url,
        "profile": profile,
        "facts": facts,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
