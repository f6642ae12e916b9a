use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playlist_migrate::app::{run, RunOptions};
use playlist_migrate::catalog::MAX_TRACKS_PER_ADD;
use playlist_migrate::config::DEFAULT_CONFIG_PATH;
use playlist_migrate::progress::format_duration;
use playlist_migrate::scoring::{FuzzyOptions, SelectStrategy, DEFAULT_FUZZY_THRESHOLD};
use playlist_migrate::sync::SyncOptions;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    /// First result, preferring one that matches the remix context
    Simple,
    /// Closest search string, ties broken by duration
    Fuzzy,
}

#[derive(Parser)]
#[command(name = "playlist-migrate")]
#[command(about = "Copy a VK audio library into a new Spotify playlist")]
struct Args {
    /// Config file holding credentials and settings
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Playlist to create (overrides `playlist_name` in the config)
    #[arg(long)]
    playlist_name: Option<String>,

    /// VK user whose library is migrated (default: the logged-in user)
    #[arg(long, allow_hyphen_values = true)]
    owner_id: Option<i64>,

    #[arg(long, value_enum, default_value_t = Strategy::Simple)]
    strategy: Strategy,

    /// Only accept results matching the remix context (simple strategy)
    #[arg(long)]
    remix_only: bool,

    /// Highest fuzzy score accepted (fuzzy strategy)
    #[arg(long, default_value_t = DEFAULT_FUZZY_THRESHOLD)]
    fuzzy_threshold: f64,

    /// Tracks per playlist-add call (at most 100)
    #[arg(long, default_value_t = MAX_TRACKS_PER_ADD)]
    chunk_size: usize,

    #[arg(long, default_value = "100")]
    search_delay_ms: u64,

    #[arg(long, default_value = "1000")]
    chunk_delay_ms: u64,

    /// Submit a destination track again when several source tracks match it
    #[arg(long)]
    allow_duplicates: bool,

    /// Search and match only; no playlist is created or changed
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log-only mode: no progress bars, periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let start = Instant::now();
    info!("--- START ---");

    let strategy = match args.strategy {
        Strategy::Simple => SelectStrategy::Simple {
            remix_only: args.remix_only,
        },
        Strategy::Fuzzy => SelectStrategy::Fuzzy(FuzzyOptions {
            threshold: args.fuzzy_threshold,
            ..Default::default()
        }),
    };

    let options = RunOptions {
        config_path: args.config,
        playlist_name: args.playlist_name,
        owner_id: args.owner_id,
        sync: SyncOptions {
            chunk_size: args.chunk_size,
            search_delay: Duration::from_millis(args.search_delay_ms),
            chunk_delay: Duration::from_millis(args.chunk_delay_ms),
            strategy,
            dedupe: !args.allow_duplicates,
            dry_run: args.dry_run,
        },
        log_only: args.log_only,
    };

    let report = run(options).await?;

    println!();
    println!("============================================================");
    println!("SUMMARY");
    println!("============================================================");
    println!("Source tracks:   {:>6}", report.source_tracks());
    println!("Matched:         {:>6}", report.matched());
    println!("Not found:       {:>6}", report.unmatched());
    println!("Added:           {:>6}", report.submitted());
    println!("Failed searches: {:>6}", report.failed_searches());
    println!("Failed chunks:   {:>6}", report.failed_chunks());
    println!("Elapsed:         {:>6}", format_duration(start.elapsed()));

    Ok(())
}
