use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vansweep_common::{Config, Source};
use vansweep_scout::regions::reference_regions;
use vansweep_scout::{
    EgressRotator, GeoFilter, KeySelector, NoopAdapter, Orchestrator, OrchestratorConfig, Strategy,
};
use vansweep_store::{CanonicalStore, FeedbackTracker};

#[derive(Parser)]
#[command(name = "vansweep-scout", about = "Multi-source van listing sweep orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preview the search keys a strategy would produce, one per line
    SelectKeys {
        #[command(flatten)]
        keys: KeyArgs,
    },
    /// Sweep the configured sources with freshly selected keys
    Run {
        #[command(flatten)]
        keys: KeyArgs,

        /// Sources to sweep, comma separated. Defaults to all known sources.
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Simultaneously active source sessions
        #[arg(long, default_value_t = 2)]
        sessions: usize,

        /// In-flight fetches across all sessions
        #[arg(long, default_value_t = 8)]
        fetch_concurrency: usize,

        /// Per-fetch deadline in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Retries per invocation after the first attempt
        #[arg(long, default_value_t = 2)]
        max_retries: u32,
    },
    /// Summarise the canonical store and learned key effectiveness
    Stats,
}

#[derive(Args)]
struct KeyArgs {
    /// Strategy: density, activity, geographic-spread, mixed, or custom
    #[arg(long, default_value = "mixed")]
    strategy: String,

    /// Maximum number of keys to produce
    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// Explicit key for the custom strategy (repeatable)
    #[arg(long = "key")]
    keys: Vec<String>,

    /// Center key for a geographic filter
    #[arg(long)]
    center: Option<String>,

    /// Radius of the geographic filter in kilometres
    #[arg(long, default_value_t = 50.0)]
    radius_km: f64,

    /// Allow keys already handed out this session
    #[arg(long)]
    include_used: bool,

    /// Seed the selector's shuffle for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    match cli.command {
        Command::SelectKeys { keys } => select_keys(&config, keys).await,
        Command::Run {
            keys,
            sources,
            sessions,
            fetch_concurrency,
            timeout_secs,
            max_retries,
        } => {
            run(
                &config,
                keys,
                sources,
                OrchestratorConfig {
                    session_concurrency: sessions,
                    fetch_concurrency,
                    timeout: Duration::from_secs(timeout_secs),
                    max_retries,
                    min_delay: Duration::from_millis(config.min_delay_ms),
                    max_delay: Duration::from_millis(config.max_delay_ms),
                },
            )
            .await
        }
        Command::Stats => stats(&config).await,
    }
}

async fn select(feedback: &FeedbackTracker, args: KeyArgs) -> Result<Vec<String>> {
    let strategy = Strategy::parse(&args.strategy, &args.keys)?;
    let geo = args.center.map(|center| GeoFilter {
        center,
        radius_km: args.radius_km,
    });
    let scores = feedback
        .scores()
        .await
        .context("failed to load effectiveness scores")?;

    let mut selector = match args.seed {
        Some(seed) => KeySelector::with_seed(reference_regions(), seed),
        None => KeySelector::new(reference_regions()),
    };
    let keys = selector.select(
        &strategy,
        args.limit,
        !args.include_used,
        &scores,
        geo.as_ref(),
    )?;
    info!(strategy = %args.strategy, keys = keys.len(), "Selected search keys");
    Ok(keys)
}

async fn select_keys(config: &Config, args: KeyArgs) -> Result<()> {
    let feedback = FeedbackTracker::open(&config.feedback_db)
        .await
        .context("failed to open feedback store")?;
    for key in select(&feedback, args).await? {
        println!("{key}");
    }
    Ok(())
}

async fn run(
    config: &Config,
    args: KeyArgs,
    source_names: Vec<String>,
    orchestrator_config: OrchestratorConfig,
) -> Result<()> {
    let sources = parse_sources(&source_names)?;

    let feedback = FeedbackTracker::open(&config.feedback_db)
        .await
        .context("failed to open feedback store")?;
    let keys = select(&feedback, args).await?;
    if keys.is_empty() {
        warn!("No keys selected, nothing to do");
        return Ok(());
    }

    let store = CanonicalStore::open(&config.data_file).context("failed to open canonical store")?;
    let rotator = Arc::new(EgressRotator::new(config.proxies.clone()));
    if config.proxies.is_empty() {
        warn!("No egress identities configured, fetching directly");
    }

    let orchestrator = Orchestrator::new(
        Arc::new(NoopAdapter),
        rotator,
        store,
        feedback,
        orchestrator_config,
    );

    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = orchestrator.run(&sources, &keys).await?;
    println!("{report}");
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let store = CanonicalStore::open(&config.data_file).context("failed to open canonical store")?;
    println!("{}", store.stats()?);

    let feedback = FeedbackTracker::open(&config.feedback_db)
        .await
        .context("failed to open feedback store")?;
    let mut scores: Vec<(String, f64)> = feedback.scores().await?.into_iter().collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    if scores.is_empty() {
        println!("\nNo key effectiveness history yet.");
        return Ok(());
    }

    println!("\nKey effectiveness (best first):");
    for (area, score) in scores.iter().take(20) {
        let patterns = feedback.patterns(area).await?;
        match (patterns.best_day, patterns.best_month) {
            (Some(day), Some(month)) => {
                println!("  {area:<6} {score:.3}  (best: {day}, {month})")
            }
            _ => println!("  {area:<6} {score:.3}"),
        }
    }
    Ok(())
}

fn parse_sources(names: &[String]) -> Result<Vec<Source>> {
    if names.is_empty() {
        return Ok(Source::ALL.to_vec());
    }
    names
        .iter()
        .map(|n| Source::from_str(n).map_err(Into::into))
        .collect()
}
