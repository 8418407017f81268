mod broker;
mod cache;
mod catalog;
mod config;
mod dimension;
mod error;
mod metrics;
mod producer;
mod render;
mod request;
mod snapshot;
mod utils;
mod view;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use broker::Broker;
use cache::{MemoryCache, SnapshotCache, SqliteCache};
use catalog::{Catalog, CatalogView};
use config::Config;
use error::ReportError;
use metrics::MetricKey;
use producer::{HttpProducer, ReportSource};
use render::{ListFormat, OutputFormat};
use request::ReportForm;
use snapshot::ReportSnapshot;
use view::{ChartSpec, Load, ViewSlot};

#[derive(Parser)]
#[command(
    name = "usage-report",
    version,
    about = "Create and inspect API gateway usage reports",
    long_about = None
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: <config_dir>/usage-report/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL
    #[arg(long, env = "USAGE_REPORT_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Gateway API key, sent as a bearer token
    #[arg(long, env = "USAGE_REPORT_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Keep snapshots in memory only
    #[arg(long, global = true)]
    no_cache: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new report and show it
    New {
        /// Report name (default: "用量报告 - <timestamp>")
        #[arg(long)]
        name: Option<String>,

        /// Statistic item, repeatable (default: all)
        #[arg(long = "item", value_name = "ITEM")]
        items: Vec<String>,

        /// Window start: unix seconds or "YYYY-MM-DD HH:MM[:SS]"
        #[arg(long)]
        start: Option<String>,

        /// Window end: unix seconds or "YYYY-MM-DD HH:MM[:SS]"
        #[arg(long)]
        end: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Chart entries per section
        #[arg(long)]
        top: Option<usize>,

        /// Charted metric: requests, total_tokens, error_429_count, normal_error_count
        #[arg(long, default_value_t = MetricKey::Requests)]
        chart: MetricKey,
    },

    /// Show an existing report
    Show {
        id: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Chart entries per section
        #[arg(long)]
        top: Option<usize>,

        /// Charted metric: requests, total_tokens, error_429_count, normal_error_count
        #[arg(long, default_value_t = MetricKey::Requests)]
        chart: MetricKey,
    },

    /// List previously generated reports
    List {
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.base_url, cli.api_key, cli.no_cache);
    debug!(base_url = %config.producer.base_url, cache = config.cache.enabled, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let succeeded = runtime.block_on(run(cli.command, &config))?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("usage_report={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_cache(config: &Config) -> Result<Box<dyn SnapshotCache>> {
    if !config.cache.enabled {
        return Ok(Box::new(MemoryCache::new()));
    }
    let cache = match &config.cache.path {
        Some(path) => SqliteCache::open(path),
        None => SqliteCache::open_default(),
    }
    .context("Failed to open report cache")?;
    match cache.count() {
        Ok(entries) => debug!(entries, "report cache opened"),
        Err(err) => warn!(error = %err, "report cache is unreadable"),
    }
    Ok(Box::new(cache))
}

/// Returns false when the requested view ended in an error.
async fn run(command: Commands, config: &Config) -> Result<bool> {
    let producer = HttpProducer::new(&config.producer.base_url, config.producer.api_key.clone())
        .context("Invalid producer configuration")?;

    match command {
        Commands::New {
            name,
            items,
            start,
            end,
            format,
            top,
            chart,
        } => {
            let form = ReportForm {
                name,
                items: if items.is_empty() {
                    ReportForm::all_items()
                } else {
                    items
                },
                start,
                end,
            };
            let mut broker = Broker::new(open_cache(config)?, producer);
            let mut slot = ViewSlot::new();
            let ticket = slot.begin();
            slot.complete(ticket, create_and_resolve(&mut broker, &form).await);
            let chart = ChartSpec {
                metric: chart,
                len: top.unwrap_or(config.display.top_n),
            };
            emit_report(slot.state(), None, format, chart)
        }
        Commands::Show {
            id,
            format,
            top,
            chart,
        } => {
            let mut broker = Broker::new(open_cache(config)?, producer);
            let mut slot = ViewSlot::new();
            let ticket = slot.begin();
            slot.complete(ticket, broker.resolve(&id).await);
            let chart = ChartSpec {
                metric: chart,
                len: top.unwrap_or(config.display.top_n),
            };
            emit_report(slot.state(), Some(&id), format, chart)
        }
        Commands::List { format } => {
            let view = CatalogView::from_result(Catalog::new(&producer).list().await);
            print!("{}", render::catalog(&view, format)?);
            Ok(view.error.is_none())
        }
    }
}

/// Validate, submit, then read back through the cache.
async fn create_and_resolve<C: SnapshotCache, S: ReportSource>(
    broker: &mut Broker<C, S>,
    form: &ReportForm,
) -> Result<ReportSnapshot, ReportError> {
    let spec = form.validate(Local::now())?;
    let created = broker.create(&spec).await?;
    broker.resolve(&created.id).await
}

fn emit_report(
    state: &Load<ReportSnapshot>,
    id: Option<&str>,
    format: OutputFormat,
    chart: ChartSpec,
) -> Result<bool> {
    let output = render::report(state, id, format, chart)?;
    match state {
        Load::Failed(_) => {
            eprint!("{}", output);
            Ok(false)
        }
        _ => {
            println!("{}", output.trim_end());
            Ok(true)
        }
    }
}
