use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use outbreak::builder::{ColumnMapping, DEFAULT_MIN_REGIONS};
use outbreak::config::{Config, DEFAULT_API_BASE, SourceConfig, TelegramConfig};
use outbreak::notify::LogNotifier;
use outbreak::pipeline::{CycleOutcome, Orchestrator};
use outbreak::source::{SourcePreset, TableLayout, WebScraper};
use outbreak::store::{DEFAULT_STORE_PATH, SnapshotStore};
use outbreak::types::{PRIMARY_METRIC, Snapshot, severity_tier};

#[derive(Parser)]
#[command(name = "outbreak")]
#[command(about = "Watches a regional outbreak table and reports changes", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the source table, store the snapshot and report changes to Telegram
    Run {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        telegram: TelegramArgs,

        #[arg(
            long,
            env = "OUTBREAK_STORE",
            default_value = DEFAULT_STORE_PATH,
            help = "Path of the stored snapshot"
        )]
        store: PathBuf,

        #[arg(
            long,
            env = "OUTBREAK_ARCHIVE_DIR",
            help = "Copy the previous snapshot here before overwriting it on change"
        )]
        archive_dir: Option<PathBuf>,

        #[arg(
            long,
            default_value_t = DEFAULT_MIN_REGIONS,
            value_parser = min_regions_parser(),
            help = "Treat extractions with fewer regions as a malformed source"
        )]
        min_regions: usize,
    },
    /// Print the report the next run would send, without storing or sending anything
    Check {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(
            long,
            env = "OUTBREAK_STORE",
            default_value = DEFAULT_STORE_PATH,
            help = "Path of the stored snapshot"
        )]
        store: PathBuf,

        #[arg(
            long,
            default_value_t = DEFAULT_MIN_REGIONS,
            value_parser = min_regions_parser(),
            help = "Treat extractions with fewer regions as a malformed source"
        )]
        min_regions: usize,
    },
    /// Print the stored snapshot with map severity tiers
    Show {
        #[arg(
            long,
            env = "OUTBREAK_STORE",
            default_value = DEFAULT_STORE_PATH,
            help = "Path of the stored snapshot"
        )]
        store: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct SourceArgs {
    #[arg(
        long,
        env = "OUTBREAK_PRESET",
        default_value = "wiki",
        value_parser = parse_preset,
        help = "Source shape: wiki, sheet or csv"
    )]
    preset: SourcePreset,

    #[arg(
        long,
        env = "OUTBREAK_SOURCE_URL",
        help = "URL of the source table (defaults to the preset's URL)"
    )]
    url: Option<String>,

    #[arg(long, help = "CSS selector matching one table row per region (HTML sources)")]
    row_selector: Option<String>,

    #[arg(long, help = "Zero-based column holding the region name")]
    region_column: Option<usize>,

    #[arg(
        long = "metric",
        value_name = "NAME=COLUMN",
        value_parser = parse_metric,
        help = "Metric column, repeatable; the first one is the sort key"
    )]
    metrics: Vec<(String, usize)>,

    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Timeout in seconds for every HTTP request"
    )]
    timeout: u64,
}

impl SourceArgs {
    fn into_config(self) -> Result<SourceConfig, String> {
        let url = self
            .url
            .or_else(|| self.preset.default_url().map(str::to_string))
            .ok_or_else(|| format!("--url is required for the '{}' preset", self.preset))?;

        let mut config = SourceConfig::from_preset(self.preset, url);
        config.timeout = Duration::from_secs(self.timeout);

        if let Some(selector) = self.row_selector {
            match &mut config.layout {
                TableLayout::Html { row_selector, .. } => *row_selector = selector,
                TableLayout::Csv { .. } => {
                    return Err("--row-selector only applies to HTML sources".to_string());
                }
            }
        }
        if let Some(column) = self.region_column {
            config.mapping.region = column;
        }
        if !self.metrics.is_empty() {
            config.mapping = ColumnMapping::new(config.mapping.region, self.metrics);
        }

        Ok(config)
    }
}

#[derive(Args)]
struct TelegramArgs {
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true, help = "Bot token")]
    token: String,

    #[arg(long, env = "TELEGRAM_GROUP", help = "Chat receiving update reports")]
    group: String,

    #[arg(long, env = "TELEGRAM_FAULT", help = "Chat receiving fault reports")]
    fault: String,

    #[arg(long, help = "Deliver reports without a notification sound")]
    silent: bool,

    #[arg(long, env = "TELEGRAM_API", default_value = DEFAULT_API_BASE)]
    api_base: String,
}

impl TelegramArgs {
    fn into_config(self, timeout: Duration) -> TelegramConfig {
        let mut config = TelegramConfig::new(self.token, self.group, self.fault);
        config.silent = self.silent;
        config.api_base = self.api_base;
        config.timeout = timeout;
        config
    }
}

fn min_regions_parser() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

fn parse_preset(s: &str) -> Result<SourcePreset, String> {
    SourcePreset::from_str(s).map_err(|e| e.to_string())
}

fn parse_metric(s: &str) -> Result<(String, usize), String> {
    let (name, column) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=COLUMN, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() || name == "region" {
        return Err(format!("Invalid metric name '{}'", name));
    }
    let column = column
        .trim()
        .parse()
        .map_err(|_| format!("Invalid column '{}'", column))?;
    Ok((name.to_string(), column))
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn print_snapshot(snapshot: &Snapshot, path: &Path) {
    if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
        let modified: DateTime<Local> = modified.into();
        println!(
            "Snapshot {} (updated {})",
            path.display(),
            modified.format("%Y-%m-%d %H:%M")
        );
    }

    let Some(first) = snapshot.records().first() else {
        println!("No entries to display.");
        return;
    };
    let names: Vec<&str> = first.metrics.names().collect();

    print!("{:>4} {:<24}", "", "Region");
    for name in &names {
        print!(" {:>10}", name);
    }
    println!(" {:>5}", "Tier");

    for (i, record) in snapshot.iter().enumerate() {
        print!("{:>3}. {:<24}", i + 1, record.region);
        for name in &names {
            print!(" {:>10}", record.metric(name));
        }
        let tier = severity_tier(record.metric(PRIMARY_METRIC))
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        println!(" {:>5}", tier);
    }

    print!("{:>4} {:<24}", "", "Total");
    for name in &names {
        print!(" {:>10}", snapshot.total(name));
    }
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Run {
            source,
            telegram,
            store,
            archive_dir,
            min_regions,
        } => {
            let source = source.into_config().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(2);
            });
            let telegram = telegram.into_config(source.timeout);

            let mut config = Config::new(source, telegram);
            config.store_path = store;
            config.archive_dir = archive_dir;
            config.min_regions = min_regions;

            let config = config.validate().unwrap_or_else(|e| {
                log::error!("Invalid configuration: {e}");
                process::exit(2);
            });

            let orchestrator = Orchestrator::from_config(&config).unwrap_or_else(|e| {
                log::error!("Error creating HTTP clients: {}", e);
                process::exit(2);
            });

            match orchestrator.run().await {
                CycleOutcome::FirstRun => log::info!("Stored initial snapshot"),
                CycleOutcome::Unchanged => log::info!("Nothing to report"),
                CycleOutcome::Notified { changed_regions } => {
                    log::info!("Reported {} changed region(s)", changed_regions)
                }
                CycleOutcome::Faulted(e) => {
                    log::error!("Cycle ended with a fault: {}", e);
                    process::exit(1);
                }
            }
        }

        Commands::Check {
            source,
            store,
            min_regions,
        } => {
            let source = source.into_config().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(2);
            });

            let fetcher =
                WebScraper::new(source.url.clone(), source.timeout).unwrap_or_else(|e| {
                    log::error!("Error creating scraper: {}", e);
                    process::exit(2);
                });
            log::info!("Checking {} against {}", fetcher.url(), store.display());

            let orchestrator = Orchestrator::new(
                fetcher,
                LogNotifier,
                SnapshotStore::new(store),
                source.layout,
                source.mapping,
                min_regions,
            );

            match orchestrator.preview().await {
                Ok(report) => println!("{}", report),
                Err(e) => {
                    log::error!("Check failed: {}", e);
                    process::exit(1);
                }
            }
        }

        Commands::Show { store, format } => {
            let snapshot_store = SnapshotStore::new(&store);
            let snapshot = match snapshot_store.load() {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    log::error!("No snapshot stored at {}", store.display());
                    process::exit(1);
                }
                Err(e) => {
                    log::error!("{}", e);
                    process::exit(1);
                }
            };

            match format {
                OutputFormat::Json => serialize_json(&snapshot),
                OutputFormat::Text => print_snapshot(&snapshot, &store),
            }
        }
    }
}
