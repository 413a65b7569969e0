mod analytics;
mod browser;
mod config;
mod error;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::analytics::AnalyticsEngine;
use crate::browser::http::HttpBrowser;
use crate::config::AppConfig;
use crate::models::{RouteKey, SearchQuery};
use crate::pipeline::demand::SeatPressureModel;
use crate::scraper::RedbusSource;
use crate::storage::{FareStore, Repository};

#[derive(Parser)]
#[command(name = "farewatch", about = "Bus fare scraper and trend tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape one route, or a batch of routes from a JSON file
    Scrape {
        /// Departure city (e.g. Hyderabad)
        source: Option<String>,

        /// Arrival city (e.g. Bangalore)
        destination: Option<String>,

        /// Journey date, e.g. 2026-09-04 or "04 Sep 2026" (default: tomorrow)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// JSON file with [{"source", "destination", "journey_date"?}, ...]
        #[arg(long, conflicts_with_all = ["source", "destination", "date"])]
        routes: Option<PathBuf>,
    },

    /// Show fare trend and demand summary for a route
    Analyze {
        source: String,
        destination: String,

        /// Only observations captured within this many days
        #[arg(long, default_value_t = 30)]
        days_back: u32,
    },

    /// Export observations to CSV (all routes unless one is given)
    Export {
        source: Option<String>,
        destination: Option<String>,

        #[arg(long, default_value_t = 30)]
        days_back: u32,

        /// Output path (default: data/export_<route>_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List all scraped routes with observation counts
    List,

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "farewatch=info,warn",
        1 => "farewatch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape {
            source,
            destination,
            date,
            routes,
        } => {
            let queries = build_queries(source, destination, date, routes)?;
            run_scrape(&config, queries).await?;
        }

        Command::Analyze {
            source,
            destination,
            days_back,
        } => {
            let repo = Repository::open(&config.storage.db_path)?;
            print_analysis(&repo, &source, &destination, days_back)?;
        }

        Command::Export {
            source,
            destination,
            days_back,
            output,
        } => {
            let key = match (&source, &destination) {
                (Some(s), Some(d)) => Some(RouteKey::new(s, d)),
                (None, None) => None,
                _ => bail!("export needs both SOURCE and DESTINATION, or neither"),
            };

            let path = output.unwrap_or_else(|| default_export_path(&source, &destination));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let repo = Repository::open(&config.storage.db_path)?;
            let file = fs::File::create(&path)
                .with_context(|| format!("create export file {:?}", path))?;
            let rows = AnalyticsEngine::new(&repo).export_csv(key.as_ref(), days_back, file)?;
            println!("Exported {} rows to {}", utils::fmt_number(rows as i64), path.display());
        }

        Command::List => {
            let repo = Repository::open(&config.storage.db_path)?;
            let routes = repo.list_routes()?;
            if routes.is_empty() {
                println!("No routes yet — run `farewatch scrape` first.");
            } else {
                println!("{} routes:", routes.len());
                for r in &routes {
                    println!(
                        "  {:<18} → {:<18} {:>10} observations",
                        r.source,
                        r.destination,
                        utils::fmt_number(r.observations)
                    );
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    crate::scraper::cleaner::parse_journey_date(s)
        .ok_or_else(|| format!("unrecognised date {:?} (try YYYY-MM-DD)", s))
}

fn build_queries(
    source: Option<String>,
    destination: Option<String>,
    date: Option<NaiveDate>,
    routes: Option<PathBuf>,
) -> Result<Vec<SearchQuery>> {
    if let Some(path) = routes {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read routes file {:?}", path))?;
        let queries: Vec<SearchQuery> =
            serde_json::from_str(&raw).with_context(|| format!("parse routes file {:?}", path))?;
        if queries.is_empty() {
            bail!("routes file {:?} contains no routes", path);
        }
        return Ok(queries);
    }

    match (source, destination) {
        (Some(source), Some(destination)) => Ok(vec![SearchQuery::new(source, destination, date)]),
        _ => bail!("provide SOURCE and DESTINATION, or --routes <file>"),
    }
}

async fn run_scrape(config: &AppConfig, queries: Vec<SearchQuery>) -> Result<()> {
    let _t = utils::Timer::start("scrape run");

    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }

    // Ctrl-C flips the flag; the pipeline drains the in-flight listing and
    // stops between listings, so sessions are still finalised.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stop requested — finishing the current listing");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let browser = HttpBrowser::new(&config.scraper)?;
    let mut source = RedbusSource::new(browser, &config.scraper);
    let demand = SeatPressureModel::new(config.pipeline.seat_capacity);

    let total = queries.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for (i, query) in queries.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        match pipeline::scrape_route(&repo, &mut source, &demand, query, &cancel).await {
            Ok(summary) => {
                succeeded += 1;
                println!(
                    "✓ {} → {} ({}): {} found, {} stored, {} skipped, {} failed",
                    query.source,
                    query.destination,
                    query.effective_date(),
                    summary.found,
                    summary.succeeded,
                    summary.skipped,
                    summary.failed
                );
            }
            Err(e) => {
                failed += 1;
                warn!("{:#}", e);
                println!("✗ {} → {}: {:#}", query.source, query.destination, e);
            }
        }

        if i + 1 < total && !cancel.load(Ordering::Relaxed) {
            info!("pausing {}s before the next route", config.pipeline.route_pause_secs);
            tokio::time::sleep(Duration::from_secs(config.pipeline.route_pause_secs)).await;
        }
    }

    println!("Done: {}/{} routes scraped, {} failed", succeeded, total, failed);
    Ok(())
}

fn print_analysis(
    store: &dyn FareStore,
    source: &str,
    destination: &str,
    days_back: u32,
) -> Result<()> {
    let engine = AnalyticsEngine::new(store);
    let key = RouteKey::new(source, destination);
    let trend = engine.fare_trend(&key, days_back)?;

    if trend.is_empty() {
        println!(
            "No observations for {} → {} in the last {} days.",
            source, destination, days_back
        );
        return Ok(());
    }

    let summary = engine.demand_summary(&key, days_back)?;

    println!("─────────────────────────────────────────────");
    println!("  {} → {} — last {} days", source, destination, days_back);
    println!("─────────────────────────────────────────────");
    println!(
        "  Observations : {}",
        utils::fmt_number(summary.observations as i64)
    );
    println!("  Avg fare     : {}", utils::fmt_price(summary.avg_fare));
    println!("  Avg seats    : {:.1}", summary.avg_available_seats);
    println!("─────────────────────────────────────────────");
    for point in &trend {
        println!(
            "  {}  avg {}  min {}  max {}  ({} obs)",
            point.date,
            utils::fmt_price(point.avg_fare),
            utils::fmt_price(point.min_fare),
            utils::fmt_price(point.max_fare),
            point.observations
        );
    }
    if let Some(pct) = analytics::trend_shift(&trend) {
        println!("─────────────────────────────────────────────");
        println!(
            "  Trend        : {} ({:+.1}%)",
            analytics::shift_direction(pct),
            pct
        );
    }
    println!("─────────────────────────────────────────────");
    Ok(())
}

fn default_export_path(source: &Option<String>, destination: &Option<String>) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = match (source, destination) {
        (Some(s), Some(d)) => format!(
            "export_{}_{}_{}.csv",
            s.to_lowercase().replace(' ', "-"),
            d.to_lowercase().replace(' ', "-"),
            stamp
        ),
        _ => format!("export_all_routes_{}.csv", stamp),
    };
    PathBuf::from("data").join(name)
}
