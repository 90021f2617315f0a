use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stable_routines::model::RepeatPattern;
use stable_routines::schedule::weekday_index;
use stable_routines::store::Repository;
use stable_routines::{
    api, engine_metrics, init_telemetry, shutdown_telemetry, HolidayCalendar,
    InMemoryIdentityProvider, InMemoryStore, Recurrence, RoutineService, StableRoutinesConfig,
    StoreNotificationSink, Validator,
};

#[derive(Parser)]
#[command(name = "stable-routines")]
#[command(about = "Recurring care routines for stables")]
#[command(long_about = "Stable Routines schedules recurring care routines (feeding, mucking, \
                       turnout, medication) for the horses of a stable, tracks their execution \
                       step by step and keeps a per-horse activity history.")]
struct Cli {
    /// Configuration file (defaults to ./stable-routines.toml when present)
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API over an in-memory document store
    Serve {
        /// Fixture with users and documents to load before serving
        #[arg(long, help = "JSON fixture: {\"users\": [..], \"documents\": {\"<collection>\": [..]}}")]
        seed: Option<PathBuf>,
        /// Override the configured bind address
        #[arg(long, help = "Address to listen on, e.g. 0.0.0.0:8080")]
        bind: Option<String>,
    },
    /// Print the dates a schedule would generate instances for
    Preview {
        /// First day of the schedule (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day of the schedule, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Repeat pattern
        #[arg(long, value_enum, default_value = "daily")]
        pattern: PatternArg,
        /// Weekdays for weekly/custom patterns, 0 = Sunday
        #[arg(long, value_delimiter = ',', help = "Comma separated weekdays, 0 = Sunday ... 6 = Saturday")]
        days: Vec<u8>,
        /// Also schedule on public holidays outside the selected weekdays
        #[arg(long)]
        include_holidays: bool,
        /// Print the dates as a JSON array
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PatternArg {
    Daily,
    Weekly,
    Custom,
}

impl From<PatternArg> for RepeatPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Daily => RepeatPattern::Daily,
            PatternArg::Weekly => RepeatPattern::Weekly,
            PatternArg::Custom => RepeatPattern::Custom,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    documents: BTreeMap<String, Vec<Value>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    StableRoutinesConfig::load_env_file()?;
    let config = StableRoutinesConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { seed, bind } => tokio::runtime::Runtime::new()?
            .block_on(async { serve_command(config, seed.as_deref(), bind).await }),
        Commands::Preview {
            start,
            end,
            pattern,
            days,
            include_holidays,
            json,
        } => {
            let recurrence = Recurrence {
                start_date: start,
                end_date: end,
                repeat_pattern: pattern.into(),
                repeat_days: days,
                include_holidays,
            };
            preview_command(&config, &recurrence, json)
        }
    }
}

async fn serve_command(
    config: StableRoutinesConfig,
    seed: Option<&Path>,
    bind: Option<String>,
) -> Result<()> {
    init_telemetry(&config.observability)?;

    let store = Arc::new(InMemoryStore::with_batch_limit(config.store.batch_limit));
    let identity = Arc::new(InMemoryIdentityProvider::new());
    if let Some(path) = seed {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&raw)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        for user in &fixture.users {
            identity.add_user(user);
        }
        let loaded = store.load_fixture(&fixture.documents).await?;
        tracing::info!(documents = loaded, users = fixture.users.len(), "Seeded store");
    }

    let notifications = Arc::new(StoreNotificationSink::new(Repository::new(store.clone())));
    let service = Arc::new(RoutineService::with_config(
        store,
        identity,
        notifications,
        &config,
    ));

    let address = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(address = %address, "Stable routines API listening");

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine_metrics().log_stats();
    shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn preview_command(
    config: &StableRoutinesConfig,
    recurrence: &Recurrence,
    json: bool,
) -> Result<()> {
    if recurrence.end_date < recurrence.start_date {
        anyhow::bail!("--end must not be before --start");
    }
    let mut validator = Validator::new();
    recurrence.check_range(&mut validator, config.schedule.max_range_days);
    validator.finish()?;
    let calendar = HolidayCalendar::new(
        &config.schedule.holiday_region,
        config.schedule.extra_holidays.iter().copied(),
    );
    let dates = recurrence.dates(&calendar);

    if json {
        println!("{}", serde_json::to_string_pretty(&dates)?);
        return Ok(());
    }

    println!("📅 SCHEDULE PREVIEW");
    println!("===================");
    println!(
        "{} → {} ({} dates)",
        recurrence.start_date,
        recurrence.end_date,
        dates.len()
    );
    println!();
    for date in &dates {
        let marker = if calendar.is_holiday(*date) { "  🎉 holiday" } else { "" };
        println!(
            "  {} {}{}",
            date,
            weekday_name(weekday_index(*date)),
            marker
        );
    }
    Ok(())
}

fn weekday_name(index: u8) -> &'static str {
    match index {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        _ => "Sat",
    }
}
