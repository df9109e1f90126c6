use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gojo::backend::HttpBackend;
use gojo::config::GojoConfig;
use gojo::ledger;
use gojo::scheduler::{cron, dispatch, Clock, ScheduledTask, SystemClock, TriggerSource};

#[derive(Parser)]
#[command(
    name = "gojo",
    about = "Daily summary email scheduler for the GOJO sales suite",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults: $GOJO_CONFIG, /etc/gojo/gojo.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (scheduler worker + HTTP API)
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Keep the ledger in memory instead of SQLite
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show the schedule, last execution and cached result
    Status {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Preview when the summaries will be sent in the next N days
    DryRun {
        /// Days to preview (1 to 3650)
        #[arg(long, default_value = "7", value_parser = clap::value_parser!(u64).range(1..=3650))]
        days: u64,
    },

    /// Send all three summaries now, outside the schedule
    RunNow,
}

fn init_tracing(config: &GojoConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GojoConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config);

    let task = ScheduledTask::from_config(&config.schedule)?;
    let clock = SystemClock;

    match cli.command {
        Commands::Serve { bind, ephemeral } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(%bind, "Starting GOJO scheduler daemon");
            gojo::serve(&config, &bind, ephemeral).await?;
        }
        Commands::Status { json } => {
            let ledger = gojo::open_ledger(&config, false)?;
            let last = ledger::last_execution_date(ledger.as_ref())?;
            let next = cron::next_execution(&task, clock.now(), last);
            let cached = ledger::cached_result(ledger.as_ref())?;

            if json {
                let report = serde_json::json!({
                    "task": task,
                    "nextExecutionTime": next.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()),
                    "lastExecution": last.map(|d| d.to_string()),
                    "lastResult": cached,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nGOJO Daily Summary Schedule");
                println!("{:<16} : {}", "Task", task.name);
                println!("{:<16} : {}", "Time", task.time_label());
                println!("{:<16} : {}", "Working days", task.working_day_labels().join(", "));
                println!(
                    "{:<16} : {}",
                    "Next execution",
                    next.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
                );
                println!(
                    "{:<16} : {}",
                    "Last execution",
                    last.map(|d| d.to_string()).unwrap_or_else(|| "never".to_string())
                );
                match cached {
                    Some(result) => {
                        println!("\nLast result ({}, {:?}):", result.timestamp.to_rfc3339(), result.trigger);
                        print_results(&result);
                    }
                    None => println!("\nNo execution results cached yet."),
                }
                println!();
            }
        }
        Commands::DryRun { days } => {
            let now = clock.now();
            let until = now + chrono::Duration::days(days as i64);
            let runs = cron::upcoming(&task, now, Some(until), usize::MAX);
            if runs.is_empty() {
                println!("No runs scheduled in next {} days.", days);
            } else {
                println!("Upcoming runs (next {} days):", days);
                for time in runs {
                    println!("{} : {}", time.format("%a %Y-%m-%d %H:%M"), task.name);
                }
            }
        }
        Commands::RunNow => {
            let ledger = gojo::open_ledger(&config, false)?;
            let backend = HttpBackend::new(&config.backend)?;
            tracing::info!("Running manual dispatch");
            let result = dispatch::dispatch(
                &backend,
                TriggerSource::Manual,
                config.schedule.pacing_delay(),
            )
            .await;
            ledger::cache_result(ledger.as_ref(), &result)?;

            println!("\n=== GOJO Manual Dispatch ===");
            print_results(&result);
            println!("{}", result.summary());
            println!("============================\n");
        }
    }

    Ok(())
}

fn print_results(result: &gojo::scheduler::ExecutionResult) {
    println!("{:<22} | {:<6} | {:<6} | Message", "Summary", "Status", "Emails");
    println!("{:-<22}-|-{:-<6}-|-{:-<6}-|-{:-<30}", "", "", "", "");
    for entry in &result.results {
        let status = if entry.success { "OK" } else { "FAIL" };
        println!(
            "{:<22} | {:<6} | {:<6} | {}",
            entry.kind.label(),
            status,
            entry.emails_sent,
            entry.message
        );
    }
}
