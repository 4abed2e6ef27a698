use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Read;
use std::path::PathBuf;
use tally::{Coordinator, CoordinatorConfig, JobStatus, PoolConfig};
use tracing::{debug, error};

/// Count words with an in-process MapReduce pipeline
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Word counting via map, shuffle, and reduce phases", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a word-count job to completion (default command)
    Run {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Number of mappers to split the input across
        #[arg(short, long, default_value = "4")]
        mappers: usize,

        /// Limit on concurrently executing tasks (default: one per task)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Simulated per-task latency in milliseconds
        #[arg(long)]
        latency_ms: Option<u64>,

        /// Emit the final report as JSON instead of a sorted table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            file,
            mappers,
            max_parallel,
            latency_ms,
            json,
        }) => run_job(file, mappers, max_parallel, latency_ms, json).await,
        None => run_job(None, 4, None, None, false).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_job(
    file: Option<PathBuf>,
    mappers: usize,
    max_parallel: Option<usize>,
    latency_ms: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let input = read_input(file)?;

    let coordinator = Coordinator::new(CoordinatorConfig {
        pool: PoolConfig {
            max_parallel,
            task_latency_ms: latency_ms,
            ..PoolConfig::default()
        },
        ..CoordinatorConfig::default()
    });

    let job_id = coordinator.start_job(&input, mappers)?;

    // Drain the log as the job runs; the stream ends at the terminal entry.
    let mut log = coordinator.stream_log(job_id)?;
    while let Some(entry) = log.next().await {
        debug!("[{}] {}", entry.phase, entry.message);
    }

    let report = coordinator.wait(job_id).await?;
    if report.status != JobStatus::Done {
        anyhow::bail!(
            "job {job_id} {}: {}",
            report.status,
            report.error.unwrap_or_else(|| "unknown failure".to_string())
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let counts = report
        .final_counts
        .ok_or_else(|| anyhow::anyhow!("completed job is missing final counts"))?;
    let mut rows: Vec<(String, u64)> = counts.into_iter().collect();
    // Highest counts first, ties alphabetical.
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in rows {
        println!("{word} {count}");
    }

    Ok(())
}

fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(&path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
