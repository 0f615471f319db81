//! rankwatch: run a demo job on an in-process cluster and watch every rank live.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rankwatch::config::MonitorConfig;
use rankwatch::scenarios::{spawn_monitored, Scenario, ScenarioParams};
use rankwatch::transport::LocalCluster;

#[derive(Parser)]
#[command(name = "rankwatch")]
#[command(about = "Live progress dashboard for message-passing jobs")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo job under the monitor
    Run(RunArgs),
    /// List the available demo jobs
    List,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Demo job to run
    #[arg(value_enum)]
    scenario: Scenario,

    /// Number of workers (defaults to what the job needs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Messages exchanged by the busy ranks
    #[arg(short, long, default_value = "10000")]
    messages: usize,

    /// Base sleep of the idle ranks, in milliseconds
    #[arg(long, default_value = "2000")]
    pause_ms: u64,

    /// Dashboard redraws per second
    #[arg(long)]
    refresh_hz: Option<f64>,

    /// Turn every send into its synchronous counterpart
    #[arg(long)]
    force_ssend: bool,

    /// Do not clear the terminal between frames
    #[arg(long)]
    no_clear: bool,

    /// JSON file with monitor settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn setup_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    // stdout belongs to the dashboard.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn monitor_config(args: &RunArgs) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_json_file(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(hz) = args.refresh_hz {
        config.refresh_hz = hz;
    }
    if args.force_ssend {
        config.force_synchronous_sends = true;
    }
    if args.no_clear {
        config.clear_screen = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let config = monitor_config(&args)?;
    let scenario = args.scenario;
    let workers = args.workers.unwrap_or(scenario.default_workers());
    let params = ScenarioParams {
        messages: args.messages,
        pause: Duration::from_millis(args.pause_ms),
    };

    let cluster = LocalCluster::new(workers);
    let handler_cluster = cluster.clone();
    ctrlc::set_handler(move || handler_cluster.abort(130))
        .context("failed to install Ctrl-C handler")?;

    info!(?scenario, workers, "starting job");
    if !scenario.terminates() {
        info!("this job does not finish on its own, press Ctrl-C to stop it");
    }

    let job = spawn_monitored(&cluster, scenario, params, config, Box::new(io::stdout()))?;

    let mut finalized = true;
    for (rank, result) in job.join().into_iter().enumerate() {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                finalized = false;
                info!(rank, "{:#}", e);
            }
            Err(_) => {
                finalized = false;
                error!(rank, "worker panicked");
            }
        }
    }

    if let Some(code) = cluster.abort_code() {
        warn!(code, "job was aborted");
    }
    Ok(if finalized {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list() {
    for scenario in Scenario::value_variants() {
        let name = scenario
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        println!(
            "{:<14} {} workers  {}",
            name,
            scenario.default_workers(),
            scenario.description()
        );
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::List => {
            list();
            Ok(ExitCode::SUCCESS)
        }
    }
}
