use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use propagation_sim::{logging, prelude::*};

#[derive(Parser)]
#[command(
    name = "netsim",
    about = "Simulate block and transaction propagation in a proof-of-work \
             network"
)]
struct Cli {
    /// Path to a TOML network description. A four-node network spanning
    /// several continents is used when absent.
    #[arg(long, short, env = "NETSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Number of ticks to run, overriding the config file.
    #[arg(long, short)]
    ticks: Option<u64>,

    /// Seed for every random choice, overriding the config file.
    #[arg(long, short, env = "NETSIM_SEED")]
    seed: Option<u64>,

    /// Output format of the results table.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Log filter, e.g. "info" or "warn,propagation_sim=debug".
    #[arg(long, default_value = "warn", env = "NETSIM_LOG_LEVEL")]
    log_level: String,

    /// Write logs as newline-delimited JSON.
    #[arg(long)]
    json_logs: bool,

    /// Resume from a JSON snapshot written by an earlier run of the same
    /// network.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write a JSON snapshot of the network to this path after the run.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the default network description as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Pretty,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", toml::to_string(&SimulationConfig::default())?);
        return Ok(());
    }

    let log_format = if cli.json_logs {
        logging::LogFormat::Json
    } else {
        logging::LogFormat::Human
    };
    logging::init_logging(log_format, &cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    let ticks = cli.ticks.unwrap_or(config.ticks);

    let mut builder = config.builder()?;
    if let Some(path) = &cli.resume {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        builder = builder.from_snapshot(SimulationSnapshot::from_json(&json)?);
    }
    let mut sim = builder.build()?;

    let workload_seed = config.seed.unwrap_or_else(rand::random);
    tracing::info!(
        nodes = sim.nodes().len(),
        ticks,
        start = sim.tick(),
        "running simulation"
    );
    config.workload.drive(&mut sim, ticks, workload_seed)?;

    let format = match cli.format {
        OutputFormat::Csv => Format::CSV,
        OutputFormat::Pretty => Format::PrettyPrint,
    };
    let results = ResultsBuilder::new(&sim).all().format(format).build();
    println!("{}", results);

    if let Some(path) = &cli.snapshot {
        std::fs::write(path, sim.snapshot().to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
