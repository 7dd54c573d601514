use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mpsim_config::SimulationConfig;
use mpsim_core::run_config;
use mpsim_report::{read_plan_csv, PlanSummary};
use mpsim_sched::build_base_plan;
use mpsim_schema::plan_state_to_batch;
use mpsim_store::{write_csv, CsvResultSink, NullResultSink, ResultSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpsim", about = "Monte Carlo simulation of usage-driven maintenance plans")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every parameter set of a config and export the trial tables.
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "./data")]
        output: PathBuf,
        /// Keep results in memory only.
        #[arg(long)]
        no_export: bool,
        /// Overrides the seed from the config.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        max_sets: Option<usize>,
    },
    /// Print the base plan of one parameter set as a CSV plan table.
    Plan {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 0)]
        set: usize,
    },
    /// Summarise exported trial tables as JSON.
    Summary {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            output,
            no_export,
            seed,
            max_sets,
        } => {
            let mut cfg = SimulationConfig::from_path(&config)?;
            if seed.is_some() {
                cfg.seed = seed;
            }
            let sink: Arc<dyn ResultSink> = if no_export {
                Arc::new(NullResultSink)
            } else {
                info!(output = %output.display(), "exporting trial tables");
                Arc::new(CsvResultSink::new(output))
            };

            for run in run_config(&cfg, sink, max_sets).await? {
                println!("== parameter set {} ==", run.index);
                println!("{}", serde_json::to_string(run.policy.as_ref())?);
                print!("{}", run.summary);
            }
        }
        Command::Plan { config, set } => {
            let cfg = SimulationConfig::from_path(&config)?;
            let sets = cfg.parameter_sets()?;
            let params = sets
                .get(set)
                .with_context(|| format!("config has {} parameter sets, no index {set}", sets.len()))?;
            let plan = build_base_plan(Arc::new(params.to_policy()?));

            let table = plan_state_to_batch(&plan, 0)?;
            write_csv(std::io::stdout().lock(), table.inner(), true)?;
        }
        Command::Summary { paths } => {
            let mut batches = Vec::new();
            for path in &paths {
                batches.extend(
                    read_plan_csv(path).with_context(|| format!("reading {}", path.display()))?,
                );
            }
            let summary = PlanSummary::from_batches(&batches)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
