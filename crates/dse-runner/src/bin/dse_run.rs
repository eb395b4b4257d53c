use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dse_runner::{run_experiment, ExperimentConfig, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dse-run", about = "Knob-space exploration over an architecture simulator")]
struct Cli {
    /// Experiment configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// GA generations or random-walk steps per episode.
    #[arg(long)]
    num_steps: Option<usize>,

    #[arg(long)]
    num_episodes: Option<usize>,

    /// GA population size.
    #[arg(long)]
    num_agents: Option<usize>,

    #[arg(long)]
    prob_mutation: Option<f64>,

    #[arg(long)]
    workload: Option<String>,

    #[arg(long)]
    summary_dir: Option<PathBuf>,

    #[arg(long)]
    reward_formulation: Option<String>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Genetic,
    RandomWalk,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Strategy {
        match value {
            StrategyArg::Genetic => Strategy::Genetic,
            StrategyArg::RandomWalk => Strategy::RandomWalk,
        }
    }
}

impl Cli {
    fn apply(self, mut config: ExperimentConfig) -> ExperimentConfig {
        if let Some(strategy) = self.strategy {
            config = config.with_strategy(strategy.into());
        }
        if let Some(n) = self.num_steps {
            config = config.with_num_steps(n);
        }
        if let Some(n) = self.num_episodes {
            config = config.with_num_episodes(n);
        }
        if let Some(n) = self.num_agents {
            config = config.with_num_agents(n);
        }
        if let Some(p) = self.prob_mutation {
            config = config.with_prob_mutation(p);
        }
        if let Some(workload) = self.workload {
            config = config.with_workload(&workload);
        }
        if let Some(dir) = self.summary_dir {
            config = config.with_summary_dir(dir);
        }
        if let Some(formulation) = self.reward_formulation {
            config = config.with_reward_formulation(&formulation);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ExperimentConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let config = cli.apply(config);

    let outcome = run_experiment(&config)?;
    let report = &outcome.report;

    println!("Experiment: {}", outcome.name);
    println!("Logs: {}", outcome.log_dir.display());
    println!(
        "Trials: {} ({} invalid)",
        report.trials.len(),
        report.trials_invalid
    );
    match &report.best {
        Some(best) => {
            println!("Best Reward: {}", best.reward);
            println!("Best Observation: {}", best.observation);
            println!("Best Action: {}", serde_json::to_string(&best.action)?);
        }
        None => println!("No trial improved on the initial best"),
    }
    Ok(())
}
