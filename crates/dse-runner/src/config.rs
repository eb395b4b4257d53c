//! Experiment configuration.

use std::fs;
use std::path::{Path, PathBuf};

use dse_optimizer::{GaConfig, RandomWalkConfig};
use dse_types::{config_error, validation_error, DseResult};
use serde::{Deserialize, Serialize};

/// Which search strategy an experiment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Genetic,
    RandomWalk,
}

impl Strategy {
    /// Directory under `summary_dir` that holds this strategy's logs.
    pub fn log_dir_name(&self) -> &'static str {
        match self {
            Strategy::Genetic => "ga_logs",
            Strategy::RandomWalk => "random_walker_logs",
        }
    }

    pub fn default_num_steps(&self) -> usize {
        match self {
            Strategy::Genetic => 20,
            Strategy::RandomWalk => 50,
        }
    }
}

/// How to launch the simulator for each candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Where candidate inputs are written; `<log dir>/sim` when unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Per-call deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    600_000
}

impl SimulatorConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// Top-level configuration for one exploration experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub strategy: Strategy,

    /// Workload name used in the experiment name.
    #[serde(default = "default_workload")]
    pub workload: String,

    pub knobs_path: PathBuf,
    pub network_path: PathBuf,
    pub system_path: PathBuf,
    pub workload_path: PathBuf,

    #[serde(default = "default_summary_dir")]
    pub summary_dir: PathBuf,
    #[serde(default = "default_reward_formulation")]
    pub reward_formulation: String,

    /// GA generations or random-walk steps per episode. Strategy default
    /// when unset.
    #[serde(default)]
    pub num_steps: Option<usize>,
    #[serde(default = "default_num_episodes")]
    pub num_episodes: usize,
    /// GA population size.
    #[serde(default = "default_num_agents")]
    pub num_agents: usize,
    #[serde(default = "default_prob_mutation")]
    pub prob_mutation: f64,
    #[serde(default)]
    pub seed: Option<u64>,

    pub simulator: SimulatorConfig,
}

fn default_workload() -> String {
    "resnet18".to_string()
}

fn default_summary_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_reward_formulation() -> String {
    "latency".to_string()
}

fn default_num_episodes() -> usize {
    1
}

fn default_num_agents() -> usize {
    4
}

fn default_prob_mutation() -> f64 {
    0.1
}

impl ExperimentConfig {
    pub fn new(
        strategy: Strategy,
        knobs_path: impl Into<PathBuf>,
        network_path: impl Into<PathBuf>,
        system_path: impl Into<PathBuf>,
        workload_path: impl Into<PathBuf>,
        simulator: SimulatorConfig,
    ) -> Self {
        Self {
            strategy,
            workload: default_workload(),
            knobs_path: knobs_path.into(),
            network_path: network_path.into(),
            system_path: system_path.into(),
            workload_path: workload_path.into(),
            summary_dir: default_summary_dir(),
            reward_formulation: default_reward_formulation(),
            num_steps: None,
            num_episodes: default_num_episodes(),
            num_agents: default_num_agents(),
            prob_mutation: default_prob_mutation(),
            seed: None,
            simulator,
        }
    }

    /// Load from a JSON file. Relative paths inside the document are
    /// resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DseResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        let mut config: Self = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for p in [
            &mut self.knobs_path,
            &mut self.network_path,
            &mut self.system_path,
            &mut self.workload_path,
            &mut self.summary_dir,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let Some(dir) = self.simulator.work_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_workload(mut self, workload: &str) -> Self {
        self.workload = workload.to_string();
        self
    }

    pub fn with_summary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.summary_dir = dir.into();
        self
    }

    pub fn with_reward_formulation(mut self, formulation: &str) -> Self {
        self.reward_formulation = formulation.to_string();
        self
    }

    pub fn with_num_steps(mut self, n: usize) -> Self {
        self.num_steps = Some(n);
        self
    }

    pub fn with_num_episodes(mut self, n: usize) -> Self {
        self.num_episodes = n;
        self
    }

    pub fn with_num_agents(mut self, n: usize) -> Self {
        self.num_agents = n;
        self
    }

    pub fn with_prob_mutation(mut self, p: f64) -> Self {
        self.prob_mutation = p;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
            .unwrap_or_else(|| self.strategy.default_num_steps())
    }

    pub fn validate(&self) -> DseResult<()> {
        if self.simulator.program.trim().is_empty() {
            return Err(validation_error!("simulator program must not be empty"));
        }
        if self.simulator.timeout_ms == 0 {
            return Err(validation_error!("simulator timeout must be positive"));
        }
        if self.workload.is_empty() {
            return Err(validation_error!("workload name must not be empty"));
        }
        if self.strategy == Strategy::Genetic {
            self.ga_config().genetic.validate()?;
        }
        Ok(())
    }

    /// `{workload}_num_iter_{steps}_num_agents_{agents}_prob_mut_{p}` for GA,
    /// `{workload}_num_steps_{steps}_num_episodes_{episodes}` for the random
    /// walk.
    pub fn experiment_name(&self) -> String {
        match self.strategy {
            Strategy::Genetic => format!(
                "{}_num_iter_{}_num_agents_{}_prob_mut_{}",
                self.workload,
                self.num_steps(),
                self.num_agents,
                format_float(self.prob_mutation)
            ),
            Strategy::RandomWalk => format!(
                "{}_num_steps_{}_num_episodes_{}",
                self.workload,
                self.num_steps(),
                self.num_episodes
            ),
        }
    }

    /// `{summary_dir}/{ga_logs|random_walker_logs}/{reward_formulation}/{name}`
    pub fn log_dir(&self) -> PathBuf {
        self.summary_dir
            .join(self.strategy.log_dir_name())
            .join(&self.reward_formulation)
            .join(self.experiment_name())
    }

    pub fn ga_config(&self) -> GaConfig {
        let config = GaConfig::default()
            .with_num_steps(self.num_steps())
            .with_population_size(self.num_agents)
            .with_mutation_probability(self.prob_mutation);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }

    pub fn random_walk_config(&self) -> RandomWalkConfig {
        let config = RandomWalkConfig::default()
            .with_num_episodes(self.num_episodes)
            .with_num_steps(self.num_steps());
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

/// Whole numbers keep one decimal, so `1.0` names as `1.0` rather than `1`.
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
