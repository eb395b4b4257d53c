//! Experiment wiring: knobs + baseline + simulator + sinks.

use std::fs;
use std::path::PathBuf;

use dse_optimizer::{
    spec, GaSearch, RandomWalkSearch, SearchDriver, SearchReport, SearchSpace, SimulatorEnv,
};
use dse_types::{config_error, Configuration, DseResult};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::baseline;
use crate::config::{ExperimentConfig, Strategy};
use crate::simulator::CommandSimulator;
use crate::sink::{write_generation_history, write_summary, CsvTrialSink};

/// What a finished experiment produced.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub name: String,
    pub log_dir: PathBuf,
    pub report: SearchReport,
}

/// Load the knob specification and baseline, and resolve the search space.
pub fn prepare(config: &ExperimentConfig) -> DseResult<(SearchSpace, Configuration)> {
    let source = fs::read_to_string(&config.knobs_path).map_err(|e| {
        config_error!("cannot read knob spec {}: {}", config.knobs_path.display(), e)
    })?;
    let knobs = spec::load(&source)?;
    let baseline = baseline::load_baseline(
        &config.network_path,
        &config.system_path,
        &config.workload_path,
    )?;

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let space = SearchSpace::resolve(knobs, baseline.dimension_count(), &mut rng)?;
    info!(
        knobs = space.knobs().len(),
        vector_len = space.len(),
        dimensions = space.dimension_count(),
        source = ?space.dimension_source(),
        candidates = ?space.cardinality(),
        "resolved search space"
    );
    Ok((space, baseline))
}

pub fn build_driver(
    config: &ExperimentConfig,
    space: SearchSpace,
    baseline: Configuration,
) -> DseResult<Box<dyn SearchDriver>> {
    let driver: Box<dyn SearchDriver> = match config.strategy {
        Strategy::Genetic => Box::new(GaSearch::new(space, baseline, config.ga_config())?),
        Strategy::RandomWalk => Box::new(RandomWalkSearch::new(
            space,
            baseline,
            config.random_walk_config(),
        )),
    };
    Ok(driver)
}

/// Run an experiment against any simulator environment, writing
/// `trials.csv`, `summary.json` and, for GA, `generation_history.csv` into
/// the experiment's log directory.
pub fn run_with_env(
    config: &ExperimentConfig,
    env: &mut dyn SimulatorEnv,
) -> DseResult<ExperimentOutcome> {
    config.validate()?;
    let (space, baseline) = prepare(config)?;
    let name = config.experiment_name();
    let log_dir = config.log_dir();
    info!(experiment = %name, log_dir = %log_dir.display(), strategy = ?config.strategy, "starting experiment");

    let mut sink = CsvTrialSink::create(&log_dir)?;
    let mut driver = build_driver(config, space, baseline)?;
    let report = driver.run(env, &mut sink)?;

    write_summary(&log_dir, &name, &report)?;
    if !report.generations.is_empty() {
        write_generation_history(&log_dir, &report.generations)?;
    }

    Ok(ExperimentOutcome {
        name,
        log_dir,
        report,
    })
}

/// Run an experiment against the configured simulator command.
pub fn run_experiment(config: &ExperimentConfig) -> DseResult<ExperimentOutcome> {
    let work_dir = config
        .simulator
        .work_dir
        .clone()
        .unwrap_or_else(|| config.log_dir().join("sim"));
    let mut simulator = CommandSimulator::new(&config.simulator, work_dir)?;
    let outcome = run_with_env(config, &mut simulator)?;
    info!(
        steps = simulator.steps(),
        useful_steps = simulator.useful_steps(),
        "simulator finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::sink::{GENERATION_HISTORY_FILE, SUMMARY_FILE, TRIALS_FILE};
    use dse_optimizer::{FnSimulator, StepResult};
    use dse_types::{SimulationFailure, TrialAction};
    use serde_json::{json, Value};
    use std::path::Path;

    const KNOBS: &str = r#"{
        "system": {
            "scheduling-policy": {"domain": {"set": ["FIFO", "LIFO"]}, "replication": "uniform"},
            "preferred-dataset-splits": {"domain": {"range": [16, 64, 16]}, "replication": "scalar"}
        },
        "network": {
            "links-count": {"domain": {"range": [1, 4, 1]}, "replication": "per-dimension"}
        }
    }"#;

    const NETWORK: &str = r#"{"topology-name": "Hierarchical", "dimensions-count": 3, "links-count": [2, 2, 2]}"#;

    const SYSTEM: &str = "scheduling-policy: FIFO\nendpoint-delay: 10\npreferred-dataset-splits: 16\n";

    fn experiment(dir: &Path, strategy: Strategy) -> ExperimentConfig {
        fs::write(dir.join("knobs.json"), KNOBS).unwrap();
        fs::write(dir.join("network.json"), NETWORK).unwrap();
        fs::write(dir.join("system.txt"), SYSTEM).unwrap();
        ExperimentConfig::new(
            strategy,
            dir.join("knobs.json"),
            dir.join("network.json"),
            dir.join("system.txt"),
            "workload/allreduce_0.65.txt",
            SimulatorConfig::new("unused"),
        )
        .with_summary_dir(dir.join("runs"))
        .with_seed(7)
    }

    fn links(config: &Configuration) -> f64 {
        config
            .network
            .get("links-count")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_f64).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn prepare_uses_template_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let config = experiment(dir.path(), Strategy::Genetic);
        let (space, baseline) = prepare(&config).unwrap();
        assert_eq!(space.dimension_count(), 3);
        // policy (1) + splits (1) + links (3)
        assert_eq!(space.len(), 5);
        assert_eq!(space.bounds().upper, vec![1.0, 64.0, 4.0, 4.0, 4.0]);
        assert_eq!(baseline.workload_path(), Some("workload/allreduce_0.65.txt"));
    }

    #[test]
    fn genetic_experiment_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = experiment(dir.path(), Strategy::Genetic)
            .with_num_steps(3)
            .with_num_agents(4);
        let mut env = FnSimulator::new(|config: &Configuration| {
            Ok(StepResult::terminal(links(config), json!({ "links": links(config) })))
        });

        let outcome = run_with_env(&config, &mut env).unwrap();

        assert_eq!(outcome.name, "resnet18_num_iter_3_num_agents_4_prob_mut_0.1");
        assert_eq!(outcome.report.trials.len(), 12);
        assert!(outcome.log_dir.ends_with(
            "ga_logs/latency/resnet18_num_iter_3_num_agents_4_prob_mut_0.1"
        ));
        assert!(outcome.log_dir.join(SUMMARY_FILE).exists());
        assert!(outcome.log_dir.join(GENERATION_HISTORY_FILE).exists());

        let mut reader = csv::Reader::from_path(outcome.log_dir.join(TRIALS_FILE)).unwrap();
        assert_eq!(reader.records().count(), 12);

        let best = outcome.report.best.unwrap();
        assert!(matches!(best.action, TrialAction::Vector(ref v) if v.len() == 5));
    }

    #[test]
    fn random_walk_experiment_survives_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = experiment(dir.path(), Strategy::RandomWalk)
            .with_num_steps(5)
            .with_num_episodes(2);
        let mut calls = 0;
        let mut env = FnSimulator::new(|config: &Configuration| {
            calls += 1;
            if calls % 2 == 0 {
                Err(SimulationFailure::Timeout { timeout_ms: 10 })
            } else {
                Ok(StepResult::terminal(links(config), json!(null)))
            }
        });

        let outcome = run_with_env(&config, &mut env).unwrap();

        assert_eq!(outcome.report.trials.len(), 10);
        assert_eq!(outcome.report.trials_invalid, 5);
        assert!(outcome.report.best_reward().unwrap() >= 3.0);
        assert!(!outcome.log_dir.join(GENERATION_HISTORY_FILE).exists());
        assert_eq!(env.resets(), 2);

        // Every recorded configuration carries the resolved dimension count.
        for trial in &outcome.report.trials {
            if let TrialAction::Configuration(c) = &trial.action {
                assert_eq!(c.dimension_count(), Some(3));
                assert_eq!(c.system.get("endpoint-delay"), Some(&json!(10)));
            }
        }
    }

    #[test]
    fn bad_knob_spec_aborts_before_simulating() {
        let dir = tempfile::tempdir().unwrap();
        let config = experiment(dir.path(), Strategy::RandomWalk);
        fs::write(
            &config.knobs_path,
            r#"{"system": {"x": {"domain": {"range": [1, 2]}, "replication": "scalar"}}}"#,
        )
        .unwrap();
        let mut env = FnSimulator::new(|_: &Configuration| -> Result<StepResult, SimulationFailure> {
            panic!("simulator must not run")
        });
        assert!(run_with_env(&config, &mut env).is_err());
    }
}
