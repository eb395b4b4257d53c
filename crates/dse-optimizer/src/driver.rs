//! Search drivers: the propose → evaluate → record loop.

use dse_types::{Configuration, DseResult, TrialAction, TrialRecord};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::env::{evaluate_candidate, SimulatorEnv};
use crate::genetic::{GeneticConfig, GeneticOptimizer, VectorOptimizer};
use crate::recorder::{BestTrial, ImprovementRule, RunStatus, SearchState, TrialSink};
use crate::search::SearchSpace;

/// Common trait for all search strategies.
pub trait SearchDriver {
    /// Run the whole fixed budget. Only structural errors (decode, optimizer
    /// or sink failures) abort; simulator failures are recorded and skipped.
    fn run(
        &mut self,
        env: &mut dyn SimulatorEnv,
        sink: &mut dyn TrialSink,
    ) -> DseResult<SearchReport>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Objective values of one GA generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: usize,
    /// What the optimizer saw: `-reward`, `+inf` for invalid trials.
    pub objectives: Vec<f64>,
    /// Highest reward within this generation.
    pub best_reward: Option<f64>,
}

/// Outcome of a completed search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub status: RunStatus,
    pub dimension_count: usize,
    pub best: Option<BestTrial>,
    pub trials: Vec<TrialRecord>,
    pub trials_invalid: usize,
    /// Per-generation history; empty for strategies without generations.
    pub generations: Vec<GenerationSummary>,
}

impl SearchReport {
    pub fn best_reward(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.reward)
    }
}

fn reset_env(env: &mut dyn SimulatorEnv, episode: usize) {
    if let Err(failure) = env.reset() {
        warn!(episode, error = %failure, "simulator reset failed, continuing");
    }
}

fn finish(
    mut status: RunStatus,
    result: DseResult<(SearchState, Vec<GenerationSummary>)>,
    dimension_count: usize,
) -> DseResult<SearchReport> {
    match result {
        Ok((state, generations)) => {
            status.mark_completed();
            let trials_invalid = state.trials_invalid();
            let (best, trials) = state.into_parts();
            info!(
                run_id = %status.id,
                strategy = %status.strategy,
                trials = trials.len(),
                invalid = trials_invalid,
                best_reward = ?best.as_ref().map(|b| b.reward),
                "search completed"
            );
            Ok(SearchReport {
                status,
                dimension_count,
                best,
                trials,
                trials_invalid,
                generations,
            })
        }
        Err(e) => {
            status.mark_failed(e.to_string());
            error!(run_id = %status.id, strategy = %status.strategy, error = %e, "search failed");
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Genetic algorithm
// ---------------------------------------------------------------------------

/// GA run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaConfig {
    /// Number of generations.
    pub num_steps: usize,
    pub genetic: GeneticConfig,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            num_steps: 20,
            genetic: GeneticConfig::default(),
        }
    }
}

impl GaConfig {
    pub fn with_num_steps(mut self, n: usize) -> Self {
        self.num_steps = n;
        self
    }

    pub fn with_population_size(mut self, n: usize) -> Self {
        self.genetic = self.genetic.with_population_size(n);
        self
    }

    pub fn with_mutation_probability(mut self, p: f64) -> Self {
        self.genetic = self.genetic.with_mutation_probability(p);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.genetic = self.genetic.with_seed(seed);
        self
    }
}

/// Drives a [`VectorOptimizer`] against the simulator, one generation per
/// `ask`/`tell` round.
///
/// Rewards are maximized but the optimizer minimizes, so each reward is
/// negated on its way in; invalid trials are reported as `+inf`. The best
/// trial is tracked here, in reward terms.
pub struct GaSearch<O: VectorOptimizer = GeneticOptimizer> {
    space: SearchSpace,
    baseline: Configuration,
    num_steps: usize,
    optimizer: O,
}

impl GaSearch<GeneticOptimizer> {
    pub fn new(space: SearchSpace, baseline: Configuration, config: GaConfig) -> DseResult<Self> {
        let optimizer = GeneticOptimizer::new(space.bounds().clone(), config.genetic)?;
        Ok(Self::with_optimizer(space, baseline, config.num_steps, optimizer))
    }
}

impl<O: VectorOptimizer> GaSearch<O> {
    pub fn with_optimizer(
        space: SearchSpace,
        baseline: Configuration,
        num_steps: usize,
        optimizer: O,
    ) -> Self {
        Self {
            space,
            baseline,
            num_steps,
            optimizer,
        }
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    fn drive(
        &mut self,
        env: &mut dyn SimulatorEnv,
        sink: &mut dyn TrialSink,
    ) -> DseResult<(SearchState, Vec<GenerationSummary>)> {
        let mut state = SearchState::new(ImprovementRule::AnyFinite);
        let mut generations = Vec::with_capacity(self.num_steps);
        let mut trial_number = 0;

        reset_env(env, 0);
        for generation in 0..self.num_steps {
            let population = self.optimizer.ask();
            let mut objectives = Vec::with_capacity(population.len());
            let mut generation_best: Option<f64> = None;

            for vector in population {
                let overrides = self.space.decode(&vector)?;
                let evaluation = evaluate_candidate(&overrides, &self.baseline, env);
                let reward = evaluation.outcome.reward();
                debug!(generation, trial = trial_number, reward = ?reward, "evaluated individual");

                objectives.push(objective_for(reward));
                if let Some(r) = reward {
                    generation_best = Some(generation_best.map_or(r, |b| b.max(r)));
                }
                state.observe(TrialRecord::new(
                    trial_number,
                    generation,
                    TrialAction::Vector(vector),
                    evaluation.outcome,
                ));
                trial_number += 1;
            }

            self.optimizer.tell(&objectives)?;
            state.recorder_mut().flush(sink)?;
            info!(
                generation,
                generation_best = ?generation_best,
                best_reward = ?state.best_reward(),
                "generation complete"
            );
            generations.push(GenerationSummary {
                generation,
                objectives,
                best_reward: generation_best,
            });
        }

        Ok((state, generations))
    }
}

/// Minimized objective for a reward; invalid trials rank last.
fn objective_for(reward: Option<f64>) -> f64 {
    match reward {
        Some(r) => -r,
        None => f64::INFINITY,
    }
}

impl<O: VectorOptimizer> SearchDriver for GaSearch<O> {
    fn run(
        &mut self,
        env: &mut dyn SimulatorEnv,
        sink: &mut dyn TrialSink,
    ) -> DseResult<SearchReport> {
        let mut status = RunStatus::new("genetic");
        status.mark_running();
        info!(
            run_id = %status.id,
            optimizer = %self.optimizer.name(),
            generations = self.num_steps,
            vector_len = self.space.len(),
            dimensions = self.space.dimension_count(),
            "starting genetic search"
        );
        let result = self.drive(env, sink);
        finish(status, result, self.space.dimension_count())
    }

    fn name(&self) -> &str {
        "genetic"
    }
}

// ---------------------------------------------------------------------------
// Random walk
// ---------------------------------------------------------------------------

/// Random-walk run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkConfig {
    pub num_episodes: usize,
    /// Samples per episode.
    pub num_steps: usize,
    /// RNG seed; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            num_episodes: 1,
            num_steps: 50,
            seed: None,
        }
    }
}

impl RandomWalkConfig {
    pub fn with_num_episodes(mut self, n: usize) -> Self {
        self.num_episodes = n;
        self
    }

    pub fn with_num_steps(mut self, n: usize) -> Self {
        self.num_steps = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Uniform random sampling of the knob space.
///
/// The simulator is reset at the start of every episode. A reward replaces
/// the best only if it is positive and strictly greater, so zero never
/// becomes best.
pub struct RandomWalkSearch {
    space: SearchSpace,
    baseline: Configuration,
    config: RandomWalkConfig,
    rng: ChaCha8Rng,
}

impl RandomWalkSearch {
    pub fn new(space: SearchSpace, baseline: Configuration, config: RandomWalkConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            space,
            baseline,
            config,
            rng,
        }
    }

    fn drive(
        &mut self,
        env: &mut dyn SimulatorEnv,
        sink: &mut dyn TrialSink,
    ) -> DseResult<(SearchState, Vec<GenerationSummary>)> {
        let mut state = SearchState::new(ImprovementRule::PositiveSignal);
        let mut trial_number = 0;

        for episode in 0..self.config.num_episodes {
            reset_env(env, episode);
            for step in 0..self.config.num_steps {
                let overrides = self.space.sample(&mut self.rng);
                let evaluation = evaluate_candidate(&overrides, &self.baseline, env);
                debug!(
                    episode,
                    step,
                    trial = trial_number,
                    reward = ?evaluation.outcome.reward(),
                    "evaluated sample"
                );
                state.observe(TrialRecord::new(
                    trial_number,
                    episode,
                    TrialAction::Configuration(evaluation.configuration),
                    evaluation.outcome,
                ));
                trial_number += 1;
            }
            state.recorder_mut().flush(sink)?;
            info!(episode, best_reward = ?state.best_reward(), "episode complete");
        }

        Ok((state, Vec::new()))
    }
}

impl SearchDriver for RandomWalkSearch {
    fn run(
        &mut self,
        env: &mut dyn SimulatorEnv,
        sink: &mut dyn TrialSink,
    ) -> DseResult<SearchReport> {
        let mut status = RunStatus::new("random_walk");
        status.mark_running();
        info!(
            run_id = %status.id,
            episodes = self.config.num_episodes,
            steps = self.config.num_steps,
            dimensions = self.space.dimension_count(),
            "starting random walk"
        );
        let result = self.drive(env, sink);
        finish(status, result, self.space.dimension_count())
    }

    fn name(&self) -> &str {
        "random_walk"
    }
}
