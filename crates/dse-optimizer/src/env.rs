//! Simulator environment contract and the single evaluation entry point.

use dse_types::{
    ConfigOverrides, Configuration, Observation, SimulationFailure, TrialOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Position of a step within a simulator episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    First,
    Mid,
    Last,
}

/// What one simulator step returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub reward: f64,
    pub discount: f64,
    pub observation: Observation,
}

impl StepResult {
    /// A terminal step with unit discount, the shape single-step simulators
    /// produce.
    pub fn terminal(reward: f64, observation: Observation) -> Self {
        Self {
            status: StepStatus::Last,
            reward,
            discount: 1.0,
            observation,
        }
    }
}

/// A black-box simulator. `step` may be slow; drivers call it at most once
/// per candidate.
pub trait SimulatorEnv {
    fn reset(&mut self) -> Result<(), SimulationFailure>;

    fn step(&mut self, configuration: &Configuration) -> Result<StepResult, SimulationFailure>;
}

impl<E: SimulatorEnv + ?Sized> SimulatorEnv for Box<E> {
    fn reset(&mut self) -> Result<(), SimulationFailure> {
        (**self).reset()
    }

    fn step(&mut self, configuration: &Configuration) -> Result<StepResult, SimulationFailure> {
        (**self).step(configuration)
    }
}

/// Adapts a closure into a [`SimulatorEnv`]; handy for analytical cost
/// models and tests.
pub struct FnSimulator<F> {
    step_fn: F,
    resets: usize,
}

impl<F> FnSimulator<F>
where
    F: FnMut(&Configuration) -> Result<StepResult, SimulationFailure>,
{
    pub fn new(step_fn: F) -> Self {
        Self { step_fn, resets: 0 }
    }

    /// How many times the environment has been reset.
    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl<F> SimulatorEnv for FnSimulator<F>
where
    F: FnMut(&Configuration) -> Result<StepResult, SimulationFailure>,
{
    fn reset(&mut self) -> Result<(), SimulationFailure> {
        self.resets += 1;
        Ok(())
    }

    fn step(&mut self, configuration: &Configuration) -> Result<StepResult, SimulationFailure> {
        (self.step_fn)(configuration)
    }
}

/// The merged configuration that was submitted and what came back.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub configuration: Configuration,
    pub outcome: TrialOutcome,
}

/// Merge `overrides` over `baseline`, step the simulator once, and classify
/// the result.
///
/// Simulator errors and non-finite rewards become
/// [`TrialOutcome::Invalid`]; they never escape as errors.
pub fn evaluate_candidate<E: SimulatorEnv + ?Sized>(
    overrides: &ConfigOverrides,
    baseline: &Configuration,
    env: &mut E,
) -> Evaluation {
    let configuration = baseline.with_overrides(overrides);

    let outcome = match env.step(&configuration) {
        Ok(step) if step.reward.is_finite() => {
            debug!(reward = step.reward, "simulator step completed");
            TrialOutcome::Scored {
                reward: step.reward,
                observation: step.observation,
            }
        }
        Ok(step) => {
            let failure = SimulationFailure::NonFiniteReward {
                reward: step.reward,
            };
            warn!(error = %failure, "discarding simulator result");
            TrialOutcome::Invalid {
                reason: failure.to_string(),
            }
        }
        Err(failure) => {
            warn!(error = %failure, "simulation failed");
            TrialOutcome::Invalid {
                reason: failure.to_string(),
            }
        }
    };

    Evaluation {
        configuration,
        outcome,
    }
}
