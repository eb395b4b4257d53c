//! Trial records: what was proposed, what the simulator said.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Configuration;

/// One optimizer-facing candidate: a slot per (knob, dimension) pair.
pub type FlatVector = Vec<f64>;

/// Opaque simulator observation.
pub type Observation = Value;

/// The action recorded for a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrialAction {
    /// Raw optimizer vector (GA and other vector-based proposers).
    Vector(FlatVector),
    /// Fully merged configuration (random walk).
    Configuration(Configuration),
}

/// What came back from evaluating a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Scored { reward: f64, observation: Observation },
    /// The simulator failed or rejected the configuration. Never a best
    /// candidate.
    Invalid { reason: String },
}

impl TrialOutcome {
    pub fn reward(&self) -> Option<f64> {
        match self {
            Self::Scored { reward, .. } => Some(*reward),
            Self::Invalid { .. } => None,
        }
    }

    pub fn observation(&self) -> Option<&Observation> {
        match self {
            Self::Scored { observation, .. } => Some(observation),
            Self::Invalid { .. } => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Scored { .. })
    }
}

/// A single completed trial. Field names `action`, `reward` and `obs` are
/// what downstream CSV and plotting consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Zero-based position in the run's evaluation order.
    pub trial_number: usize,
    /// GA generation or random-walk episode the trial belongs to.
    pub episode: usize,
    pub action: TrialAction,
    /// `None` for invalid trials.
    pub reward: Option<f64>,
    #[serde(rename = "obs")]
    pub observation: Observation,
    /// Failure reason for invalid trials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TrialRecord {
    pub fn new(trial_number: usize, episode: usize, action: TrialAction, outcome: TrialOutcome) -> Self {
        let (reward, observation, failure) = match outcome {
            TrialOutcome::Scored {
                reward,
                observation,
            } => (Some(reward), observation, None),
            TrialOutcome::Invalid { reason } => (None, Value::Null, Some(reason)),
        };
        Self {
            trial_number,
            episode,
            action,
            reward,
            observation,
            failure,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.reward.is_some()
    }
}
