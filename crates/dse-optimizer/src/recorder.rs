//! Trial recording, best-so-far tracking and run lifecycle.

use chrono::{DateTime, Utc};
use dse_types::{DseResult, Observation, TrialAction, TrialRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Unique search run identifier.
pub type RunId = Uuid;

/// Persistence collaborator for trial records. The core never touches the
/// filesystem itself; implementations decide the format.
pub trait TrialSink {
    /// Receive records in trial order. Called with only the records not yet
    /// handed over by a previous flush.
    fn write_trials(&mut self, records: &[TrialRecord]) -> DseResult<()>;
}

/// Sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<TrialRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TrialRecord> {
        self.records
    }
}

impl TrialSink for MemorySink {
    fn write_trials(&mut self, records: &[TrialRecord]) -> DseResult<()> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}

/// Append-only trial log.
///
/// Records are kept in call order and are never dropped, reordered or
/// deduplicated. `flush` hands over whatever was recorded since the last
/// successful flush.
#[derive(Debug, Clone, Default)]
pub struct TrialRecorder {
    records: Vec<TrialRecord>,
    flushed: usize,
}

impl TrialRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records not yet handed to a sink.
    pub fn pending(&self) -> usize {
        self.records.len() - self.flushed
    }

    pub fn flush(&mut self, sink: &mut dyn TrialSink) -> DseResult<()> {
        let pending = &self.records[self.flushed..];
        if pending.is_empty() {
            return Ok(());
        }
        sink.write_trials(pending)?;
        debug!(count = pending.len(), "flushed trial records");
        self.flushed = self.records.len();
        Ok(())
    }

    pub fn into_records(self) -> Vec<TrialRecord> {
        self.records
    }
}

/// When a new reward replaces the current best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImprovementRule {
    /// Best starts at zero; only rewards strictly above it count, so zero
    /// and negative rewards never become best.
    PositiveSignal,
    /// The first scored trial is best; afterwards strictly greater wins.
    AnyFinite,
}

impl ImprovementRule {
    pub fn improves(&self, candidate: f64, current: Option<f64>) -> bool {
        match (self, current) {
            (Self::PositiveSignal, current) => candidate > current.unwrap_or(0.0),
            (Self::AnyFinite, None) => true,
            (Self::AnyFinite, Some(current)) => candidate > current,
        }
    }
}

/// Best trial seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub trial_number: usize,
    pub reward: f64,
    pub observation: Observation,
    pub action: TrialAction,
}

/// Best-so-far tracking plus the trial history of one run.
#[derive(Debug, Clone)]
pub struct SearchState {
    rule: ImprovementRule,
    best: Option<BestTrial>,
    recorder: TrialRecorder,
    trials_invalid: usize,
}

impl SearchState {
    pub fn new(rule: ImprovementRule) -> Self {
        Self {
            rule,
            best: None,
            recorder: TrialRecorder::new(),
            trials_invalid: 0,
        }
    }

    /// Record a completed trial and update the best. Returns `true` when the
    /// trial became the new best.
    pub fn observe(&mut self, record: TrialRecord) -> bool {
        let improved = match record.reward {
            Some(reward) => self.rule.improves(reward, self.best_reward()),
            None => {
                self.trials_invalid += 1;
                false
            }
        };

        if improved {
            if let Some(reward) = record.reward {
                info!(
                    trial = record.trial_number,
                    reward,
                    previous = ?self.best_reward(),
                    "new best reward"
                );
                self.best = Some(BestTrial {
                    trial_number: record.trial_number,
                    reward,
                    observation: record.observation.clone(),
                    action: record.action.clone(),
                });
            }
        }

        self.recorder.record(record);
        improved
    }

    pub fn best(&self) -> Option<&BestTrial> {
        self.best.as_ref()
    }

    pub fn best_reward(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.reward)
    }

    pub fn history(&self) -> &[TrialRecord] {
        self.recorder.records()
    }

    pub fn recorder_mut(&mut self) -> &mut TrialRecorder {
        &mut self.recorder
    }

    pub fn trials_completed(&self) -> usize {
        self.recorder.len()
    }

    pub fn trials_invalid(&self) -> usize {
        self.trials_invalid
    }

    pub fn into_parts(self) -> (Option<BestTrial>, Vec<TrialRecord>) {
        (self.best, self.recorder.into_records())
    }
}

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Identity and timing of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub strategy: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(strategy: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy: strategy.to_string(),
            state: RunState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Wall-clock duration once the run has both started and finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
