//! CSV and JSON persistence for search runs.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use dse_optimizer::{GenerationSummary, SearchReport, TrialSink};
use dse_types::{DseError, DseResult, TrialRecord};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

pub const TRIALS_FILE: &str = "trials.csv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const GENERATION_HISTORY_FILE: &str = "generation_history.csv";

fn sink_error(e: impl std::fmt::Display) -> DseError {
    DseError::Sink(e.to_string())
}

/// Writes one CSV row per trial with the columns `action`, `reward`, `obs`.
///
/// Actions and observations are JSON-encoded; invalid trials leave the
/// reward cell empty.
pub struct CsvTrialSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvTrialSink {
    /// Create `trials.csv` in `dir`, replacing any previous file.
    pub fn create<P: AsRef<Path>>(dir: P) -> DseResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(TRIALS_FILE);
        let mut writer = csv::Writer::from_path(&path).map_err(sink_error)?;
        writer
            .write_record(["action", "reward", "obs"])
            .map_err(sink_error)?;
        writer.flush()?;
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl TrialSink for CsvTrialSink {
    fn write_trials(&mut self, records: &[TrialRecord]) -> DseResult<()> {
        for record in records {
            let action = serde_json::to_string(&record.action)?;
            let reward = record.reward.map(|r| r.to_string()).unwrap_or_default();
            let obs = serde_json::to_string(&record.observation)?;
            self.writer
                .write_record([action.as_str(), reward.as_str(), obs.as_str()])
                .map_err(sink_error)?;
        }
        self.writer.flush()?;
        self.rows += records.len();
        debug!(rows = self.rows, path = %self.path.display(), "appended trial rows");
        Ok(())
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    experiment: &'a str,
    run_id: String,
    strategy: &'a str,
    started_at: Option<String>,
    finished_at: Option<String>,
    dimension_count: usize,
    trials: usize,
    trials_invalid: usize,
    best_reward: Option<f64>,
    best_action: Option<Value>,
    best_observation: Option<&'a Value>,
    best_trial: Option<usize>,
}

/// Write `summary.json` with the best action, reward and observation.
pub fn write_summary(dir: &Path, experiment: &str, report: &SearchReport) -> DseResult<PathBuf> {
    let best = report.best.as_ref();
    let summary = RunSummary {
        experiment,
        run_id: report.status.id.to_string(),
        strategy: &report.status.strategy,
        started_at: report.status.started_at.map(|t| t.to_rfc3339()),
        finished_at: report.status.finished_at.map(|t| t.to_rfc3339()),
        dimension_count: report.dimension_count,
        trials: report.trials.len(),
        trials_invalid: report.trials_invalid,
        best_reward: best.map(|b| b.reward),
        best_action: best.map(|b| serde_json::to_value(&b.action)).transpose()?,
        best_observation: best.map(|b| &b.observation),
        best_trial: best.map(|b| b.trial_number),
    };

    fs::create_dir_all(dir)?;
    let path = dir.join(SUMMARY_FILE);
    fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
    info!(path = %path.display(), best_reward = ?summary.best_reward, "wrote run summary");
    Ok(path)
}

/// Write per-generation objectives: `generation, best_reward, objective_0..`.
pub fn write_generation_history(
    dir: &Path,
    generations: &[GenerationSummary],
) -> DseResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(GENERATION_HISTORY_FILE);
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&path)
        .map_err(sink_error)?;

    let width = generations
        .iter()
        .map(|g| g.objectives.len())
        .max()
        .unwrap_or(0);
    let mut header = vec!["generation".to_string(), "best_reward".to_string()];
    header.extend((0..width).map(|i| format!("objective_{i}")));
    writer.write_record(&header).map_err(sink_error)?;

    for generation in generations {
        let mut row = vec![
            generation.generation.to_string(),
            generation
                .best_reward
                .map(|r| r.to_string())
                .unwrap_or_default(),
        ];
        row.extend(generation.objectives.iter().map(|o| o.to_string()));
        writer.write_record(&row).map_err(sink_error)?;
    }
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dse_optimizer::{BestTrial, RunStatus};
    use dse_types::{TrialAction, TrialOutcome};
    use serde_json::json;

    fn records() -> Vec<TrialRecord> {
        vec![
            TrialRecord::new(
                0,
                0,
                TrialAction::Vector(vec![1.0, 3.0, 6.0]),
                TrialOutcome::Scored {
                    reward: 2.5,
                    observation: json!({"latency": 0.4}),
                },
            ),
            TrialRecord::new(
                1,
                0,
                TrialAction::Vector(vec![0.0, 1.0, 1.0]),
                TrialOutcome::Invalid {
                    reason: "timeout".into(),
                },
            ),
        ]
    }

    #[test]
    fn trial_csv_has_action_reward_obs_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvTrialSink::create(dir.path()).unwrap();
        let records = records();
        sink.write_trials(&records[..1]).unwrap();
        sink.write_trials(&records[1..]).unwrap();
        assert_eq!(sink.rows(), 2);

        let mut reader = csv::Reader::from_path(sink.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["action", "reward", "obs"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "[1.0,3.0,6.0]");
        assert_eq!(&rows[0][1], "2.5");
        assert_eq!(&rows[0][2], r#"{"latency":0.4}"#);
        assert_eq!(&rows[1][1], "");
        assert_eq!(&rows[1][2], "null");
    }

    #[test]
    fn summary_and_history_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut status = RunStatus::new("genetic");
        status.mark_running();
        status.mark_completed();
        let trials = records();
        let report = SearchReport {
            status,
            dimension_count: 2,
            best: Some(BestTrial {
                trial_number: 0,
                reward: 2.5,
                observation: json!({"latency": 0.4}),
                action: TrialAction::Vector(vec![1.0, 3.0, 6.0]),
            }),
            trials,
            trials_invalid: 1,
            generations: vec![GenerationSummary {
                generation: 0,
                objectives: vec![-2.5, f64::INFINITY],
                best_reward: Some(2.5),
            }],
        };

        let path = write_summary(dir.path(), "resnet18_num_iter_1", &report).unwrap();
        let summary: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(summary["best_reward"], json!(2.5));
        assert_eq!(summary["best_action"], json!([1.0, 3.0, 6.0]));
        assert_eq!(summary["trials_invalid"], json!(1));
        assert_eq!(summary["strategy"], json!("genetic"));

        let path = write_generation_history(dir.path(), &report.generations).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("generation,best_reward,objective_0,objective_1"));
        assert_eq!(lines.next(), Some("0,2.5,-2.5,inf"));
    }
}
