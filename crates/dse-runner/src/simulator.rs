//! Process-backed simulator environment.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use dse_optimizer::{SimulatorEnv, StepResult};
use dse_types::{Configuration, DseResult, Observation, SimulationFailure};
use serde::Deserialize;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::baseline;
use crate::config::SimulatorConfig;

/// Last stdout line of a simulator run.
#[derive(Debug, Deserialize)]
struct SimulatorOutput {
    reward: f64,
    #[serde(default)]
    observation: Observation,
    #[serde(default = "default_valid")]
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn default_valid() -> bool {
    true
}

/// Runs an external command once per step.
///
/// Each step writes the candidate into the work directory
/// (`network.json`, `system.txt`, `workload.txt`, `configuration.json`),
/// runs the command there with `DSE_WORK_DIR` set, and reads the last
/// non-empty stdout line as `{"reward": .., "observation": .., "valid": ..}`.
/// A child that outlives the deadline is killed.
pub struct CommandSimulator {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    timeout: Duration,
    runtime: Runtime,
    steps: usize,
    useful_steps: usize,
    episode: usize,
}

impl CommandSimulator {
    pub fn new(config: &SimulatorConfig, work_dir: PathBuf) -> DseResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            work_dir,
            timeout: Duration::from_millis(config.timeout_ms),
            runtime,
            steps: 0,
            useful_steps: 0,
            episode: 0,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Steps taken across all episodes.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Steps that produced a valid reward.
    pub fn useful_steps(&self) -> usize {
        self.useful_steps
    }

    async fn execute(&self) -> Result<std::process::Output, SimulationFailure> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .env("DSE_WORK_DIR", &self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SimulationFailure::Internal {
                message: format!("failed to spawn {}: {}", self.program, e),
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SimulationFailure::Internal {
                message: format!("failed to wait for {}: {}", self.program, e),
            }),
            Err(_) => Err(SimulationFailure::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn parse_output(stdout: &[u8]) -> Result<StepResult, SimulationFailure> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| SimulationFailure::MalformedOutput {
            message: "simulator produced no output".to_string(),
        })?;

    let output: SimulatorOutput =
        serde_json::from_str(line).map_err(|e| SimulationFailure::MalformedOutput {
            message: format!("{e}: {line}"),
        })?;

    if !output.valid {
        return Err(SimulationFailure::InvalidConfiguration {
            reason: output
                .reason
                .unwrap_or_else(|| "simulator marked the configuration invalid".to_string()),
        });
    }
    if !output.reward.is_finite() {
        return Err(SimulationFailure::NonFiniteReward {
            reward: output.reward,
        });
    }
    Ok(StepResult::terminal(output.reward, output.observation))
}

impl SimulatorEnv for CommandSimulator {
    fn reset(&mut self) -> Result<(), SimulationFailure> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| SimulationFailure::Internal {
            message: format!("cannot create {}: {}", self.work_dir.display(), e),
        })?;
        self.episode += 1;
        debug!(episode = self.episode, work_dir = %self.work_dir.display(), "simulator reset");
        Ok(())
    }

    fn step(&mut self, configuration: &Configuration) -> Result<StepResult, SimulationFailure> {
        self.steps += 1;
        baseline::write_inputs(configuration, &self.work_dir).map_err(|e| {
            SimulationFailure::Internal {
                message: e.to_string(),
            }
        })?;

        let output = self.runtime.block_on(self.execute())?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(step = self.steps, status = %output.status, "simulator exited with failure");
            return Err(SimulationFailure::ProcessFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let result = parse_output(&output.stdout)?;
        self.useful_steps += 1;
        info!(
            step = self.steps,
            useful = self.useful_steps,
            reward = result.reward,
            "simulator step"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dse_types::ConfigSection;
    use serde_json::json;

    fn configuration() -> Configuration {
        let system: ConfigSection = [("scheduling-policy".to_string(), json!("LIFO"))]
            .into_iter()
            .collect();
        let network: ConfigSection = [("dimensions-count".to_string(), json!(2))]
            .into_iter()
            .collect();
        Configuration::new(system, network, "allreduce.txt")
    }

    fn shell(script: &str, timeout_ms: u64, dir: &Path) -> CommandSimulator {
        let config = SimulatorConfig::new("sh")
            .with_args(["-c", script])
            .with_timeout_ms(timeout_ms);
        let mut sim = CommandSimulator::new(&config, dir.to_path_buf()).unwrap();
        sim.reset().unwrap();
        sim
    }

    #[test]
    fn parses_last_line_of_stdout() {
        let step = parse_output(b"loading\n{\"reward\": 2.5, \"observation\": {\"latency\": 4}}\n\n")
            .unwrap();
        assert_eq!(step.reward, 2.5);
        assert_eq!(step.observation, json!({"latency": 4}));
    }

    #[test]
    fn rejects_invalid_and_malformed_output() {
        assert!(matches!(
            parse_output(b"{\"reward\": 1.0, \"valid\": false, \"reason\": \"deadlock\"}"),
            Err(SimulationFailure::InvalidConfiguration { reason }) if reason == "deadlock"
        ));
        assert!(matches!(
            parse_output(b"reward=3"),
            Err(SimulationFailure::MalformedOutput { .. })
        ));
        assert!(matches!(
            parse_output(b"  \n"),
            Err(SimulationFailure::MalformedOutput { .. })
        ));
    }

    #[test]
    fn runs_command_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"grep -q "scheduling-policy: LIFO" system.txt && echo '{"reward": 0.75, "observation": [1, 2]}'"#;
        let mut sim = shell(script, 10_000, dir.path());

        let step = sim.step(&configuration()).unwrap();
        assert_eq!(step.reward, 0.75);
        assert_eq!(step.observation, json!([1, 2]));
        assert_eq!(sim.useful_steps(), 1);
        assert!(dir.path().join("configuration.json").exists());
    }

    #[test]
    fn non_zero_exit_is_a_process_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = shell("echo broken >&2; exit 3", 10_000, dir.path());
        match sim.step(&configuration()) {
            Err(SimulationFailure::ProcessFailed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("expected process failure, got {other:?}"),
        }
        assert_eq!(sim.steps(), 1);
        assert_eq!(sim.useful_steps(), 0);
    }

    #[test]
    fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = shell("sleep 5", 100, dir.path());
        assert_eq!(
            sim.step(&configuration()),
            Err(SimulationFailure::Timeout { timeout_ms: 100 })
        );
    }

    #[test]
    fn missing_program_is_internal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulatorConfig::new("/nonexistent/simulator-binary");
        let mut sim = CommandSimulator::new(&config, dir.path().to_path_buf()).unwrap();
        assert!(matches!(
            sim.step(&configuration()),
            Err(SimulationFailure::Internal { .. })
        ));
    }
}
