//! # dse-runner
//!
//! Runs knob-space exploration experiments against an external simulator
//! command and persists every trial.

pub mod baseline;
pub mod config;
pub mod runner;
pub mod simulator;
pub mod sink;

pub use config::{ExperimentConfig, SimulatorConfig, Strategy};
pub use runner::{build_driver, prepare, run_experiment, run_with_env, ExperimentOutcome};
pub use simulator::CommandSimulator;
pub use sink::CsvTrialSink;
