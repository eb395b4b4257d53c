//! # dse-optimizer
//!
//! Design-space exploration over a black-box architecture simulator.
//!
//! Parses knob specifications, flattens them into the bounded vectors
//! numeric optimizers work on, decodes vectors back into simulator
//! configurations, and drives genetic-algorithm and random-walk searches
//! while recording every trial.

pub mod codec;
pub mod spec;

mod bounds;
mod driver;
mod env;
mod genetic;
mod recorder;
mod search;

pub use bounds::{
    compile_bounds, resolve_dimension_count, Bounds, DimensionSource, LayoutEntry, VectorLayout,
};
pub use driver::{
    GaConfig, GaSearch, GenerationSummary, RandomWalkConfig, RandomWalkSearch, SearchDriver,
    SearchReport,
};
pub use env::{evaluate_candidate, Evaluation, FnSimulator, SimulatorEnv, StepResult, StepStatus};
pub use genetic::{GeneticConfig, GeneticOptimizer, VectorOptimizer};
pub use recorder::{
    BestTrial, ImprovementRule, MemorySink, RunId, RunState, RunStatus, SearchState,
    TrialRecorder, TrialSink,
};
pub use search::SearchSpace;
