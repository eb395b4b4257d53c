use thiserror::Error;

use crate::knobs::Section;

/// Main error type for a design-space exploration run.
///
/// Everything except [`SimulationFailure`] is structural: it means the knob
/// specification, the bounds or the vector layout are inconsistent, and the
/// run must stop before (or as soon as) it happens.
#[derive(Error, Debug)]
pub enum DseError {
    #[error("Knob specification error: {0}")]
    SpecParse(#[from] SpecParseError),

    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Simulation failure: {0}")]
    Simulation(#[from] SimulationFailure),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Malformed knob specification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecParseError {
    #[error("Knob specification is not valid JSON: {message}")]
    InvalidDocument { message: String },

    #[error("Unknown section `{section}` in knob specification")]
    UnknownSection { section: String },

    #[error("Section {section} must be an object of knobs")]
    SectionNotObject { section: Section },

    #[error("Knob {section}.{knob}: {message}")]
    MalformedKnob {
        section: Section,
        knob: String,
        message: String,
    },

    #[error("Knob {section}.{knob}: malformed domain: {message}")]
    MalformedDomain {
        section: Section,
        knob: String,
        message: String,
    },

    #[error("Knob {section}.{knob}: unrecognized replication `{value}`")]
    UnknownReplication {
        section: Section,
        knob: String,
        value: String,
    },

    #[error("Knob {section}.{knob} is declared more than once")]
    DuplicateKnob { section: Section, knob: String },
}

/// Failure while flattening knobs into optimizer bounds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Dimension count is neither a knob nor supplied by the network template")]
    UnresolvedDimensionCount,

    #[error("Dimension count must be a positive integer, got {value}")]
    InvalidDimensionCount { value: String },

    #[error("Knob {section}.{knob}: malformed domain: {message}")]
    MalformedDomain {
        section: Section,
        knob: String,
        message: String,
    },
}

/// A flat vector does not fit the layout it is decoded against.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Vector length mismatch: expected {expected} slots for dimension count {dimension_count}, got {actual}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        dimension_count: usize,
    },

    #[error("Slot {index} ({section}.{knob}) is NaN")]
    NotANumber {
        index: usize,
        section: Section,
        knob: String,
    },
}

/// Recoverable failure of a single simulator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationFailure {
    #[error("Simulator rejected the configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Simulator returned a non-finite reward: {reward}")]
    NonFiniteReward { reward: f64 },

    #[error("Simulator call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Simulator exited with status {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("Simulator output could not be parsed: {message}")]
    MalformedOutput { message: String },

    #[error("Simulator error: {message}")]
    Internal { message: String },
}

/// Result type alias for exploration operations
pub type DseResult<T> = Result<T, DseError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::DseError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::DseError::Config(format!($($arg)*))
    };
}
