//! Knob specification model: sections, domains, replication modes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::SpecParseError;

/// Name of the knob (and network field) that fixes the number of topology
/// dimensions.
pub const DIMENSIONS_COUNT: &str = "dimensions-count";

/// Relative tolerance used when deciding whether a number sits on a lattice.
pub const LATTICE_EPSILON: f64 = 1e-9;

/// Largest number of lattice points a numeric domain may span.
pub const MAX_LATTICE_LEVELS: usize = u32::MAX as usize;

/// The three configuration sections, in flattening order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    System,
    Network,
    Workload,
}

impl Section {
    /// Traversal order shared by every flattening and decoding pass.
    pub const ALL: [Section; 3] = [Section::System, Section::Network, Section::Workload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Network => "network",
            Self::Workload => "workload",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "system" => Some(Self::System),
            "network" => Some(Self::Network),
            "workload" => Some(Self::Workload),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of values a knob may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Ordered categorical choices; the optimizer sees their indices.
    Categorical { values: Vec<Value> },
    /// Inclusive numeric range on the lattice `min + k * step`.
    Numeric { min: f64, max: f64, step: f64 },
}

impl Domain {
    pub fn categorical(values: Vec<Value>) -> Self {
        Self::Categorical { values }
    }

    pub fn numeric(min: f64, max: f64, step: f64) -> Self {
        Self::Numeric { min, max, step }
    }

    /// Check the structural constraints a domain must satisfy before it can
    /// be flattened.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Categorical { values } => {
                if values.is_empty() {
                    return Err("categorical set is empty".into());
                }
                for (i, value) in values.iter().enumerate() {
                    if value.is_array() || value.is_object() || value.is_null() {
                        return Err(format!("categorical value {value} is not a scalar"));
                    }
                    if values[..i].contains(value) {
                        return Err(format!("categorical value {value} appears twice"));
                    }
                }
                Ok(())
            }
            Self::Numeric { min, max, step } => {
                if !min.is_finite() || !max.is_finite() || !step.is_finite() {
                    return Err(format!("range ({min}, {max}, {step}) is not finite"));
                }
                if min > max {
                    return Err(format!("range min {min} exceeds max {max}"));
                }
                if *step <= 0.0 {
                    return Err(format!("range step {step} must be positive"));
                }
                if lattice_levels(*min, *max, *step).is_none() {
                    return Err(format!(
                        "range ({min}, {max}, {step}) spans more than {MAX_LATTICE_LEVELS} values"
                    ));
                }
                Ok(())
            }
        }
    }

    /// Number of distinct values the domain admits.
    ///
    /// Saturates at [`MAX_LATTICE_LEVELS`] for numeric ranges that
    /// [`Domain::validate`] would reject.
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Categorical { values } => values.len(),
            Self::Numeric { min, max, step } => {
                lattice_levels(*min, *max, *step).unwrap_or(MAX_LATTICE_LEVELS)
            }
        }
    }

    /// Whether `value` is one the domain can produce.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Self::Categorical { values } => values.contains(value),
            Self::Numeric { min, max, step } => {
                let Some(v) = value.as_f64() else {
                    return false;
                };
                let tolerance = step * LATTICE_EPSILON;
                if v < min - tolerance || v > max + tolerance {
                    return false;
                }
                let k = (v - min) / step;
                (k - k.round()).abs() <= LATTICE_EPSILON * k.abs().max(1.0)
            }
        }
    }
}

/// Lattice points in `[min, max]` at `step`, or `None` when the count is not
/// representable or exceeds [`MAX_LATTICE_LEVELS`].
fn lattice_levels(min: f64, max: f64, step: f64) -> Option<usize> {
    let span = ((max - min) / step + LATTICE_EPSILON).floor();
    if !span.is_finite() || span < 0.0 || span >= MAX_LATTICE_LEVELS as f64 {
        return None;
    }
    (span as usize).checked_add(1)
}

/// How many values a knob carries per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Replication {
    /// One independent value per network dimension.
    PerDimension,
    /// One value broadcast across all dimensions.
    Uniform,
    /// Exactly one value.
    Scalar,
}

impl Replication {
    /// Parse a replication token. Accepts the kebab-case names as well as the
    /// `FALSE` / `TRUE` / `N/A` flags used by legacy knob files.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "per-dimension" | "per_dimension" | "PER_DIMENSION" | "FALSE" => {
                Some(Self::PerDimension)
            }
            "uniform" | "UNIFORM" | "TRUE" => Some(Self::Uniform),
            "scalar" | "SCALAR" | "N/A" => Some(Self::Scalar),
            _ => None,
        }
    }

    /// Number of flat-vector slots this mode occupies.
    pub fn slots(&self, dimension_count: usize) -> usize {
        match self {
            Self::PerDimension => dimension_count,
            Self::Uniform | Self::Scalar => 1,
        }
    }
}

/// One tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobSpec {
    pub name: String,
    pub domain: Domain,
    pub replication: Replication,
}

impl KnobSpec {
    pub fn new(name: impl Into<String>, domain: Domain, replication: Replication) -> Self {
        Self {
            name: name.into(),
            domain,
            replication,
        }
    }
}

/// Every knob of a run, grouped by section in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnobSpace {
    pub system: Vec<KnobSpec>,
    pub network: Vec<KnobSpec>,
    pub workload: Vec<KnobSpec>,
}

impl KnobSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, section: Section) -> &[KnobSpec] {
        match section {
            Section::System => &self.system,
            Section::Network => &self.network,
            Section::Workload => &self.workload,
        }
    }

    /// Append a knob, rejecting duplicate names within its section.
    pub fn push(&mut self, section: Section, spec: KnobSpec) -> Result<(), SpecParseError> {
        let knobs = match section {
            Section::System => &mut self.system,
            Section::Network => &mut self.network,
            Section::Workload => &mut self.workload,
        };
        if knobs.iter().any(|k| k.name == spec.name) {
            return Err(SpecParseError::DuplicateKnob {
                section,
                knob: spec.name,
            });
        }
        knobs.push(spec);
        Ok(())
    }

    /// Builder form of [`KnobSpace::push`] for tests and programmatic specs.
    ///
    /// # Panics
    /// Panics on a duplicate knob name.
    pub fn with_knob(mut self, section: Section, spec: KnobSpec) -> Self {
        if let Err(e) = self.push(section, spec) {
            panic!("{e}");
        }
        self
    }

    /// The knob that fixes the dimension count, if the space declares one.
    ///
    /// Either section may declare it. When both do, the count is drawn from
    /// the network declaration, which describes the topology itself.
    pub fn dimension_knob(&self) -> Option<(Section, &KnobSpec)> {
        [Section::Network, Section::System]
            .into_iter()
            .find_map(|s| {
                self.section(s)
                    .iter()
                    .find(|k| k.name == DIMENSIONS_COUNT)
                    .map(|k| (s, k))
            })
    }

    /// Every knob that occupies flat-vector slots, in traversal order.
    /// `dimensions-count` is excluded from every section: it is resolved
    /// before flattening.
    pub fn flattened(&self) -> impl Iterator<Item = (Section, &KnobSpec)> + '_ {
        Section::ALL.into_iter().flat_map(move |section| {
            self.section(section)
                .iter()
                .filter(|k| k.name != DIMENSIONS_COUNT)
                .map(move |k| (section, k))
        })
    }

    pub fn len(&self) -> usize {
        self.system.len() + self.network.len() + self.workload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
