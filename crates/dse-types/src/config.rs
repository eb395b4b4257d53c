//! Structured simulator configurations and per-trial overrides.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::knobs::{Section, DIMENSIONS_COUNT};

/// Field of the workload section that points at the workload descriptor.
pub const WORKLOAD_PATH: &str = "path";

/// Ordered key/value mapping for one configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSection(Map<String, Value>);

impl ConfigSection {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `overrides` over this section; existing keys are
    /// replaced, all others are kept.
    pub fn merge_from(&mut self, overrides: &ConfigSection) {
        for (key, value) in overrides.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ConfigSection {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ConfigSection {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A complete candidate as submitted to the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub system: ConfigSection,
    pub network: ConfigSection,
    pub workload: ConfigSection,
}

impl Configuration {
    pub fn new(system: ConfigSection, network: ConfigSection, workload_path: impl Into<String>) -> Self {
        let mut workload = ConfigSection::new();
        workload.insert(WORKLOAD_PATH, Value::String(workload_path.into()));
        Self {
            system,
            network,
            workload,
        }
    }

    pub fn section(&self, section: Section) -> &ConfigSection {
        match section {
            Section::System => &self.system,
            Section::Network => &self.network,
            Section::Workload => &self.workload,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut ConfigSection {
        match section {
            Section::System => &mut self.system,
            Section::Network => &mut self.network,
            Section::Workload => &mut self.workload,
        }
    }

    pub fn workload_path(&self) -> Option<&str> {
        self.workload.get(WORKLOAD_PATH).and_then(Value::as_str)
    }

    /// The network's dimension count, when the template declares a positive
    /// integer one.
    pub fn dimension_count(&self) -> Option<usize> {
        self.network
            .get(DIMENSIONS_COUNT)
            .and_then(Value::as_u64)
            .filter(|d| *d > 0)
            .map(|d| d as usize)
    }

    /// Build a fresh configuration from this baseline with `overrides`
    /// applied. The baseline itself is never modified.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Configuration {
        let mut merged = self.clone();
        for section in Section::ALL {
            merged
                .section_mut(section)
                .merge_from(overrides.section(section));
        }
        merged
    }
}

/// Knob assignments produced for one candidate, keyed by section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub system: ConfigSection,
    pub network: ConfigSection,
    pub workload: ConfigSection,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, section: Section) -> &ConfigSection {
        match section {
            Section::System => &self.system,
            Section::Network => &self.network,
            Section::Workload => &self.workload,
        }
    }

    pub fn set(&mut self, section: Section, key: impl Into<String>, value: Value) {
        let target = match section {
            Section::System => &mut self.system,
            Section::Network => &mut self.network,
            Section::Workload => &mut self.workload,
        };
        target.insert(key, value);
    }

    pub fn get(&self, section: Section, key: &str) -> Option<&Value> {
        self.section(section).get(key)
    }

    pub fn len(&self) -> usize {
        self.system.len() + self.network.len() + self.workload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
