//! Flattening of a knob space into optimizer bounds.
//!
//! [`VectorLayout`] is the single description of which flat-vector slots
//! belong to which knob. Both [`compile_bounds`] and the codec walk the same
//! layout, so the two can never disagree on slot order.

use dse_types::{
    BoundsError, Domain, FlatVector, KnobSpace, KnobSpec, Section, LATTICE_EPSILON,
    MAX_LATTICE_LEVELS,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Slots owned by one knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub section: Section,
    pub knob: KnobSpec,
    /// Index of the knob's first slot.
    pub offset: usize,
    /// Number of consecutive slots.
    pub width: usize,
}

impl LayoutEntry {
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Slot assignment for a knob space at a fixed dimension count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayout {
    entries: Vec<LayoutEntry>,
    dimension_count: usize,
    len: usize,
}

impl VectorLayout {
    /// Walk the space in traversal order (sections `system`, `network`,
    /// `workload`; knobs in declaration order; the dimension-count knob
    /// skipped) and assign slots.
    pub fn new(space: &KnobSpace, dimension_count: usize) -> Result<Self, BoundsError> {
        if dimension_count == 0 {
            return Err(BoundsError::InvalidDimensionCount {
                value: dimension_count.to_string(),
            });
        }

        let mut entries = Vec::new();
        let mut offset = 0;
        for (section, knob) in space.flattened() {
            knob.domain
                .validate()
                .map_err(|message| BoundsError::MalformedDomain {
                    section,
                    knob: knob.name.clone(),
                    message,
                })?;
            let width = knob.replication.slots(dimension_count);
            entries.push(LayoutEntry {
                section,
                knob: knob.clone(),
                offset,
                width,
            });
            offset += width;
        }

        Ok(Self {
            entries,
            dimension_count,
            len: offset,
        })
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn dimension_count(&self) -> usize {
        self.dimension_count
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The entry owning slot `index`.
    pub fn locate(&self, index: usize) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.slots().contains(&index))
    }

    /// Lower/upper/precision arrays, slot for slot.
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::with_capacity(self.len);
        for entry in &self.entries {
            let (lower, upper, precision) = match &entry.knob.domain {
                Domain::Categorical { values } => (0.0, (values.len() - 1) as f64, 1.0),
                Domain::Numeric { min, max, step } => (*min, *max, *step),
            };
            for _ in 0..entry.width {
                bounds.lower.push(lower);
                bounds.upper.push(upper);
                bounds.precision.push(precision);
            }
        }
        bounds
    }
}

/// Parallel per-slot arrays handed to vector optimizers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: FlatVector,
    pub upper: FlatVector,
    pub precision: FlatVector,
}

impl Bounds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            lower: Vec::with_capacity(capacity),
            upper: Vec::with_capacity(capacity),
            precision: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Number of lattice points `lower + k * precision` within slot `index`.
    pub fn levels(&self, index: usize) -> usize {
        let span = (self.upper[index] - self.lower[index]) / self.precision[index];
        (span + LATTICE_EPSILON)
            .floor()
            .clamp(0.0, (MAX_LATTICE_LEVELS - 1) as f64) as usize
            + 1
    }

    /// Value of lattice point `level` in slot `index`.
    pub fn level_value(&self, index: usize, level: usize) -> f64 {
        self.lower[index] + level as f64 * self.precision[index]
    }

    /// Centre of every slot's range.
    pub fn midpoint(&self) -> FlatVector {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| (lo + hi) / 2.0)
            .collect()
    }
}

/// Flatten `space` at `dimension_count` into optimizer bounds.
pub fn compile_bounds(space: &KnobSpace, dimension_count: usize) -> Result<Bounds, BoundsError> {
    Ok(VectorLayout::new(space, dimension_count)?.bounds())
}

/// Where the run's dimension count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionSource {
    /// Drawn once from a `dimensions-count` knob in this section.
    Knob(Section),
    /// Taken from the network template.
    Template,
}

/// Resolve the dimension count before any flattening happens.
///
/// A `dimensions-count` knob wins and is drawn once from the domain
/// [`KnobSpace::dimension_knob`] selects (the network declaration when both
/// sections carry one); otherwise `template` (the network template's value)
/// is used.
pub fn resolve_dimension_count<R: Rng + ?Sized>(
    space: &KnobSpace,
    template: Option<usize>,
    rng: &mut R,
) -> Result<(usize, DimensionSource), BoundsError> {
    let Some((section, knob)) = space.dimension_knob() else {
        return match template {
            Some(0) => Err(BoundsError::InvalidDimensionCount { value: "0".into() }),
            Some(count) => Ok((count, DimensionSource::Template)),
            None => Err(BoundsError::UnresolvedDimensionCount),
        };
    };

    knob.domain
        .validate()
        .map_err(|message| BoundsError::MalformedDomain {
            section,
            knob: knob.name.clone(),
            message,
        })?;

    let drawn = match &knob.domain {
        Domain::Categorical { values } => values[rng.gen_range(0..values.len())].clone(),
        Domain::Numeric { min, step, .. } => {
            let level = rng.gen_range(0..knob.domain.cardinality());
            let value = min + level as f64 * step;
            serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
    };

    let count = match drawn.as_f64() {
        Some(v) if v >= 1.0 && (v - v.round()).abs() <= LATTICE_EPSILON => v.round() as usize,
        _ => {
            return Err(BoundsError::InvalidDimensionCount {
                value: drawn.to_string(),
            })
        }
    };

    Ok((count, DimensionSource::Knob(section)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dse_types::{Replication, DIMENSIONS_COUNT};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn scenario_space() -> KnobSpace {
        KnobSpace::new()
            .with_knob(
                Section::System,
                KnobSpec::new(
                    "scheduling-policy",
                    Domain::categorical(vec![json!("FIFO"), json!("LIFO")]),
                    Replication::Uniform,
                ),
            )
            .with_knob(
                Section::Network,
                KnobSpec::new(
                    "num-hops",
                    Domain::numeric(1.0, 8.0, 1.0),
                    Replication::PerDimension,
                ),
            )
    }

    #[test]
    fn scenario_bounds() {
        let bounds = compile_bounds(&scenario_space(), 2).unwrap();
        assert_eq!(bounds.lower, vec![0.0, 1.0, 1.0]);
        assert_eq!(bounds.upper, vec![1.0, 8.0, 8.0]);
        assert_eq!(bounds.precision, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn layout_offsets_follow_replication() {
        let space = scenario_space()
            .with_knob(
                Section::Network,
                KnobSpec::new(
                    "link-latency",
                    Domain::numeric(100.0, 500.0, 50.0),
                    Replication::Scalar,
                ),
            )
            .with_knob(
                Section::Workload,
                KnobSpec::new(
                    "parallelism",
                    Domain::categorical(vec![json!("DATA"), json!("MODEL"), json!("HYBRID")]),
                    Replication::PerDimension,
                ),
            );
        let layout = VectorLayout::new(&space, 3).unwrap();

        let spans: Vec<(&str, usize, usize)> = layout
            .entries()
            .iter()
            .map(|e| (e.knob.name.as_str(), e.offset, e.width))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("scheduling-policy", 0, 1),
                ("num-hops", 1, 3),
                ("link-latency", 4, 1),
                ("parallelism", 5, 3),
            ]
        );
        assert_eq!(layout.len(), 8);
        assert_eq!(layout.locate(3).unwrap().knob.name, "num-hops");
        assert_eq!(layout.locate(7).unwrap().knob.name, "parallelism");
        assert!(layout.locate(8).is_none());

        let bounds = layout.bounds();
        assert_eq!(bounds.len(), layout.len());
        assert_eq!(bounds.upper.len(), layout.len());
        assert_eq!(bounds.precision.len(), layout.len());
        assert_eq!(bounds.upper[5], 2.0);
        assert_eq!(bounds.precision[4], 50.0);
    }

    #[test]
    fn dimension_knob_is_not_flattened() {
        let space = scenario_space().with_knob(
            Section::System,
            KnobSpec::new(
                DIMENSIONS_COUNT,
                Domain::categorical(vec![json!(2), json!(4)]),
                Replication::Scalar,
            ),
        );
        let bounds = compile_bounds(&space, 4).unwrap();
        // scheduling-policy (1) + num-hops (4)
        assert_eq!(bounds.len(), 5);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert_eq!(
            compile_bounds(&scenario_space(), 0),
            Err(BoundsError::InvalidDimensionCount { value: "0".into() })
        );
    }

    #[test]
    fn malformed_domain_reported_with_knob() {
        let space = KnobSpace::new().with_knob(
            Section::Network,
            KnobSpec::new("bad", Domain::numeric(3.0, 1.0, 1.0), Replication::Scalar),
        );
        match compile_bounds(&space, 2) {
            Err(BoundsError::MalformedDomain { section, knob, .. }) => {
                assert_eq!(section, Section::Network);
                assert_eq!(knob, "bad");
            }
            other => panic!("expected malformed domain, got {other:?}"),
        }
    }

    #[test]
    fn oversized_range_is_malformed() {
        let space = KnobSpace::new().with_knob(
            Section::Network,
            KnobSpec::new("bytes", Domain::numeric(0.0, 1.0e20, 1.0), Replication::Scalar),
        );
        assert!(matches!(
            VectorLayout::new(&space, 1),
            Err(BoundsError::MalformedDomain { ref knob, .. }) if knob == "bytes"
        ));
    }

    #[test]
    fn lattice_levels() {
        let bounds = compile_bounds(
            &KnobSpace::new().with_knob(
                Section::Network,
                KnobSpec::new("bw", Domain::numeric(25.0, 200.0, 25.0), Replication::Scalar),
            ),
            1,
        )
        .unwrap();
        assert_eq!(bounds.levels(0), 8);
        assert_eq!(bounds.level_value(0, 7), 200.0);
        assert_eq!(bounds.midpoint(), vec![112.5]);
    }

    #[test]
    fn resolve_from_template() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(
            resolve_dimension_count(&scenario_space(), Some(4), &mut rng),
            Ok((4, DimensionSource::Template))
        );
        assert_eq!(
            resolve_dimension_count(&scenario_space(), None, &mut rng),
            Err(BoundsError::UnresolvedDimensionCount)
        );
    }

    #[test]
    fn resolve_from_knob_overrides_template() {
        let space = scenario_space().with_knob(
            Section::System,
            KnobSpec::new(
                DIMENSIONS_COUNT,
                Domain::numeric(2.0, 5.0, 1.0),
                Replication::Scalar,
            ),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let (count, source) = resolve_dimension_count(&space, Some(9), &mut rng).unwrap();
            assert!((2..=5).contains(&count));
            assert_eq!(source, DimensionSource::Knob(Section::System));
        }
    }

    #[test]
    fn network_dimension_knob_wins_and_takes_no_slot() {
        let space = scenario_space()
            .with_knob(
                Section::System,
                KnobSpec::new(
                    DIMENSIONS_COUNT,
                    Domain::categorical(vec![json!(2)]),
                    Replication::Scalar,
                ),
            )
            .with_knob(
                Section::Network,
                KnobSpec::new(
                    DIMENSIONS_COUNT,
                    Domain::categorical(vec![json!(2), json!(3), json!(4)]),
                    Replication::Scalar,
                ),
            );

        let layout = VectorLayout::new(&space, 3).unwrap();
        assert!(layout
            .entries()
            .iter()
            .all(|e| e.knob.name != DIMENSIONS_COUNT));
        // scheduling-policy (1) + num-hops (3)
        assert_eq!(layout.len(), 4);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..100 {
            let (count, source) = resolve_dimension_count(&space, None, &mut rng).unwrap();
            assert_eq!(source, DimensionSource::Knob(Section::Network));
            seen.insert(count);
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn resolve_rejects_non_integer_draws() {
        let space = KnobSpace::new().with_knob(
            Section::System,
            KnobSpec::new(
                DIMENSIONS_COUNT,
                Domain::categorical(vec![json!("two")]),
                Replication::Scalar,
            ),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            resolve_dimension_count(&space, Some(2), &mut rng),
            Err(BoundsError::InvalidDimensionCount { .. })
        ));
    }
}
