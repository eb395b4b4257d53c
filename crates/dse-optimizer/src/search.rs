//! Resolved search spaces.

use dse_types::{
    BoundsError, ConfigOverrides, DecodeError, KnobSpace, Section, DIMENSIONS_COUNT,
};
use rand::Rng;
use serde_json::Value;

use crate::bounds::{resolve_dimension_count, Bounds, DimensionSource, VectorLayout};
use crate::codec;

/// A knob space with its dimension count fixed, ready for flattening.
///
/// Construction performs the two phases in order: resolve the dimension
/// count, then lay out the remaining knobs. Everything downstream (bounds,
/// decoding, random sampling) reads the same [`VectorLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    knobs: KnobSpace,
    layout: VectorLayout,
    bounds: Bounds,
    dimension_source: DimensionSource,
}

impl SearchSpace {
    /// Resolve the dimension count from a `dimensions-count` knob (drawn
    /// once) or from the network template, then flatten.
    pub fn resolve<R: Rng + ?Sized>(
        knobs: KnobSpace,
        template_dimensions: Option<usize>,
        rng: &mut R,
    ) -> Result<Self, BoundsError> {
        let (dimension_count, source) =
            resolve_dimension_count(&knobs, template_dimensions, rng)?;
        Self::build(knobs, dimension_count, source)
    }

    /// Flatten with a caller-chosen dimension count.
    pub fn with_dimension_count(knobs: KnobSpace, dimension_count: usize) -> Result<Self, BoundsError> {
        Self::build(knobs, dimension_count, DimensionSource::Template)
    }

    fn build(
        knobs: KnobSpace,
        dimension_count: usize,
        dimension_source: DimensionSource,
    ) -> Result<Self, BoundsError> {
        let layout = VectorLayout::new(&knobs, dimension_count)?;
        let bounds = layout.bounds();
        Ok(Self {
            knobs,
            layout,
            bounds,
            dimension_source,
        })
    }

    pub fn knobs(&self) -> &KnobSpace {
        &self.knobs
    }

    pub fn layout(&self) -> &VectorLayout {
        &self.layout
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn dimension_count(&self) -> usize {
        self.layout.dimension_count()
    }

    pub fn dimension_source(&self) -> DimensionSource {
        self.dimension_source
    }

    /// Flat-vector length.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Number of distinct candidates, or `None` on overflow.
    pub fn cardinality(&self) -> Option<usize> {
        let mut total: usize = 1;
        for entry in self.layout.entries() {
            let levels = entry.knob.domain.cardinality();
            for _ in 0..entry.width {
                total = total.checked_mul(levels)?;
            }
        }
        Some(total)
    }

    /// Decode an optimizer vector. The resolved dimension count is always
    /// written to `network.dimensions-count` so every candidate is
    /// self-consistent.
    pub fn decode(&self, vector: &[f64]) -> Result<ConfigOverrides, DecodeError> {
        let mut overrides = codec::decode(vector, &self.layout)?;
        self.stamp_dimensions(&mut overrides);
        Ok(overrides)
    }

    /// Uniformly random candidate, with the same semantics as [`decode`].
    ///
    /// [`decode`]: SearchSpace::decode
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ConfigOverrides {
        let mut overrides = codec::sample_random(&self.layout, rng);
        self.stamp_dimensions(&mut overrides);
        overrides
    }

    fn stamp_dimensions(&self, overrides: &mut ConfigOverrides) {
        overrides.set(
            Section::Network,
            DIMENSIONS_COUNT,
            Value::from(self.dimension_count() as u64),
        );
    }
}
