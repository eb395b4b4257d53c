//! Vector codec: flat optimizer vectors to structured knob overrides.

use dse_types::{
    ConfigOverrides, DecodeError, Domain, FlatVector, Replication, LATTICE_EPSILON,
};
use rand::Rng;
use serde_json::{Number, Value};

use crate::bounds::{LayoutEntry, VectorLayout};

/// Most decimal places a numeric knob value is rounded to.
const MAX_DECIMALS: i32 = 12;

/// Decode `vector` into per-section knob overrides.
///
/// Categorical slots are rounded to the nearest category index; numeric
/// slots are clamped to `[min, max]` and snapped to the nearest multiple of
/// `step` above `min`. Infinities clamp like any other out-of-range value;
/// only NaN is rejected.
pub fn decode(vector: &[f64], layout: &VectorLayout) -> Result<ConfigOverrides, DecodeError> {
    if vector.len() != layout.len() {
        return Err(DecodeError::LengthMismatch {
            expected: layout.len(),
            actual: vector.len(),
            dimension_count: layout.dimension_count(),
        });
    }

    if let Some(index) = vector.iter().position(|v| v.is_nan()) {
        // locate() cannot miss: the length check above matched the layout.
        let (section, knob) = layout
            .locate(index)
            .map(|e| (e.section, e.knob.name.clone()))
            .unwrap_or((dse_types::Section::System, String::new()));
        return Err(DecodeError::NotANumber {
            index,
            section,
            knob,
        });
    }

    Ok(assemble(vector, layout))
}

/// Draw a uniformly random candidate.
///
/// Every slot gets a uniformly chosen lattice point (category index or
/// `min + k * step`), and the result goes through the same per-knob decoding
/// as [`decode`], so random-walk and vector searches cover the same space.
pub fn sample_random<R: Rng + ?Sized>(layout: &VectorLayout, rng: &mut R) -> ConfigOverrides {
    assemble(&random_vector(layout, rng), layout)
}

/// A vector whose every slot is a uniformly drawn lattice point.
pub fn random_vector<R: Rng + ?Sized>(layout: &VectorLayout, rng: &mut R) -> FlatVector {
    let mut vector = Vec::with_capacity(layout.len());
    for entry in layout.entries() {
        let levels = entry.knob.domain.cardinality();
        for _ in 0..entry.width {
            let level = rng.gen_range(0..levels);
            vector.push(match &entry.knob.domain {
                Domain::Categorical { .. } => level as f64,
                Domain::Numeric { min, step, .. } => min + level as f64 * step,
            });
        }
    }
    vector
}

fn assemble(vector: &[f64], layout: &VectorLayout) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    for entry in layout.entries() {
        let value = decode_entry(entry, &vector[entry.slots()], layout.dimension_count());
        overrides.set(entry.section, entry.knob.name.clone(), value);
    }
    overrides
}

fn decode_entry(entry: &LayoutEntry, slots: &[f64], dimension_count: usize) -> Value {
    let domain = &entry.knob.domain;
    match entry.knob.replication {
        Replication::PerDimension => {
            Value::Array(slots.iter().map(|s| decode_slot(domain, *s)).collect())
        }
        Replication::Uniform => {
            let value = decode_slot(domain, slots[0]);
            Value::Array(vec![value; dimension_count])
        }
        Replication::Scalar => decode_slot(domain, slots[0]),
    }
}

/// Map one slot value onto the knob's domain.
pub fn decode_slot(domain: &Domain, slot: f64) -> Value {
    match domain {
        Domain::Categorical { values } => {
            let index = slot.round().clamp(0.0, (values.len() - 1) as f64) as usize;
            values[index].clone()
        }
        Domain::Numeric { min, max, step } => {
            let last = (domain.cardinality() - 1) as f64;
            let level = ((slot.clamp(*min, *max) - min) / step).round().clamp(0.0, last);
            let decimals = decimals(*min).max(decimals(*step));
            let value = round_to(min + level * step, decimals);
            if decimals == 0 {
                Value::from(value as i64)
            } else {
                Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
            }
        }
    }
}

/// Decimal places needed to write `x` exactly, capped at [`MAX_DECIMALS`].
fn decimals(x: f64) -> i32 {
    (0..MAX_DECIMALS)
        .find(|d| {
            let scaled = x * 10f64.powi(*d);
            (scaled - scaled.round()).abs() <= LATTICE_EPSILON * scaled.abs().max(1.0)
        })
        .unwrap_or(MAX_DECIMALS)
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}
