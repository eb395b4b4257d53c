//! Knob specification loader.
//!
//! A specification is a JSON object with optional `system`, `network` and
//! `workload` sections. Each section maps knob names, in declaration order,
//! to a definition:
//!
//! ```json
//! {
//!   "system": {
//!     "scheduling-policy": { "domain": { "set": ["FIFO", "LIFO"] }, "replication": "uniform" }
//!   },
//!   "network": {
//!     "num-hops": { "domain": { "range": [1, 8, 1] }, "replication": "per-dimension" }
//!   }
//! }
//! ```
//!
//! The compact tuple form `[<domain>, "<replication>"]` is accepted too, with
//! the legacy `FALSE` / `TRUE` / `N/A` replication flags.

use dse_types::{Domain, KnobSpace, KnobSpec, Replication, Section, SpecParseError};
use serde_json::Value;

/// Parse a knob specification document.
pub fn load(source: &str) -> Result<KnobSpace, SpecParseError> {
    let document: Value =
        serde_json::from_str(source).map_err(|e| SpecParseError::InvalidDocument {
            message: e.to_string(),
        })?;
    from_value(&document)
}

/// Parse an already-decoded knob specification document.
pub fn from_value(document: &Value) -> Result<KnobSpace, SpecParseError> {
    let root = document
        .as_object()
        .ok_or_else(|| SpecParseError::InvalidDocument {
            message: "top level must be an object of sections".into(),
        })?;

    let mut space = KnobSpace::new();
    for (section_name, body) in root {
        let section = Section::from_name(section_name).ok_or_else(|| {
            SpecParseError::UnknownSection {
                section: section_name.clone(),
            }
        })?;
        let knobs = body
            .as_object()
            .ok_or(SpecParseError::SectionNotObject { section })?;

        for (name, definition) in knobs {
            let spec = parse_knob(section, name, definition)?;
            space.push(section, spec)?;
        }
    }

    Ok(space)
}

fn parse_knob(section: Section, name: &str, definition: &Value) -> Result<KnobSpec, SpecParseError> {
    let malformed = |message: &str| SpecParseError::MalformedKnob {
        section,
        knob: name.to_string(),
        message: message.to_string(),
    };

    let (domain, replication) = match definition {
        Value::Object(fields) => {
            if let Some(extra) = fields
                .keys()
                .find(|k| k.as_str() != "domain" && k.as_str() != "replication")
            {
                return Err(malformed(&format!("unexpected field `{extra}`")));
            }
            let domain = fields
                .get("domain")
                .ok_or_else(|| malformed("missing `domain`"))?;
            let replication = fields
                .get("replication")
                .ok_or_else(|| malformed("missing `replication`"))?;
            (domain, replication)
        }
        Value::Array(items) if items.len() == 2 => (&items[0], &items[1]),
        _ => {
            return Err(malformed(
                "expected an object with `domain` and `replication`",
            ))
        }
    };

    Ok(KnobSpec {
        name: name.to_string(),
        domain: parse_domain(section, name, domain)?,
        replication: parse_replication(section, name, replication)?,
    })
}

fn parse_domain(section: Section, name: &str, value: &Value) -> Result<Domain, SpecParseError> {
    let malformed = |message: String| SpecParseError::MalformedDomain {
        section,
        knob: name.to_string(),
        message,
    };

    let fields = match value.as_object() {
        Some(fields) if fields.len() == 1 => fields,
        _ => {
            return Err(malformed(
                "expected {\"set\": [...]} or {\"range\": [min, max, step]}".into(),
            ))
        }
    };

    let domain = if let Some(set) = fields.get("set") {
        let values = set
            .as_array()
            .ok_or_else(|| malformed("`set` must be an array".into()))?;
        Domain::categorical(values.clone())
    } else if let Some(range) = fields.get("range") {
        let bounds: Vec<f64> = range
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        match (range.as_array().map(Vec::len), bounds.as_slice()) {
            (Some(3), [min, max, step]) => Domain::numeric(*min, *max, *step),
            _ => return Err(malformed("`range` must be [min, max, step] numbers".into())),
        }
    } else {
        return Err(malformed(format!(
            "unknown domain kind `{}`",
            fields.keys().next().map(String::as_str).unwrap_or_default()
        )));
    };

    domain.validate().map_err(malformed)?;
    Ok(domain)
}

fn parse_replication(
    section: Section,
    name: &str,
    value: &Value,
) -> Result<Replication, SpecParseError> {
    value
        .as_str()
        .and_then(Replication::from_token)
        .ok_or_else(|| SpecParseError::UnknownReplication {
            section,
            knob: name.to_string(),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
}
