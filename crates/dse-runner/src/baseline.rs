//! Baseline template loaders and simulator input writers.
//!
//! The network template is a JSON object. The system template is a list of
//! `key: value` lines, with per-dimension values joined by `_`.

use std::fs;
use std::path::Path;

use dse_types::{config_error, ConfigSection, Configuration, DseResult};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Load the network template.
pub fn load_network<P: AsRef<Path>>(path: P) -> DseResult<ConfigSection> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| config_error!("cannot read network file {}: {}", path.display(), e))?;
    let map: Map<String, Value> = serde_json::from_str(&text).map_err(|e| {
        config_error!("network file {} is not a JSON object: {}", path.display(), e)
    })?;
    Ok(ConfigSection::from(map))
}

/// Load the system template.
pub fn load_system<P: AsRef<Path>>(path: P) -> DseResult<ConfigSection> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| config_error!("cannot read system file {}: {}", path.display(), e))?;
    parse_system(&text)
}

/// Parse `key: value` lines. Blank lines and `#` comments are skipped;
/// numeric values become JSON numbers.
pub fn parse_system(text: &str) -> DseResult<ConfigSection> {
    let mut section = ConfigSection::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| config_error!("system line {}: expected `key: value`, got {:?}", line_no + 1, line))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(config_error!("system line {}: empty key", line_no + 1));
        }
        section.insert(key, parse_scalar(value.trim()));
    }
    Ok(section)
}

fn parse_scalar(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

/// Render a system section back into `key: value` lines.
pub fn render_system(section: &ConfigSection) -> String {
    let mut out = String::new();
    for (key, value) in section.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&render_value(value));
        out.push('\n');
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("_"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Assemble the baseline configuration from the three templates.
pub fn load_baseline(
    network_path: &Path,
    system_path: &Path,
    workload_path: &Path,
) -> DseResult<Configuration> {
    let network = load_network(network_path)?;
    let system = load_system(system_path)?;
    debug!(
        network_keys = network.len(),
        system_keys = system.len(),
        workload = %workload_path.display(),
        "loaded baseline templates"
    );
    Ok(Configuration::new(
        system,
        network,
        workload_path.to_string_lossy().into_owned(),
    ))
}

/// Write the inputs the simulator reads for one candidate.
pub fn write_inputs(configuration: &Configuration, dir: &Path) -> DseResult<()> {
    fs::create_dir_all(dir)?;
    fs::write(
        dir.join("network.json"),
        serde_json::to_string_pretty(&configuration.network)?,
    )?;
    fs::write(dir.join("system.txt"), render_system(&configuration.system))?;
    fs::write(
        dir.join("workload.txt"),
        configuration.workload_path().unwrap_or_default(),
    )?;
    fs::write(
        dir.join("configuration.json"),
        serde_json::to_string_pretty(configuration)?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SYSTEM: &str = "\
# baseline system
scheduling-policy: LIFO
endpoint-delay: 10
active-chunks-per-dimension: 1
preferred-dataset-splits: 64
boost-mode: 1
all-reduce-implementation: ring_ring_fc_ring
intra-dimension-scheduling: FIFO
injection-scale: 0.5
";

    #[test]
    fn parses_system_lines_in_order() {
        let section = parse_system(SYSTEM).unwrap();
        assert_eq!(section.len(), 8);
        assert_eq!(section.get("scheduling-policy"), Some(&json!("LIFO")));
        assert_eq!(section.get("endpoint-delay"), Some(&json!(10)));
        assert_eq!(section.get("injection-scale"), Some(&json!(0.5)));
        assert_eq!(
            section.get("all-reduce-implementation"),
            Some(&json!("ring_ring_fc_ring"))
        );
        let keys: Vec<&String> = section.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[0], "scheduling-policy");
        assert_eq!(keys[7], "injection-scale");
    }

    #[test]
    fn malformed_system_line_fails_with_line_number() {
        let err = parse_system("scheduling-policy: LIFO\nno colon here\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn render_joins_sequences_with_underscores() {
        let mut section = ConfigSection::new();
        section.insert("scheduling-policy", json!("FIFO"));
        section.insert("all-reduce-implementation", json!(["ring", "fc", "ring", "switch"]));
        section.insert("endpoint-delay", json!(10));
        section.insert("links-count", json!([2, 4]));
        assert_eq!(
            render_system(&section),
            "scheduling-policy: FIFO\n\
             all-reduce-implementation: ring_fc_ring_switch\n\
             endpoint-delay: 10\n\
             links-count: 2_4\n"
        );
    }

    #[test]
    fn loads_baseline_and_writes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let network_path = dir.path().join("network.json");
        let system_path = dir.path().join("system.txt");
        fs::write(
            &network_path,
            r#"{"topology-name": "Hierarchical", "dimensions-count": 2, "units-count": [4, 4]}"#,
        )
        .unwrap();
        fs::write(&system_path, SYSTEM).unwrap();

        let baseline = load_baseline(
            &network_path,
            &system_path,
            Path::new("workload/allreduce_0.65.txt"),
        )
        .unwrap();
        assert_eq!(baseline.dimension_count(), Some(2));
        assert_eq!(baseline.workload_path(), Some("workload/allreduce_0.65.txt"));

        let out = dir.path().join("sim");
        write_inputs(&baseline, &out).unwrap();
        let network: Value =
            serde_json::from_str(&fs::read_to_string(out.join("network.json")).unwrap()).unwrap();
        assert_eq!(network["units-count"], json!([4, 4]));
        let system = fs::read_to_string(out.join("system.txt")).unwrap();
        assert!(system.starts_with("scheduling-policy: LIFO\n"));
        assert_eq!(
            fs::read_to_string(out.join("workload.txt")).unwrap(),
            "workload/allreduce_0.65.txt"
        );
        assert!(out.join("configuration.json").exists());
    }

    #[test]
    fn non_object_network_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(load_network(&path).is_err());
    }
}
