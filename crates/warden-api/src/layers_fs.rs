//! Reads and writes `layers/NNN-label.yaml` (§6 "Persisted layout"). The
//! only I/O `warden-plan`'s `Layer`/`Plan` types don't do themselves —
//! kept here rather than in `warden-plan`, which stays filesystem-free.

use std::fs;
use std::path::Path;

use serde::Serialize;
use warden_plan::{CheckEntry, Layer, ServiceEntry};
use warden_types::{CheckName, LayerLabel, ServiceName};

use crate::error::ApiError;

/// Loads every `NNN-label.yaml` file in `dir`, ordered by its numeric
/// prefix. A missing directory is an empty layer stack, not an error: a
/// freshly initialized configuration directory has no layers yet.
pub fn load_layers(dir: &Path) -> Result<Vec<Layer>, ApiError> {
    let mut entries = match fs::read_dir(dir) {
        Ok(entries) => entries.collect::<Result<Vec<_>, _>>()?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut layers = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
            continue;
        }
        let Some((order, label)) = parse_file_name(&path) else { continue };
        let yaml = fs::read_to_string(&path)?;
        layers.push(Layer::parse(label, order, &yaml)?);
    }
    Ok(layers)
}

fn parse_file_name(path: &Path) -> Option<(u64, LayerLabel)> {
    let stem = path.file_stem()?.to_str()?;
    let (order, label) = stem.split_once('-')?;
    let order = order.parse().ok()?;
    Some((order, LayerLabel::new(label)))
}

fn file_name(layer: &Layer) -> String {
    format!("{:03}-{}.yaml", layer.order, layer.label)
}

#[derive(Serialize)]
struct LayerYamlOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: &'a Option<String>,
    services: &'a std::collections::BTreeMap<ServiceName, ServiceEntry>,
    checks: &'a std::collections::BTreeMap<CheckName, CheckEntry>,
}

/// Writes (or overwrites) `layer`'s file under `dir`, creating `dir` if this
/// is the first layer ever persisted.
pub fn persist_layer(dir: &Path, layer: &Layer) -> Result<(), ApiError> {
    fs::create_dir_all(dir)?;
    let out = LayerYamlOut {
        summary: &layer.summary,
        services: &layer.services,
        checks: &layer.checks,
    };
    let yaml = serde_yaml::to_string(&out)?;
    fs::write(dir.join(file_name(layer)), yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_layer_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let layer = Layer::parse(
            LayerLabel::new("base"),
            0,
            r#"
services:
  web:
    override: replace
    command: ["/bin/true"]
"#,
        )
        .unwrap();

        persist_layer(dir.path(), &layer).unwrap();
        let loaded = load_layers(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, LayerLabel::new("base"));
        assert_eq!(loaded[0].order, 0);
        assert!(loaded[0].services.contains_key(&ServiceName::new("web")));
    }

    #[test]
    fn missing_directory_loads_as_no_layers() {
        let layers = load_layers(Path::new("/nonexistent/warden/layers")).unwrap();
        assert!(layers.is_empty());
    }

    #[test]
    fn layers_load_in_numeric_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        persist_layer(dir.path(), &Layer::parse(LayerLabel::new("z-first"), 0, "services: {}\n").unwrap()).unwrap();
        persist_layer(dir.path(), &Layer::parse(LayerLabel::new("a-second"), 1, "services: {}\n").unwrap()).unwrap();

        let loaded = load_layers(dir.path()).unwrap();
        assert_eq!(loaded.iter().map(|l| l.order).collect::<Vec<_>>(), vec![0, 1]);
    }
}
