// Merging the area summary into a geography layer.
//
// The layer registry is a JSON object of logical layer name to
// `{"path": ..., "version": ...}`. Relative paths are resolved against
// the registry's own directory.

use crate::error::{Result, SummaryError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct LayerEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub version: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct LayerRegistry {
    path: PathBuf,
    layers: HashMap<String, LayerEntry>,
}

impl LayerRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let layers = read_json(path)?;
        Ok(LayerRegistry { path: path.to_path_buf(), layers })
    }

    /// The named layer with its path made absolute.
    pub fn layer(&self, name: &str) -> Result<LayerEntry> {
        let entry = self.layers.get(name).ok_or_else(|| SummaryError::UnknownLayer {
            name: name.to_string(),
            registry: self.path.clone(),
        })?;
        let mut entry = entry.clone();
        if entry.path.is_relative() {
            if let Some(dir) = self.path.parent() {
                entry.path = dir.join(&entry.path);
            }
        }
        Ok(entry)
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| SummaryError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| SummaryError::json(path, e))
}

/// Keeps the features whose `key_property` names an area in `summary` and
/// copies that area's attributes into the feature's properties. Other
/// members of the collection (`name`, `crs`, ...) are preserved.
pub fn merge_summary(
    layer: Value,
    summary: &Map<String, Value>,
    key_property: &str,
    layer_path: &Path,
) -> Result<Value> {
    let not_collection = || SummaryError::NotFeatureCollection(layer_path.to_path_buf());
    let Value::Object(mut collection) = layer else {
        return Err(not_collection());
    };
    if collection.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(not_collection());
    }
    let Some(Value::Array(features)) = collection.remove("features") else {
        return Err(not_collection());
    };

    let total = features.len();
    let merged: Vec<Value> = features
        .into_iter()
        .filter_map(|feature| merge_feature(feature, summary, key_property))
        .collect();
    info!(
        layer = %layer_path.display(),
        total,
        matched = merged.len(),
        "summary merged into geography layer"
    );
    collection.insert("features".to_string(), Value::Array(merged));
    Ok(Value::Object(collection))
}

fn merge_feature(
    mut feature: Value,
    summary: &Map<String, Value>,
    key_property: &str,
) -> Option<Value> {
    let properties = feature.get_mut("properties")?.as_object_mut()?;
    let key = match properties.get(key_property)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let Some(Value::Object(area)) = summary.get(&key) else {
        return None;
    };
    for (attribute, value) in area {
        properties.insert(attribute.clone(), value.clone());
    }
    Some(feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer() -> Value {
        json!({
            "type": "FeatureCollection",
            "name": "parishes",
            "features": [
                {"type": "Feature", "properties": {"PARISH_CODE": "P1", "NAME": "Ashburton"},
                 "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
                {"type": "Feature", "properties": {"PARISH_CODE": "P9", "NAME": "Elsewhere"},
                 "geometry": null},
                {"type": "Feature", "properties": {"NAME": "No code"}, "geometry": null}
            ]
        })
    }

    fn summary() -> Map<String, Value> {
        json!({
            "all": {"certificates": 4},
            "P1": {"certificates": 3, "current-energy-rating": {"C": 2, "D": 1}}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn keeps_matching_features_with_merged_properties() {
        let merged = merge_summary(layer(), &summary(), "PARISH_CODE", Path::new("p.geojson"))
            .unwrap();
        assert_eq!(merged["name"], "parishes");
        let features = merged["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        let props = &features[0]["properties"];
        assert_eq!(props["NAME"], "Ashburton");
        assert_eq!(props["certificates"], 3);
        assert_eq!(props["current-energy-rating"]["C"], 2);
    }

    #[test]
    fn rejects_non_collections() {
        let err = merge_summary(json!({"type": "Feature"}), &summary(), "PARISH_CODE", Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, SummaryError::NotFeatureCollection(_)));
    }

    #[test]
    fn registry_resolves_relative_paths_and_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.json");
        fs::write(
            &path,
            r#"{"parishes": {"path": "boundaries/parishes.geojson", "version": "2024-12"}}"#,
        )
        .unwrap();
        let registry = LayerRegistry::load(&path).unwrap();
        let entry = registry.layer("parishes").unwrap();
        assert_eq!(entry.path, dir.path().join("boundaries/parishes.geojson"));
        assert_eq!(entry.version, Some(json!("2024-12")));
        assert!(matches!(
            registry.layer("wards"),
            Err(SummaryError::UnknownLayer { .. })
        ));
    }
}
