// Version stamps and the recompute decision.
//
// Every derived artifact (summary JSON, workbook, map layer) is recorded
// in one stamp store under its file name. A stamp is only written after
// the artifact it describes has been committed, so an interrupted run
// leaves the old stamp behind and the next run retries.
use crate::error::{Result, SummaryError};
use crate::output::write_json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version of the certificate download, as reported by the upstream API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceVersion {
    #[serde(default)]
    pub updated_date: Option<String>,
    #[serde(default)]
    pub latest_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub source: SourceVersion,
    #[serde(default)]
    pub config_version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography_version: Option<Value>,
    /// Informational only; never compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Stamp {
    pub fn new(source: SourceVersion, config_version: Option<Value>) -> Self {
        Stamp { source, config_version, geography_version: None, generated_at: None }
    }

    pub fn with_geography(mut self, version: Option<Value>) -> Self {
        self.geography_version = version;
        self
    }
}

/// Artifact file name to the stamp it was last generated under.
#[derive(Debug)]
pub struct StampStore {
    path: PathBuf,
    entries: BTreeMap<String, Stamp>,
}

impl StampStore {
    /// Loads the store; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(StampStore { path, entries })
    }

    pub fn get(&self, artifact: &str) -> Option<&Stamp> {
        self.entries.get(artifact)
    }

    /// Records `stamp` for `artifact`. Re-reads the file first so entries
    /// written since `load` survive, then replaces the file atomically.
    pub fn record(&mut self, artifact: &str, mut stamp: Stamp) -> Result<()> {
        stamp.generated_at = Some(Utc::now());
        let mut entries = read_entries(&self.path)?;
        entries.insert(artifact.to_string(), stamp);
        write_json(&self.path, &entries)?;
        debug!(artifact, path = %self.path.display(), "stamp recorded");
        self.entries = entries;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, Stamp>> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| SummaryError::json(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "stamp store not found, starting empty");
            Ok(BTreeMap::new())
        }
        Err(e) => Err(SummaryError::io(path, e)),
    }
}

/// Why an artifact must be regenerated, or `Fresh` if it need not be.
#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    Fresh,
    ArtifactMissing(PathBuf),
    NeverGenerated,
    SourceChanged,
    ConfigChanged,
    GeographyChanged,
}

impl Staleness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Staleness::Fresh)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::Fresh => write!(f, "up to date"),
            Staleness::ArtifactMissing(p) => write!(f, "{} is missing", p.display()),
            Staleness::NeverGenerated => write!(f, "no previous stamp"),
            Staleness::SourceChanged => write!(f, "certificate source changed"),
            Staleness::ConfigChanged => write!(f, "configuration version changed"),
            Staleness::GeographyChanged => write!(f, "geography layer changed"),
        }
    }
}

/// Decides whether the summary artifacts must be recomputed.
///
/// Fresh only when every artifact is present and readable and the stamp
/// recorded under `key` carries the current source and config versions.
pub fn check_summary(
    store: &StampStore,
    key: &str,
    current: &Stamp,
    artifacts: &[&Path],
) -> Staleness {
    if let Some(missing) = artifacts.iter().find(|p| !artifact_readable(p)) {
        return Staleness::ArtifactMissing(missing.to_path_buf());
    }
    let Some(recorded) = store.get(key) else {
        return Staleness::NeverGenerated;
    };
    compare_inputs(recorded, current)
}

/// Decides whether the map layer must be regenerated against the summary
/// stamp it would be built from and the geography layer's version.
pub fn check_map(
    store: &StampStore,
    key: &str,
    map_path: &Path,
    summary: &Stamp,
    geography_version: Option<&Value>,
) -> Staleness {
    if !artifact_readable(map_path) {
        return Staleness::ArtifactMissing(map_path.to_path_buf());
    }
    let Some(recorded) = store.get(key) else {
        return Staleness::NeverGenerated;
    };
    if recorded.geography_version.as_ref() != geography_version {
        return Staleness::GeographyChanged;
    }
    compare_inputs(recorded, summary)
}

fn compare_inputs(recorded: &Stamp, current: &Stamp) -> Staleness {
    if recorded.source != current.source {
        Staleness::SourceChanged
    } else if recorded.config_version != current.config_version {
        Staleness::ConfigChanged
    } else {
        Staleness::Fresh
    }
}

/// A file that opens, or a directory that lists.
fn artifact_readable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok(),
        Ok(_) => fs::File::open(path).is_ok(),
        Err(_) => false,
    }
}
