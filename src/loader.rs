use crate::error::{Result, SummaryError};
use crate::types::{CertificateRecord, SummaryConfig, UprnLookup};
use crate::util::format_int;
use crate::version::SourceVersion;
use csv::{ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reads a JSON document, treating a missing file as `T::default()`.
/// Any other read failure or malformed JSON is fatal.
fn read_json_or_default<T>(path: &Path, what: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| SummaryError::json(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "{what} not found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(SummaryError::io(path, e)),
    }
}

pub fn load_config(path: &Path) -> Result<SummaryConfig> {
    let config: SummaryConfig = read_json_or_default(path, "config")?;
    info!(
        path = %path.display(),
        attributes = config.attributes.len(),
        version = ?config.version,
        "config loaded"
    );
    Ok(config)
}

pub fn load_uprn_lookup(path: &Path) -> Result<UprnLookup> {
    let lookup: UprnLookup = read_json_or_default(path, "UPRN lookup")?;
    info!(path = %path.display(), "UPRN lookup loaded ({} entries)", format_int(lookup.len()));
    Ok(lookup)
}

/// The `version.json` left beside the download by the fetcher.
pub fn load_source_version(path: &Path) -> Result<SourceVersion> {
    read_json_or_default(path, "source version")
}

/// Lazily yields certificate rows from a CSV download.
///
/// Paged downloads are concatenated with a header per page, so rows that
/// repeat the header line are skipped. A read error ends the run.
pub struct CertificateReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: StringRecord,
    row: StringRecord,
}

impl CertificateReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SummaryError::MissingSource(path.to_path_buf()));
        }
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| SummaryError::csv(path, e))?;
        let headers = reader.headers().map_err(|e| SummaryError::csv(path, e))?.clone();
        Ok(CertificateReader {
            path: path.to_path_buf(),
            reader,
            headers,
            row: StringRecord::new(),
        })
    }
}

impl Iterator for CertificateReader {
    type Item = Result<CertificateRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_record(&mut self.row) {
                Ok(false) => return None,
                Ok(true) if self.row == self.headers => continue,
                Ok(true) => {
                    let record = self
                        .headers
                        .iter()
                        .zip(self.row.iter())
                        .map(|(h, v)| (h.to_string(), v.to_string()))
                        .collect();
                    return Some(Ok(record));
                }
                Err(e) => return Some(Err(SummaryError::csv(&self.path, e))),
            }
        }
    }
}
