use std::path::PathBuf;

/// Fatal errors for a summary run. Per-record problems never reach here;
/// they are absorbed into the classifier's counters.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Certificate source not found: {0}")]
    MissingSource(PathBuf),

    #[error("Layer '{name}' is not listed in {registry}")]
    UnknownLayer { name: String, registry: PathBuf },

    #[error("Geography layer {0} is not a GeoJSON FeatureCollection")]
    NotFeatureCollection(PathBuf),
}

impl SummaryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json { path: path.into(), source }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SummaryError>;
