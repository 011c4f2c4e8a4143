use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Column holding the building identifier used for deduplication.
pub const BUILDING_FIELD: &str = "building-reference-number";
/// Column holding the Unique Property Reference Number.
pub const UPRN_FIELD: &str = "uprn";
/// Reserved area code aggregating every classified building.
pub const ALL_AREA: &str = "all";
/// Pseudo-attribute carrying the per-area certificate count.
pub const CERTIFICATES: &str = "certificates";

/// One raw certificate row: column name to cell text.
pub type CertificateRecord = HashMap<String, String>;

/// UPRN to the area attributes of that property (e.g. `PARISH_CODE`).
pub type UprnLookup = HashMap<String, serde_json::Map<String, Value>>;

/// Statistics a continuous attribute can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatName {
    Count,
    Mean,
    Variance,
    #[serde(rename = "standard-deviation", alias = "sd", alias = "stddev")]
    Sd,
    Min,
    Max,
}

impl StatName {
    pub const ALL: [StatName; 6] = [
        StatName::Count,
        StatName::Mean,
        StatName::Variance,
        StatName::Sd,
        StatName::Min,
        StatName::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatName::Count => "count",
            StatName::Mean => "mean",
            StatName::Variance => "variance",
            StatName::Sd => "standard-deviation",
            StatName::Min => "min",
            StatName::Max => "max",
        }
    }
}

/// `stats: true` or `stats: ["mean", "sd"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StatsSelection {
    Flag(bool),
    Fields(Vec<StatName>),
}

/// Column ordering for a discrete attribute's observed values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPolicy {
    #[default]
    Ascending,
    Descending,
    Value,
    Specific,
    /// Any unrecognised policy keeps first-observed order.
    #[serde(other)]
    Unordered,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributeHandling {
    /// Raw value to canonical value. Falsy targets leave the raw value alone.
    pub mapping: HashMap<String, Value>,
    pub stats: Option<StatsSelection>,
    pub order: OrderPolicy,
    pub specific: Vec<String>,
}

impl AttributeHandling {
    /// Applies the value mapping. Unmapped values, and values mapped to
    /// `null`, `false`, `0` or `""`, pass through unchanged.
    pub fn remap(&self, raw: &str) -> String {
        match self.mapping.get(raw) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
            Some(Value::Bool(true)) => "true".to_string(),
            _ => raw.to_string(),
        }
    }

    /// The statistics to emit, or `None` when the attribute is discrete.
    pub fn stat_fields(&self) -> Option<Vec<StatName>> {
        match &self.stats {
            Some(StatsSelection::Flag(true)) => Some(StatName::ALL.to_vec()),
            Some(StatsSelection::Fields(fields)) => Some(fields.clone()),
            Some(StatsSelection::Flag(false)) | None => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Certificate columns to summarise, in report order.
    pub attributes: Vec<String>,
    pub attribute_handling: HashMap<String, AttributeHandling>,
    /// Opaque version identifier compared by the reconciler.
    pub version: Option<Value>,
    /// Lookup field holding the area code, unless overridden on the command line.
    pub code_name: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        SummaryConfig {
            attributes: vec![
                "current-energy-rating".to_string(),
                "potential-energy-rating".to_string(),
            ],
            attribute_handling: HashMap::new(),
            version: None,
            code_name: None,
        }
    }
}

impl SummaryConfig {
    pub fn handling(&self, attribute: &str) -> Option<&AttributeHandling> {
        self.attribute_handling.get(attribute)
    }

    pub fn order_for(&self, attribute: &str) -> OrderPolicy {
        self.handling(attribute).map(|h| h.order).unwrap_or_default()
    }
}
