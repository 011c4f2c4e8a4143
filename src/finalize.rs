use crate::accumulate::{AreaAggregate, Moments};
use crate::classify::Aggregation;
use crate::order::order_headings;
use crate::types::{OrderPolicy, StatName, SummaryConfig, ALL_AREA, CERTIFICATES};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

/// Report columns for one attribute, shared by every area.
#[derive(Debug, Clone, PartialEq)]
pub enum Columns {
    Certificates,
    Headings(Vec<String>),
    Stats(Vec<StatName>),
}

/// One finalized attribute of one area.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalAttribute {
    Count(u64),
    Frequencies(Vec<(String, u64)>),
    Statistics(Vec<(StatName, Option<f64>)>),
}

impl FinalAttribute {
    /// Count for a discrete value, zero when absent.
    pub fn frequency(&self, value: &str) -> u64 {
        match self {
            FinalAttribute::Frequencies(entries) => entries
                .iter()
                .find(|(v, _)| v == value)
                .map_or(0, |(_, n)| *n),
            _ => 0,
        }
    }

    pub fn statistic(&self, name: StatName) -> Option<f64> {
        match self {
            FinalAttribute::Statistics(stats) => {
                stats.iter().find(|(s, _)| *s == name).and_then(|(_, v)| *v)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaSummary {
    pub attributes: Vec<(String, FinalAttribute)>,
}

impl AreaSummary {
    pub fn get(&self, attribute: &str) -> Option<&FinalAttribute> {
        self.attributes
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, a)| a)
    }

    pub fn certificates(&self) -> u64 {
        match self.get(CERTIFICATES) {
            Some(FinalAttribute::Count(n)) => *n,
            _ => 0,
        }
    }
}

/// Read-only statistics for every area, `all` first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub areas: Vec<(String, AreaSummary)>,
    pub columns: Vec<(String, Columns)>,
}

impl Summary {
    pub fn area(&self, code: &str) -> Option<&AreaSummary> {
        self.areas.iter().find(|(c, _)| c == code).map(|(_, a)| a)
    }
}

/// Turns raw accumulators into reportable statistics without touching them.
pub fn finalize(aggregation: &Aggregation, config: &SummaryConfig) -> Summary {
    let mut columns = vec![(CERTIFICATES.to_string(), Columns::Certificates)];
    for attribute in &config.attributes {
        // Each attribute is one JSON key and one sheet.
        if columns.iter().any(|(name, _)| name == attribute) {
            warn!(attribute = %attribute, "attribute listed twice or shadows certificates; skipped");
            continue;
        }
        let handling = config.handling(attribute);
        let plan = match handling.and_then(|h| h.stat_fields()) {
            Some(fields) => Columns::Stats(fields),
            None => {
                let all_table = aggregation.all.frequencies(attribute);
                let observed = all_table.map(|t| t.values().to_vec()).unwrap_or_default();
                let specific = handling.map(|h| h.specific.as_slice()).unwrap_or(&[]);
                Columns::Headings(order_headings(
                    &observed,
                    config.order_for(attribute),
                    specific,
                    all_table,
                ))
            }
        };
        columns.push((attribute.clone(), plan));
    }

    let mut areas = Vec::with_capacity(aggregation.areas.len() + 1);
    let ordered = std::iter::once((ALL_AREA, &aggregation.all))
        .chain(aggregation.areas.iter().map(|(c, a)| (c.as_str(), a)));
    for (code, aggregate) in ordered {
        let summary = finalize_area(aggregate, &columns, config);
        areas.push((code.to_string(), summary));
    }
    Summary { areas, columns }
}

fn finalize_area(
    aggregate: &AreaAggregate,
    columns: &[(String, Columns)],
    config: &SummaryConfig,
) -> AreaSummary {
    let mut attributes = Vec::with_capacity(columns.len());
    for (attribute, plan) in columns {
        let value = match plan {
            Columns::Certificates => FinalAttribute::Count(aggregate.certificates),
            Columns::Stats(fields) => {
                let Some(m) = aggregate.moments(attribute) else {
                    continue;
                };
                FinalAttribute::Statistics(statistics(m, fields))
            }
            Columns::Headings(headings) => {
                let Some(table) = aggregate.frequencies(attribute) else {
                    continue;
                };
                // Listed values always appear for `specific`, observed or not.
                let keep_zero = config.order_for(attribute) == OrderPolicy::Specific;
                let entries = headings
                    .iter()
                    .filter(|h| keep_zero || table.contains(h))
                    .map(|h| (h.clone(), table.get(h)))
                    .collect();
                FinalAttribute::Frequencies(entries)
            }
        };
        attributes.push((attribute.clone(), value));
    }
    AreaSummary { attributes }
}

fn statistics(m: &Moments, fields: &[StatName]) -> Vec<(StatName, Option<f64>)> {
    fields
        .iter()
        .map(|&name| {
            let value = match name {
                StatName::Count => Some(m.n as f64),
                StatName::Mean => Some(m.mean()),
                StatName::Variance => m.variance(),
                StatName::Sd => m.sd(),
                StatName::Min => m.min,
                StatName::Max => m.max,
            };
            (name, value)
        })
        .collect()
}

impl Serialize for FinalAttribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FinalAttribute::Count(n) => serializer.serialize_u64(*n),
            FinalAttribute::Frequencies(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (value, count) in entries {
                    map.serialize_entry(value, count)?;
                }
                map.end()
            }
            FinalAttribute::Statistics(stats) => {
                let mut map = serializer.serialize_map(Some(stats.len()))?;
                for (name, value) in stats {
                    match (name, value) {
                        (StatName::Count, Some(n)) => {
                            map.serialize_entry(name.as_str(), &(*n as u64))?
                        }
                        _ => map.serialize_entry(name.as_str(), value)?,
                    }
                }
                map.end()
            }
        }
    }
}

impl Serialize for AreaSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len()))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.areas.len()))?;
        for (code, area) in &self.areas {
            map.serialize_entry(code, area)?;
        }
        map.end()
    }
}
