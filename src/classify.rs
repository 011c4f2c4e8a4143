use crate::accumulate::{AreaAggregate, AttributeAggregate, FrequencyTable, Moments};
use crate::types::{
    AttributeHandling, CertificateRecord, SummaryConfig, UprnLookup, ALL_AREA, BUILDING_FIELD,
    CERTIFICATES, UPRN_FIELD,
};
use crate::util::parse_f64_safe;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Diagnostic totals for one run. Logged, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub records: u64,
    pub unique_buildings: u64,
    pub missing_uprn: u64,
    pub unclassified: u64,
    pub unparseable_values: u64,
}

/// Per-attribute routing decided once from configuration.
#[derive(Debug, Clone)]
struct AttributePlan {
    name: String,
    handling: Option<AttributeHandling>,
    continuous: bool,
}

impl AttributePlan {
    fn empty_aggregate(&self) -> AttributeAggregate {
        if self.continuous {
            AttributeAggregate::Continuous(Moments::default())
        } else {
            AttributeAggregate::Discrete(FrequencyTable::default())
        }
    }
}

enum Observation<'v> {
    Text(&'v str),
    Number(f64),
}

/// Aggregates produced by a classifier once the stream is exhausted.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub all: AreaAggregate,
    pub areas: BTreeMap<String, AreaAggregate>,
    pub counters: RunCounters,
}

/// Streams certificate records into per-area aggregates.
///
/// Input contract: records must arrive newest-first for each building.
/// The first record seen for a building identifier is the only one
/// counted, so that ordering gives "most recent certificate wins". The
/// classifier does not sort.
pub struct Classifier<'a> {
    lookup: &'a UprnLookup,
    code_name: String,
    plans: Vec<AttributePlan>,
    seen_buildings: HashSet<String>,
    all: AreaAggregate,
    areas: BTreeMap<String, AreaAggregate>,
    counters: RunCounters,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &SummaryConfig, lookup: &'a UprnLookup, code_name: &str) -> Self {
        let mut named = HashSet::from([CERTIFICATES]);
        let plans = config
            .attributes
            .iter()
            .filter(|&name| named.insert(name.as_str()))
            .map(|name| {
                let handling = config.handling(name).cloned();
                let continuous = handling
                    .as_ref()
                    .is_some_and(|h| h.stat_fields().is_some());
                AttributePlan { name: name.clone(), handling, continuous }
            })
            .collect();
        Classifier {
            lookup,
            code_name: code_name.to_string(),
            plans,
            seen_buildings: HashSet::new(),
            all: AreaAggregate::default(),
            areas: BTreeMap::new(),
            counters: RunCounters::default(),
        }
    }

    pub fn observe(&mut self, record: &CertificateRecord) {
        self.counters.records += 1;

        let uprn = non_empty(record.get(UPRN_FIELD));
        if uprn.is_none() {
            self.counters.missing_uprn += 1;
        }

        let Some(building) = non_empty(record.get(BUILDING_FIELD)) else {
            return;
        };
        if !self.seen_buildings.insert(building.to_string()) {
            return;
        }
        self.counters.unique_buildings += 1;

        let Some(uprn) = uprn else {
            return;
        };
        let Some(entry) = self.lookup.get(uprn) else {
            debug!(uprn, "UPRN not found in lookup");
            self.counters.missing_uprn += 1;
            return;
        };
        let Some(area_code) = entry.get(&self.code_name).and_then(area_code_of) else {
            self.counters.unclassified += 1;
            return;
        };
        if area_code == ALL_AREA {
            warn!(uprn, area_code = %area_code, "area code collides with the reserved all area");
            self.counters.unclassified += 1;
            return;
        }

        let area = self.areas.entry(area_code).or_default();
        let all = &mut self.all;
        area.certificates += 1;
        all.certificates += 1;

        for plan in &self.plans {
            let Some(raw) = non_empty(record.get(&plan.name)) else {
                continue;
            };
            let value = match &plan.handling {
                Some(h) => h.remap(raw),
                None => raw.to_string(),
            };
            let observation = if plan.continuous {
                match parse_f64_safe(&value) {
                    Some(v) => Observation::Number(v),
                    None => {
                        self.counters.unparseable_values += 1;
                        continue;
                    }
                }
            } else {
                Observation::Text(&value)
            };
            route(area, plan, &observation);
            route(all, plan, &observation);
        }
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn finish(self) -> Aggregation {
        Aggregation { all: self.all, areas: self.areas, counters: self.counters }
    }
}

fn route(aggregate: &mut AreaAggregate, plan: &AttributePlan, observation: &Observation<'_>) {
    let slot = aggregate
        .attributes
        .entry(plan.name.clone())
        .or_insert_with(|| plan.empty_aggregate());
    match (slot, observation) {
        (AttributeAggregate::Discrete(table), Observation::Text(v)) => table.observe(v),
        (AttributeAggregate::Continuous(m), Observation::Number(v)) => m.observe(*v),
        // Plans never change kind within a run.
        _ => {}
    }
}

fn non_empty(v: Option<&String>) -> Option<&str> {
    v.map(String::as_str).filter(|s| !s.is_empty())
}

fn area_code_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup() -> UprnLookup {
        serde_json::from_value(json!({
            "100": {"PARISH_CODE": "E04000001"},
            "200": {"PARISH_CODE": "E04000002"},
            "300": {"PARISH_CODE": ""},
        }))
        .unwrap()
    }

    fn config(json: serde_json::Value) -> SummaryConfig {
        serde_json::from_value(json).unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> CertificateRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn rating_config() -> SummaryConfig {
        config(json!({"attributes": ["current-energy-rating"]}))
    }

    #[test]
    fn newest_certificate_per_building_wins() {
        let lookup = lookup();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        // Newest first, as supplied by the fetcher.
        c.observe(&record(&[
            ("building-reference-number", "B1"),
            ("uprn", "100"),
            ("current-energy-rating", "C"),
        ]));
        c.observe(&record(&[
            ("building-reference-number", "B1"),
            ("uprn", "100"),
            ("current-energy-rating", "E"),
        ]));
        let agg = c.finish();
        let area = &agg.areas["E04000001"];
        assert_eq!(area.certificates, 1);
        let table = area.frequencies("current-energy-rating").unwrap();
        assert_eq!(table.get("C"), 1);
        assert_eq!(table.get("E"), 0);
        assert_eq!(agg.counters.records, 2);
        assert_eq!(agg.counters.unique_buildings, 1);
    }

    #[test]
    fn repeated_building_leaves_aggregates_unchanged() {
        let lookup = lookup();
        let cfg = rating_config();
        let first = record(&[
            ("building-reference-number", "B7"),
            ("uprn", "200"),
            ("current-energy-rating", "B"),
        ]);

        let mut once = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        once.observe(&first);
        let once = once.finish();

        let mut twice = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        twice.observe(&first);
        twice.observe(&first);
        let twice = twice.finish();

        assert_eq!(once.all, twice.all);
        assert_eq!(once.areas, twice.areas);
    }

    #[test]
    fn unknown_uprn_counts_as_missing_and_aggregates_nothing() {
        let lookup = lookup();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        c.observe(&record(&[
            ("building-reference-number", "B2"),
            ("uprn", "999"),
            ("current-energy-rating", "D"),
        ]));
        let agg = c.finish();
        assert_eq!(agg.counters.missing_uprn, 1);
        assert!(agg.areas.is_empty());
        assert_eq!(agg.all.certificates, 0);
    }

    #[test]
    fn blank_uprn_counted_once() {
        let lookup = lookup();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        c.observe(&record(&[("building-reference-number", "B3"), ("uprn", "")]));
        let counters = c.counters();
        assert_eq!(counters.missing_uprn, 1);
        assert_eq!(counters.unique_buildings, 1);
    }

    #[test]
    fn empty_area_code_is_unclassified() {
        let lookup = lookup();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        c.observe(&record(&[("building-reference-number", "B4"), ("uprn", "300")]));
        let agg = c.finish();
        assert_eq!(agg.counters.unclassified, 1);
        assert!(agg.areas.is_empty());
    }

    #[test]
    fn mapping_applies_before_counting() {
        let lookup = lookup();
        let cfg = config(json!({
            "attributes": ["current-energy-rating"],
            "attribute_handling": {
                "current-energy-rating": {"mapping": {"A": "Good"}}
            }
        }));
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        c.observe(&record(&[
            ("building-reference-number", "B5"),
            ("uprn", "100"),
            ("current-energy-rating", "A"),
        ]));
        let agg = c.finish();
        for area in [&agg.areas["E04000001"], &agg.all] {
            let table = area.frequencies("current-energy-rating").unwrap();
            assert_eq!(table.get("Good"), 1);
            assert_eq!(table.get("A"), 0);
        }
    }

    #[test]
    fn stats_attributes_accumulate_moments_and_skip_text() {
        let lookup = lookup();
        let cfg = config(json!({
            "attributes": ["total-floor-area"],
            "attribute_handling": {"total-floor-area": {"stats": true}}
        }));
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        for (building, area) in [("B1", "2"), ("B2", "4"), ("B3", "NO DATA!"), ("B4", "6")] {
            c.observe(&record(&[
                ("building-reference-number", building),
                ("uprn", "100"),
                ("total-floor-area", area),
            ]));
        }
        let agg = c.finish();
        let m = agg.areas["E04000001"].moments("total-floor-area").unwrap();
        assert_eq!(m.n, 3);
        assert_eq!(m.x, 12.0);
        assert_eq!(agg.all.moments("total-floor-area"), Some(m));
        assert_eq!(agg.areas["E04000001"].certificates, 4);
        assert_eq!(agg.counters.unparseable_values, 1);
    }

    #[test]
    fn area_code_named_all_is_unclassified() {
        let lookup: UprnLookup = serde_json::from_value(json!({
            "1": {"PARISH_CODE": "all"},
            "2": {"PARISH_CODE": "P2"},
        }))
        .unwrap();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        for (b, u) in [("B1", "1"), ("B2", "2")] {
            c.observe(&record(&[
                ("building-reference-number", b),
                ("uprn", u),
                ("current-energy-rating", "C"),
            ]));
        }
        let agg = c.finish();
        assert_eq!(agg.counters.unclassified, 1);
        assert!(!agg.areas.contains_key(ALL_AREA));
        assert_eq!(agg.all.certificates, 1);
        assert_eq!(agg.areas["P2"].certificates, 1);
    }

    #[test]
    fn repeated_attribute_is_counted_once() {
        let lookup = lookup();
        let cfg = config(json!({
            "attributes": ["current-energy-rating", "certificates", "current-energy-rating"]
        }));
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        c.observe(&record(&[
            ("building-reference-number", "B1"),
            ("uprn", "100"),
            ("current-energy-rating", "C"),
            ("certificates", "9"),
        ]));
        let agg = c.finish();
        assert_eq!(agg.all.frequencies("current-energy-rating").unwrap().get("C"), 1);
        assert!(!agg.all.attributes.contains_key(CERTIFICATES));
        assert_eq!(agg.all.certificates, 1);
    }

    #[test]
    fn all_aggregate_is_union_of_areas() {
        let lookup = lookup();
        let cfg = rating_config();
        let mut c = Classifier::new(&cfg, &lookup, "PARISH_CODE");
        for (b, u, r) in [("B1", "100", "C"), ("B2", "200", "C"), ("B3", "200", "D")] {
            c.observe(&record(&[
                ("building-reference-number", b),
                ("uprn", u),
                ("current-energy-rating", r),
            ]));
        }
        let agg = c.finish();
        assert!(!agg.areas.contains_key(ALL_AREA));
        assert_eq!(agg.all.certificates, 3);
        let all = agg.all.frequencies("current-energy-rating").unwrap();
        assert_eq!(all.get("C"), 2);
        assert_eq!(all.get("D"), 1);
        let sum: u64 = agg.areas.values().map(|a| a.certificates).sum();
        assert_eq!(sum, agg.all.certificates);
    }
}
