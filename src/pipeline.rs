// One summary run: load inputs, decide what is stale, rebuild it.
//
// Nothing here survives between invocations; all aggregation state lives
// in the `Classifier` created for the run and is dropped when it returns.
use crate::classify::{Classifier, RunCounters};
use crate::error::{Result, SummaryError};
use crate::finalize::finalize;
use crate::loader::{load_config, load_source_version, load_uprn_lookup, CertificateReader};
use crate::map::{merge_summary, read_json, LayerRegistry};
use crate::output::{build_sheets, preview_sheet, write_json, write_workbook, CsvWorkbook};
use crate::types::{SummaryConfig, UprnLookup, ALL_AREA};
use crate::util::format_int;
use crate::version::{check_map, check_summary, Stamp, StampStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_CODE_NAME: &str = "PARISH_CODE";

/// Paths and identifiers for a run, overridable as `key=value` arguments.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub uprn_lookup: Option<PathBuf>,
    pub code_name: Option<String>,
    pub config: PathBuf,
    pub json_output: Option<PathBuf>,
    pub workbook_output: Option<PathBuf>,
    pub versions: Option<PathBuf>,
    pub layers: Option<PathBuf>,
    pub map: Option<String>,
    pub map_output: Option<PathBuf>,
    /// Rows of the certificates sheet echoed to the console.
    pub preview_rows: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            data_dir: PathBuf::from("data"),
            uprn_lookup: None,
            code_name: None,
            config: PathBuf::from("config.json"),
            json_output: None,
            workbook_output: None,
            versions: None,
            layers: None,
            map: None,
            map_output: None,
            preview_rows: 5,
        }
    }
}

impl RunOptions {
    /// Applies `key=value` overrides. Unknown keys are logged and ignored.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut opts = RunOptions::default();
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                warn!(arg = %arg, "ignoring argument without '='");
                continue;
            };
            match key {
                "datadir" => opts.data_dir = PathBuf::from(value),
                "uprn_lookup" => opts.uprn_lookup = Some(PathBuf::from(value)),
                "code_name" => opts.code_name = Some(value.to_string()),
                "config" => opts.config = PathBuf::from(value),
                "json_output" => opts.json_output = Some(PathBuf::from(value)),
                "xlsx_output" | "workbook_output" => {
                    opts.workbook_output = Some(PathBuf::from(value))
                }
                "versions" => opts.versions = Some(PathBuf::from(value)),
                "layers" => opts.layers = Some(PathBuf::from(value)),
                "map" => opts.map = Some(value.to_string()),
                "map_output" => opts.map_output = Some(PathBuf::from(value)),
                _ => warn!(key, "ignoring unknown option"),
            }
        }
        opts
    }

    fn in_data_dir(&self, explicit: &Option<PathBuf>, default: &str) -> PathBuf {
        explicit.clone().unwrap_or_else(|| self.data_dir.join(default))
    }

    pub fn source_path(&self) -> PathBuf {
        self.data_dir.join("epc_data.csv")
    }

    pub fn source_version_path(&self) -> PathBuf {
        self.data_dir.join("version.json")
    }

    pub fn lookup_path(&self) -> PathBuf {
        self.in_data_dir(&self.uprn_lookup, "uprn_lookup.json")
    }

    pub fn json_path(&self) -> PathBuf {
        self.in_data_dir(&self.json_output, "summary_output.json")
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.in_data_dir(&self.workbook_output, "summary_output")
    }

    pub fn versions_path(&self) -> PathBuf {
        self.in_data_dir(&self.versions, "artifact_versions.json")
    }

    pub fn layers_path(&self) -> PathBuf {
        self.in_data_dir(&self.layers, "layers.json")
    }

    pub fn map_path(&self, map: &str) -> PathBuf {
        self.in_data_dir(&self.map_output, &format!("epc_{map}.geojson"))
    }
}

/// What a run did. `counters` is only present when the summary was rebuilt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub counters: Option<RunCounters>,
    pub map_regenerated: bool,
}

impl RunReport {
    pub fn summary_recomputed(&self) -> bool {
        self.counters.is_some()
    }
}

pub fn run(opts: &RunOptions) -> Result<RunReport> {
    let source = opts.source_path();
    if !source.is_file() {
        return Err(SummaryError::MissingSource(source));
    }
    let config = load_config(&opts.config)?;
    let code_name = opts
        .code_name
        .clone()
        .or_else(|| config.code_name.clone())
        .unwrap_or_else(|| DEFAULT_CODE_NAME.to_string());

    let stamp = Stamp::new(
        load_source_version(&opts.source_version_path())?,
        config.version.clone(),
    );
    let mut store = StampStore::load(opts.versions_path())?;
    let json_path = opts.json_path();
    let workbook_path = opts.workbook_path();
    let summary_key = artifact_key(&json_path);

    let mut report = RunReport::default();
    let staleness = check_summary(
        &store,
        &summary_key,
        &stamp,
        &[json_path.as_path(), workbook_path.as_path()],
    );
    if staleness.is_fresh() {
        info!(artifact = %summary_key, "summary up to date, skipping aggregation");
    } else {
        info!(artifact = %summary_key, reason = %staleness, "recomputing summary");
        let lookup = load_uprn_lookup(&opts.lookup_path())?;
        let counters = summarise(
            &source,
            &config,
            &lookup,
            &code_name,
            &json_path,
            &workbook_path,
            opts.preview_rows,
        )?;
        store.record(&summary_key, stamp.clone())?;
        report.counters = Some(counters);
    }

    if let Some(map) = &opts.map {
        report.map_regenerated =
            refresh_map(opts, map, &code_name, &json_path, &stamp, &mut store)?;
    }
    Ok(report)
}

fn summarise(
    source: &Path,
    config: &SummaryConfig,
    lookup: &UprnLookup,
    code_name: &str,
    json_path: &Path,
    workbook_path: &Path,
    preview_rows: usize,
) -> Result<RunCounters> {
    info!(path = %source.display(), code_name, "processing certificates");
    let mut classifier = Classifier::new(config, lookup, code_name);
    for record in CertificateReader::open(source)? {
        classifier.observe(&record?);
        let records = classifier.counters().records;
        if records % 100_000 == 0 {
            debug!("{} records read", format_int(records));
        }
    }
    let aggregation = classifier.finish();
    let c = aggregation.counters;
    info!("Total records processed: {}", format_int(c.records));
    info!("Total unique building EPCs: {}", format_int(c.unique_buildings));
    info!("Total records with no UPRN match: {}", format_int(c.missing_uprn));
    info!(
        areas = aggregation.areas.len(),
        unclassified = c.unclassified,
        unparseable_values = c.unparseable_values,
        "classification complete"
    );

    let summary = finalize(&aggregation, config);
    write_json(json_path, &summary)?;
    let certificates = summary.area(ALL_AREA).map_or(0, |a| a.certificates());
    info!(path = %json_path.display(), certificates, "JSON summary written");

    let sheets = build_sheets(&summary);
    write_workbook(CsvWorkbook::create(workbook_path)?, &sheets)?;
    if let Some(certificates) = sheets.first().filter(|_| preview_rows > 0) {
        preview_sheet(certificates, preview_rows);
    }
    Ok(c)
}

fn refresh_map(
    opts: &RunOptions,
    map: &str,
    code_name: &str,
    json_path: &Path,
    summary_stamp: &Stamp,
    store: &mut StampStore,
) -> Result<bool> {
    let registry = LayerRegistry::load(&opts.layers_path())?;
    let layer = registry.layer(map)?;
    let map_path = opts.map_path(map);
    let map_key = artifact_key(&map_path);

    let staleness = check_map(store, &map_key, &map_path, summary_stamp, layer.version.as_ref());
    if staleness.is_fresh() {
        info!(artifact = %map_key, "map layer up to date");
        return Ok(false);
    }
    info!(artifact = %map_key, reason = %staleness, "regenerating map layer");
    let geography: Value = read_json(&layer.path)?;
    let summary: Map<String, Value> = read_json(json_path)?;
    let merged = merge_summary(geography, &summary, code_name, &layer.path)?;
    write_json(&map_path, &merged)?;
    store.record(&map_key, summary_stamp.clone().with_geography(layer.version))?;
    Ok(true)
}

fn artifact_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
