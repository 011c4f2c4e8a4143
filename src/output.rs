use crate::error::{Result, SummaryError};
use crate::finalize::{Columns, Summary};
use crate::util::format_stat;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::{debug, info};

/// Header of the first column of every sheet.
pub const AREA_HEADER: &str = "Area Code";

/// Writes pretty JSON next to `path` and renames it into place, so readers
/// see either the previous file or the complete new one.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(|e| SummaryError::json(path, e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SummaryError::io(parent, e))?;
    }
    let staging = staging_path(path);
    fs::write(&staging, s).map_err(|e| SummaryError::io(&staging, e))?;
    fs::rename(&staging, path).map_err(|e| SummaryError::io(path, e))?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(u64),
    Stat(Option<f64>),
}

impl Cell {
    fn raw(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Count(n) => n.to_string(),
            Cell::Stat(Some(v)) => v.to_string(),
            Cell::Stat(None) => String::new(),
        }
    }

    fn display(&self) -> String {
        match self {
            Cell::Stat(v) => format_stat(*v),
            other => other.raw(),
        }
    }
}

/// One worksheet: a header row followed by one row per area.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// Lays out one sheet per attribute, `certificates` first. Discrete
/// columns follow the summary's heading order with absent values as 0.
pub fn build_sheets(summary: &Summary) -> Vec<Sheet> {
    summary
        .columns
        .iter()
        .map(|(attribute, columns)| {
            let mut header = vec![Cell::Text(AREA_HEADER.to_string())];
            match columns {
                Columns::Certificates => header.push(Cell::Text(attribute.clone())),
                Columns::Headings(h) => header.extend(h.iter().cloned().map(Cell::Text)),
                Columns::Stats(s) => {
                    header.extend(s.iter().map(|n| Cell::Text(n.as_str().to_string())))
                }
            }
            let mut rows = vec![header];
            for (code, area) in &summary.areas {
                let mut row = vec![Cell::Text(code.clone())];
                let value = area.get(attribute);
                match columns {
                    Columns::Certificates => row.push(Cell::Count(area.certificates())),
                    Columns::Headings(h) => row.extend(
                        h.iter()
                            .map(|v| Cell::Count(value.map_or(0, |a| a.frequency(v)))),
                    ),
                    Columns::Stats(s) => row.extend(
                        s.iter()
                            .map(|&n| Cell::Stat(value.and_then(|a| a.statistic(n)))),
                    ),
                }
                rows.push(row);
            }
            Sheet { name: attribute.clone(), rows }
        })
        .collect()
}

/// Consumer of finished sheets. The workbook only becomes visible on
/// `commit`; dropping a sink without committing leaves the old output.
pub trait WorkbookSink {
    fn add_sheet(&mut self, sheet: &Sheet) -> Result<()>;
    fn commit(self) -> Result<()>;
}

/// Workbook as a directory with one CSV file per sheet.
#[derive(Debug)]
pub struct CsvWorkbook {
    target: PathBuf,
    staging: PathBuf,
    /// Lowercased stems already written, so case-insensitive filesystems
    /// cannot fold two sheets onto one file either.
    used: HashSet<String>,
}

impl CsvWorkbook {
    pub fn create(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let staging = staging_path(&target);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| SummaryError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| SummaryError::io(&staging, e))?;
        Ok(CsvWorkbook { target, staging, used: HashSet::new() })
    }

    /// Sanitised file stem for a sheet, suffixed `_2`, `_3`, ... when an
    /// earlier sheet already took it.
    fn unique_stem(&mut self, name: &str) -> String {
        let base = sheet_file_name(name);
        let mut stem = base.clone();
        let mut n = 1;
        while !self.used.insert(stem.to_lowercase()) {
            n += 1;
            stem = format!("{base}_{n}");
        }
        stem
    }
}

impl WorkbookSink for CsvWorkbook {
    fn add_sheet(&mut self, sheet: &Sheet) -> Result<()> {
        let stem = self.unique_stem(&sheet.name);
        if stem != sheet.name {
            debug!(sheet = %sheet.name, file = %stem, "sheet renamed on disk");
        }
        let path = self.staging.join(format!("{stem}.csv"));
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| SummaryError::csv(&path, e))?;
        for row in &sheet.rows {
            wtr.write_record(row.iter().map(Cell::raw))
                .map_err(|e| SummaryError::csv(&path, e))?;
        }
        wtr.flush().map_err(|e| SummaryError::io(&path, e))?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target).map_err(|e| SummaryError::io(&self.target, e))?;
        }
        fs::rename(&self.staging, &self.target).map_err(|e| SummaryError::io(&self.target, e))?;
        info!(path = %self.target.display(), "workbook written");
        Ok(())
    }
}

fn sheet_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn write_workbook<W: WorkbookSink>(mut sink: W, sheets: &[Sheet]) -> Result<()> {
    for sheet in sheets {
        sink.add_sheet(sheet)?;
    }
    sink.commit()
}

/// Prints the first rows of a sheet as a markdown table.
pub fn preview_sheet(sheet: &Sheet, max_rows: usize) {
    // Header plus `max_rows` data rows.
    let rows: Vec<Vec<String>> = sheet
        .rows
        .iter()
        .take(max_rows + 1)
        .map(|r| r.iter().map(Cell::display).collect())
        .collect();
    if rows.len() < 2 {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    for row in rows {
        builder.push_record(row);
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
