//! CSV persistence for every artifact the pipeline stages hand to each other.
//!
//! Undefined values are written as empty cells and read back as `None`.

use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{CutoffDirection, CutoffRecord, Metric, MetricRecord};
use crate::universe::TickerCoverage;

pub const METRICS_COLUMNS: [&str; 9] = [
    "ticker",
    "industry",
    "market_cap",
    "revenue_cagr",
    "net_profit_margin_avg",
    "net_income_cagr",
    "eps_cagr",
    "operating_cashflow_cagr",
    "roce",
];

fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("opening {} for writing", path.display()))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_cell(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    Ok(Some(raw.parse().with_context(|| format!("invalid number '{}'", raw))?))
}

/// Write the Metrics Table, header included even when there are no rows
pub fn write_metrics(path: &Path, records: &[MetricRecord]) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record(METRICS_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_metrics(path: &Path) -> Result<Vec<MetricRecord>> {
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening metrics table {}", path.display()))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<MetricRecord>().enumerate() {
        let mut record = row.with_context(|| format!("{} row {}", path.display(), line + 1))?;
        record.industry = record.industry.filter(|i| !i.trim().is_empty());
        records.push(record);
    }
    Ok(records)
}

/// Write the Cutoffs Table with one column per screened metric, in `metrics` order
pub fn write_cutoffs(path: &Path, cutoffs: &[CutoffRecord], metrics: &[Metric]) -> Result<()> {
    let mut writer = create_writer(path)?;

    let mut header = vec!["industry".to_string(), "percentile".to_string()];
    header.extend(metrics.iter().map(|m| m.column().to_string()));
    writer.write_record(&header)?;

    for row in cutoffs {
        let mut fields = vec![row.industry.clone(), row.percentile.to_string()];
        fields.extend(metrics.iter().map(|&m| cell(row.value(m))));
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a Cutoffs Table, returning the metric columns it carries alongside the rows
pub fn read_cutoffs(path: &Path) -> Result<(Vec<Metric>, Vec<CutoffRecord>)> {
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening cutoffs table {}", path.display()))?;

    let headers = reader.headers()?.clone();
    if headers.get(0) != Some("industry") || headers.get(1) != Some("percentile") {
        return Err(anyhow!(
            "{} must start with industry,percentile columns",
            path.display()
        ));
    }
    let metrics = headers
        .iter()
        .skip(2)
        .map(|name| name.parse::<Metric>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut cutoffs = Vec::new();
    for row in reader.records() {
        let row = row?;
        let percentile: u8 = row
            .get(1)
            .unwrap_or_default()
            .trim()
            .parse()
            .with_context(|| format!("invalid percentile in {}", path.display()))?;
        let values = metrics
            .iter()
            .enumerate()
            .map(|(i, &metric)| Ok((metric, parse_cell(row.get(i + 2).unwrap_or_default())?)))
            .collect::<Result<Vec<_>>>()?;

        cutoffs.push(CutoffRecord {
            industry: row.get(0).unwrap_or_default().to_string(),
            percentile,
            values,
        });
    }
    Ok((metrics, cutoffs))
}

/// Sidecar stored next to a Cutoffs Table recording how its quantiles were taken
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoffsMeta {
    pub direction: CutoffDirection,
}

/// `cutoffs_table.csv` → `cutoffs_table.meta.json`
pub fn cutoffs_meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

pub fn write_cutoffs_meta(path: &Path, meta: &CutoffsMeta) -> Result<()> {
    let meta_path = cutoffs_meta_path(path);
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(&meta_path, json).with_context(|| format!("writing {}", meta_path.display()))
}

/// `None` when the table was written without a sidecar
pub fn read_cutoffs_meta(path: &Path) -> Result<Option<CutoffsMeta>> {
    let meta_path = cutoffs_meta_path(path);
    if !meta_path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    let meta = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", meta_path.display()))?;
    Ok(Some(meta))
}

/// Fail unless the Cutoffs Table at `path` was aggregated for `direction`
pub fn ensure_cutoffs_direction(path: &Path, direction: CutoffDirection) -> Result<()> {
    match read_cutoffs_meta(path)? {
        Some(meta) if meta.direction == direction => Ok(()),
        Some(meta) => bail!(
            "{} holds {} cutoffs but screening uses {}; rerun `cutoffs --direction {}` or screen with --direction {}",
            path.display(),
            meta.direction,
            direction,
            direction,
            meta.direction
        ),
        None => bail!(
            "{} has no recorded direction ({} missing); rerun `cutoffs` to regenerate it",
            path.display(),
            cutoffs_meta_path(path).display()
        ),
    }
}

/// Write a qualification result in the `YF_Ticker,Years` layout
pub fn write_coverage(path: &Path, rows: &[TickerCoverage]) -> Result<()> {
    let mut writer = create_writer(path)?;
    writer.write_record(["YF_Ticker", "Years"])?;
    for row in rows {
        let years = row
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let years = format!("[{}]", years);
        writer.write_record([row.ticker.as_str(), years.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one column of tickers from a CSV, skipping blanks
pub fn read_ticker_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let index = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| anyhow!("{} has no '{}' column", path.display(), column))?;

    let mut tickers = Vec::new();
    for row in reader.records() {
        if let Some(ticker) = row?.get(index).map(str::trim).filter(|t| !t.is_empty()) {
            tickers.push(ticker.to_string());
        }
    }
    Ok(tickers)
}
