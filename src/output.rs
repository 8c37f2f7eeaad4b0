//! The output sink: a narrow append contract over record tables.
//!
//! The aggregation side never knows where records land. A sink exposes
//! `create` (declare a table once) and `extend` (append records to it);
//! the memory sink backs tests and the report printers, the ndjson sink
//! writes one file per table the way the catalog tooling does.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::calculator::CalculationResults;

#[derive(Debug, Clone, PartialEq)]
pub enum OutputError {
    DuplicateTable(String),
    UnknownTable(String),
    Io(String),
    Serialize(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::DuplicateTable(key) => write!(f, "table {key} already exists"),
            OutputError::UnknownTable(key) => write!(f, "table {key} was never created"),
            OutputError::Io(text) => write!(f, "output i/o failed: {text}"),
            OutputError::Serialize(text) => write!(f, "record serialization failed: {text}"),
        }
    }
}

impl Error for OutputError {}

/// Appendable record tables. `create` declares a table exactly once,
/// `extend` appends records to a declared table.
pub trait OutputSink {
    fn create(&mut self, key: &str) -> Result<(), OutputError>;
    fn extend(&mut self, key: &str, records: &[Value]) -> Result<(), OutputError>;
}

/// Turn any serializable record into a sink row.
pub fn record<T: Serialize>(value: &T) -> Result<Value, OutputError> {
    serde_json::to_value(value).map_err(|e| OutputError::Serialize(e.to_string()))
}

/// Tables held in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, Vec<Value>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn table(&self, key: &str) -> Option<&[Value]> {
        self.tables.get(key).map(|rows| rows.as_slice())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }
}

impl OutputSink for MemorySink {
    fn create(&mut self, key: &str) -> Result<(), OutputError> {
        if self.tables.contains_key(key) {
            return Err(OutputError::DuplicateTable(key.to_string()));
        }
        self.tables.insert(key.to_string(), Vec::new());
        Ok(())
    }

    fn extend(&mut self, key: &str, records: &[Value]) -> Result<(), OutputError> {
        let Some(table) = self.tables.get_mut(key) else {
            return Err(OutputError::UnknownTable(key.to_string()));
        };
        table.extend(records.iter().cloned());
        Ok(())
    }
}

/// One `<table>.ndjson` file per table under a directory, one record per
/// line.
pub struct NdjsonDirSink {
    dir: PathBuf,
    files: BTreeMap<String, BufWriter<File>>,
}

impl NdjsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| OutputError::Io(format!("{}: {e}", dir.display())))?;
        Ok(NdjsonDirSink { dir, files: BTreeMap::new() })
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        for writer in self.files.values_mut() {
            writer.flush().map_err(|e| OutputError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

impl OutputSink for NdjsonDirSink {
    fn create(&mut self, key: &str) -> Result<(), OutputError> {
        if self.files.contains_key(key) {
            return Err(OutputError::DuplicateTable(key.to_string()));
        }
        let path = self.dir.join(format!("{key}.ndjson"));
        let file =
            File::create(&path).map_err(|e| OutputError::Io(format!("{}: {e}", path.display())))?;
        self.files.insert(key.to_string(), BufWriter::new(file));
        Ok(())
    }

    fn extend(&mut self, key: &str, records: &[Value]) -> Result<(), OutputError> {
        let Some(writer) = self.files.get_mut(key) else {
            return Err(OutputError::UnknownTable(key.to_string()));
        };
        for rec in records {
            serde_json::to_writer(&mut *writer, rec)
                .map_err(|e| OutputError::Serialize(e.to_string()))?;
            writeln!(writer).map_err(|e| OutputError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CurveRecord<'a> {
    rlz: usize,
    asset: usize,
    loss_type: String,
    insured: bool,
    losses: &'a [f64],
    poes: &'a [f64],
    average_loss: f64,
}

#[derive(Serialize)]
struct AggCurveRecord<'a> {
    rlz: usize,
    loss_type: String,
    losses: &'a [f64],
    poes: &'a [f64],
    average_loss: f64,
    stddev: f64,
}

#[derive(Serialize)]
struct LossMapRecord<'a> {
    rlz: usize,
    loss_type: String,
    poe: f64,
    losses: &'a [f64],
}

#[derive(Serialize)]
struct StatCurveRecord<'a> {
    kind: &'static str,
    quantile: Option<f64>,
    loss_type: String,
    asset: usize,
    losses: &'a [f64],
    poes: &'a [f64],
    average_loss: f64,
}

#[derive(Serialize)]
struct StatMapRecord<'a> {
    kind: &'static str,
    quantile: Option<f64>,
    loss_type: String,
    poe: f64,
    losses: &'a [f64],
}

/// Write every table of one calculation through the sink.
pub fn export_results(
    results: &CalculationResults,
    sink: &mut dyn OutputSink,
) -> Result<(), OutputError> {
    let outputs = &results.outputs;

    sink.create("asset_curves")?;
    let mut rows = Vec::new();
    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        for rlz in 0..outputs.realizations.len() {
            let curves = outputs.asset_curves.get(column, rlz);
            let insured = outputs.insured_curves.get(column, rlz);
            for asset in 0..outputs.num_assets {
                if let Some(curve) = &curves[asset] {
                    rows.push(record(&CurveRecord {
                        rlz,
                        asset,
                        loss_type: loss_type.to_string(),
                        insured: false,
                        losses: &curve.losses,
                        poes: &curve.poes,
                        average_loss: curve.average_loss,
                    })?);
                }
                if let Some(curve) = &insured[asset] {
                    rows.push(record(&CurveRecord {
                        rlz,
                        asset,
                        loss_type: loss_type.to_string(),
                        insured: true,
                        losses: &curve.losses,
                        poes: &curve.poes,
                        average_loss: curve.average_loss,
                    })?);
                }
            }
        }
    }
    sink.extend("asset_curves", &rows)?;

    sink.create("agg_curves")?;
    let mut rows = Vec::new();
    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        for rlz in 0..outputs.realizations.len() {
            let agg = outputs.agg_curves.get(column, rlz);
            rows.push(record(&AggCurveRecord {
                rlz,
                loss_type: loss_type.to_string(),
                losses: &agg.curve.losses,
                poes: &agg.curve.poes,
                average_loss: agg.curve.average_loss,
                stddev: agg.stddev,
            })?);
        }
    }
    sink.extend("agg_curves", &rows)?;

    sink.create("event_loss_asset")?;
    let mut rows = Vec::with_capacity(outputs.asset_losses.len());
    for row in &outputs.asset_losses {
        rows.push(record(row)?);
    }
    sink.extend("event_loss_asset", &rows)?;

    sink.create("event_loss_agg")?;
    let mut rows = Vec::with_capacity(outputs.agg_losses.len());
    for row in &outputs.agg_losses {
        rows.push(record(row)?);
    }
    sink.extend("event_loss_agg", &rows)?;

    sink.create("loss_maps")?;
    let mut rows = Vec::new();
    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        for rlz in 0..outputs.realizations.len() {
            let map = outputs.loss_maps.get(column, rlz);
            for (poe, losses) in outputs.conditional_poes.iter().zip(map) {
                rows.push(record(&LossMapRecord {
                    rlz,
                    loss_type: loss_type.to_string(),
                    poe: *poe,
                    losses,
                })?);
            }
        }
    }
    sink.extend("loss_maps", &rows)?;

    let Some(stats) = &results.stats else {
        return Ok(());
    };

    sink.create("stat_curves")?;
    let mut rows = Vec::new();
    for per_type in &stats.per_loss_type {
        let loss_type = per_type.loss_type.to_string();
        for (asset, slot) in per_type.mean_curves.iter().enumerate() {
            if let Some(curve) = slot {
                rows.push(record(&StatCurveRecord {
                    kind: "mean",
                    quantile: None,
                    loss_type: loss_type.clone(),
                    asset,
                    losses: &curve.losses,
                    poes: &curve.poes,
                    average_loss: curve.average_loss,
                })?);
            }
        }
        for (&quantile, curves) in stats.quantiles.iter().zip(&per_type.quantile_curves) {
            for (asset, slot) in curves.iter().enumerate() {
                if let Some(curve) = slot {
                    rows.push(record(&StatCurveRecord {
                        kind: "quantile",
                        quantile: Some(quantile),
                        loss_type: loss_type.clone(),
                        asset,
                        losses: &curve.losses,
                        poes: &curve.poes,
                        average_loss: curve.average_loss,
                    })?);
                }
            }
        }
    }
    sink.extend("stat_curves", &rows)?;

    sink.create("stat_maps")?;
    let mut rows = Vec::new();
    for per_type in &stats.per_loss_type {
        let loss_type = per_type.loss_type.to_string();
        for (poe, losses) in stats.conditional_poes.iter().zip(&per_type.mean_maps) {
            rows.push(record(&StatMapRecord {
                kind: "mean",
                quantile: None,
                loss_type: loss_type.clone(),
                poe: *poe,
                losses,
            })?);
        }
        for (&quantile, maps) in stats.quantiles.iter().zip(&per_type.quantile_maps) {
            for (poe, losses) in stats.conditional_poes.iter().zip(maps) {
                rows.push(record(&StatMapRecord {
                    kind: "quantile",
                    quantile: Some(quantile),
                    loss_type: loss_type.clone(),
                    poe: *poe,
                    losses,
                })?);
            }
        }
    }
    sink.extend("stat_maps", &rows)?;

    Ok(())
}
