use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::model::{Artifact, LoaderArgs, Value};

// ---------------------------------------------------------------------------
// Table1D – a 1-D profile or SED
// ---------------------------------------------------------------------------

/// One named column of a table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub values: Vec<f64>,
}

/// Tabular 1-D data: radial profiles, spectra, SEDs.
#[derive(Debug, Clone, PartialEq)]
pub struct Table1D {
    pub columns: Vec<Column>,
    /// Observing wavelength, when the section passes `loader_wlg`.
    pub wavelength: Option<Value>,
    /// File the table was read from.
    pub path: PathBuf,
}

impl Table1D {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_lengths(&self) -> Result<()> {
        let rows = self.len();
        for col in &self.columns {
            if col.values.len() != rows {
                bail!(
                    "column '{}' has {} values but '{}' has {rows}",
                    col.name,
                    col.values.len(),
                    self.columns[0].name
                );
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Registered loader for the `profile` and `sed` types.
///
/// Recognised arguments: `wlg` (stored as [`Table1D::wavelength`]).
pub fn load_profile(path: &Path, args: &LoaderArgs) -> Result<Artifact> {
    let mut table = load_table(path)?;
    for (key, value) in args.iter() {
        match key {
            "wlg" => table.wavelength = Some(value.clone()),
            other => debug!("ignoring loader argument '{other}' = {value}"),
        }
    }
    Ok(Arc::new(table))
}

/// Load a table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one numeric column per field; a header such as
///                `r [arcsec]` declares the unit of that column
/// * `.json`    – `{"columns": [{"name": "r", "unit": "arcsec", "values": [...]}]}`
/// * `.parquet` – numeric columns; unit from the field metadata key `unit`
pub fn load_table(path: &Path) -> Result<Table1D> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let columns = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let table = Table1D {
        columns,
        wavelength: None,
        path: path.to_path_buf(),
    };
    table.check_lengths()?;
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Split `name [unit]` headers.
fn split_header(header: &str) -> (String, Option<String>) {
    let header = header.trim();
    if let Some((name, rest)) = header.split_once('[') {
        if let Some(unit) = rest.strip_suffix(']') {
            return (name.trim().to_string(), Some(unit.trim().to_string()));
        }
    }
    (header.to_string(), None)
}

fn load_csv(path: &Path) -> Result<Vec<Column>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let mut columns: Vec<Column> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| {
            let (name, unit) = split_header(h);
            Column {
                name,
                unit,
                values: Vec::new(),
            }
        })
        .collect();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col, field) in columns.iter_mut().zip(record.iter()) {
            let value = field.trim().parse::<f64>().with_context(|| {
                format!("Row {row_no}, {}: '{field}' is not a number", col.name)
            })?;
            col.values.push(value);
        }
    }

    Ok(columns)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonTable {
    columns: Vec<Column>,
}

fn load_json(path: &Path) -> Result<Vec<Column>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let table: JsonTable = serde_json::from_str(&text).context("parsing JSON")?;
    Ok(table.columns)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Numeric columns become table columns; anything else is skipped.
fn load_parquet(path: &Path) -> Result<Vec<Column>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Column> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        for (idx, field) in schema.fields().iter().enumerate() {
            let Some(values) = extract_f64(batch.column(idx).as_ref())
                .with_context(|| format!("reading column '{}'", field.name()))?
            else {
                debug!("skipping non-numeric column '{}'", field.name());
                continue;
            };

            match columns.iter_mut().find(|c| c.name == *field.name()) {
                Some(col) => col.values.extend(values),
                None => columns.push(Column {
                    name: field.name().clone(),
                    unit: field.metadata().get("unit").cloned(),
                    values,
                }),
            }
        }
    }

    Ok(columns)
}

/// Read a numeric Arrow column as `f64`, nulls as NaN. `None` for other types.
fn extract_f64(col: &dyn Array) -> Result<Option<Vec<f64>>> {
    let values = match col.data_type() {
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("expected Float64Array")?
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect(),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("expected Float32Array")?
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .iter()
            .map(|v| v.map_or(f64::NAN, |i| i as f64))
            .collect(),
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        _ => return Ok(None),
    };
    Ok(Some(values))
}
