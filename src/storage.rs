//! Output writers: serialize a [`Frame`] to CSV, Parquet, or YAML, dispatched
//! by the destination extension. Without a destination the frame is previewed
//! on stdout instead.

use crate::error::Result;
use crate::frame::{Cell, Frame};
use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use csv::WriterBuilder;
use log::info;
use num_format::{Locale, ToFormattedString};
use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Rows shown by the console preview.
const PREVIEW_ROWS: usize = 20;

/// Write `frame` to `out`, choosing the format from the extension: `.csv`,
/// `.parquet`, `.yaml`/`.yml`; anything else (or no extension) falls back to
/// CSV. With no destination, print a bounded preview instead and touch no
/// file. A successful write logs one summary line with path, row count, and
/// column count.
pub fn save(frame: &Frame, out: Option<&Path>) -> Result<()> {
    let Some(path) = out else {
        println!("{}", frame.preview(PREVIEW_ROWS));
        return Ok(());
    };
    match extension(path).as_deref() {
        Some("parquet") => save_parquet(frame, path)?,
        Some("yaml" | "yml") => save_yaml(frame, path)?,
        _ => save_csv(frame, path)?,
    }
    info!(
        "Wrote: {} (rows={}, cols={})",
        path.display(),
        frame.n_rows().to_formatted_string(&Locale::en),
        frame.n_cols()
    );
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// CSV with a header row and no index column. Null cells render as empty
/// fields.
fn save_csv(frame: &Frame, path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(frame.columns())?;
    for row in frame.rows() {
        wtr.write_record(row.iter().map(Cell::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Arrow type for one column: Int64 when every non-null cell is an integer,
/// Float64 when numeric with any float, Utf8 otherwise. All-null columns are
/// Utf8. Every column is nullable.
fn column_type(frame: &Frame, idx: usize) -> DataType {
    let mut saw_int = false;
    let mut saw_float = false;
    for row in frame.rows() {
        match row[idx] {
            Cell::Null => {}
            Cell::Int(_) => saw_int = true,
            Cell::Float(_) => saw_float = true,
            Cell::Str(_) => return DataType::Utf8,
        }
    }
    if saw_float {
        DataType::Float64
    } else if saw_int {
        DataType::Int64
    } else {
        DataType::Utf8
    }
}

fn build_array(frame: &Frame, idx: usize, data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::new();
            for row in frame.rows() {
                match row[idx] {
                    Cell::Int(i) => builder.append_value(i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::new();
            for row in frame.rows() {
                match row[idx].as_f64() {
                    Some(v) => builder.append_value(v),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for row in frame.rows() {
                match &row[idx] {
                    Cell::Null => builder.append_null(),
                    cell => builder.append_value(cell.to_string()),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

fn save_parquet(frame: &Frame, path: &Path) -> Result<()> {
    let fields: Vec<Field> = frame
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| Field::new(name, column_type(frame, idx), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| build_array(frame, idx, field.data_type()))
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// YAML sequence of per-row mappings, field order preserved per row.
#[cfg(feature = "yaml")]
fn save_yaml(frame: &Frame, path: &Path) -> Result<()> {
    use serde_yaml::{Mapping, Value};

    let records: Vec<Value> = frame
        .rows()
        .iter()
        .map(|row| {
            let mut record = Mapping::with_capacity(frame.n_cols());
            for (name, cell) in frame.columns().iter().zip(row) {
                record.insert(Value::String(name.clone()), yaml_cell(cell));
            }
            Value::Mapping(record)
        })
        .collect();
    let file = fs::File::create(path)?;
    serde_yaml::to_writer(file, &records)?;
    Ok(())
}

#[cfg(not(feature = "yaml"))]
fn save_yaml(_frame: &Frame, _path: &Path) -> Result<()> {
    Err(crate::error::Error::UnsupportedFormat(
        "YAML output requires the `yaml` feature; rebuild with `--features yaml`".to_string(),
    ))
}

#[cfg(feature = "yaml")]
fn yaml_cell(cell: &Cell) -> serde_yaml::Value {
    use serde_yaml::Value;
    match cell {
        Cell::Null => Value::Null,
        Cell::Str(s) => Value::String(s.clone()),
        Cell::Int(i) => Value::Number((*i).into()),
        Cell::Float(v) => Value::Number((*v).into()),
    }
}

/// YAML mapping keyed by record id, keys in sorted order. Used by the keyed
/// metadata exports, which keep list-valued fields as lists.
#[cfg(feature = "yaml")]
pub fn save_keyed_yaml<T: serde::Serialize>(
    records: &BTreeMap<String, T>,
    path: &Path,
) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_yaml::to_writer(file, records)?;
    info!(
        "Wrote: {} (entries={})",
        path.display(),
        records.len().to_formatted_string(&Locale::en)
    );
    Ok(())
}

#[cfg(not(feature = "yaml"))]
pub fn save_keyed_yaml<T: serde::Serialize>(
    _records: &BTreeMap<String, T>,
    _path: &Path,
) -> Result<()> {
    Err(crate::error::Error::UnsupportedFormat(
        "YAML output requires the `yaml` feature; rebuild with `--features yaml`".to_string(),
    ))
}
