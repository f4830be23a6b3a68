use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use log::info;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::dataset::Dataset;
use super::descriptor::{DescriptorTable, DescriptorValue};

// ---------------------------------------------------------------------------
// Row – one observation of the source table
// ---------------------------------------------------------------------------

/// One observation: its measurement vector plus the remaining columns.
#[derive(Debug, Clone)]
struct Row {
    values: Vec<f64>,
    metadata: BTreeMap<String, DescriptorValue>,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Import an observation table as a 2D [`Dataset`].  Dispatch by extension.
///
/// `column` names the list-valued column holding each observation's
/// measurements; every other column becomes an obs descriptor.
///
/// Supported formats:
/// * `.parquet` – Parquet file with a List<Float64> measurement column
/// * `.json`    – `[{ "<column>": [...], ...meta }, ...]`
/// * `.csv`     – measurement column holds semicolon-separated floats
pub fn load_table(path: &Path, column: &str) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let rows = match ext.as_str() {
        "parquet" | "pq" => read_parquet(path, column)?,
        "json" => read_json(path, column)?,
        "csv" => read_csv(path, column)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    info!("imported {} observations from {}", rows.len(), path.display());
    rows_to_dataset(rows)
}

/// Stack rows into a measurement matrix; absent metadata cells become `Null`.
fn rows_to_dataset(rows: Vec<Row>) -> Result<Dataset> {
    let n_channel = rows.first().map_or(0, |r| r.values.len());
    let mut flat = Vec::with_capacity(rows.len() * n_channel);
    for (i, row) in rows.iter().enumerate() {
        if row.values.len() != n_channel {
            bail!(
                "Row {i}: has {} measurements but row 0 has {n_channel}",
                row.values.len()
            );
        }
        flat.extend_from_slice(&row.values);
    }
    let measurements = Array2::from_shape_vec((rows.len(), n_channel), flat)
        .context("building measurement matrix")?;

    let names: BTreeSet<&String> = rows.iter().flat_map(|r| r.metadata.keys()).collect();
    let obs_descriptors: DescriptorTable = names
        .into_iter()
        .map(|name| {
            let values: Vec<DescriptorValue> = rows
                .iter()
                .map(|r| r.metadata.get(name).cloned().unwrap_or(DescriptorValue::Null))
                .collect();
            (name.clone(), values)
        })
        .collect();

    Ok(Dataset::new(measurements, None, Some(obs_descriptors), None)?)
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "pattern": [0.12, 0.14, ...], "condition": "face", "run": 1 },
///   ...
/// ]
/// ```
fn read_json(path: &Path, column: &str) -> Result<Vec<Row>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let values = json_array_to_f64(obj.get(column), i, column)?;

        let metadata = obj
            .iter()
            .filter(|(key, _)| key.as_str() != column)
            .map(|(key, val)| (key.clone(), json_to_descriptor(val)))
            .collect();

        rows.push(Row { values, metadata });
    }

    Ok(rows)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_descriptor(val: &JsonValue) -> DescriptorValue {
    match val {
        JsonValue::String(s) => DescriptorValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                DescriptorValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                DescriptorValue::Float(f)
            } else {
                DescriptorValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => DescriptorValue::Bool(*b),
        JsonValue::Null => DescriptorValue::Null,
        JsonValue::Array(items) => DescriptorValue::List(items.iter().map(json_to_descriptor).collect()),
        other => DescriptorValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names. The measurement column holds
/// semicolon-separated floats, e.g. `"0.12;0.14;0.11"`. All other columns
/// are treated as descriptors.
fn read_csv(path: &Path, column: &str) -> Result<Vec<Row>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let value_idx = headers
        .iter()
        .position(|h| h == column)
        .with_context(|| format!("CSV missing '{column}' column"))?;

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let values = parse_semicolon_floats(record.get(value_idx).unwrap_or(""), row_no, column)?;

        let metadata = record
            .iter()
            .enumerate()
            .filter(|(col_idx, _)| *col_idx != value_idx)
            .map(|(col_idx, value)| (headers[col_idx].clone(), guess_descriptor_type(value)))
            .collect();

        rows.push(Row { values, metadata });
    }

    Ok(rows)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_descriptor_type(s: &str) -> DescriptorValue {
    if s.is_empty() {
        return DescriptorValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return DescriptorValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return DescriptorValue::Float(f);
    }
    if s == "true" || s == "false" {
        return DescriptorValue::Bool(s == "true");
    }
    DescriptorValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Read a Parquet observation table.
///
/// Expected schema:
/// - `<column>`: List<Float64> or LargeList<Float64> – measurement vectors
/// - Any other columns are treated as descriptors (strings, ints, floats, bools)
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn read_parquet(path: &Path, column: &str) -> Result<Vec<Row>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let value_idx = schema
            .index_of(column)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{column}' column"))?;
        let value_col = batch.column(value_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != value_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..batch.num_rows() {
            let values = extract_f64_list(value_col, row)
                .with_context(|| format!("Row {row}: failed to read '{column}'"))?;

            let mut metadata = BTreeMap::new();
            for (col_idx, col_name) in &meta_cols {
                let value = extract_descriptor_value(batch.column(*col_idx), row)
                    .with_context(|| format!("Row {row}: failed to read '{col_name}'"))?;
                metadata.insert(col_name.clone(), value);
            }

            rows.push(Row { values, metadata });
        }
    }

    Ok(rows)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single descriptor value from an Arrow column at a given row.
fn extract_descriptor_value(col: &Arc<dyn Array>, row: usize) -> Result<DescriptorValue> {
    if col.is_null(row) {
        return Ok(DescriptorValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => {
            let s = col.as_any().downcast_ref::<StringArray>().context("expected StringArray")?;
            DescriptorValue::String(s.value(row).to_string())
        }
        DataType::LargeUtf8 => DescriptorValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>().context("expected Int32Array")?;
            DescriptorValue::Integer(i64::from(arr.value(row)))
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>().context("expected Int64Array")?;
            DescriptorValue::Integer(arr.value(row))
        }
        DataType::Float32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("expected Float32Array")?;
            DescriptorValue::Float(f64::from(arr.value(row)))
        }
        DataType::Float64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            DescriptorValue::Float(arr.value(row))
        }
        DataType::Boolean => {
            let arr = col
                .as_any()
                .downcast_ref::<BooleanArray>()
                .context("expected BooleanArray")?;
            DescriptorValue::Bool(arr.value(row))
        }
        other => DescriptorValue::String(format!("{other:?}")),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::descriptor::column;
    use arrow::array::{Float64Builder, ListBuilder};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use ndarray::array;
    use parquet::arrow::ArrowWriter;

    #[test]
    fn imports_json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(
            &path,
            r#"[{"pattern": [1.0, 2.0], "cond": "a", "run": 1},
                {"pattern": [3.0, 4.0], "cond": "b"}]"#,
        )
        .unwrap();

        let ds = load_table(&path, "pattern").unwrap();
        assert_eq!(ds.measurements(), &array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(ds.obs_descriptors().get("cond").unwrap(), column(["a", "b"]).as_slice());
        assert_eq!(
            ds.obs_descriptors().get("run").unwrap(),
            &[DescriptorValue::Integer(1), DescriptorValue::Null]
        );
    }

    #[test]
    fn imports_csv_with_semicolon_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "pattern,cond,weight\n1;2;3,a,0.5\n4;5;6,b,1.5\n").unwrap();

        let ds = load_table(&path, "pattern").unwrap();
        assert_eq!((ds.n_obs(), ds.n_channel()), (2, 3));
        assert_eq!(ds.obs_descriptors().get("weight").unwrap(), column([0.5, 1.5]).as_slice());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(&path, r#"[{"pattern": [1.0, 2.0]}, {"pattern": [3.0]}]"#).unwrap();
        assert!(load_table(&path, "pattern").is_err());
    }

    #[test]
    fn missing_measurement_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "cond\na\n").unwrap();
        assert!(load_table(&path, "pattern").is_err());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(load_table(Path::new("table.xlsx"), "pattern").is_err());
    }

    #[test]
    fn imports_parquet_list_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.parquet");

        let mut builder = ListBuilder::new(Float64Builder::new());
        for row in [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]] {
            builder.values().append_slice(&row);
            builder.append(true);
        }
        let patterns = builder.finish();
        let conds = StringArray::from(vec!["a", "b", "a"]);
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "pattern",
                DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
                false,
            ),
            Field::new("cond", DataType::Utf8, false),
        ]));
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(patterns), Arc::new(conds)]).unwrap();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None)
            .unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_table(&path, "pattern").unwrap();
        assert_eq!(ds.measurements(), &array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(ds.obs_descriptors().get("cond").unwrap(), column(["a", "b", "a"]).as_slice());
    }
}
