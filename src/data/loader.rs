use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, Float32Array, Float32Builder, Float64Array, Float64Builder, Int32Array,
    Int64Array, LargeListArray, LargeStringArray, ListArray, ListBuilder, StringArray,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{EnergyList, NoiseTable, SampleKey, ShowerRecord, Voxel, GRID_LEN};
use crate::error::DatasetError;

/// Deposit records keyed by sample.
pub type DepositTable = BTreeMap<SampleKey, ShowerRecord>;
/// Energy lists keyed by sample.
pub type EnergyTable = BTreeMap<SampleKey, EnergyList>;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Supported table formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Parquet,
    Json,
    Csv,
}

fn format_of(path: &Path) -> Result<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => Ok(Format::Parquet),
        "json" => Ok(Format::Json),
        "csv" => Ok(Format::Csv),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load sparse energy deposits.
///
/// Supported formats:
/// * `.parquet` – long format, one row per deposit: `key, z, x, y, energy`
/// * `.csv`     – same columns as Parquet
/// * `.json`    – `{ "key": [[z, x, y, energy], ...], ... }`
pub fn load_deposits(path: &Path) -> crate::error::Result<DepositTable> {
    let table = match format_of(path) {
        Ok(Format::Parquet) => load_deposits_parquet(path),
        Ok(Format::Json) => load_deposits_json(path),
        Ok(Format::Csv) => load_deposits_csv(path),
        Err(e) => Err(e),
    }
    .map_err(|e| DatasetError::load(path, &e))?;

    log::info!("loaded deposits for {} samples from {}", table.len(), path.display());
    Ok(table)
}

/// Load per-sample shower energies.
///
/// Supported formats:
/// * `.parquet` – `key` column plus `energies: List<Float64 | Float32>`
/// * `.csv`     – `key, energies` with semicolon-separated floats (empty = no showers)
/// * `.json`    – `{ "key": [e0, e1, ...], ... }`
pub fn load_energies(path: &Path) -> crate::error::Result<EnergyTable> {
    let table = match format_of(path) {
        Ok(Format::Parquet) => load_keyed_lists_parquet(path, "energies"),
        Ok(Format::Json) => load_keyed_lists_json(path),
        Ok(Format::Csv) => load_keyed_lists_csv(path, "energies"),
        Err(e) => Err(e),
    }
    .map_err(|e| DatasetError::load(path, &e))?;

    log::info!("loaded energies for {} samples from {}", table.len(), path.display());
    Ok(table)
}

/// Load dense noise grids, flattened in `(z, x, y)` order.
///
/// Same layouts as [`load_energies`], with the list column named `values`.
/// Every grid must hold exactly one value per detector cell.
pub fn load_noise(path: &Path) -> crate::error::Result<NoiseTable> {
    let table = match format_of(path) {
        Ok(Format::Parquet) => load_keyed_lists_parquet(path, "values"),
        Ok(Format::Json) => load_keyed_lists_json(path),
        Ok(Format::Csv) => load_keyed_lists_csv(path, "values"),
        Err(e) => Err(e),
    }
    .map_err(|e| DatasetError::load(path, &e))?;

    if let Some((key, values)) = table.iter().find(|(_, v)| v.len() != GRID_LEN) {
        return Err(DatasetError::InvalidNoiseShape {
            key: key.clone(),
            expected: GRID_LEN,
            len: values.len(),
        });
    }

    log::info!("loaded {} noise samples from {}", table.len(), path.display());
    Ok(table
        .into_iter()
        .map(|(k, v)| (k, v.into_iter().map(|x| x as f32).collect()))
        .collect())
}

// ---------------------------------------------------------------------------
// JSON loaders
// ---------------------------------------------------------------------------

fn load_deposits_json(path: &Path) -> Result<DepositTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let raw: BTreeMap<String, Vec<(usize, usize, usize, f64)>> =
        serde_json::from_str(&text).context("parsing JSON deposits")?;

    Ok(raw
        .into_iter()
        .map(|(key, rows)| {
            let deposits = rows
                .into_iter()
                .map(|(z, x, y, e)| (Voxel::new(z, x, y), e))
                .collect();
            (key, ShowerRecord::new(deposits))
        })
        .collect())
}

fn load_keyed_lists_json(path: &Path) -> Result<BTreeMap<SampleKey, Vec<f64>>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    serde_json::from_str(&text).context("parsing JSON object of float arrays")
}

// ---------------------------------------------------------------------------
// CSV loaders
// ---------------------------------------------------------------------------

fn column_index(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("CSV missing '{name}' column"))
}

fn load_deposits_csv(path: &Path) -> Result<DepositTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let key_idx = column_index(&headers, "key")?;
    let z_idx = column_index(&headers, "z")?;
    let x_idx = column_index(&headers, "x")?;
    let y_idx = column_index(&headers, "y")?;
    let e_idx = column_index(&headers, "energy")?;

    let mut table = DepositTable::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let parse_coord = |idx: usize, col: &str| -> Result<usize> {
            field(idx)
                .parse::<usize>()
                .with_context(|| format!("Row {row_no}, {col}: '{}' is not an index", field(idx)))
        };
        let voxel = Voxel::new(
            parse_coord(z_idx, "z")?,
            parse_coord(x_idx, "x")?,
            parse_coord(y_idx, "y")?,
        );
        let energy = field(e_idx)
            .parse::<f64>()
            .with_context(|| format!("Row {row_no}, energy: '{}' is not a number", field(e_idx)))?;

        table
            .entry(field(key_idx).to_string())
            .or_default()
            .push(voxel, energy);
    }

    Ok(table)
}

fn load_keyed_lists_csv(path: &Path, list_col: &str) -> Result<BTreeMap<SampleKey, Vec<f64>>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let key_idx = column_index(&headers, "key")?;
    let list_idx = column_index(&headers, list_col)?;

    let mut table = BTreeMap::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let key = record.get(key_idx).unwrap_or("").trim().to_string();
        let values = parse_semicolon_floats(record.get(list_idx).unwrap_or(""), row_no, list_col)?;

        if table.insert(key.clone(), values).is_some() {
            bail!("CSV row {row_no}: duplicate key '{key}'");
        }
    }

    Ok(table)
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

// ---------------------------------------------------------------------------
// Parquet loaders
// ---------------------------------------------------------------------------

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    reader
        .map(|batch| batch.context("reading parquet record batch"))
        .collect()
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn load_deposits_parquet(path: &Path) -> Result<DepositTable> {
    let mut table = DepositTable::new();

    for batch in read_batches(path)? {
        let key_col = column(&batch, "key")?;
        let z_col = column(&batch, "z")?;
        let x_col = column(&batch, "x")?;
        let y_col = column(&batch, "y")?;
        let e_col = column(&batch, "energy")?;

        for row in 0..batch.num_rows() {
            let key = extract_key(key_col, row).with_context(|| format!("Row {row}: 'key'"))?;
            let voxel = Voxel::new(
                extract_index(z_col, row).with_context(|| format!("Row {row}: 'z'"))?,
                extract_index(x_col, row).with_context(|| format!("Row {row}: 'x'"))?,
                extract_index(y_col, row).with_context(|| format!("Row {row}: 'y'"))?,
            );
            let energy = extract_f64(e_col, row).with_context(|| format!("Row {row}: 'energy'"))?;
            table.entry(key).or_default().push(voxel, energy);
        }
    }

    Ok(table)
}

fn load_keyed_lists_parquet(path: &Path, list_col: &str) -> Result<BTreeMap<SampleKey, Vec<f64>>> {
    let mut table = BTreeMap::new();

    for batch in read_batches(path)? {
        let key_col = column(&batch, "key")?;
        let values_col = column(&batch, list_col)?;

        for row in 0..batch.num_rows() {
            let key = extract_key(key_col, row).with_context(|| format!("Row {row}: 'key'"))?;
            let values = extract_f64_list(values_col, row)
                .with_context(|| format!("Row {row}: failed to read '{list_col}'"))?;
            if table.insert(key.clone(), values).is_some() {
                bail!("Row {row}: duplicate key '{key}'");
            }
        }
    }

    Ok(table)
}

// -- Parquet / Arrow helpers --

/// Sample keys may be stored as strings or integers.
fn extract_key(col: &ArrayRef, row: usize) -> Result<SampleKey> {
    if col.is_null(row) {
        bail!("null key");
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col
            .as_any()
            .downcast_ref::<StringArray>()
            .context("expected StringArray")?
            .value(row)
            .to_string()),
        DataType::LargeUtf8 => Ok(col
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .context("expected LargeStringArray")?
            .value(row)
            .to_string()),
        DataType::Int32 | DataType::Int64 | DataType::UInt32 | DataType::UInt64 => {
            Ok(extract_index(col, row)?.to_string())
        }
        other => bail!("Expected string or integer key column, got {other:?}"),
    }
}

/// Read a non-negative grid coordinate. Float columns are accepted when the
/// value is integral, since matrix exports often store indices as doubles.
fn extract_index(col: &ArrayRef, row: usize) -> Result<usize> {
    if col.is_null(row) {
        bail!("null index");
    }
    let value: i64 = match col.data_type() {
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as i64,
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row),
        DataType::UInt32 => col
            .as_any()
            .downcast_ref::<UInt32Array>()
            .context("expected UInt32Array")?
            .value(row) as i64,
        DataType::UInt64 => {
            let v = col
                .as_any()
                .downcast_ref::<UInt64Array>()
                .context("expected UInt64Array")?
                .value(row);
            i64::try_from(v).context("index does not fit in i64")?
        }
        DataType::Float64 => {
            let v = extract_f64(col, row)?;
            if v.fract() != 0.0 {
                bail!("index {v} is not integral");
            }
            v as i64
        }
        other => bail!("Expected integer column, got {other:?}"),
    };
    usize::try_from(value).with_context(|| format!("negative index {value}"))
}

fn extract_f64(col: &ArrayRef, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null value");
    }
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(arr.value(row))
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(arr.value(row) as f64)
    } else {
        bail!("Expected Float64 or Float32 column, got {:?}", col.data_type())
    }
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32; null elements are rejected
    let present =
        |i: usize, v: Option<f64>| v.with_context(|| format!("null element at position {i}"));
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        f64_arr.iter().enumerate().map(|(i, v)| present(i, v)).collect()
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        f32_arr
            .iter()
            .enumerate()
            .map(|(i, v)| present(i, v.map(f64::from)))
            .collect()
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

// ---------------------------------------------------------------------------
// Parquet writers
// ---------------------------------------------------------------------------

fn write_batch(path: &Path, batch: RecordBatch) -> crate::error::Result<()> {
    let write = || -> Result<()> {
        let file = std::fs::File::create(path).context("creating parquet file")?;
        let mut writer =
            ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
        writer.write(&batch).context("writing record batch")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    };
    write().map_err(|e| DatasetError::load(path, &e))
}

fn list_field(name: &str, item: DataType) -> Field {
    Field::new(name, DataType::List(Arc::new(Field::new("item", item, true))), false)
}

/// Write deposits in the long `key, z, x, y, energy` layout.
pub fn write_deposits_parquet(path: &Path, table: &DepositTable) -> crate::error::Result<()> {
    let mut keys = Vec::new();
    let (mut zs, mut xs, mut ys, mut es) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());

    for (key, record) in table {
        for (voxel, energy) in &record.deposits {
            keys.push(key.as_str());
            zs.push(voxel.z as i64);
            xs.push(voxel.x as i64);
            ys.push(voxel.y as i64);
            es.push(*energy);
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("z", DataType::Int64, false),
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Int64, false),
        Field::new("energy", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(keys)),
            Arc::new(Int64Array::from(zs)),
            Arc::new(Int64Array::from(xs)),
            Arc::new(Int64Array::from(ys)),
            Arc::new(Float64Array::from(es)),
        ],
    )
    .map_err(|e| DatasetError::load(path, &anyhow::Error::new(e)))?;

    write_batch(path, batch)
}

/// Write energy lists as `key` plus an `energies` list column.
pub fn write_energies_parquet(path: &Path, table: &EnergyTable) -> crate::error::Result<()> {
    let keys: Vec<&str> = table.keys().map(|k| k.as_str()).collect();

    let mut builder = ListBuilder::new(Float64Builder::new());
    for energies in table.values() {
        builder.values().append_slice(energies);
        builder.append(true);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        list_field("energies", DataType::Float64),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(StringArray::from(keys)), Arc::new(builder.finish())],
    )
    .map_err(|e| DatasetError::load(path, &anyhow::Error::new(e)))?;

    write_batch(path, batch)
}

/// Write noise grids as `key` plus a `values` list column.
pub fn write_noise_parquet(path: &Path, table: &NoiseTable) -> crate::error::Result<()> {
    let keys: Vec<&str> = table.keys().map(|k| k.as_str()).collect();

    let mut builder = ListBuilder::new(Float32Builder::new());
    for values in table.values() {
        builder.values().append_slice(values);
        builder.append(true);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        list_field("values", DataType::Float32),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(StringArray::from(keys)), Arc::new(builder.finish())],
    )
    .map_err(|e| DatasetError::load(path, &anyhow::Error::new(e)))?;

    write_batch(path, batch)
}
