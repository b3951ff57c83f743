use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{can_cast_types, cast, concat_batches};
use arrow::datatypes::{DataType, Float64Type, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Column, ColumnData, Table, Value};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Format dispatch
// ---------------------------------------------------------------------------

/// Tabular file formats, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Parquet,
    Feather,
    Hdf,
}

impl TabularFormat {
    /// Formats accepted by `points` without `--geo`.
    pub const POINTS: &'static [TabularFormat] = &[
        TabularFormat::Csv,
        TabularFormat::Parquet,
        TabularFormat::Feather,
        TabularFormat::Hdf,
    ];

    /// Formats accepted for network node and edge tables.
    pub const NETWORK: &'static [TabularFormat] = &[TabularFormat::Csv, TabularFormat::Parquet];

    fn extension(self) -> &'static str {
        match self {
            TabularFormat::Csv => "csv",
            TabularFormat::Parquet => "parquet",
            TabularFormat::Feather => "feather",
            TabularFormat::Hdf => "hdf",
        }
    }

    /// Match `path` against the allowed formats.
    pub fn detect(path: &Path, allowed: &[TabularFormat]) -> Result<TabularFormat, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        allowed
            .iter()
            .copied()
            .find(|f| f.extension() == ext)
            .ok_or_else(|| Error::UnsupportedFormat {
                path: path.to_path_buf(),
                expected: if allowed.len() == TabularFormat::POINTS.len() {
                    "csv, parquet, feather, hdf"
                } else {
                    "csv, parquet"
                },
            })
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file.  Dispatch by extension among `allowed`.
///
/// Supported formats:
/// * `.csv`     – header row, column types inferred per column
/// * `.parquet` – any flat schema (pandas / polars / pyarrow writers)
/// * `.feather` – Arrow IPC file (feather v2), optionally compressed
/// * `.hdf`     – pandas fixed-format frames or 1-D datasets (cargo feature `hdf`)
pub fn load_table(path: &Path, allowed: &[TabularFormat]) -> Result<Table> {
    let format = TabularFormat::detect(path, allowed)?;
    let table = match format {
        TabularFormat::Csv => load_csv(path),
        TabularFormat::Parquet => load_parquet(path),
        TabularFormat::Feather => load_feather(path),
        TabularFormat::Hdf => load_hdf(path),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "loaded {} rows x {} columns from {}",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per row.
/// Each column gets the narrowest type that parses every non-empty cell.
fn load_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut cells: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, column) in cells.iter_mut().enumerate() {
            column.push(Value::parse_guess(record.get(col_idx).unwrap_or("")));
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::from_values(name, values))
        .collect();
    Ok(Table::new(columns))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Record batches of a parquet file together with its key/value metadata
/// (GeoParquet keeps its `geo` document there).
pub(crate) struct ParquetContents {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub metadata: HashMap<String, String>,
}

pub(crate) fn read_parquet(path: &Path) -> Result<ParquetContents> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let metadata = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    let schema = builder.schema().clone();

    let reader = builder.build().context("building parquet reader")?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("reading parquet record batch")?;

    Ok(ParquetContents {
        schema,
        batches,
        metadata,
    })
}

fn load_parquet(path: &Path) -> Result<Table> {
    let contents = read_parquet(path)?;
    batches_to_table(&contents.schema, &contents.batches)
}

// ---------------------------------------------------------------------------
// Feather loader
// ---------------------------------------------------------------------------

/// Feather v2 is the Arrow IPC file format; pandas writes it lz4-compressed
/// by default.
fn load_feather(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening feather file")?;
    let reader = arrow::ipc::reader::FileReader::try_new(file, None)
        .context("reading feather footer (only feather v2 / Arrow IPC files are supported)")?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("reading feather record batch")?;
    batches_to_table(&schema, &batches)
}

// ---------------------------------------------------------------------------
// HDF loader
// ---------------------------------------------------------------------------

/// Read a pandas frame saved with `to_hdf(..., format="fixed")` (the pandas
/// default), or a plain HDF/netCDF file of 1-D variables.
///
/// The fixed layout keeps the frame under `/<key>` with one 2-D
/// `block<i>_values` dataset (rows x columns) per dtype and the matching
/// column names in `block<i>_items`. Numeric blocks are split into named
/// columns; object blocks (pickled strings) are skipped. The PyTables
/// `format="table"` layout stores a compound `table` dataset and is rejected.
/// Without any blocks, every 1-D numeric variable of equal length becomes a
/// column.
#[cfg(feature = "hdf")]
fn load_hdf(path: &Path) -> Result<Table> {
    let file = netcdf::open(path).context("opening HDF file")?;

    let mut columns = hdf::read_group(file.variables().collect())?;
    if columns.is_empty() {
        if let Some(group) = file.groups().context("listing HDF groups")?.next() {
            log::debug!("reading HDF group {}", group.name());
            columns = hdf::read_group(group.variables().collect())?;
        }
    }

    let rows = columns.first().map_or(0, Column::len);
    columns.retain(|c| c.len() == rows);
    anyhow::ensure!(!columns.is_empty(), "no numeric frame blocks or 1-D datasets found in HDF file");
    Ok(Table::new(columns))
}

#[cfg(feature = "hdf")]
mod hdf {
    use anyhow::{bail, Context, Result};
    use netcdf::Variable;

    use crate::data::model::{Column, ColumnData};

    /// Columns of one group: pandas blocks when present, else 1-D variables.
    pub(super) fn read_group(vars: Vec<Variable<'_>>) -> Result<Vec<Column>> {
        let find = |name: &str| vars.iter().find(|v| v.name() == name);

        let mut columns = Vec::new();
        for block in 0usize.. {
            let values = find(format!("block{block}_values").as_str());
            let items = find(format!("block{block}_items").as_str());
            let (Some(values), Some(items)) = (values, items) else {
                break;
            };
            let names = read_names(items).with_context(|| format!("reading block{block}_items"))?;
            match read_block(values, names.len()) {
                Ok(data) => columns.extend(
                    names
                        .into_iter()
                        .zip(data)
                        .map(|(name, values)| Column::new(name, ColumnData::Float(values))),
                ),
                Err(e) => log::debug!("skipping non-numeric frame block {block} ({names:?}): {e:#}"),
            }
        }
        if !columns.is_empty() {
            return Ok(columns);
        }
        if find("table").is_some() {
            bail!("pandas HDF 'table' format is not supported, save the frame with format=\"fixed\"");
        }

        for var in &vars {
            if var.dimensions().len() != 1 {
                log::debug!("skipping {}-d HDF variable {}", var.dimensions().len(), var.name());
                continue;
            }
            match var.get_values::<f64, _>(..) {
                Ok(values) => columns.push(Column::new(var.name(), ColumnData::Float(values))),
                Err(e) => log::debug!("skipping non-numeric HDF variable {}: {e}", var.name()),
            }
        }
        Ok(columns)
    }

    /// Split a row-major `rows x width` block into `width` columns.
    fn read_block(var: &Variable<'_>, width: usize) -> Result<Vec<Vec<f64>>> {
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let rows = match dims.as_slice() {
            [rows] if width == 1 => *rows,
            [rows, cols] if *cols == width => *rows,
            _ => bail!("block {} has shape {dims:?} for {width} column names", var.name()),
        };
        let flat = var.get_values::<f64, _>(..)?;
        Ok((0..width)
            .map(|col| (0..rows).map(|row| flat[row * width + col]).collect())
            .collect())
    }

    /// Column names: variable-length strings, or fixed-width byte strings
    /// exposed as a trailing character dimension.
    fn read_names(var: &Variable<'_>) -> Result<Vec<String>> {
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        match dims.as_slice() {
            [n] => (0..*n)
                .map(|i| var.get_string([i]).map_err(Into::into))
                .collect(),
            [n, width] if *width > 0 => {
                let raw = var.get_raw_values(..)?;
                Ok(raw
                    .chunks(*width)
                    .take(*n)
                    .map(|chunk| {
                        let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                        String::from_utf8_lossy(&chunk[..end]).trim().to_string()
                    })
                    .collect())
            }
            _ => bail!("unexpected shape {dims:?} for column names"),
        }
    }
}

#[cfg(not(feature = "hdf"))]
fn load_hdf(_path: &Path) -> Result<Table> {
    Err(Error::FormatUnavailable {
        format: "HDF",
        feature: "hdf",
    }
    .into())
}

// -- Arrow helpers --

/// Flatten record batches into a [`Table`]. Columns whose Arrow type has no
/// tabular meaning here (binary, nested) are skipped.
pub(crate) fn batches_to_table(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<Table> {
    let batch = concat_batches(schema, batches).context("concatenating record batches")?;

    if log::log_enabled!(log::Level::Trace) && batch.num_rows() > 0 {
        if let Ok(preview) = arrow::util::pretty::pretty_format_batches(&[batch.slice(0, batch.num_rows().min(5))]) {
            log::trace!("first rows:\n{preview}");
        }
    }

    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        match array_to_data(array)? {
            Some(data) => columns.push(Column::new(field.name().clone(), data)),
            None => log::debug!("skipping column {} of type {:?}", field.name(), array.data_type()),
        }
    }
    Ok(Table::new(columns))
}

/// Convert an Arrow array into column storage, casting to the widest
/// matching representation.
fn array_to_data(array: &ArrayRef) -> Result<Option<ColumnData>> {
    let data = match array.data_type() {
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(..) => {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats.as_primitive::<Float64Type>();
            ColumnData::Float(
                (0..floats.len())
                    .map(|i| if floats.is_null(i) { f64::NAN } else { floats.value(i) })
                    .collect(),
            )
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Timestamp(..)
        | DataType::Date64 => {
            let ints = cast(array, &DataType::Int64)?;
            ColumnData::Int(ints.as_primitive::<Int64Type>().iter().collect())
        }
        DataType::Boolean => ColumnData::Bool(array.as_boolean().iter().collect()),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            ColumnData::Text(string_values(array)?)
        }
        DataType::Dictionary(_, value) if can_cast_types(value, &DataType::Utf8) => {
            let text = string_values(array)?;
            let values = text
                .into_iter()
                .map(|s| s.map_or(Value::Null, Value::String))
                .collect();
            return Ok(Some(Column::from_values("", values).into_categorical().data));
        }
        _ => return Ok(None),
    };
    Ok(Some(data))
}

fn string_values(array: &ArrayRef) -> Result<Vec<Option<String>>> {
    let strings = cast(array, &DataType::Utf8)?;
    Ok(strings
        .as_string::<i32>()
        .iter()
        .map(|s| s.map(str::to_string))
        .collect())
}
