//! Memory-optimized Arrow encoding of parsed tables.
//!
//! A column plan is computed once over the whole table, then every chunk is
//! encoded with the same schema: integers take the narrowest width that holds
//! their range, floats drop to `Float32` when lossless, repetitive strings
//! become dictionaries and `datetime` becomes a UTC second timestamp.

use crate::models::ColumnMeta;
use arrow::array::{
    ArrayRef, BooleanArray, DictionaryArray, Float32Array, Float64Array, PrimitiveArray,
    StringArray, TimestampSecondArray,
};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Field, Int16Type, Int32Type, Int64Type, Int8Type, Schema,
    SchemaRef, TimeUnit, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, Utc};
use logparser::{status_class, ParsedTable, Record, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 50_000;

/// Strings repeat enough to dictionary-encode below this distinct/total ratio.
const DICTIONARY_RATIO: f64 = 0.5;

const TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    Timestamp,
    Dictionary,
    Utf8,
}

impl ColumnKind {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Boolean => DataType::Boolean,
            Self::Timestamp => DataType::Timestamp(TimeUnit::Second, Some(TIMEZONE.into())),
            Self::Dictionary => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            Self::Utf8 => DataType::Utf8,
        }
    }

    fn narrowest_int(min: i64, max: i64) -> Self {
        if min >= 0 {
            if max <= i64::from(u8::MAX) {
                Self::UInt8
            } else if max <= i64::from(u16::MAX) {
                Self::UInt16
            } else if max <= i64::from(u32::MAX) {
                Self::UInt32
            } else {
                Self::UInt64
            }
        } else if min >= i64::from(i8::MIN) && max <= i64::from(i8::MAX) {
            Self::Int8
        } else if min >= i64::from(i16::MIN) && max <= i64::from(i16::MAX) {
            Self::Int16
        } else if min >= i64::from(i32::MIN) && max <= i64::from(i32::MAX) {
            Self::Int32
        } else {
            Self::Int64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    pub name: String,
    pub kind: ColumnKind,
}

/// What one column holds across the whole table.
#[derive(Default)]
struct ColumnStats<'a> {
    ints: usize,
    floats: usize,
    bools: usize,
    strings: usize,
    datetimes: usize,
    min: i64,
    max: i64,
    float32_exact: bool,
    distinct: HashSet<&'a str>,
}

impl<'a> ColumnStats<'a> {
    fn new() -> Self {
        Self {
            min: i64::MAX,
            max: i64::MIN,
            float32_exact: true,
            ..Default::default()
        }
    }

    fn observe(&mut self, value: &'a Value) {
        match value {
            Value::Null => {}
            Value::Int(i) => {
                self.ints += 1;
                self.min = self.min.min(*i);
                self.max = self.max.max(*i);
                if (*i as f32) as i64 != *i {
                    self.float32_exact = false;
                }
            }
            Value::Float(f) => {
                self.floats += 1;
                if f64::from(*f as f32) != *f {
                    self.float32_exact = false;
                }
            }
            Value::Bool(_) => self.bools += 1,
            Value::Str(s) => {
                self.strings += 1;
                self.distinct.insert(s.as_str());
            }
            Value::DateTime(_) => self.datetimes += 1,
        }
    }

    fn kind(&self, rows: usize) -> ColumnKind {
        let non_null = self.ints + self.floats + self.bools + self.strings + self.datetimes;
        if non_null == 0 {
            return ColumnKind::Utf8;
        }
        if self.datetimes == non_null {
            ColumnKind::Timestamp
        } else if self.ints == non_null {
            ColumnKind::narrowest_int(self.min, self.max)
        } else if self.ints + self.floats == non_null {
            if self.float32_exact {
                ColumnKind::Float32
            } else {
                ColumnKind::Float64
            }
        } else if self.bools == non_null {
            ColumnKind::Boolean
        } else if self.strings == non_null
            && (self.distinct.len() as f64) / (rows as f64) < DICTIONARY_RATIO
        {
            ColumnKind::Dictionary
        } else {
            ColumnKind::Utf8
        }
    }
}

/// Decide the Arrow type of every column from all of its values.
pub fn plan_columns(table: &ParsedTable) -> Vec<ColumnPlan> {
    table
        .columns()
        .iter()
        .map(|name| {
            let mut stats = ColumnStats::new();
            for value in table.column_values(name).flatten() {
                stats.observe(value);
            }
            ColumnPlan {
                name: name.clone(),
                kind: stats.kind(table.len()),
            }
        })
        .collect()
}

/// Every field is nullable: records may lack any column.
pub fn build_schema(plans: &[ColumnPlan]) -> SchemaRef {
    Arc::new(Schema::new(
        plans
            .iter()
            .map(|plan| Field::new(plan.name.as_str(), plan.kind.data_type(), true))
            .collect::<Vec<_>>(),
    ))
}

pub fn column_meta(plans: &[ColumnPlan]) -> Vec<ColumnMeta> {
    plans
        .iter()
        .map(|plan| ColumnMeta {
            name: plan.name.clone(),
            data_type: plan.kind.data_type().to_string(),
        })
        .collect()
}

pub fn build_batch(
    schema: &SchemaRef,
    plans: &[ColumnPlan],
    records: &[Record],
) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = plans
        .iter()
        .map(|plan| build_column(plan, records))
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    RecordBatch::try_new_with_options(schema.clone(), columns, &options)
}

fn build_column(plan: &ColumnPlan, records: &[Record]) -> ArrayRef {
    let name = plan.name.as_str();
    let values = || records.iter().map(move |record| record.get(name));

    match plan.kind {
        ColumnKind::UInt8 => int_column::<UInt8Type>(records, name),
        ColumnKind::UInt16 => int_column::<UInt16Type>(records, name),
        ColumnKind::UInt32 => int_column::<UInt32Type>(records, name),
        ColumnKind::UInt64 => int_column::<UInt64Type>(records, name),
        ColumnKind::Int8 => int_column::<Int8Type>(records, name),
        ColumnKind::Int16 => int_column::<Int16Type>(records, name),
        ColumnKind::Int32 => int_column::<Int32Type>(records, name),
        ColumnKind::Int64 => int_column::<Int64Type>(records, name),
        ColumnKind::Float32 => Arc::new(
            values()
                .map(|v| v.and_then(Value::as_f64).map(|f| f as f32))
                .collect::<Float32Array>(),
        ),
        ColumnKind::Float64 => Arc::new(
            values()
                .map(|v| v.and_then(Value::as_f64))
                .collect::<Float64Array>(),
        ),
        ColumnKind::Boolean => Arc::new(
            values()
                .map(|v| match v {
                    Some(Value::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        ColumnKind::Timestamp => Arc::new(
            values()
                .map(|v| v.and_then(Value::as_datetime).map(|dt| dt.timestamp()))
                .collect::<TimestampSecondArray>()
                .with_timezone(TIMEZONE),
        ),
        ColumnKind::Dictionary => Arc::new(
            values()
                .map(|v| v.and_then(Value::as_str))
                .collect::<DictionaryArray<Int32Type>>(),
        ),
        ColumnKind::Utf8 => Arc::new(
            values()
                .map(|v| v.filter(|v| !v.is_null()).map(ToString::to_string))
                .collect::<StringArray>(),
        ),
    }
}

fn int_column<T>(records: &[Record], name: &str) -> ArrayRef
where
    T: ArrowPrimitiveType,
    T::Native: TryFrom<i64>,
{
    let array: PrimitiveArray<T> = records
        .iter()
        .map(|record| {
            record
                .get(name)
                .and_then(Value::as_i64)
                .and_then(|i| T::Native::try_from(i).ok())
        })
        .collect();
    Arc::new(array)
}

pub fn write_arrow_chunk(batch: &RecordBatch, path: &Path) -> Result<(), ArrowError> {
    let file = File::create(path)?;
    let mut writer = StreamWriter::try_new(file, &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    Ok(())
}

pub fn read_arrow_chunk(path: &Path) -> Result<Vec<RecordBatch>, ArrowError> {
    let reader = StreamReader::try_new(File::open(path)?, None)?;
    reader.collect()
}

/// Re-encode batches as one IPC stream, stopping after `limit` rows.
pub fn write_stream<W: Write>(
    out: W,
    schema: &SchemaRef,
    batches: impl IntoIterator<Item = RecordBatch>,
    limit: Option<usize>,
) -> Result<W, ArrowError> {
    let mut writer = StreamWriter::try_new(out, schema)?;
    let mut remaining = limit.unwrap_or(usize::MAX);

    for batch in batches {
        if remaining == 0 {
            break;
        }
        let rows = batch.num_rows().min(remaining);
        writer.write(&batch.slice(0, rows))?;
        remaining -= rows;
    }

    writer.finish()?;
    writer.into_inner()
}

/// Running summary written to `meta.json`.
#[derive(Debug, Default)]
pub struct MetaCollector {
    pub row_count: usize,
    pub t_min: Option<DateTime<Utc>>,
    pub t_max: Option<DateTime<Utc>>,
    pub status_classes: BTreeMap<String, usize>,
}

impl MetaCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, record: &Record) {
        self.row_count += 1;

        if let Some(dt) = record.get("datetime").and_then(Value::as_datetime) {
            self.t_min = Some(self.t_min.map_or(dt, |t| t.min(dt)));
            self.t_max = Some(self.t_max.map_or(dt, |t| t.max(dt)));
        }

        // browsing/json use status_code, clf uses status
        let class = record
            .get("status_code")
            .or_else(|| record.get("status"))
            .and_then(status_class);
        if let Some(class) = class {
            *self.status_classes.entry(class).or_default() += 1;
        }
    }
}
