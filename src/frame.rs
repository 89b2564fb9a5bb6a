//! In-memory tabular data exchanged with BigQuery.
//!
//! A [`Frame`] wraps an Arrow [`RecordBatch`]. Query results decode into it
//! column by column using the result schema; uploads go the other way through
//! [`Frame::to_json_rows`].

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder, TimestampMicrosecondArray,
    TimestampMicrosecondBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field as ArrowField, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value as Json};
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{GbqError, Result};
use crate::jobs::ResultPage;
use crate::schema::{Field, FieldType, TableSchema};

/// Timezone tag on timestamp columns. BigQuery timestamps are UTC instants.
pub const UTC_OFFSET: &str = "+00:00";

pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(UTC_OFFSET.into()))
}

/// Column type a result field decodes into. Only integer, float, boolean and
/// timestamp fields get typed columns; the rest stay text.
pub fn arrow_type(field_type: &FieldType) -> DataType {
    if field_type.is_integer() {
        DataType::Int64
    } else if field_type.is_float() {
        DataType::Float64
    } else if field_type.is_boolean() {
        DataType::Boolean
    } else if *field_type == FieldType::Timestamp {
        timestamp_type()
    } else {
        DataType::Utf8
    }
}

/// Field type generated for a column when creating a table from a frame.
pub fn field_type(data_type: &DataType) -> FieldType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => FieldType::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => FieldType::Float,
        DataType::Boolean => FieldType::Boolean,
        DataType::Timestamp(_, _) => FieldType::Timestamp,
        _ => FieldType::String,
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    batch: RecordBatch,
}

impl From<RecordBatch> for Frame {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}

impl Frame {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Builds a frame from named columns. Every column is nullable and all
    /// columns must have the same length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ArrayRef)>,
        S: Into<String>,
    {
        let (fields, arrays): (Vec<ArrowField>, Vec<ArrayRef>) = columns
            .into_iter()
            .map(|(name, array)| {
                (ArrowField::new(name, array.data_type().clone(), true), array)
            })
            .unzip();

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map(Self::new)
            .map_err(|e| GbqError::InvalidSchema(e.to_string()))
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_schema(&self) -> TableSchema {
        TableSchema::from_fields(
            self.batch
                .schema_ref()
                .fields()
                .iter()
                .map(|f| Field::new(f.name().clone(), field_type(f.data_type())))
                .collect(),
        )
    }

    /// One JSON object per row, keyed by column name, for `insertAll`.
    pub fn to_json_rows(&self) -> Result<Vec<Map<String, Json>>> {
        let names = self.column_names();
        let columns = self
            .batch
            .columns()
            .iter()
            .map(column_to_json)
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.len())
            .map(|row| {
                names
                    .iter()
                    .zip(&columns)
                    .map(|(name, cells)| (name.to_string(), cells[row].clone()))
                    .collect()
            })
            .collect())
    }

    /// Cells rendered for display; nulls are empty strings.
    pub fn display_rows(&self) -> Result<Vec<Vec<String>>> {
        let options = FormatOptions::default();
        let formatters = self
            .batch
            .columns()
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((0..self.len())
            .map(|row| formatters.iter().map(|f| f.value(row).to_string()).collect())
            .collect())
    }

    /// Decodes result pages against `schema`, keeping page and row order.
    pub fn from_pages(schema: &TableSchema, pages: &[ResultPage]) -> Result<Self> {
        let row_count: usize = pages.iter().map(|p| p.rows.len()).sum();
        let mut builders: Vec<ColumnBuilder> = schema
            .fields
            .iter()
            .map(|f| ColumnBuilder::new(&arrow_type(&f.field_type), row_count))
            .collect();

        for raw in pages.iter().flat_map(|p| &p.rows) {
            let cells = raw.cells();
            if cells.len() != builders.len() {
                return Err(GbqError::Decode(format!(
                    "row has {} cells but the schema has {} fields",
                    cells.len(),
                    builders.len()
                )));
            }

            for (builder, cell) in builders.iter_mut().zip(cells) {
                builder.append_cell(&cell.value)?;
            }
        }

        let arrow_schema = Schema::new(
            schema
                .fields
                .iter()
                .map(|f| ArrowField::new(f.name.clone(), arrow_type(&f.field_type), true))
                .collect::<Vec<_>>(),
        );

        build_batch(arrow_schema, builders, row_count).map(Self::new)
    }

    /// Builds a frame from JSON objects. Column types are inferred from the
    /// non-null values; mixed integer/float columns become floats.
    pub fn from_json_records(records: &[Json]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let object = record.as_object().ok_or_else(|| {
                GbqError::Decode(format!("expected a JSON object per record, got {}", record))
            })?;
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let types = names
            .iter()
            .map(|name| infer_type(name, records.iter().filter_map(|r| r.get(name.as_str()))))
            .collect::<Result<Vec<_>>>()?;

        let mut builders: Vec<ColumnBuilder> = types
            .iter()
            .map(|t| ColumnBuilder::new(t, records.len()))
            .collect();

        for record in records {
            for (name, builder) in names.iter().zip(builders.iter_mut()) {
                builder.append_json(record.get(name.as_str()).unwrap_or(&Json::Null))?;
            }
        }

        let schema = Schema::new(
            names
                .iter()
                .zip(&types)
                .map(|(name, t)| ArrowField::new(name.clone(), t.clone(), true))
                .collect::<Vec<_>>(),
        );

        build_batch(schema, builders, records.len()).map(Self::new)
    }
}

fn build_batch(
    schema: Schema,
    builders: Vec<ColumnBuilder>,
    row_count: usize,
) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(row_count));
    Ok(RecordBatch::try_new_with_options(Arc::new(schema), columns, &options)?)
}

enum ColumnBuilder {
    Integer(Int64Builder),
    Float(Float64Builder),
    Boolean(BooleanBuilder),
    Timestamp(TimestampMicrosecondBuilder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn new(data_type: &DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Int64 => ColumnBuilder::Integer(Int64Builder::with_capacity(capacity)),
            DataType::Float64 => ColumnBuilder::Float(Float64Builder::with_capacity(capacity)),
            DataType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::with_capacity(capacity)),
            DataType::Timestamp(_, _) => ColumnBuilder::Timestamp(
                TimestampMicrosecondBuilder::with_capacity(capacity).with_timezone(UTC_OFFSET),
            ),
            _ => ColumnBuilder::Text(StringBuilder::with_capacity(capacity, capacity * 16)),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ColumnBuilder::Integer(_) => "INTEGER",
            ColumnBuilder::Float(_) => "FLOAT",
            ColumnBuilder::Boolean(_) => "BOOLEAN",
            ColumnBuilder::Timestamp(_) => "TIMESTAMP",
            ColumnBuilder::Text(_) => "STRING",
        }
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuilder::Integer(b) => b.append_null(),
            ColumnBuilder::Float(b) => b.append_null(),
            ColumnBuilder::Boolean(b) => b.append_null(),
            ColumnBuilder::Timestamp(b) => b.append_null(),
            ColumnBuilder::Text(b) => b.append_null(),
        }
    }

    /// Appends a cell as the API sends it: a string, or `null` in either form.
    /// Timestamps arrive as epoch seconds.
    fn append_cell(&mut self, cell: &Json) -> Result<()> {
        let text: Cow<'_, str> = match cell {
            Json::Null => {
                self.append_null();
                return Ok(());
            }
            Json::String(s) if s == "null" => {
                self.append_null();
                return Ok(());
            }
            Json::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        };

        let bad = |what: &str| GbqError::Decode(format!("cannot read '{}' as {}", text, what));

        match self {
            ColumnBuilder::Integer(b) => b.append_value(text.parse().map_err(|_| bad("INTEGER"))?),
            ColumnBuilder::Float(b) => b.append_value(text.parse().map_err(|_| bad("FLOAT"))?),
            ColumnBuilder::Boolean(b) => b.append_value(text == "true"),
            ColumnBuilder::Timestamp(b) => {
                let secs: f64 = text.parse().map_err(|_| bad("TIMESTAMP"))?;
                b.append_value((secs * 1_000_000.0).round() as i64);
            }
            ColumnBuilder::Text(b) => b.append_value(text.as_ref()),
        }

        Ok(())
    }

    fn append_json(&mut self, value: &Json) -> Result<()> {
        if value.is_null() {
            self.append_null();
            return Ok(());
        }

        let appended = match (&mut *self, value) {
            (ColumnBuilder::Integer(b), Json::Number(n)) => {
                n.as_i64().map(|v| b.append_value(v)).is_some()
            }
            (ColumnBuilder::Float(b), Json::Number(n)) => {
                n.as_f64().map(|v| b.append_value(v)).is_some()
            }
            (ColumnBuilder::Boolean(b), Json::Bool(v)) => {
                b.append_value(*v);
                true
            }
            (ColumnBuilder::Timestamp(b), Json::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| b.append_value(ts.timestamp_micros()))
                .is_some(),
            (ColumnBuilder::Text(b), Json::String(s)) => {
                b.append_value(s);
                true
            }
            (ColumnBuilder::Text(b), other) => {
                b.append_value(other.to_string());
                true
            }
            _ => false,
        };

        if !appended {
            return Err(GbqError::Decode(format!(
                "cannot read {} as {}",
                value,
                self.type_name()
            )));
        }
        Ok(())
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Integer(mut b) => Arc::new(b.finish()) as ArrayRef,
            ColumnBuilder::Float(mut b) => Arc::new(b.finish()) as ArrayRef,
            ColumnBuilder::Boolean(mut b) => Arc::new(b.finish()) as ArrayRef,
            ColumnBuilder::Timestamp(mut b) => Arc::new(b.finish()) as ArrayRef,
            ColumnBuilder::Text(mut b) => Arc::new(b.finish()) as ArrayRef,
        }
    }
}

fn infer_type<'a>(name: &str, values: impl Iterator<Item = &'a Json>) -> Result<DataType> {
    let mut inferred: Option<DataType> = None;

    for value in values {
        let this = match value {
            Json::Null => continue,
            Json::Bool(_) => DataType::Boolean,
            Json::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
            Json::Number(_) => DataType::Float64,
            Json::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => timestamp_type(),
            _ => DataType::Utf8,
        };

        inferred = Some(match inferred {
            None => this,
            Some(current) if current == this => current,
            Some(current) => match (&current, &this) {
                (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                    DataType::Float64
                }
                (DataType::Timestamp(..), DataType::Utf8)
                | (DataType::Utf8, DataType::Timestamp(..)) => DataType::Utf8,
                _ => {
                    return Err(GbqError::InvalidSchema(format!(
                        "column '{}' mixes {} and {} values",
                        name, current, this
                    )))
                }
            },
        });
    }

    Ok(inferred.unwrap_or(DataType::Utf8))
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        GbqError::Decode(format!("unexpected column type {}", array.data_type()))
    })
}

/// Column values as JSON. Integers and floats are widened to 64 bits and
/// timestamps become RFC 3339 strings in UTC.
fn column_to_json(array: &ArrayRef) -> Result<Vec<Json>> {
    let len = array.len();
    let null_or = |i: usize, value: Json| if array.is_null(i) { Json::Null } else { value };

    let cells = match array.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let widened = cast(array.as_ref(), &DataType::Int64)?;
            let ints = downcast::<Int64Array>(&widened)?;
            (0..len)
                .map(|i| if ints.is_null(i) { Json::Null } else { Json::from(ints.value(i)) })
                .collect()
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let widened = cast(array.as_ref(), &DataType::Float64)?;
            let floats = downcast::<Float64Array>(&widened)?;
            (0..len)
                .map(|i| {
                    if floats.is_null(i) {
                        return Json::Null;
                    }
                    serde_json::Number::from_f64(floats.value(i))
                        .map(Json::Number)
                        .unwrap_or(Json::Null)
                })
                .collect()
        }
        DataType::Boolean => {
            let bools = downcast::<BooleanArray>(array)?;
            (0..len).map(|i| null_or(i, Json::Bool(bools.value(i)))).collect()
        }
        DataType::Timestamp(_, tz) => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, tz.clone());
            let micros = cast(array.as_ref(), &target)?;
            let micros = downcast::<TimestampMicrosecondArray>(&micros)?;
            (0..len)
                .map(|i| {
                    if micros.is_null(i) {
                        return Json::Null;
                    }
                    DateTime::from_timestamp_micros(micros.value(i))
                        .map(|ts| Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                        .unwrap_or(Json::Null)
                })
                .collect()
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = cast(array.as_ref(), &DataType::Utf8)?;
            let strings = downcast::<StringArray>(&text)?;
            (0..len)
                .map(|i| {
                    if strings.is_null(i) {
                        Json::Null
                    } else {
                        Json::String(strings.value(i).to_string())
                    }
                })
                .collect()
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
            (0..len)
                .map(|i| null_or(i, Json::String(formatter.value(i).to_string())))
                .collect()
        }
    };

    Ok(cells)
}
