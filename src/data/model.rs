use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Value – a single cell read out of any column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common Pandas dtypes.
/// Used as a key for category and node-id maps, so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Value {
    /// Try to interpret the value as an `f64` for aggregation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Normalised form used when values from different files must compare
    /// equal: integral floats collapse to integers.
    pub fn as_key(&self) -> Value {
        match self {
            Value::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Value::Integer(*v as i64)
            }
            other => other.clone(),
        }
    }

    /// Guess the type of a raw text cell (CSV, DBF).
    pub fn parse_guess(s: &str) -> Value {
        let s = s.trim();
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
        if s == "true" || s == "false" || s == "True" || s == "False" {
            return Value::Bool(s.eq_ignore_ascii_case("true"));
        }
        Value::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Column – one named, typed vector
// ---------------------------------------------------------------------------

/// Typed storage for one column. Missing numeric cells are `NaN` in `Float`
/// and `None` elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    /// Codes index into `categories`; `None` is a missing value.
    Categorical {
        codes: Vec<Option<u32>>,
        categories: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Column {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row` as a [`Value`].
    pub fn value(&self, row: usize) -> Value {
        match &self.data {
            ColumnData::Float(v) => match v[row] {
                f if f.is_nan() => Value::Null,
                f => Value::Float(f),
            },
            ColumnData::Int(v) => v[row].map_or(Value::Null, Value::Integer),
            ColumnData::Bool(v) => v[row].map_or(Value::Null, Value::Bool),
            ColumnData::Text(v) => v[row]
                .as_ref()
                .map_or(Value::Null, |s| Value::String(s.clone())),
            ColumnData::Categorical { codes, categories } => codes[row]
                .map_or(Value::Null, |c| categories[c as usize].clone()),
        }
    }

    /// Numeric view of the column, `NaN` for missing cells.
    pub fn to_f64(&self) -> Result<Vec<f64>, Error> {
        match &self.data {
            ColumnData::Float(v) => Ok(v.clone()),
            ColumnData::Int(v) => Ok(v.iter().map(|c| c.map_or(f64::NAN, |i| i as f64)).collect()),
            ColumnData::Bool(v) => Ok(v
                .iter()
                .map(|c| c.map_or(f64::NAN, |b| if b { 1.0 } else { 0.0 }))
                .collect()),
            ColumnData::Text(_) | ColumnData::Categorical { .. } => {
                Err(Error::NonNumericColumn(self.name.clone()))
            }
        }
    }

    /// Convert into a categorical column. Categories are the sorted unique
    /// non-null values, like `astype('category')`.
    pub fn into_categorical(self) -> Column {
        if matches!(self.data, ColumnData::Categorical { .. }) {
            return self;
        }
        let values: Vec<Value> = (0..self.len()).map(|r| self.value(r)).collect();
        let unique: BTreeSet<&Value> = values.iter().filter(|v| **v != Value::Null).collect();
        let categories: Vec<Value> = unique.into_iter().cloned().collect();
        let index: BTreeMap<&Value, u32> = categories
            .iter()
            .enumerate()
            .map(|(i, v)| (v, i as u32))
            .collect();
        let codes = values.iter().map(|v| index.get(v).copied()).collect();
        Column {
            name: self.name,
            data: ColumnData::Categorical { codes, categories },
        }
    }

    /// Category codes and categories, casting on the fly when the column is
    /// not categorical yet.
    pub fn category_codes(&self) -> (Vec<Option<u32>>, Vec<Value>) {
        match &self.data {
            ColumnData::Categorical { codes, categories } => (codes.clone(), categories.clone()),
            _ => match self.clone().into_categorical().data {
                ColumnData::Categorical { codes, categories } => (codes, categories),
                _ => (Vec::new(), Vec::new()),
            },
        }
    }

    /// Build a column from loosely typed cells, picking the narrowest type
    /// that holds every non-null value.
    pub fn from_values(name: impl Into<String>, values: Vec<Value>) -> Column {
        let all = |pred: fn(&Value) -> bool| values.iter().all(|v| *v == Value::Null || pred(v));
        let data = if all(|v| matches!(v, Value::Integer(_))) && values.iter().any(|v| *v != Value::Null) {
            ColumnData::Int(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect(),
            )
        } else if all(|v| matches!(v, Value::Integer(_) | Value::Float(_))) {
            ColumnData::Float(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
        } else if all(|v| matches!(v, Value::Bool(_))) {
            ColumnData::Bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            ColumnData::Text(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )
        };
        Column::new(name, data)
    }
}

// ---------------------------------------------------------------------------
// Table – the complete loaded dataset
// ---------------------------------------------------------------------------

/// An in-memory dataset: equally long named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Table { columns }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, Error> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::MissingColumn {
                column: name.to_string(),
                available: self.column_names().join(", "),
            })
    }

    /// Numeric view of a named column.
    pub fn f64_column(&self, name: &str) -> Result<Vec<f64>, Error> {
        self.column(name)?.to_f64()
    }

    /// Insert or replace a column.
    pub fn set_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
    }

    /// Rename `from` to `to`, replacing any column already called `to`.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        if from == to {
            return self.column(from).map(|_| ());
        }
        self.column(from)?;
        self.columns.retain(|c| c.name != to);
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == from) {
            col.name = to.to_string();
        }
        Ok(())
    }

    /// Cast the named column to categorical in place.
    pub fn categorize(&mut self, name: &str) -> Result<(), Error> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::MissingColumn {
                column: name.to_string(),
                available: self.column_names().join(", "),
            })?;
        let col = std::mem::replace(
            &mut self.columns[idx],
            Column::new(name, ColumnData::Float(Vec::new())),
        );
        self.columns[idx] = col.into_categorical();
        Ok(())
    }
}
