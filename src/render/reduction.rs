//! Per-pixel reductions. Names resolve to [`Reducer`] while the render spec
//! is built, so an unknown name fails before any file is read.

use std::collections::HashMap;
use std::str::FromStr;

use super::canvas::Grid;
use crate::data::model::Value;
use crate::error::Error;

/// Names accepted by `--agg`.
pub const REDUCER_NAMES: &[&str] = &[
    "any", "count", "sum", "mean", "min", "max", "std", "var", "mode", "first", "last",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// 1 where any row landed.
    Any,
    /// Rows per pixel, or non-missing values when a column is given.
    Count,
    Sum,
    Mean,
    Min,
    Max,
    /// Population standard deviation.
    Std,
    /// Population variance.
    Var,
    /// Most frequent value, ties go to the smallest.
    Mode,
    /// First value in row order.
    First,
    /// Last value in row order.
    Last,
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Error> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "any" => Reducer::Any,
            "count" => Reducer::Count,
            "sum" => Reducer::Sum,
            "mean" => Reducer::Mean,
            "min" => Reducer::Min,
            "max" => Reducer::Max,
            "std" => Reducer::Std,
            "var" => Reducer::Var,
            "mode" => Reducer::Mode,
            "first" => Reducer::First,
            "last" => Reducer::Last,
            "summary" => return Err(Error::UnsupportedAggregation(name.to_string())),
            _ => return Err(Error::UnknownAggregation(name.to_string())),
        })
    }
}

impl Reducer {
    /// Whether the reducer is meaningless without a value column.
    pub fn needs_column(self) -> bool {
        !matches!(self, Reducer::Any | Reducer::Count)
    }
}

/// A resolved aggregation: reducer, optional value column and optional
/// group-by column producing one layer per category.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub reducer: Reducer,
    pub column: Option<String>,
    pub by: Option<String>,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::count()
    }
}

impl Aggregation {
    /// Plain per-pixel row count.
    pub fn count() -> Self {
        Aggregation {
            reducer: Reducer::Count,
            column: None,
            by: None,
        }
    }

    /// Resolve CLI options. A column without a reducer name counts the
    /// column's non-missing values.
    pub fn resolve(name: Option<&str>, column: Option<&str>, by: Option<&str>) -> Result<Self, Error> {
        let reducer = name.map(Reducer::from_str).transpose()?.unwrap_or(Reducer::Count);
        if reducer.needs_column() && column.is_none() {
            return Err(Error::MissingAggregationColumn(
                name.unwrap_or_default().to_string(),
            ));
        }
        Ok(Aggregation {
            reducer,
            column: column.map(str::to_string),
            by: by.map(str::to_string),
        })
    }
}

/// Output of binning: one grid, or one grid per category.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Scalar(Grid),
    Categorical(CategoricalGrid),
}

/// One layer per category, all `width` x `height`. A group-by column with
/// no values yields no layers but keeps the canvas size.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalGrid {
    pub width: usize,
    pub height: usize,
    pub categories: Vec<Value>,
    pub layers: Vec<Grid>,
}

impl Aggregate {
    /// Apply `f` to every grid.
    pub fn map_grids(&self, f: impl Fn(&Grid) -> Grid) -> Aggregate {
        match self {
            Aggregate::Scalar(g) => Aggregate::Scalar(f(g)),
            Aggregate::Categorical(c) => Aggregate::Categorical(CategoricalGrid {
                width: c.width,
                height: c.height,
                categories: c.categories.clone(),
                layers: c.layers.iter().map(f).collect(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Reduction kernels
// ---------------------------------------------------------------------------

/// Reduce rows into `n_keys` slots. `keys[row]` is the slot of each row
/// (`None` drops the row); `values` is the value column if any. Slots that
/// received nothing are `NaN`.
pub fn aggregate(reducer: Reducer, keys: &[Option<usize>], values: Option<&[f64]>, n_keys: usize) -> Vec<f64> {
    // Rows paired with their value; missing values are skipped by every
    // reducer except a column-less count.
    let rows = || {
        keys.iter().enumerate().filter_map(move |(row, key)| {
            let key = (*key)?;
            match values {
                None => Some((key, 1.0)),
                Some(v) if v[row].is_nan() => None,
                Some(v) => Some((key, v[row])),
            }
        })
    };

    let mut out = vec![f64::NAN; n_keys];
    match reducer {
        Reducer::Count | Reducer::Any => {
            let mut counts = vec![0u64; n_keys];
            for (key, _) in rows() {
                counts[key] += 1;
            }
            for (slot, &c) in out.iter_mut().zip(&counts) {
                if c > 0 {
                    *slot = if reducer == Reducer::Any { 1.0 } else { c as f64 };
                }
            }
        }
        Reducer::Sum => {
            for (key, v) in rows() {
                out[key] = if out[key].is_nan() { v } else { out[key] + v };
            }
        }
        Reducer::Mean | Reducer::Var | Reducer::Std => {
            // Welford running mean and M2.
            let mut n = vec![0u64; n_keys];
            let mut mean = vec![0.0f64; n_keys];
            let mut m2 = vec![0.0f64; n_keys];
            for (key, v) in rows() {
                n[key] += 1;
                let delta = v - mean[key];
                mean[key] += delta / n[key] as f64;
                m2[key] += delta * (v - mean[key]);
            }
            for key in 0..n_keys {
                if n[key] == 0 {
                    continue;
                }
                let var = m2[key] / n[key] as f64;
                out[key] = match reducer {
                    Reducer::Mean => mean[key],
                    Reducer::Var => var,
                    _ => var.sqrt(),
                };
            }
        }
        Reducer::Min => {
            for (key, v) in rows() {
                out[key] = if out[key].is_nan() { v } else { out[key].min(v) };
            }
        }
        Reducer::Max => {
            for (key, v) in rows() {
                out[key] = if out[key].is_nan() { v } else { out[key].max(v) };
            }
        }
        Reducer::First => {
            for (key, v) in rows() {
                if out[key].is_nan() {
                    out[key] = v;
                }
            }
        }
        Reducer::Last => {
            for (key, v) in rows() {
                out[key] = v;
            }
        }
        Reducer::Mode => {
            let mut tallies: HashMap<usize, HashMap<u64, u64>> = HashMap::new();
            for (key, v) in rows() {
                *tallies.entry(key).or_default().entry(v.to_bits()).or_default() += 1;
            }
            for (key, tally) in tallies {
                let best = tally
                    .into_iter()
                    .map(|(bits, count)| (f64::from_bits(bits), count))
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.total_cmp(&a.0)));
                if let Some((value, _)) = best {
                    out[key] = value;
                }
            }
        }
    }
    out
}
