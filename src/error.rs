use std::path::PathBuf;

/// Validation and dispatch failures. Everything here is detected before or
/// while routing options; lower-level I/O and decoding failures travel as
/// `anyhow` errors with context instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported data format for {path}: expected one of {expected}")]
    UnsupportedFormat { path: PathBuf, expected: &'static str },

    #[error("{format} input needs the '{feature}' cargo feature")]
    FormatUnavailable {
        format: &'static str,
        feature: &'static str,
    },

    #[error("invalid range {input:?}: expected \"min,max\" with two finite numbers and min < max")]
    InvalidRange { input: String },

    #[error("unknown aggregation function '{0}' (expected one of: {list})", list = crate::render::reduction::REDUCER_NAMES.join(", "))]
    UnknownAggregation(String),

    #[error("aggregation '{0}' cannot be shaded into a single image")]
    UnsupportedAggregation(String),

    #[error("aggregation '{0}' needs a column (--agg_col)")]
    MissingAggregationColumn(String),

    #[error("unknown layout '{0}' (expected random, circular, forceatlas2 or geo)")]
    UnknownLayout(String),

    #[error("unknown color mapping '{0}' (expected eq_hist, cbrt, log or linear)")]
    UnknownHow(String),

    #[error("unknown colormap '{0}' (available: {list}, optionally with a _r suffix)", list = crate::color::Colormap::names().collect::<Vec<_>>().join(", "))]
    UnknownColormap(String),

    #[error("invalid color '{0}'")]
    InvalidColor(String),

    #[error("{name} must be a positive number, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("canvas must be at least 1x1 pixels, got {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("column '{0}' is not numeric")]
    NonNumericColumn(String),

    #[error("geometry in row {row} is a {kind}, only Point geometries have x/y coordinates")]
    NonPointGeometry { row: usize, kind: String },

    #[error("edge {edge} references unknown node id {id}")]
    UnknownNodeId { edge: usize, id: String },

    #[error("edge {edge} references node {index}, but only {nodes} nodes exist (use --id to map node keys)")]
    EdgeOutOfRange { edge: usize, index: String, nodes: usize },

    #[error("cannot write image to {0}: unsupported output extension")]
    UnsupportedOutput(PathBuf),
}
