//! Rasterize large point and network datasets into images.
//!
//! Two pipelines share one rendering layer:
//! * [`points`] bins a point cloud onto a canvas, reduces each pixel and
//!   shades the result, optionally as a framed figure with a colorbar;
//! * [`network`] lays out a node-link graph, routes (and optionally bundles)
//!   its edges and composites nodes over edges.
//!
//! Options are validated into [`spec::RenderSpec`] / [`spec::NetworkSpec`]
//! before any file is read.

pub mod cli;
pub mod color;
pub mod data;
pub mod error;
pub mod network;
pub mod points;
pub mod render;
pub mod spec;
pub mod timing;

pub use error::Error;
pub use spec::{NetworkSpec, RenderSpec};
pub use timing::StageTimings;
