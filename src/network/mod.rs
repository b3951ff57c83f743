/// Network layer: node-link graphs to images.
///
/// Architecture:
/// ```text
///   nodes table      edges table
///        │                │
///        ▼                ▼
///   ┌───────────────────────────┐
///   │  Graph::prepare            │  rename columns, map ids → indices
///   └───────────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  layout   │  random / circular / forceatlas2 / geo
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  bundle   │  straight segments or hammer bundling
///   └──────────┘
///        │
///        ▼
///   composite: edges (line counts) under nodes (spread points)
/// ```
pub mod bundle;
pub mod layout;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use image::RgbaImage;

use self::bundle::{connect_edges, HammerBundle};
use self::layout::{Layout, Point};
use crate::color::Colormap;
use crate::data::loader::{load_table, TabularFormat};
use crate::data::model::{Table, Value};
use crate::error::Error;
use crate::render::canvas::Canvas;
use crate::render::image::{output_format, save};
use crate::render::reduction::{Aggregate, Aggregation};
use crate::render::shade::{self, How};
use crate::spec::{BundleParams, NetworkSpec};
use crate::timing::{Stage, StageTimings};

/// Color of uncategorized nodes.
pub const NODE_COLOR: &str = "#FF3333";
/// Radius nodes are spread by, in pixels.
pub const NODE_SPREAD: u32 = 3;
/// Optional numeric edge column weighting layout and bundling.
pub const WEIGHT_COLUMN: &str = "weight";

// ---------------------------------------------------------------------------
// Graph preparation
// ---------------------------------------------------------------------------

/// Nodes and edges after column renaming and id resolution.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Node table with canonical `x`/`y` columns when it has coordinates.
    pub nodes: Table,
    /// `(source, target, weight)` by node position.
    pub edges: Vec<(usize, usize, f64)>,
}

impl Graph {
    /// Rename the configured columns to `x`, `y`, `source` and `target`, and
    /// resolve every edge endpoint to a node index.
    pub fn prepare(mut nodes: Table, mut edges: Table, spec: &NetworkSpec) -> Result<Graph, Error> {
        let cols = &spec.columns;
        let has_xy = nodes.has_column(&cols.x) && nodes.has_column(&cols.y);
        if has_xy || spec.layout == Layout::Geo {
            nodes.rename(&cols.x, "x")?;
            nodes.rename(&cols.y, "y")?;
        }
        edges.rename(&cols.source, "source")?;
        edges.rename(&cols.target, "target")?;

        let resolve = endpoint_resolver(&nodes, cols.id.as_deref())?;
        let sources = edges.column("source")?;
        let targets = edges.column("target")?;
        let weights = match edges.column(WEIGHT_COLUMN) {
            Ok(col) => col.to_f64().ok(),
            Err(_) => None,
        };

        let resolved = (0..edges.len())
            .map(|e| {
                let s = resolve(e, sources.value(e))?;
                let t = resolve(e, targets.value(e))?;
                let w = weights.as_ref().map_or(1.0, |w| w[e]);
                Ok((s, t, if w.is_finite() { w } else { 1.0 }))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        log::info!("graph with {} nodes and {} edges", nodes.len(), resolved.len());
        Ok(Graph {
            nodes,
            edges: resolved,
        })
    }

    /// The nodes' own coordinates from the canonical `x`/`y` columns.
    pub fn coordinates(&self) -> Result<Vec<Point>, Error> {
        let xs = self.nodes.f64_column("x")?;
        let ys = self.nodes.f64_column("y")?;
        Ok(xs.into_iter().zip(ys).collect())
    }

    /// Node positions for `layout`. `Geo` draws the nodes where they are;
    /// forceatlas2 starts from them when every node has finite coordinates.
    pub fn layout(&self, layout: Layout) -> Result<Vec<Point>, Error> {
        let given = match layout {
            Layout::Geo => Some(self.coordinates()?),
            _ => self.coordinates().ok().filter(|pts| {
                let complete = pts.iter().all(|p| p.0.is_finite() && p.1.is_finite());
                if !complete {
                    log::warn!("node coordinates have missing values, starting from random positions");
                }
                complete
            }),
        };
        log::info!("computing {layout:?} layout for {} nodes", self.nodes.len());
        Ok(layout.place(self.nodes.len(), given, &self.edges))
    }
}

/// Map an edge endpoint cell to a node index. With an id column, keys are
/// looked up in that column; without one, endpoints are node positions.
fn endpoint_resolver(nodes: &Table, id: Option<&str>) -> Result<impl Fn(usize, Value) -> Result<usize, Error>, Error> {
    let n = nodes.len();
    let index: Option<HashMap<Value, usize>> = match id {
        Some(id) => {
            let col = nodes.column(id)?;
            Some((0..n).map(|i| (col.value(i).as_key(), i)).collect())
        }
        None => None,
    };

    Ok(move |edge: usize, value: Value| match &index {
        Some(index) => index
            .get(&value.as_key())
            .copied()
            .ok_or_else(|| Error::UnknownNodeId {
                edge,
                id: value.to_string(),
            }),
        None => match value.as_key() {
            Value::Integer(i) if i >= 0 && (i as usize) < n => Ok(i as usize),
            other => Err(Error::EdgeOutOfRange {
                edge,
                index: other.to_string(),
                nodes: n,
            }),
        },
    })
}

/// Edge polylines between laid-out nodes.
pub fn route_edges(positions: &[Point], edges: &[(usize, usize, f64)], bundle: Option<BundleParams>) -> Vec<Vec<Point>> {
    match bundle {
        Some(params) => {
            log::info!(
                "bundling {} edges (bandwidth {}, decay {})",
                edges.len(),
                params.initial_bandwidth,
                params.decay
            );
            HammerBundle {
                initial_bandwidth: params.initial_bandwidth,
                decay: params.decay,
                ..HammerBundle::default()
            }
            .bundle(positions, edges)
        }
        None => connect_edges(positions, edges),
    }
}

// ---------------------------------------------------------------------------
// Compositing
// ---------------------------------------------------------------------------

/// Draw edges under nodes on a canvas spanning the node positions.
pub fn composite(graph: &Graph, positions: &[Point], paths: &[Vec<Point>], spec: &NetworkSpec) -> Result<RgbaImage> {
    let xs: Vec<f64> = positions.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = positions.iter().map(|p| p.1).collect();
    let canvas = Canvas::new(spec.width, spec.height, None, None, &xs, &ys);

    let edge_counts = Aggregate::Scalar(canvas.lines(paths));
    let edges_img = shade::shade(&edge_counts, &spec.edge_colormap, How::EqHist);

    let mut nodes = graph.nodes.clone();
    let node_agg = match spec.category.as_deref() {
        Some(cat) => {
            nodes.categorize(cat)?;
            if nodes.column(cat)?.category_codes().1.is_empty() {
                log::warn!("category column '{cat}' has no values, drawing nodes uncategorized");
                Aggregation::count()
            } else {
                Aggregation {
                    by: Some(cat.to_string()),
                    ..Aggregation::count()
                }
            }
        }
        None => Aggregation::count(),
    };
    let node_counts = canvas.points(&nodes, &xs, &ys, &node_agg)?;
    let nodes_img = shade::shade(&node_counts, &Colormap::from_colors(&[NODE_COLOR])?, How::EqHist);
    let nodes_img = shade::spread_image(&nodes_img, NODE_SPREAD);

    let img = shade::stack(&edges_img, &nodes_img);
    Ok(match spec.background {
        Some(color) => shade::set_background(&img, color),
        None => img,
    })
}

/// Lay out, route and draw an in-memory graph.
pub fn render_network(nodes: Table, edges: Table, spec: &NetworkSpec) -> Result<RgbaImage> {
    let graph = Graph::prepare(nodes, edges, spec)?;
    let positions = graph.layout(spec.layout)?;
    let paths = route_edges(&positions, &graph.edges, spec.bundle);
    composite(&graph, &positions, &paths, spec)
}

/// Run the whole pipeline from files.
pub fn run(nodes_path: &Path, edges_path: &Path, output: &Path, spec: &NetworkSpec) -> Result<StageTimings> {
    let format = output_format(output)?;
    let mut timings = StageTimings::new();

    let graph = timings.time(Stage::Load, || -> Result<Graph> {
        let nodes = load_table(nodes_path, TabularFormat::NETWORK)?;
        let edges = load_table(edges_path, TabularFormat::NETWORK)?;
        Ok(Graph::prepare(nodes, edges, spec)?)
    })?;
    let positions = timings.time(Stage::Layout, || graph.layout(spec.layout))?;
    let paths = timings.time(Stage::Edges, || route_edges(&positions, &graph.edges, spec.bundle));
    timings.time(Stage::Render, || -> Result<()> {
        let img = composite(&graph, &positions, &paths, spec)?;
        save(&img, output, format)
    })?;

    Ok(timings)
}
