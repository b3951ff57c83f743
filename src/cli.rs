//! Command-line arguments and their conversion into render specs.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::error::Error;
use crate::spec::{Backend, ColumnMap, NetworkSpec, RenderSpec};

#[derive(Debug, Parser)]
#[command(name = "pointshade", version)]
#[command(about = "Quick rasterized visualization of large datasets", long_about = None)]
#[command(after_help = "Supported data formats: csv, parquet, feather, hdf, geoparquet, shapefile, geojson, geopackage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a point cloud
    Points(PointsArgs),
    /// Render a node-link graph
    Network(NetworkArgs),
}

#[derive(Debug, Args)]
pub struct PointsArgs {
    /// Input dataset
    pub data_path: PathBuf,

    /// Output image (.png, .jpg)
    pub output_path: PathBuf,

    /// Name of the x column; with --geo it names the derived column
    #[arg(long = "x", default_value = "x")]
    pub x: String,

    /// Name of the y column; with --geo it names the derived column
    #[arg(long = "y", default_value = "y")]
    pub y: String,

    /// Image width in pixels
    #[arg(long = "w", default_value_t = crate::spec::DEFAULT_WIDTH)]
    pub w: u32,

    /// Image height in pixels
    #[arg(long = "h", default_value_t = crate::spec::DEFAULT_HEIGHT)]
    pub h: u32,

    /// Range of the x axis, "xmin,xmax"
    #[arg(long = "x_range", allow_hyphen_values = true)]
    pub x_range: Option<String>,

    /// Range of the y axis, "ymin,ymax"
    #[arg(long = "y_range", allow_hyphen_values = true)]
    pub y_range: Option<String>,

    /// Aggregation function (count, any, sum, mean, min, max, std, var, mode, first, last)
    #[arg(long)]
    pub agg: Option<String>,

    /// Column to aggregate on
    #[arg(long = "agg_col")]
    pub agg_col: Option<String>,

    /// Column to group by, one layer per category
    #[arg(long)]
    pub by: Option<String>,

    /// Pixels to spread points by
    #[arg(long = "spread_px")]
    pub spread_px: Option<u32>,

    /// How to map values to colors: eq_hist, cbrt, log or linear
    #[arg(long, default_value = "eq_hist")]
    pub how: String,

    /// Colormap name, or comma-separated colors
    #[arg(long, default_value = crate::spec::DEFAULT_COLORMAP)]
    pub cmap: String,

    /// Read the input as geospatial data (geoparquet, shapefile, geojson, geopackage)
    #[arg(long, default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub geo: bool,

    /// Background color, e.g. "black" or "#ffffff"
    #[arg(long)]
    pub background: Option<String>,

    /// Render a framed figure with a colorbar (no spreading)
    #[arg(long, default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub matplotlib: bool,
}

impl PointsArgs {
    pub fn to_spec(&self) -> Result<RenderSpec, Error> {
        let backend = if self.matplotlib {
            Backend::Figure
        } else {
            Backend::Raster
        };
        Ok(RenderSpec::builder()
            .columns(&self.x, &self.y)
            .canvas(self.w, self.h)?
            .x_range(self.x_range.as_deref())?
            .y_range(self.y_range.as_deref())?
            .aggregation(self.agg.as_deref(), self.agg_col.as_deref(), self.by.as_deref())?
            .spread(self.spread_px)
            .how(&self.how)?
            .colormap(&self.cmap)?
            .background(self.background.as_deref())?
            .backend(backend)
            .geo(self.geo)
            .build())
    }
}

#[derive(Debug, Args)]
pub struct NetworkArgs {
    /// Nodes table (csv or parquet)
    pub nodes_file: PathBuf,

    /// Edges table (csv or parquet)
    pub edges_file: PathBuf,

    /// Output image (.png, .jpg)
    pub output_path: PathBuf,

    /// Image width in pixels
    #[arg(long = "w", default_value_t = crate::spec::DEFAULT_WIDTH)]
    pub w: u32,

    /// Image height in pixels
    #[arg(long = "h", default_value_t = crate::spec::DEFAULT_HEIGHT)]
    pub h: u32,

    /// Node x column
    #[arg(long = "x", default_value = "x")]
    pub x: String,

    /// Node y column
    #[arg(long = "y", default_value = "y")]
    pub y: String,

    /// Edge source column
    #[arg(long, default_value = "source")]
    pub source: String,

    /// Edge target column
    #[arg(long, default_value = "target")]
    pub target: String,

    /// Node id column referenced by source/target
    #[arg(long)]
    pub id: Option<String>,

    /// Layout: random, circular, forceatlas2 or geo
    #[arg(long, default_value = "forceatlas2")]
    pub layout: String,

    /// Node category column
    #[arg(long)]
    pub cat: Option<String>,

    /// Background color
    #[arg(long)]
    pub background: Option<String>,

    /// Bundle edges
    #[arg(long, default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub bundle: bool,

    /// Initial bundling bandwidth
    #[arg(long)]
    pub bw: Option<f64>,

    /// Bundling bandwidth decay
    #[arg(long)]
    pub decay: Option<f64>,

    /// Edge colormap name, or comma-separated colors
    #[arg(long = "edge_cmap")]
    pub edge_cmap: Option<String>,
}

impl NetworkArgs {
    pub fn to_spec(&self) -> Result<NetworkSpec, Error> {
        let columns = ColumnMap {
            x: self.x.clone(),
            y: self.y.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            id: self.id.clone(),
        };
        Ok(NetworkSpec::builder()
            .canvas(self.w, self.h)?
            .columns(columns)
            .layout(&self.layout)?
            .category(self.cat.as_deref())
            .bundle(self.bundle, self.bw, self.decay)?
            .edge_colormap(self.edge_cmap.as_deref())?
            .background(self.background.as_deref())?
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::layout::Layout;
    use crate::render::shade::How;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pointshade").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_points_defaults() {
        let Command::Points(args) = parse(&["points", "in.csv", "out.png"]).command else {
            panic!("expected points");
        };
        assert_eq!((args.w, args.h), (600, 600));
        assert_eq!(args.x, "x");
        assert!(!args.geo);
        assert!(!args.matplotlib);
        let spec = args.to_spec().unwrap();
        assert_eq!(spec.how, How::EqHist);
        assert_eq!(spec.backend, Backend::Raster);
    }

    #[test]
    fn test_points_underscore_options_and_boolish() {
        let Command::Points(args) = parse(&[
            "points", "in.parquet", "out.png", "--x_range", "-10,10", "--agg", "mean", "--agg_col", "v",
            "--spread_px", "2", "--geo", "yes", "--matplotlib", "1",
        ])
        .command
        else {
            panic!("expected points");
        };
        assert_eq!(args.x_range.as_deref(), Some("-10,10"));
        assert!(args.geo);
        let spec = args.to_spec().unwrap();
        assert_eq!(spec.x_range, Some((-10.0, 10.0)));
        assert_eq!(spec.spread, Some(2));
        assert_eq!(spec.backend, Backend::Figure);
    }

    #[test]
    fn test_points_invalid_option_fails_in_spec() {
        let Command::Points(args) = parse(&["points", "in.csv", "out.png", "--agg", "median"]).command else {
            panic!("expected points");
        };
        assert!(matches!(args.to_spec(), Err(Error::UnknownAggregation(_))));
    }

    #[test]
    fn test_network_options() {
        let Command::Network(args) = parse(&[
            "network", "nodes.csv", "edges.csv", "out.png", "--layout", "circular", "--id", "name",
            "--bundle", "true", "--bw", "0.1", "--edge_cmap", "kbc",
        ])
        .command
        else {
            panic!("expected network");
        };
        let spec = args.to_spec().unwrap();
        assert_eq!(spec.layout, Layout::Circular);
        assert_eq!(spec.columns.id.as_deref(), Some("name"));
        assert_eq!(spec.bundle.map(|b| b.initial_bandwidth), Some(0.1));
        assert_eq!(spec.edge_colormap.name, "kbc");
    }
}
