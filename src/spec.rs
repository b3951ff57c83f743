//! Validated render settings. Builders check every option as it is set, so a
//! finished spec is always renderable and bad options fail before any file
//! is touched.

use image::Rgba;

use crate::color::{parse_color, Colormap};
use crate::error::Error;
use crate::network::layout::Layout;
use crate::render::reduction::Aggregation;
use crate::render::shade::How;

pub const DEFAULT_WIDTH: u32 = 600;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_COLORMAP: &str = "fire";
pub const DEFAULT_EDGE_COLORS: [&str; 2] = ["lightblue", "darkblue"];

/// Parse `"min,max"` into two finite floats with `min < max`.
pub fn parse_range(input: &str) -> Result<(f64, f64), Error> {
    let invalid = || Error::InvalidRange {
        input: input.to_string(),
    };
    let mut parts = input.split(',').map(|p| p.trim().parse::<f64>());
    let (Some(Ok(lo)), Some(Ok(hi)), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if !lo.is_finite() || !hi.is_finite() || lo >= hi {
        return Err(invalid());
    }
    Ok((lo, hi))
}

/// A named colormap, or a comma-separated list of colors such as
/// `"lightblue,darkblue"` or `"#FF3333"`.
pub fn resolve_colormap(name: &str) -> Result<Colormap, Error> {
    Colormap::by_name(name).or_else(|err| {
        let colors: Vec<&str> = name.split(',').map(str::trim).collect();
        Colormap::from_colors(&colors).map_err(|_| err)
    })
}

fn check_canvas(width: u32, height: u32) -> Result<(), Error> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidCanvas { width, height });
    }
    Ok(())
}

fn optional_color(color: Option<&str>) -> Result<Option<Rgba<u8>>, Error> {
    color.map(parse_color).transpose()
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// Where the shaded aggregate ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// The shaded image itself.
    #[default]
    Raster,
    /// The image inside an axes frame with a colorbar.
    Figure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub x_column: String,
    pub y_column: String,
    pub x_range: Option<(f64, f64)>,
    pub y_range: Option<(f64, f64)>,
    pub aggregation: Aggregation,
    /// Spread radius in pixels; never `Some(0)`.
    pub spread: Option<u32>,
    pub how: How,
    pub colormap: Colormap,
    pub background: Option<Rgba<u8>>,
    pub backend: Backend,
    /// Read the input as a geospatial dataset.
    pub geo: bool,
}

impl RenderSpec {
    pub fn builder() -> RenderSpecBuilder {
        RenderSpecBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct RenderSpecBuilder {
    spec: RenderSpec,
}

impl Default for RenderSpecBuilder {
    fn default() -> Self {
        RenderSpecBuilder {
            spec: RenderSpec {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                x_column: "x".into(),
                y_column: "y".into(),
                x_range: None,
                y_range: None,
                aggregation: Aggregation::count(),
                spread: None,
                how: How::EqHist,
                colormap: Colormap::fire(),
                background: None,
                backend: Backend::Raster,
                geo: false,
            },
        }
    }
}

impl RenderSpecBuilder {
    pub fn columns(mut self, x: &str, y: &str) -> Self {
        self.spec.x_column = x.to_string();
        self.spec.y_column = y.to_string();
        self
    }

    pub fn canvas(mut self, width: u32, height: u32) -> Result<Self, Error> {
        check_canvas(width, height)?;
        self.spec.width = width;
        self.spec.height = height;
        Ok(self)
    }

    pub fn x_range(mut self, range: Option<&str>) -> Result<Self, Error> {
        self.spec.x_range = range.map(parse_range).transpose()?;
        Ok(self)
    }

    pub fn y_range(mut self, range: Option<&str>) -> Result<Self, Error> {
        self.spec.y_range = range.map(parse_range).transpose()?;
        Ok(self)
    }

    pub fn aggregation(mut self, name: Option<&str>, column: Option<&str>, by: Option<&str>) -> Result<Self, Error> {
        self.spec.aggregation = Aggregation::resolve(name, column, by)?;
        Ok(self)
    }

    pub fn spread(mut self, px: Option<u32>) -> Self {
        self.spec.spread = px.filter(|&px| px > 0);
        self
    }

    pub fn how(mut self, how: &str) -> Result<Self, Error> {
        self.spec.how = how.parse()?;
        Ok(self)
    }

    pub fn colormap(mut self, name: &str) -> Result<Self, Error> {
        self.spec.colormap = resolve_colormap(name)?;
        Ok(self)
    }

    pub fn background(mut self, color: Option<&str>) -> Result<Self, Error> {
        self.spec.background = optional_color(color)?;
        Ok(self)
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.spec.backend = backend;
        self
    }

    pub fn geo(mut self, geo: bool) -> Self {
        self.spec.geo = geo;
        self
    }

    pub fn build(self) -> RenderSpec {
        let spec = self.spec;
        if spec.backend == Backend::Figure && spec.spread.is_some() {
            log::warn!("spreading is not supported for figure output, ignoring --spread_px");
        }
        log::debug!("render spec: {spec:?}");
        spec
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Column names in the node and edge tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub x: String,
    pub y: String,
    pub source: String,
    pub target: String,
    /// Node key column; edge endpoints are positional indices without it.
    pub id: Option<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            x: "x".into(),
            y: "y".into(),
            source: "source".into(),
            target: "target".into(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleParams {
    pub initial_bandwidth: f64,
    pub decay: f64,
}

impl Default for BundleParams {
    fn default() -> Self {
        BundleParams {
            initial_bandwidth: 0.05,
            decay: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub width: u32,
    pub height: u32,
    pub columns: ColumnMap,
    pub layout: Layout,
    /// Node category column for colored nodes.
    pub category: Option<String>,
    /// Hammer bundling; straight edges when `None`.
    pub bundle: Option<BundleParams>,
    pub edge_colormap: Colormap,
    pub background: Option<Rgba<u8>>,
}

impl NetworkSpec {
    pub fn builder() -> NetworkSpecBuilder {
        NetworkSpecBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct NetworkSpecBuilder {
    spec: NetworkSpec,
}

impl Default for NetworkSpecBuilder {
    fn default() -> Self {
        NetworkSpecBuilder {
            spec: NetworkSpec {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                columns: ColumnMap::default(),
                layout: Layout::ForceAtlas2,
                category: None,
                bundle: None,
                edge_colormap: Colormap::edges(),
                background: None,
            },
        }
    }
}

impl NetworkSpecBuilder {
    pub fn canvas(mut self, width: u32, height: u32) -> Result<Self, Error> {
        check_canvas(width, height)?;
        self.spec.width = width;
        self.spec.height = height;
        Ok(self)
    }

    pub fn columns(mut self, columns: ColumnMap) -> Self {
        self.spec.columns = columns;
        self
    }

    pub fn layout(mut self, layout: &str) -> Result<Self, Error> {
        self.spec.layout = layout.parse()?;
        Ok(self)
    }

    pub fn category(mut self, column: Option<&str>) -> Self {
        self.spec.category = column.map(str::to_string);
        self
    }

    /// Enable or disable bundling. Bandwidth and decay only matter when
    /// bundling is on; given without it they are ignored with a warning.
    pub fn bundle(mut self, enabled: bool, bandwidth: Option<f64>, decay: Option<f64>) -> Result<Self, Error> {
        if !enabled {
            if bandwidth.is_some() || decay.is_some() {
                log::warn!("--bw/--decay have no effect without --bundle");
            }
            self.spec.bundle = None;
            return Ok(self);
        }
        let defaults = BundleParams::default();
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(value)
            } else {
                Err(Error::InvalidParameter { name, value })
            }
        };
        self.spec.bundle = Some(BundleParams {
            initial_bandwidth: positive("bandwidth", bandwidth.unwrap_or(defaults.initial_bandwidth))?,
            decay: positive("decay", decay.unwrap_or(defaults.decay))?,
        });
        Ok(self)
    }

    pub fn edge_colormap(mut self, name: Option<&str>) -> Result<Self, Error> {
        self.spec.edge_colormap = match name {
            Some(name) => resolve_colormap(name)?,
            None => Colormap::edges(),
        };
        Ok(self)
    }

    pub fn background(mut self, color: Option<&str>) -> Result<Self, Error> {
        self.spec.background = optional_color(color)?;
        Ok(self)
    }

    pub fn build(self) -> NetworkSpec {
        log::debug!("network spec: {:?}", self.spec);
        self.spec
    }
}
