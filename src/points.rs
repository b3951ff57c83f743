//! The `points` pipeline: load, bin onto a canvas, shade, write.

use std::path::Path;

use anyhow::Result;
use image::{Rgba, RgbaImage};

use crate::data::geo::load_geo_table;
use crate::data::loader::{load_table, TabularFormat};
use crate::data::model::Table;
use crate::render::canvas::Canvas;
use crate::render::figure;
use crate::render::image::{output_format, save};
use crate::render::shade;
use crate::spec::{Backend, RenderSpec};
use crate::timing::{Stage, StageTimings};

/// Axes face of figures without an explicit background.
const DEFAULT_FACE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Load the dataset the way `spec` asks: geospatial layers derive the x/y
/// columns from point geometry, tabular files must already have them.
pub fn load(path: &Path, spec: &RenderSpec) -> Result<Table> {
    if spec.geo {
        load_geo_table(path, &spec.x_column, &spec.y_column)
    } else {
        load_table(path, TabularFormat::POINTS)
    }
}

/// Point coordinates and the canvas that covers them.
pub struct Placement {
    pub canvas: Canvas,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

pub fn place(table: &Table, spec: &RenderSpec) -> Result<Placement> {
    let xs = table.f64_column(&spec.x_column)?;
    let ys = table.f64_column(&spec.y_column)?;
    let canvas = Canvas::new(spec.width, spec.height, spec.x_range, spec.y_range, &xs, &ys);
    Ok(Placement { canvas, xs, ys })
}

/// Aggregate and shade placed points into the final image.
pub fn draw(table: &mut Table, placement: &Placement, spec: &RenderSpec) -> Result<RgbaImage> {
    if let Some(by) = spec.aggregation.by.as_deref() {
        table.categorize(by)?;
    }
    let agg = placement
        .canvas
        .points(table, &placement.xs, &placement.ys, &spec.aggregation)?;

    let img = match spec.backend {
        Backend::Raster => {
            let agg = match spec.spread {
                Some(px) => shade::spread(&agg, px),
                None => agg,
            };
            let img = shade::shade(&agg, &spec.colormap, spec.how);
            match spec.background {
                Some(color) => shade::set_background(&img, color),
                None => img,
            }
        }
        Backend::Figure => figure::render(&agg, &spec.colormap, spec.background.unwrap_or(DEFAULT_FACE)),
    };
    Ok(img)
}

/// Render an in-memory table.
pub fn render_points(table: &mut Table, spec: &RenderSpec) -> Result<RgbaImage> {
    let placement = place(table, spec)?;
    draw(table, &placement, spec)
}

/// Run the whole pipeline. The output format is checked before anything is
/// loaded, and nothing is written unless rendering succeeds.
pub fn run(data: &Path, output: &Path, spec: &RenderSpec) -> Result<StageTimings> {
    let format = output_format(output)?;
    let mut timings = StageTimings::new();

    let mut table = timings.time(Stage::Load, || load(data, spec))?;
    let placement = timings.time(Stage::Canvas, || place(&table, spec))?;
    timings.time(Stage::Render, || -> Result<()> {
        let img = draw(&mut table, &placement, spec)?;
        save(&img, output, format)
    })?;

    Ok(timings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, ColumnData, Value};
    use crate::error::Error;

    fn table() -> Table {
        Table::new(vec![
            Column::new("x", ColumnData::Float(vec![0.0, 1.0, 2.0, 3.0])),
            Column::new("y", ColumnData::Float(vec![0.0, 1.0, 2.0, 3.0])),
            Column::new("v", ColumnData::Int(vec![Some(1), Some(2), None, Some(4)])),
            Column::from_values(
                "kind",
                ["a", "b", "a", "b"].iter().map(|s| Value::String(s.to_string())).collect(),
            ),
        ])
    }

    fn spec() -> crate::spec::RenderSpecBuilder {
        RenderSpec::builder().canvas(4, 4).unwrap()
    }

    #[test]
    fn test_raster_draws_diagonal() {
        let img = render_points(&mut table(), &spec().build()).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
        for i in 0..4 {
            assert!(img.get_pixel(i, 3 - i)[3] > 0, "pixel {i} should be drawn");
        }
        assert_eq!(img.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_background_fills_empty_pixels() {
        let spec = spec().background(Some("black")).unwrap().build();
        let img = render_points(&mut table(), &spec).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_spread_grows_footprint() {
        let plain = render_points(&mut table(), &spec().build()).unwrap();
        let spread = render_points(&mut table(), &spec().spread(Some(1)).build()).unwrap();
        let drawn = |img: &RgbaImage| img.pixels().filter(|p| p[3] > 0).count();
        assert!(drawn(&spread) > drawn(&plain));
    }

    #[test]
    fn test_group_by_categorizes_column() {
        let mut t = table();
        let spec = spec().aggregation(Some("sum"), Some("v"), Some("kind")).unwrap().build();
        render_points(&mut t, &spec).unwrap();
        assert!(matches!(t.column("kind").unwrap().data, ColumnData::Categorical { .. }));
    }

    #[test]
    fn test_group_by_without_values_keeps_canvas_size() {
        let mut t = table();
        t.columns.push(Column::new("none", ColumnData::Text(vec![None; 4])));
        let spec = RenderSpec::builder()
            .canvas(20, 10)
            .unwrap()
            .aggregation(None, None, Some("none"))
            .unwrap()
            .build();
        let img = render_points(&mut t, &spec).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_figure_backend_is_larger_than_plot() {
        let spec = spec().backend(Backend::Figure).build();
        let img = render_points(&mut table(), &spec).unwrap();
        assert!(img.width() > 4 && img.height() > 4);
    }

    #[test]
    fn test_missing_coordinate_column() {
        let spec = spec().columns("lon", "lat").build();
        let err = render_points(&mut table(), &spec).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MissingColumn { .. })));
    }
}
