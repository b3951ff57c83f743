//! Pixel grid definition and the two ways data lands on it: point binning
//! and line rasterization.

use super::reduction::{aggregate, Aggregate, Aggregation, CategoricalGrid};
use crate::data::model::Table;
use crate::error::Error;

/// A dense row-major grid of per-pixel values. Row 0 is the top of the image
/// (largest y). Empty cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl Grid {
    pub fn empty(width: usize, height: usize) -> Self {
        Grid {
            width,
            height,
            data: vec![f64::NAN; width * height],
        }
    }

    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.data[row * self.width + col]
    }

    /// Finite values only.
    pub fn finite(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }
}

/// `(min, max)` over finite values.
fn data_bounds(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Widen a zero-width range so it still maps onto pixels.
fn pad_degenerate((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// Fixed-resolution pixel grid with the data ranges it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

impl Canvas {
    /// Build a canvas; missing ranges default to the finite bounds of the
    /// coordinates (or `0..1` when there are none).
    pub fn new(
        width: u32,
        height: u32,
        x_range: Option<(f64, f64)>,
        y_range: Option<(f64, f64)>,
        xs: &[f64],
        ys: &[f64],
    ) -> Self {
        let x_range = x_range.unwrap_or_else(|| pad_degenerate(data_bounds(xs).unwrap_or((0.0, 1.0))));
        let y_range = y_range.unwrap_or_else(|| pad_degenerate(data_bounds(ys).unwrap_or((0.0, 1.0))));
        log::debug!("canvas {width}x{height}, x {x_range:?}, y {y_range:?}");
        Canvas {
            width,
            height,
            x_range,
            y_range,
        }
    }

    fn cols(&self) -> usize {
        self.width as usize
    }

    fn rows(&self) -> usize {
        self.height as usize
    }

    /// Continuous pixel coordinates: column from the left, row from the
    /// bottom, both in `[0, width]` / `[0, height]` inside the ranges.
    fn to_pixel_space(&self, x: f64, y: f64) -> (f64, f64) {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        (
            (x - x0) / (x1 - x0) * self.width as f64,
            (y - y0) / (y1 - y0) * self.height as f64,
        )
    }

    /// Pixel `(col, row)` holding the point, row 0 at the top. Points on the
    /// upper range edge land in the last pixel; anything outside is `None`.
    pub fn pixel(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        if x < x0 || x > x1 || y < y0 || y > y1 {
            return None;
        }
        let (px, py) = self.to_pixel_space(x, y);
        let col = (px.floor() as usize).min(self.cols() - 1);
        let row_up = (py.floor() as usize).min(self.rows() - 1);
        Some((col, self.rows() - 1 - row_up))
    }

    /// Flat cell index per point.
    pub fn cells(&self, xs: &[f64], ys: &[f64]) -> Vec<Option<usize>> {
        xs.iter()
            .zip(ys)
            .map(|(&x, &y)| self.pixel(x, y).map(|(c, r)| r * self.cols() + c))
            .collect()
    }

    /// Bin points and reduce each pixel. `table` supplies the aggregation and
    /// group-by columns.
    pub fn points(&self, table: &Table, xs: &[f64], ys: &[f64], agg: &Aggregation) -> Result<Aggregate, Error> {
        let cells = self.cells(xs, ys);
        let n_cells = self.cols() * self.rows();
        let values = agg.column.as_deref().map(|c| table.f64_column(c)).transpose()?;

        let Some(by) = agg.by.as_deref() else {
            let data = aggregate(agg.reducer, &cells, values.as_deref(), n_cells);
            return Ok(Aggregate::Scalar(Grid {
                width: self.cols(),
                height: self.rows(),
                data,
            }));
        };

        let (codes, categories) = table.column(by)?.category_codes();

        // One key per (pixel, category) so a single pass reduces every layer.
        let n_cats = categories.len().max(1);
        let keys: Vec<Option<usize>> = cells
            .iter()
            .zip(&codes)
            .map(|(cell, code)| Some((*cell)? * n_cats + (*code)? as usize))
            .collect();
        let flat = aggregate(agg.reducer, &keys, values.as_deref(), n_cells * n_cats);

        let layers = (0..categories.len())
            .map(|c| Grid {
                width: self.cols(),
                height: self.rows(),
                data: (0..n_cells).map(|cell| flat[cell * n_cats + c]).collect(),
            })
            .collect();

        Ok(Aggregate::Categorical(CategoricalGrid {
            width: self.cols(),
            height: self.rows(),
            categories,
            layers,
        }))
    }

    /// Count, per pixel, how many polylines pass through it. Segments are
    /// clipped to the canvas; a path counts a pixel once per visit.
    pub fn lines(&self, paths: &[Vec<(f64, f64)>]) -> Grid {
        let mut grid = Grid::empty(self.cols(), self.rows());
        let mut counts = vec![0u32; self.cols() * self.rows()];
        let mut touched: Vec<(usize, usize)> = Vec::new();

        for path in paths {
            touched.clear();
            for pair in path.windows(2) {
                let a = self.to_pixel_space(pair[0].0, pair[0].1);
                let b = self.to_pixel_space(pair[1].0, pair[1].1);
                if let Some((a, b)) = clip_segment(a, b, self.width as f64, self.height as f64) {
                    self.bresenham(a, b, &mut touched);
                }
            }
            touched.dedup();
            for &(col, row) in &touched {
                counts[row * self.cols() + col] += 1;
            }
        }

        for (cell, &count) in grid.data.iter_mut().zip(&counts) {
            if count > 0 {
                *cell = count as f64;
            }
        }
        grid
    }

    fn bresenham(&self, a: (f64, f64), b: (f64, f64), out: &mut Vec<(usize, usize)>) {
        let max_col = self.width as i64 - 1;
        let max_row = self.height as i64 - 1;
        let to_int = |(x, y): (f64, f64)| {
            (
                (x.floor() as i64).clamp(0, max_col),
                (y.floor() as i64).clamp(0, max_row),
            )
        };
        let (mut x0, mut y0) = to_int(a);
        let (x1, y1) = to_int(b);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            out.push((x0 as usize, (max_row - y0) as usize));
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}

/// Liang–Barsky clipping of a segment to `[0, w] x [0, h]`.
fn clip_segment(a: (f64, f64), b: (f64, f64), w: f64, h: f64) -> Option<((f64, f64), (f64, f64))> {
    if !(a.0.is_finite() && a.1.is_finite() && b.0.is_finite() && b.1.is_finite()) {
        return None;
    }
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, a.0), (dx, w - a.0), (-dy, a.1), (dy, h - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, Value};
    use crate::render::reduction::Reducer;

    fn canvas_10x10() -> Canvas {
        Canvas::new(10, 10, Some((0.0, 10.0)), Some((0.0, 10.0)), &[], &[])
    }

    #[test]
    fn test_pixel_orientation_and_edges() {
        let canvas = canvas_10x10();
        // Bottom-left data corner is the bottom-left pixel.
        assert_eq!(canvas.pixel(0.0, 0.0), Some((0, 9)));
        // Upper range edge lands in the last pixel.
        assert_eq!(canvas.pixel(10.0, 10.0), Some((9, 0)));
        assert_eq!(canvas.pixel(10.5, 5.0), None);
        assert_eq!(canvas.pixel(f64::NAN, 5.0), None);
    }

    #[test]
    fn test_default_ranges_from_data() {
        let canvas = Canvas::new(4, 4, None, None, &[1.0, 3.0, f64::NAN], &[2.0, 2.0]);
        assert_eq!(canvas.x_range, (1.0, 3.0));
        // Zero-width y range gets padded.
        assert_eq!(canvas.y_range, (1.5, 2.5));
    }

    #[test]
    fn test_count_points_in_one_cell() {
        let canvas = canvas_10x10();
        let xs = vec![5.1, 5.2, 5.3];
        let ys = vec![5.5, 5.6, 5.7];
        let table = Table::default();
        let Aggregate::Scalar(grid) = canvas.points(&table, &xs, &ys, &Aggregation::count()).unwrap() else {
            panic!("expected scalar aggregate");
        };
        assert_eq!(grid.get(5, 4), 3.0);
        assert_eq!(grid.finite().count(), 1);
    }

    #[test]
    fn test_points_by_category_splits_layers() {
        let canvas = canvas_10x10();
        let table = Table::new(vec![Column::from_values(
            "kind",
            vec![Value::String("a".into()), Value::String("b".into()), Value::String("a".into())],
        )]);
        let agg = Aggregation {
            reducer: Reducer::Count,
            column: None,
            by: Some("kind".into()),
        };
        let Aggregate::Categorical(cats) = canvas.points(&table, &[1.0, 1.0, 8.0], &[1.0, 1.0, 8.0], &agg).unwrap() else {
            panic!("expected categorical aggregate");
        };
        assert_eq!(cats.categories.len(), 2);
        assert_eq!(cats.layers[0].get(1, 8), 1.0);
        assert_eq!(cats.layers[1].get(1, 8), 1.0);
        assert_eq!(cats.layers[0].get(8, 1), 1.0);
        assert!(cats.layers[1].get(8, 1).is_nan());
    }

    #[test]
    fn test_lines_count_each_path_once() {
        let canvas = canvas_10x10();
        let paths = vec![
            vec![(0.5, 0.5), (9.5, 0.5)],
            vec![(0.5, 0.5), (5.5, 0.5), (9.5, 0.5)],
        ];
        let grid = canvas.lines(&paths);
        // Bottom row, every pixel crossed by both paths.
        for col in 0..10 {
            assert_eq!(grid.get(col, 9), 2.0, "col {col}");
        }
        assert_eq!(grid.finite().count(), 10);
    }

    #[test]
    fn test_lines_are_clipped() {
        let canvas = canvas_10x10();
        let grid = canvas.lines(&[vec![(-100.0, 5.5), (100.0, 5.5)]]);
        assert_eq!(grid.finite().count(), 10);
        let outside = canvas.lines(&[vec![(-5.0, -5.0), (-1.0, -1.0)]]);
        assert_eq!(outside.finite().count(), 0);
    }
}
