//! Turning aggregates into pixels: value scaling, colormapping, spreading
//! and compositing.

use std::str::FromStr;

use image::{Rgba, RgbaImage};

use super::canvas::Grid;
use super::reduction::{Aggregate, CategoricalGrid};
use crate::color::{category_colors, Colormap};
use crate::error::Error;

/// Lowest alpha given to a non-empty pixel when alpha carries magnitude.
pub const MIN_ALPHA: u8 = 40;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// How aggregate values are scaled before colormapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum How {
    /// Histogram equalization.
    #[default]
    EqHist,
    /// Cube root.
    Cbrt,
    /// `log1p`.
    Log,
    Linear,
}

impl FromStr for How {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "eq_hist" => Ok(How::EqHist),
            "cbrt" => Ok(How::Cbrt),
            "log" => Ok(How::Log),
            "linear" => Ok(How::Linear),
            _ => Err(Error::UnknownHow(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Value scaling
// ---------------------------------------------------------------------------

/// Map finite values to `[0, 1]`; `NaN` stays `NaN`. A single distinct value
/// maps to 1.
pub fn normalize(values: &[f64], how: How) -> Vec<f64> {
    let Some(lo) = values.iter().copied().filter(|v| v.is_finite()).reduce(f64::min) else {
        return values.to_vec();
    };

    let scaled: Vec<f64> = match how {
        How::Linear => values.to_vec(),
        How::Log => values.iter().map(|v| (v - lo).ln_1p()).collect(),
        How::Cbrt => values.iter().map(|v| (v - lo).cbrt()).collect(),
        How::EqHist => return equalize(values),
    };

    let (min, max) = scaled
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), v| (a.min(v), b.max(v)));
    scaled
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                f64::NAN
            } else if max > min {
                (v - min) / (max - min)
            } else {
                1.0
            }
        })
        .collect()
}

/// Rank-based histogram equalization: each value maps to the fraction of
/// values at or below it, rescaled so the smallest value lands on 0.
fn equalize(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let cdf = |v: f64| sorted.partition_point(|&s| s <= v) as f64 / n;
    let floor = cdf(sorted[0]);

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                f64::NAN
            } else if floor < 1.0 {
                (cdf(v) - floor) / (1.0 - floor)
            } else {
                1.0
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shading
// ---------------------------------------------------------------------------

/// Shade an aggregate. Scalar grids use `cmap`; categorical stacks use the
/// categorical color key and carry magnitude in alpha.
pub fn shade(agg: &Aggregate, cmap: &Colormap, how: How) -> RgbaImage {
    match agg {
        Aggregate::Scalar(grid) => shade_grid(grid, cmap, how),
        Aggregate::Categorical(cats) => shade_categorical(cats, how),
    }
}

fn shade_grid(grid: &Grid, cmap: &Colormap, how: How) -> RgbaImage {
    let t = normalize(&grid.data, how);
    let single = cmap.colors.len() == 1;
    let mut img = RgbaImage::from_pixel(grid.width as u32, grid.height as u32, TRANSPARENT);
    for (i, &t) in t.iter().enumerate() {
        if t.is_nan() {
            continue;
        }
        let color = if single {
            let base = cmap.colors[0];
            Rgba([base[0], base[1], base[2], ramp_alpha(t)])
        } else {
            cmap.sample(t)
        };
        img.put_pixel((i % grid.width) as u32, (i / grid.width) as u32, color);
    }
    img
}

fn shade_categorical(cats: &CategoricalGrid, how: How) -> RgbaImage {
    let colors = category_colors(cats.layers.len());
    let (w, h) = (cats.width, cats.height);

    // Totals decide alpha; weights decide hue.
    let totals: Vec<f64> = (0..w * h)
        .map(|i| {
            let total: f64 = cats.layers.iter().map(|g| weight(g.data[i])).sum();
            if total > 0.0 {
                total
            } else {
                f64::NAN
            }
        })
        .collect();
    let alpha = normalize(&totals, how);

    let mut img = RgbaImage::from_pixel(w as u32, h as u32, TRANSPARENT);
    for i in 0..w * h {
        if totals[i].is_nan() {
            continue;
        }
        let mut rgb = [0.0f64; 3];
        for (layer, color) in cats.layers.iter().zip(&colors) {
            let share = weight(layer.data[i]) / totals[i];
            for (c, acc) in rgb.iter_mut().enumerate() {
                *acc += color[c] as f64 * share;
            }
        }
        let px = Rgba([
            rgb[0].round() as u8,
            rgb[1].round() as u8,
            rgb[2].round() as u8,
            ramp_alpha(alpha[i]),
        ]);
        img.put_pixel((i % w) as u32, (i / w) as u32, px);
    }
    img
}

fn weight(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn ramp_alpha(t: f64) -> u8 {
    (MIN_ALPHA as f64 + t.clamp(0.0, 1.0) * (255 - MIN_ALPHA) as f64).round() as u8
}

// ---------------------------------------------------------------------------
// Spreading
// ---------------------------------------------------------------------------

/// Offsets of a filled circle of radius `px`.
fn circle_kernel(px: u32) -> Vec<(i64, i64)> {
    let r = px as i64;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Dilate every non-empty cell by `px`, adding overlapping contributions.
pub fn spread_grid(grid: &Grid, px: u32) -> Grid {
    if px == 0 {
        return grid.clone();
    }
    let kernel = circle_kernel(px);
    let (w, h) = (grid.width as i64, grid.height as i64);
    let mut out = Grid::empty(grid.width, grid.height);
    for (i, &v) in grid.data.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let (x, y) = ((i as i64) % w, (i as i64) / w);
        for &(dx, dy) in &kernel {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let slot = &mut out.data[(ny * w + nx) as usize];
            *slot = if slot.is_nan() { v } else { *slot + v };
        }
    }
    out
}

/// Spread an aggregate, layer by layer.
pub fn spread(agg: &Aggregate, px: u32) -> Aggregate {
    agg.map_grids(|g| spread_grid(g, px))
}

/// Dilate every visible pixel of an image by `px`, compositing with "over".
pub fn spread_image(img: &RgbaImage, px: u32) -> RgbaImage {
    if px == 0 {
        return img.clone();
    }
    let kernel = circle_kernel(px);
    let (w, h) = (img.width() as i64, img.height() as i64);
    let mut out = RgbaImage::from_pixel(img.width(), img.height(), TRANSPARENT);
    for (x, y, &src) in img.enumerate_pixels() {
        if src[3] == 0 {
            continue;
        }
        for &(dx, dy) in &kernel {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let dst = out.get_pixel_mut(nx as u32, ny as u32);
            *dst = over(src, *dst);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Compositing
// ---------------------------------------------------------------------------

/// Porter-Duff "over" on straight-alpha pixels.
pub fn over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f64 / 255.0;
    let da = dst[3] as f64 / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return TRANSPARENT;
    }
    let channel = |c: usize| ((src[c] as f64 * sa + dst[c] as f64 * da * (1.0 - sa)) / oa).round() as u8;
    Rgba([channel(0), channel(1), channel(2), (oa * 255.0).round() as u8])
}

/// Composite `top` over `bottom`; both must share dimensions.
pub fn stack(bottom: &RgbaImage, top: &RgbaImage) -> RgbaImage {
    let mut out = bottom.clone();
    for (dst, src) in out.pixels_mut().zip(top.pixels()) {
        *dst = over(*src, *dst);
    }
    out
}

/// Composite the image over a solid color.
pub fn set_background(img: &RgbaImage, color: Rgba<u8>) -> RgbaImage {
    let mut out = img.clone();
    for px in out.pixels_mut() {
        *px = over(*px, color);
    }
    out
}
