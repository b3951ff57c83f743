//! Framed figure output: the shaded image inside an axes frame, with a
//! colorbar (or category swatches) to the right.

use image::{Rgba, RgbaImage};

use super::reduction::Aggregate;
use super::shade::{self, How};
use crate::color::{category_colors, Colormap};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const MARGIN_LEFT: u32 = 48;
const MARGIN_RIGHT: u32 = 24;
const MARGIN_TOP: u32 = 24;
const MARGIN_BOTTOM: u32 = 40;
const BAR_GAP: u32 = 16;
const BAR_WIDTH: u32 = 18;
const SWATCH: u32 = 12;
const TICK_LEN: u32 = 5;
const TICKS: u32 = 5;

/// Pixel layout of a figure for a given plot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureLayout {
    pub width: u32,
    pub height: u32,
    /// Top-left corner of the plot area.
    pub plot_origin: (u32, u32),
    /// Top-left corner of the colorbar strip.
    pub bar_origin: (u32, u32),
}

impl FigureLayout {
    pub fn new(plot_width: u32, plot_height: u32) -> Self {
        let bar_x = MARGIN_LEFT + plot_width + BAR_GAP;
        FigureLayout {
            width: bar_x + BAR_WIDTH + MARGIN_RIGHT,
            height: MARGIN_TOP + plot_height + MARGIN_BOTTOM,
            plot_origin: (MARGIN_LEFT, MARGIN_TOP),
            bar_origin: (bar_x, MARGIN_TOP),
        }
    }
}

/// Render an aggregate as a figure. Values are shaded linearly; `face` fills
/// the axes behind empty pixels.
pub fn render(agg: &Aggregate, cmap: &Colormap, face: Rgba<u8>) -> RgbaImage {
    let plot = shade::set_background(&shade::shade(agg, cmap, How::Linear), face);
    let layout = FigureLayout::new(plot.width(), plot.height());
    let mut fig = RgbaImage::from_pixel(layout.width, layout.height, PAPER);

    let (ox, oy) = layout.plot_origin;
    image::imageops::overlay(&mut fig, &plot, ox as i64, oy as i64);
    frame(&mut fig, ox, oy, plot.width(), plot.height());
    axis_ticks(&mut fig, ox, oy, plot.width(), plot.height());

    match agg {
        Aggregate::Scalar(_) => colorbar(&mut fig, layout, plot.height(), cmap),
        Aggregate::Categorical(cats) => swatches(&mut fig, layout, cats.layers.len()),
    }
    fig
}

// ---------------------------------------------------------------------------
// Drawing primitives
// ---------------------------------------------------------------------------

fn put(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    for yy in y..y + h {
        for xx in x..x + w {
            put(img, xx, yy, color);
        }
    }
}

/// One-pixel outline just outside the `w x h` box at `(x, y)`.
fn frame(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32) {
    let (left, top) = (x.saturating_sub(1), y.saturating_sub(1));
    let (right, bottom) = (x + w, y + h);
    for xx in left..=right {
        put(img, xx, top, INK);
        put(img, xx, bottom, INK);
    }
    for yy in top..=bottom {
        put(img, left, yy, INK);
        put(img, right, yy, INK);
    }
}

/// Evenly spaced positions from `start` to `start + len - 1`.
fn tick_positions(start: u32, len: u32) -> impl Iterator<Item = u32> {
    let span = len.saturating_sub(1);
    (0..TICKS).map(move |i| start + span * i / (TICKS - 1))
}

fn axis_ticks(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32) {
    let bottom = y + h;
    for tx in tick_positions(x, w) {
        for d in 1..=TICK_LEN {
            put(img, tx, bottom + d, INK);
        }
    }
    for ty in tick_positions(y, h) {
        for d in 1..=TICK_LEN {
            put(img, x.saturating_sub(1 + d), ty, INK);
        }
    }
}

/// Vertical colormap strip, high values at the top.
fn colorbar(img: &mut RgbaImage, layout: FigureLayout, height: u32, cmap: &Colormap) {
    let (bx, by) = layout.bar_origin;
    for row in 0..height {
        let t = if height > 1 {
            1.0 - row as f64 / (height - 1) as f64
        } else {
            1.0
        };
        let color = shade::over(cmap.sample(t), PAPER);
        fill_rect(img, bx, by + row, BAR_WIDTH, 1, color);
    }
    frame(img, bx, by, BAR_WIDTH, height);
    for ty in tick_positions(by, height) {
        for d in 1..=TICK_LEN {
            put(img, bx + BAR_WIDTH + d, ty, INK);
        }
    }
}

/// One outlined swatch per category in the colorbar column.
fn swatches(img: &mut RgbaImage, layout: FigureLayout, n: usize) {
    let (bx, by) = layout.bar_origin;
    for (i, color) in category_colors(n).into_iter().enumerate() {
        let y = by + i as u32 * (SWATCH + 4);
        if y + SWATCH >= img.height() {
            log::warn!("figure too short to show all {n} category swatches");
            break;
        }
        fill_rect(img, bx, y, SWATCH, SWATCH, color);
        frame(img, bx, y, SWATCH, SWATCH);
    }
}
