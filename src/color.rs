use std::str::FromStr;

use image::Rgba;
use palette::{Clamp, FromColor, Hsl, IntoColor, Mix, Oklab, Srgb};

use crate::error::Error;

/// Number of entries a named colormap is expanded to.
pub const COLORMAP_SIZE: usize = 256;

/// Default categorical color key (Set1, Set2 and Set3 combined).
pub const SETS1TO3: [&str; 22] = [
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#ffff33", "#a65628", "#f781bf",
    "#999999", "#66c2a5", "#fc8d62", "#8da0cb", "#a6d854", "#ffd92f", "#e5c494", "#ffffb3",
    "#fb8072", "#fdb462", "#fccde5", "#d9d9d9", "#ccebc5", "#ffed6f",
];

/// Anchor colors of the named colormaps, low to high.
const NAMED_COLORMAPS: &[(&str, &[&str])] = &[
    ("fire", &["#000000", "#5a0000", "#b00f00", "#ff3f00", "#ff8c00", "#ffcb26", "#ffff9c", "#ffffff"]),
    ("bgy", &["#000080", "#0040c0", "#00a080", "#40c040", "#a0d020", "#f0e030"]),
    ("bgyw", &["#000080", "#0040c0", "#00a080", "#40c040", "#a0d020", "#f0e030", "#ffffff"]),
    ("bmw", &["#000004", "#1d0b8b", "#7316c7", "#c03ccb", "#ee84dd", "#ffffff"]),
    ("bmy", &["#000b7d", "#5c1a9e", "#a8208a", "#e04a55", "#f79a2a", "#f5f064"]),
    ("kbc", &["#000000", "#0c1a6e", "#1b3ad6", "#2f7ff2", "#5cc4f5", "#a3ffff"]),
    ("kb", &["#000000", "#00115a", "#0431c5", "#3d5fff"]),
    ("kg", &["#000000", "#024d05", "#06a00a", "#2dff1e"]),
    ("kr", &["#000000", "#5a0000", "#c00000", "#ff2d1e"]),
    ("blues", &["#f0f0f0", "#b4cde8", "#6d9cd6", "#3a67b8", "#1f3a8d"]),
    ("gray", &["#000000", "#ffffff"]),
    ("dimgray", &["#505050", "#c8c8c8"]),
    ("coolwarm", &["#3a4cc0", "#8db0fe", "#dddddd", "#f49a7b", "#b40426"]),
    ("rainbow", &["#0034f8", "#00a5e0", "#2ec72c", "#fad300", "#ff3b00"]),
    ("viridis", &["#440154", "#3b528b", "#21918c", "#5ec962", "#fde725"]),
    ("inferno", &["#000004", "#420a68", "#932667", "#dd513a", "#fca50a", "#fcffa4"]),
    ("magma", &["#000004", "#3b0f70", "#8c2981", "#de4968", "#fe9f6d", "#fcfdbf"]),
    ("plasma", &["#0d0887", "#6a00a8", "#b12a90", "#e16462", "#fca636", "#f0f921"]),
];

// ---------------------------------------------------------------------------
// Color parsing
// ---------------------------------------------------------------------------

/// Parse a CSS color name (`black`, `lightblue`) or a `#rgb` / `#rrggbb` hex
/// code into an opaque color.
pub fn parse_color(s: &str) -> Result<Rgba<u8>, Error> {
    let trimmed = s.trim();
    let rgb: Srgb<u8> = palette::named::from_str(&trimmed.to_ascii_lowercase())
        .or_else(|| Srgb::from_str(trimmed).ok())
        .ok_or_else(|| Error::InvalidColor(s.to_string()))?;
    Ok(Rgba([rgb.red, rgb.green, rgb.blue, 255]))
}

fn to_oklab(color: Rgba<u8>) -> Oklab {
    Srgb::new(color[0], color[1], color[2])
        .into_format::<f32>()
        .into_color()
}

fn from_oklab(lab: Oklab) -> Rgba<u8> {
    let rgb: Srgb<u8> = Srgb::from_color(lab).clamp().into_format();
    Rgba([rgb.red, rgb.green, rgb.blue, 255])
}

// ---------------------------------------------------------------------------
// Continuous colormaps
// ---------------------------------------------------------------------------

/// An ordered list of colors that shading interpolates over.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    pub name: String,
    pub colors: Vec<Rgba<u8>>,
}

impl Colormap {
    /// Look up a named colormap. Names are case-insensitive and a `_r` suffix
    /// reverses the map.
    pub fn by_name(name: &str) -> Result<Colormap, Error> {
        let lower = name.to_ascii_lowercase();
        let (base, reversed) = match lower.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };

        let anchors = NAMED_COLORMAPS
            .iter()
            .find(|(n, _)| *n == base)
            .map(|(_, anchors)| *anchors)
            .ok_or_else(|| Error::UnknownColormap(name.to_string()))?;

        let mut cmap = Colormap::from_anchors(&lower, anchors);
        if reversed {
            cmap.colors.reverse();
        }
        Ok(cmap)
    }

    /// Default colormap for points.
    pub fn fire() -> Colormap {
        Colormap::from_anchors("fire", NAMED_COLORMAPS[0].1)
    }

    /// Default colormap for network edges.
    pub fn edges() -> Colormap {
        Colormap {
            name: "lightblue,darkblue".into(),
            colors: vec![Rgba([173, 216, 230, 255]), Rgba([0, 0, 139, 255])],
        }
    }

    fn from_anchors(name: &str, hex: &[&str]) -> Colormap {
        let anchors: Vec<Rgba<u8>> = hex.iter().filter_map(|h| parse_color(h).ok()).collect();
        Colormap {
            name: name.to_string(),
            colors: expand(&anchors, COLORMAP_SIZE),
        }
    }

    /// A colormap from explicit colors, e.g. `["lightblue", "darkblue"]`.
    pub fn from_colors(names: &[&str]) -> Result<Colormap, Error> {
        let colors = names
            .iter()
            .map(|n| parse_color(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Colormap {
            name: names.join(","),
            colors,
        })
    }

    /// Names accepted by [`Colormap::by_name`] (without `_r` variants).
    pub fn names() -> impl Iterator<Item = &'static str> {
        NAMED_COLORMAPS.iter().map(|(n, _)| *n)
    }

    /// Color at `t` in `[0, 1]`, interpolating linearly between entries.
    pub fn sample(&self, t: f64) -> Rgba<u8> {
        let n = self.colors.len();
        if n == 1 {
            return self.colors[0];
        }
        let pos = t.clamp(0.0, 1.0) * (n - 1) as f64;
        let lo = (pos.floor() as usize).min(n - 1);
        let hi = (lo + 1).min(n - 1);
        let frac = pos - lo as f64;
        let (a, b) = (self.colors[lo], self.colors[hi]);
        let lerp = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
        Rgba([lerp(0), lerp(1), lerp(2), lerp(3)])
    }
}

/// Expand anchor colors to `n` entries, mixing in Oklab.
fn expand(anchors: &[Rgba<u8>], n: usize) -> Vec<Rgba<u8>> {
    if anchors.len() < 2 {
        return anchors.to_vec();
    }
    let labs: Vec<Oklab> = anchors.iter().copied().map(to_oklab).collect();
    let segments = (labs.len() - 1) as f32;
    (0..n)
        .map(|i| {
            let pos = i as f32 / (n - 1) as f32 * segments;
            let lo = (pos.floor() as usize).min(labs.len() - 2);
            let frac = pos - lo as f32;
            from_oklab(labs[lo].mix(labs[lo + 1], frac))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Categorical color keys
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgba<u8>> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Rgba([
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
                255,
            ])
        })
        .collect()
}

/// Colors for `n` categories: the default key first, then evenly spaced hues
/// once it runs out.
pub fn category_colors(n: usize) -> Vec<Rgba<u8>> {
    let mut colors: Vec<Rgba<u8>> = SETS1TO3
        .iter()
        .take(n)
        .filter_map(|hex| parse_color(hex).ok())
        .collect();
    if n > colors.len() {
        colors.extend(generate_palette(n - colors.len()));
    }
    colors
}
