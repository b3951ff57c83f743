//! Edge routing: straight segments, or hammer bundling which pulls edges
//! along the gradient of a blurred edge-density image so that edges running
//! close together merge into bundles.

use super::layout::Point;

/// Straight segment per edge; edges with an endpoint out of range are
/// skipped.
pub fn connect_edges(positions: &[Point], edges: &[(usize, usize, f64)]) -> Vec<Vec<Point>> {
    edges
        .iter()
        .filter_map(|&(s, t, _)| Some(vec![*positions.get(s)?, *positions.get(t)?]))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HammerBundle {
    /// Blur radius of the first pass, as a fraction of the unit square.
    pub initial_bandwidth: f64,
    /// Bandwidth multiplier per pass.
    pub decay: f64,
    pub iterations: usize,
    /// Side of the density image in pixels.
    pub accuracy: usize,
    /// Advection steps per pass.
    pub advect_iterations: usize,
    /// Smoothing weight given to the neighbors' midpoint.
    pub tension: f64,
    pub min_segment_length: f64,
    pub max_segment_length: f64,
}

impl Default for HammerBundle {
    fn default() -> Self {
        HammerBundle {
            initial_bandwidth: 0.05,
            decay: 0.7,
            iterations: 4,
            accuracy: 500,
            advect_iterations: 50,
            tension: 0.3,
            min_segment_length: 0.008,
            max_segment_length: 0.016,
        }
    }
}

impl HammerBundle {
    /// Bundle `edges` between `positions`. Returns one polyline per drawable
    /// edge, in data coordinates, starting and ending at its nodes.
    pub fn bundle(&self, positions: &[Point], edges: &[(usize, usize, f64)]) -> Vec<Vec<Point>> {
        let Some(frame) = UnitFrame::around(positions) else {
            return Vec::new();
        };
        let normalized: Vec<Point> = positions.iter().map(|&p| frame.normalize(p)).collect();

        let mut weights = Vec::new();
        let mut paths: Vec<Vec<Point>> = edges
            .iter()
            .filter_map(|&(s, t, w)| {
                let path = vec![*normalized.get(s)?, *normalized.get(t)?];
                weights.push(if w.is_finite() { w } else { 1.0 });
                Some(self.resample(&path))
            })
            .collect();

        for i in 0..self.iterations {
            let bandwidth = self.initial_bandwidth * self.decay.powi(i as i32 + 1) * self.accuracy as f64;
            if bandwidth < 2.0 {
                break;
            }
            log::debug!("bundling pass {i}, bandwidth {bandwidth:.2}px");
            let density = self.density(&paths, &weights, bandwidth);
            let field = Gradient::of(&density, self.accuracy + 1);
            for path in &mut paths {
                *path = self.advect(&field, std::mem::take(path));
            }
        }

        for path in &mut paths {
            *path = self.resample(path);
        }
        for _ in 0..10 {
            for path in &mut paths {
                smooth(path, self.tension);
            }
        }

        paths
            .into_iter()
            .map(|path| path.into_iter().map(|p| frame.denormalize(p)).collect())
            .collect()
    }

    /// Blurred point density over an `(accuracy + 1)²` image, x-major.
    fn density(&self, paths: &[Vec<Point>], weights: &[f64], bandwidth: f64) -> Vec<f64> {
        let side = self.accuracy + 1;
        let mut img = vec![0.0f64; side * side];
        for (path, &w) in paths.iter().zip(weights) {
            for &p in path {
                let (xi, yi) = self.cell(p);
                img[xi * side + yi] += w;
            }
        }
        gaussian_blur(&mut img, side, bandwidth / 2.0);
        img
    }

    fn cell(&self, (x, y): Point) -> (usize, usize) {
        let acc = self.accuracy as f64;
        (
            (x * acc).clamp(0.0, acc) as usize,
            (y * acc).clamp(0.0, acc) as usize,
        )
    }

    /// Walk interior points one pixel per step up the density gradient,
    /// resampling every other step.
    fn advect(&self, field: &Gradient, mut path: Vec<Point>) -> Vec<Point> {
        let step = 1.0 / self.accuracy as f64;
        for it in 0..self.advect_iterations {
            let last = path.len().saturating_sub(1);
            for p in path.iter_mut().take(last).skip(1) {
                let (xi, yi) = self.cell(*p);
                let (gx, gy) = field.at(xi, yi);
                p.0 = (p.0 + gx * step).clamp(0.0, 1.0);
                p.1 = (p.1 + gy * step).clamp(0.0, 1.0);
            }
            if it % 2 == 0 {
                path = self.resample(&path);
            }
        }
        path
    }

    /// Merge points closer than the minimum segment length and split
    /// segments longer than the maximum. Endpoints are kept exactly.
    fn resample(&self, path: &[Point]) -> Vec<Point> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Vec::new();
        };
        if path.len() < 2 {
            return path.to_vec();
        }
        let target = (self.min_segment_length + self.max_segment_length) / 2.0;

        let mut out = vec![first];
        let mut current = first;
        for (i, &next) in path.iter().enumerate().skip(1) {
            let is_last = i == path.len() - 1;
            let d = distance(current, next);
            if d < self.min_segment_length && !is_last {
                continue;
            }
            if d > self.max_segment_length {
                let pieces = (d / target).ceil() as usize;
                for k in 1..pieces {
                    let t = k as f64 / pieces as f64;
                    out.push((current.0 + (next.0 - current.0) * t, current.1 + (next.1 - current.1) * t));
                }
            }
            if is_last {
                // Too close to the previous kept point: drop that one instead.
                if d < self.min_segment_length && out.len() > 1 {
                    out.pop();
                }
                out.push(last);
            } else {
                out.push(next);
            }
            current = next;
        }
        out
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Pull each interior point toward the midpoint of its neighbors.
fn smooth(path: &mut [Point], tension: f64) {
    for i in 1..path.len().saturating_sub(1) {
        let (prev, next) = (path[i - 1], path[i + 1]);
        let p = &mut path[i];
        p.0 = (1.0 - tension) * p.0 + tension * (prev.0 + next.0) / 2.0;
        p.1 = (1.0 - tension) * p.1 + tension * (prev.1 + next.1) / 2.0;
    }
}

// ---------------------------------------------------------------------------
// Density field
// ---------------------------------------------------------------------------

/// Affine map from the node bounding box onto the unit square.
#[derive(Debug, Clone, Copy)]
struct UnitFrame {
    min: Point,
    span: Point,
}

impl UnitFrame {
    fn around(points: &[Point]) -> Option<Self> {
        let finite = points.iter().filter(|p| p.0.is_finite() && p.1.is_finite());
        let (mut lo, mut hi) = ((f64::INFINITY, f64::INFINITY), (f64::NEG_INFINITY, f64::NEG_INFINITY));
        let mut any = false;
        for &(x, y) in finite {
            any = true;
            lo = (lo.0.min(x), lo.1.min(y));
            hi = (hi.0.max(x), hi.1.max(y));
        }
        let span = |a: f64, b: f64| if b > a { b - a } else { 1.0 };
        any.then(|| UnitFrame {
            min: lo,
            span: (span(lo.0, hi.0), span(lo.1, hi.1)),
        })
    }

    fn normalize(&self, (x, y): Point) -> Point {
        ((x - self.min.0) / self.span.0, (y - self.min.1) / self.span.1)
    }

    fn denormalize(&self, (x, y): Point) -> Point {
        (x * self.span.0 + self.min.0, y * self.span.1 + self.min.1)
    }
}

/// Unit-length gradient directions of a square image (zero where flat).
struct Gradient {
    side: usize,
    gx: Vec<f64>,
    gy: Vec<f64>,
}

impl Gradient {
    fn of(img: &[f64], side: usize) -> Self {
        let at = |x: usize, y: usize| img[x * side + y];
        // Central differences inside, one-sided on the border.
        let diff = |lo: f64, hi: f64, i: usize| {
            if i == 0 || i == side - 1 {
                hi - lo
            } else {
                (hi - lo) / 2.0
            }
        };
        let mut gx = vec![0.0; side * side];
        let mut gy = vec![0.0; side * side];
        for x in 0..side {
            for y in 0..side {
                let (x0, x1) = (x.saturating_sub(1), (x + 1).min(side - 1));
                let (y0, y1) = (y.saturating_sub(1), (y + 1).min(side - 1));
                let dx = diff(at(x0, y), at(x1, y), x);
                let dy = diff(at(x, y0), at(x, y1), y);
                let mag = (dx * dx + dy * dy).sqrt();
                let mag = if mag > 0.0 { mag } else { 1.0 };
                gx[x * side + y] = dx / mag;
                gy[x * side + y] = dy / mag;
            }
        }
        Gradient { side, gx, gy }
    }

    fn at(&self, x: usize, y: usize) -> (f64, f64) {
        let i = x.min(self.side - 1) * self.side + y.min(self.side - 1);
        (self.gx[i], self.gy[i])
    }
}

/// Separable Gaussian blur in place, reflecting at the borders and truncating
/// the kernel at four sigma.
fn gaussian_blur(img: &mut [f64], side: usize, sigma: f64) {
    if sigma <= 0.0 || side == 0 {
        return;
    }
    let radius = (4.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);

    let n = side as isize;
    let reflect = |mut i: isize| {
        // d c b a | a b c d | d c b a
        loop {
            if i < 0 {
                i = -i - 1;
            } else if i >= n {
                i = 2 * n - i - 1;
            } else {
                return i as usize;
            }
        }
    };

    let mut line = vec![0.0; side];
    // Along y (contiguous).
    for x in 0..side {
        let row = &mut img[x * side..(x + 1) * side];
        if row.iter().all(|&v| v == 0.0) {
            continue;
        }
        line.copy_from_slice(row);
        for (y, out) in row.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * line[reflect(y as isize + k as isize - radius)])
                .sum();
        }
    }
    // Along x.
    for y in 0..side {
        for (x, slot) in line.iter_mut().enumerate() {
            *slot = img[x * side + y];
        }
        if line.iter().all(|&v| v == 0.0) {
            continue;
        }
        for x in 0..side {
            img[x * side + y] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * line[reflect(x as isize + k as isize - radius)])
                .sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_interior_y(path: &[Point]) -> f64 {
        let inner = &path[1..path.len() - 1];
        inner.iter().map(|p| p.1).sum::<f64>() / inner.len() as f64
    }

    #[test]
    fn test_connect_edges_is_straight() {
        let pos = vec![(0.0, 0.0), (1.0, 2.0)];
        let paths = connect_edges(&pos, &[(0, 1, 1.0), (1, 5, 1.0)]);
        assert_eq!(paths, vec![vec![(0.0, 0.0), (1.0, 2.0)]]);
    }

    #[test]
    fn test_resample_bounds_segment_lengths() {
        let hb = HammerBundle::default();
        let path = hb.resample(&[(0.0, 0.0), (0.001, 0.0), (0.5, 0.0), (0.5005, 0.0)]);
        assert_eq!(path.first(), Some(&(0.0, 0.0)));
        assert_eq!(path.last(), Some(&(0.5005, 0.0)));
        for pair in path.windows(2) {
            let d = distance(pair[0], pair[1]);
            assert!(d <= hb.max_segment_length + 1e-12, "segment {d}");
        }
    }

    #[test]
    fn test_blur_preserves_mass_away_from_border() {
        let side = 41;
        let mut img = vec![0.0; side * side];
        img[20 * side + 20] = 1.0;
        gaussian_blur(&mut img, side, 2.0);
        let total: f64 = img.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(img[20 * side + 20] > img[20 * side + 23]);
    }

    #[test]
    fn test_bundling_pulls_close_edges_together() {
        let positions = vec![(0.0, 0.45), (1.0, 0.45), (0.0, 0.47), (1.0, 0.47), (0.0, 0.0), (1.0, 1.0)];
        let edges = [(0, 1, 1.0), (2, 3, 1.0), (4, 5, 1.0)];
        let paths = HammerBundle::default().bundle(&positions, &edges);
        assert_eq!(paths.len(), 3);

        let (a, b) = (&paths[0], &paths[1]);
        assert!(a.len() > 2 && b.len() > 2);
        // Endpoints stay on their nodes.
        assert!(distance(a[0], (0.0, 0.45)) < 1e-9);
        assert!(distance(*a.last().unwrap(), (1.0, 0.45)) < 1e-9);
        // Interiors move toward each other.
        assert!(mean_interior_y(a) > 0.452);
        assert!(mean_interior_y(b) < 0.468);
    }

    #[test]
    fn test_bundle_handles_degenerate_input() {
        let hb = HammerBundle::default();
        assert!(hb.bundle(&[], &[]).is_empty());
        let same = hb.bundle(&[(2.0, 2.0), (2.0, 2.0)], &[(0, 1, 1.0)]);
        assert_eq!(same.len(), 1);
        assert!(same[0].iter().all(|p| p.0.is_finite() && p.1.is_finite()));
    }
}
