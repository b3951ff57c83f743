//! Node placement.

use std::f64::consts::TAU;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Error;

/// Seed for every randomized layout, so renders are reproducible.
pub const LAYOUT_SEED: u64 = 0x00c0_ffee;

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Uniform random positions in the unit square.
    Random,
    /// Evenly spaced on the circle inscribed in the unit square.
    Circular,
    /// Force-directed placement.
    ForceAtlas2,
    /// Node x/y columns as given.
    Geo,
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Layout::Random),
            "circular" => Ok(Layout::Circular),
            "forceatlas2" => Ok(Layout::ForceAtlas2),
            "geo" => Ok(Layout::Geo),
            _ => Err(Error::UnknownLayout(s.to_string())),
        }
    }
}

impl Layout {
    /// Place `n` nodes. `given` holds the nodes' own coordinates when the
    /// table has them: used verbatim by `Geo`, as the start of `ForceAtlas2`.
    /// `edges` are `(source, target, weight)` by node index.
    pub fn place(self, n: usize, given: Option<Vec<Point>>, edges: &[(usize, usize, f64)]) -> Vec<Point> {
        match self {
            Layout::Random => random(n, LAYOUT_SEED),
            Layout::Circular => circular(n),
            Layout::Geo => given.unwrap_or_else(|| random(n, LAYOUT_SEED)),
            Layout::ForceAtlas2 => {
                let start = given.unwrap_or_else(|| random(n, LAYOUT_SEED));
                ForceAtlas2::default().run(start, edges)
            }
        }
    }
}

pub fn random(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (rng.gen::<f64>(), rng.gen::<f64>())).collect()
}

pub fn circular(n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let theta = TAU * i as f64 / n as f64;
            (0.5 + 0.5 * theta.cos(), 0.5 + 0.5 * theta.sin())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ForceAtlas2
// ---------------------------------------------------------------------------

/// Repulsion between every node pair (`k² / d²`) against attraction along
/// edges (`w · d / k`), with a step size that cools linearly to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceAtlas2 {
    pub iterations: usize,
    /// Optimal distance; `sqrt(1 / n)` when `None`.
    pub k: Option<f64>,
    /// Initial maximum step.
    pub temperature: f64,
    /// Distances and step lengths below this are clamped up to it.
    pub min_distance: f64,
}

impl Default for ForceAtlas2 {
    fn default() -> Self {
        ForceAtlas2 {
            iterations: 10,
            k: None,
            temperature: 0.1,
            min_distance: 0.01,
        }
    }
}

impl ForceAtlas2 {
    pub fn run(&self, mut pos: Vec<Point>, edges: &[(usize, usize, f64)]) -> Vec<Point> {
        let n = pos.len();
        if n == 0 {
            return pos;
        }
        let k = self.k.unwrap_or_else(|| (1.0 / n as f64).sqrt());
        let adjacency = symmetric_adjacency(n, edges);

        let mut temperature = self.temperature;
        let cooling = self.temperature / (self.iterations + 1) as f64;
        let mut displacement = vec![(0.0f64, 0.0f64); n];

        for _ in 0..self.iterations {
            for (i, disp) in displacement.iter_mut().enumerate() {
                let (xi, yi) = pos[i];
                let mut d = (0.0, 0.0);
                for (j, &(xj, yj)) in pos.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let (dx, dy) = (xi - xj, yi - yj);
                    let dist = (dx * dx + dy * dy).sqrt().max(self.min_distance);
                    let weight = adjacency[i].iter().find(|(t, _)| *t == j).map_or(0.0, |(_, w)| *w);
                    let force = k * k / (dist * dist) - weight * dist / k;
                    d.0 += dx * force;
                    d.1 += dy * force;
                }
                *disp = d;
            }

            for (p, &(dx, dy)) in pos.iter_mut().zip(&displacement) {
                let len = (dx * dx + dy * dy).sqrt().max(self.min_distance);
                p.0 += dx * temperature / len;
                p.1 += dy * temperature / len;
            }
            temperature -= cooling;
        }
        pos
    }
}

/// Per-node neighbor lists with summed weights, edges counted both ways.
fn symmetric_adjacency(n: usize, edges: &[(usize, usize, f64)]) -> Vec<Vec<(usize, f64)>> {
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut add = |a: usize, b: usize, w: f64| match adjacency[a].iter_mut().find(|(t, _)| *t == b) {
        Some(slot) => slot.1 += w,
        None => adjacency[a].push((b, w)),
    };
    for &(s, t, w) in edges {
        if s < n && t < n {
            add(s, t, w);
            add(t, s, w);
        }
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(a: Point, b: Point) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    #[test]
    fn test_layout_names() {
        assert_eq!("forceatlas2".parse::<Layout>().unwrap(), Layout::ForceAtlas2);
        assert_eq!("Circular".parse::<Layout>().unwrap(), Layout::Circular);
        assert!(matches!("spring".parse::<Layout>(), Err(Error::UnknownLayout(_))));
    }

    #[test]
    fn test_random_is_seeded_and_in_unit_square() {
        let a = random(50, 7);
        assert_eq!(a, random(50, 7));
        assert!(a.iter().all(|&(x, y)| (0.0..1.0).contains(&x) && (0.0..1.0).contains(&y)));
    }

    #[test]
    fn test_circular_on_circle() {
        let pts = circular(8);
        assert_eq!(pts.len(), 8);
        for p in &pts {
            assert!((dist(*p, (0.5, 0.5)) - 0.5).abs() < 1e-12);
        }
        assert!((pts[0].0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_geo_keeps_given_positions() {
        let given = vec![(10.0, 20.0), (30.0, 40.0)];
        assert_eq!(Layout::Geo.place(2, Some(given.clone()), &[]), given);
    }

    #[test]
    fn test_forceatlas2_pulls_connected_nodes_together() {
        // Linked nodes further apart than k settle near k = sqrt(1/2).
        let start = vec![(0.0, 0.0), (1.0, 0.0)];
        let out = ForceAtlas2::default().run(start.clone(), &[(0, 1, 1.0)]);
        let d = dist(out[0], out[1]);
        assert!(d < 1.0);
        assert!((d - 0.5f64.sqrt()).abs() < 0.2);
        assert!(out.iter().all(|&(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn test_forceatlas2_pushes_unlinked_nodes_apart() {
        let start = vec![(0.5, 0.5), (0.52, 0.5)];
        let out = ForceAtlas2::default().run(start.clone(), &[]);
        assert!(dist(out[0], out[1]) > dist(start[0], start[1]));
    }
}
