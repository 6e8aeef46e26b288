//! Hexagonal binning on two interleaved rectangular lattices.
//!
//! Lattice one has centres at integer steps of `(sx, sy)` from the lower
//! bounds, lattice two is shifted by half a step on both axes. A point goes to
//! whichever nearest centre is closer under the `x² + 3y²` metric, which makes
//! the cells regular pointy-top hexagons when `ny = nx / √3`.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexBin {
    pub center: (f64, f64),
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct HexBinning {
    pub bins: Vec<HexBin>,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    sx: f64,
    sy: f64,
}

impl HexBinning {
    pub fn max_count(&self) -> u64 {
        self.bins.iter().map(|bin| bin.count).max().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().map(|bin| bin.count).sum()
    }

    /// Vertices of the hexagon around `center`.
    pub fn hexagon(&self, center: (f64, f64)) -> Vec<(f64, f64)> {
        const SHAPE: [(f64, f64); 6] = [
            (0.5, -0.5),
            (0.5, 0.5),
            (0.0, 1.0),
            (-0.5, 0.5),
            (-0.5, -0.5),
            (0.0, -1.0),
        ];
        SHAPE
            .iter()
            .map(|(dx, dy)| (center.0 + dx * self.sx, center.1 + dy * self.sy / 3.0))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Lattice {
    Primary,
    Offset,
}

/// Bins `points` into hexagons, `gridsize` of them across the x extent.
pub fn hexbin(points: &[(f64, f64)], gridsize: usize) -> HexBinning {
    let nx = gridsize.max(1) as f64;
    let ny = ((nx / 3f64.sqrt()) as usize).max(1) as f64;

    let (xmin, xmax) = padded_extent(points.iter().map(|p| p.0));
    let (ymin, ymax) = padded_extent(points.iter().map(|p| p.1));
    let sx = (xmax - xmin) / nx;
    let sy = (ymax - ymin) / ny;

    let mut counts: BTreeMap<(Lattice, i64, i64), u64> = BTreeMap::new();
    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        let px = (x - xmin) / sx;
        let py = (y - ymin) / sy;

        let (i1, j1) = (px.round(), py.round());
        let (i2, j2) = (px.floor(), py.floor());
        let d1 = (px - i1).powi(2) + 3.0 * (py - j1).powi(2);
        let d2 = (px - i2 - 0.5).powi(2) + 3.0 * (py - j2 - 0.5).powi(2);

        let key = if d1 < d2 {
            (Lattice::Primary, i1 as i64, j1 as i64)
        } else {
            (Lattice::Offset, i2 as i64, j2 as i64)
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    let bins = counts
        .into_iter()
        .map(|((lattice, i, j), count)| {
            let shift = match lattice {
                Lattice::Primary => 0.0,
                Lattice::Offset => 0.5,
            };
            HexBin {
                center: (
                    xmin + (i as f64 + shift) * sx,
                    ymin + (j as f64 + shift) * sy,
                ),
                count,
            }
        })
        .collect();

    HexBinning {
        bins,
        x_range: (xmin - sx, xmax + sx),
        y_range: (ymin - sy, ymax + sy),
        sx,
        sy,
    }
}

fn padded_extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_point_lands_in_a_bin() {
        let points: Vec<(f64, f64)> = (0..500)
            .map(|i| ((i % 37) as f64, (i / 37) as f64 * 3.0))
            .collect();
        let binned = hexbin(&points, 10);
        assert_eq!(binned.total(), 500);
        assert!(binned.bins.len() > 1);
    }

    #[test]
    fn coincident_points_share_one_bin() {
        let points = vec![(4.0, 9.0); 12];
        let binned = hexbin(&points, 80);
        assert_eq!(binned.bins.len(), 1);
        assert_eq!(binned.max_count(), 12);
    }

    #[test]
    fn hexagon_surrounds_its_center() {
        let points = vec![(0.0, 0.0), (10.0, 10.0)];
        let binned = hexbin(&points, 5);
        let center = binned.bins[0].center;
        let vertices = binned.hexagon(center);
        assert_eq!(vertices.len(), 6);
        let mean_x = vertices.iter().map(|v| v.0).sum::<f64>() / 6.0;
        let mean_y = vertices.iter().map(|v| v.1).sum::<f64>() / 6.0;
        assert!((mean_x - center.0).abs() < 1e-9);
        assert!((mean_y - center.1).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_no_bins() {
        let binned = hexbin(&[], 80);
        assert!(binned.bins.is_empty());
        assert_eq!(binned.max_count(), 0);
    }
}
