use rustc_hash::FxHashMap;

use super::{Extent, LinearScale, ScatterPoint};
use crate::db::models::Category;
use crate::error::{Error, Result};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// One non-empty hexagon of the lattice.
#[derive(Debug, Clone)]
pub struct HexBin<'a, P> {
    /// Lattice row (multiples of `1.5 · radius` below the origin)
    pub row: i64,
    /// Lattice column; odd rows are shifted half a column right
    pub col: i64,
    /// Centre in pixel space
    pub x: f64,
    pub y: f64,
    members: Vec<&'a P>,
    counts: [usize; 3],
}

impl<'a, P> HexBin<'a, P> {
    pub fn members(&self) -> &[&'a P] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts[category.index()]
    }

    /// Vertices of the hexagon, clockwise from the top.
    pub fn corners(&self, radius: f64) -> [(f64, f64); 6] {
        let mut corners = [(0.0, 0.0); 6];
        for (i, corner) in corners.iter_mut().enumerate() {
            let angle = std::f64::consts::FRAC_PI_3 * i as f64;
            *corner = (self.x + angle.sin() * radius, self.y - angle.cos() * radius);
        }
        corners
    }
}

/// Largest member count across `bins`, 0 when there are none.
pub fn max_bin_size<P>(bins: &[HexBin<'_, P>]) -> usize {
    bins.iter().map(|b| b.len()).max().unwrap_or(0)
}

/// Pointy-top hexagon lattice of a fixed radius over a viewport.
///
/// The lattice is anchored on the extent's origin, so binning the same
/// input with the same radius and extent always yields the same cells.
#[derive(Debug, Clone, Copy)]
pub struct HexBinner {
    radius: f64,
    extent: Extent,
    dx: f64,
    dy: f64,
}

impl HexBinner {
    pub fn new(radius: f64, extent: Extent) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::Config(format!("hexagon radius must be positive, got {}", radius)));
        }
        Ok(Self {
            radius,
            extent,
            dx: radius * SQRT_3,
            dy: radius * 1.5,
        })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Lattice cell `(col, row)` whose centre is nearest to a pixel.
    fn cell(&self, px: f64, py: f64) -> (i64, i64) {
        let py = (py - self.extent.y0) / self.dy;
        let mut pj = py.round();
        let odd = |j: f64| (j as i64) & 1 == 1;

        let px = (px - self.extent.x0) / self.dx - if odd(pj) { 0.5 } else { 0.0 };
        let mut pi = px.round();

        // Outside the middle third of a row the point may sit in the
        // neighbouring row's hexagon; compare true distances to both centres.
        let py1 = py - pj;
        if py1.abs() * 3.0 > 1.0 {
            let px1 = px - pi;
            let pi2 = pi + if px < pi { -0.5 } else { 0.5 };
            let pj2 = pj + if py < pj { -1.0 } else { 1.0 };
            let px2 = px - pi2;
            let py2 = py - pj2;

            let d1 = (px1 * self.dx).powi(2) + (py1 * self.dy).powi(2);
            let d2 = (px2 * self.dx).powi(2) + (py2 * self.dy).powi(2);
            if d1 > d2 {
                pi = pi2 + if odd(pj) { 0.5 } else { -0.5 };
                pj = pj2;
            }
        }

        (pi as i64, pj as i64)
    }

    fn centre(&self, col: i64, row: i64) -> (f64, f64) {
        let shift = if row & 1 == 1 { 0.5 } else { 0.0 };
        (
            self.extent.x0 + (col as f64 + shift) * self.dx,
            self.extent.y0 + row as f64 * self.dy,
        )
    }

    /// Assign every point to exactly one hexagon.
    ///
    /// Bins come back in the order their first member appears in `points`.
    /// Points whose projection is not finite are left out.
    pub fn bin<'a, P: ScatterPoint>(
        &self,
        points: &'a [P],
        x_scale: &LinearScale,
        y_scale: &LinearScale,
    ) -> Vec<HexBin<'a, P>> {
        let mut index: FxHashMap<(i64, i64), usize> = FxHashMap::default();
        let mut bins: Vec<HexBin<'a, P>> = Vec::new();

        for point in points {
            let px = x_scale.apply(point.x());
            let py = y_scale.apply(point.y());
            if !px.is_finite() || !py.is_finite() {
                continue;
            }

            let (col, row) = self.cell(px, py);
            let slot = *index.entry((col, row)).or_insert_with(|| {
                let (x, y) = self.centre(col, row);
                bins.push(HexBin {
                    row,
                    col,
                    x,
                    y,
                    members: Vec::new(),
                    counts: [0; 3],
                });
                bins.len() - 1
            });

            let bin = &mut bins[slot];
            bin.members.push(point);
            bin.counts[point.category().index()] += 1;
        }

        bins
    }
}
