use serde::Serialize;

use super::{Extent, ScatterPoint};

/// Affine map from a data interval to a pixel interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn apply(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d1 == d0 {
            return (r0 + r1) / 2.0;
        }
        r0 + (value - d0) / (d1 - d0) * (r1 - r0)
    }

    pub fn invert(&self, pixel: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if r1 == r0 {
            return (d0 + d1) / 2.0;
        }
        d0 + (pixel - r0) / (r1 - r0) * (d1 - d0)
    }
}

/// Min and max of the finite values, `None` when there are none.
fn finite_extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn padded((lo, hi): (f64, f64), padding: f64) -> (f64, f64) {
    let span = hi - lo;
    if span == 0.0 {
        return (lo - 1.0, hi + 1.0);
    }
    (lo - span * padding, hi + span * padding)
}

/// Scales mapping the data extent (padded by `padding` of its span on each
/// side) onto `viewport`. The y scale is inverted so larger values plot
/// higher. Returns `None` when no point has finite coordinates.
pub fn compute_scales<P: ScatterPoint>(
    points: &[P],
    viewport: Extent,
    padding: f64,
) -> Option<(LinearScale, LinearScale)> {
    let x_extent = finite_extent(points.iter().map(|p| p.x()))?;
    let y_extent = finite_extent(points.iter().map(|p| p.y()))?;

    let padding = if padding.is_finite() && padding >= 0.0 { padding } else { 0.0 };

    Some((
        LinearScale::new(padded(x_extent, padding), (viewport.x0, viewport.x1)),
        LinearScale::new(padded(y_extent, padding), (viewport.y1, viewport.y0)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Category;
    use crate::hexbin::testing::Dot;

    #[test]
    fn test_linear_scale() {
        let scale = LinearScale::new((0.0, 100.0), (0.0, 800.0));
        assert_eq!(scale.apply(0.0), 0.0);
        assert_eq!(scale.apply(50.0), 400.0);
        assert_eq!(scale.apply(100.0), 800.0);
        assert_eq!(scale.invert(400.0), 50.0);
    }

    #[test]
    fn test_empty_input_has_no_scales() {
        let points: Vec<Dot> = vec![];
        assert!(compute_scales(&points, Extent::viewport(800.0, 480.0), 0.1).is_none());
    }

    #[test]
    fn test_non_finite_only_has_no_scales() {
        let points = vec![Dot::new(0, f64::NAN, 1.0, Category::Promote)];
        assert!(compute_scales(&points, Extent::viewport(800.0, 480.0), 0.1).is_none());
    }

    #[test]
    fn test_padding_and_inverted_y() {
        let points = vec![
            Dot::new(0, 0.0, 0.0, Category::Promote),
            Dot::new(1, 100.0, 10.0, Category::AtRisk),
        ];
        let (xs, ys) = compute_scales(&points, Extent::viewport(800.0, 480.0), 0.1).unwrap();

        assert_eq!(xs.domain(), (-10.0, 110.0));
        assert_eq!(ys.domain(), (-1.0, 11.0));
        assert_eq!(ys.range(), (480.0, 0.0));
        assert_eq!(ys.apply(-1.0), 480.0);
        assert_eq!(ys.apply(11.0), 0.0);
    }

    #[test]
    fn test_single_point_is_centred() {
        let points = vec![Dot::new(0, 5.0, 5.0, Category::Intervention)];
        let (xs, ys) = compute_scales(&points, Extent::viewport(800.0, 480.0), 0.1).unwrap();

        assert_eq!(xs.domain(), (4.0, 6.0));
        assert_eq!(xs.apply(5.0), 400.0);
        assert_eq!(ys.apply(5.0), 240.0);
    }
}
