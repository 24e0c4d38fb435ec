use std::collections::BTreeMap;

use serde::Serialize;

use super::{HexBin, ScatterPoint};
use crate::db::models::Category;

/// Opacity of the sparsest non-empty bin.
pub const MIN_OPACITY: f64 = 0.3;
pub const MAX_OPACITY: f64 = 0.95;

/// Members listed in a tooltip summary.
pub const SUMMARY_SAMPLE_LIMIT: usize = 5;

/// Tooltip aggregate of one bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinSummary<'a, P> {
    pub count: usize,
    pub counts: BTreeMap<Category, usize>,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_value: f64,
    pub dominant: Category,
    pub sample: Vec<&'a P>,
}

impl<'a, P: ScatterPoint> HexBin<'a, P> {
    /// Most common category; ties go to the riskier one.
    pub fn dominant_category(&self) -> Category {
        Category::ALL
            .into_iter()
            .max_by_key(|c| (self.count(*c), *c))
            .unwrap_or(Category::AtRisk)
    }

    /// Opacity for this bin relative to the largest bin in the frame,
    /// interpolated linearly between [`MIN_OPACITY`] and [`MAX_OPACITY`].
    pub fn visual_weight(&self, max_bin_size: usize) -> f64 {
        if max_bin_size == 0 {
            return MIN_OPACITY;
        }
        let t = (self.len() as f64 / max_bin_size as f64).clamp(0.0, 1.0);
        (MIN_OPACITY + t * (MAX_OPACITY - MIN_OPACITY)).max(MIN_OPACITY)
    }

    pub fn summarize(&self) -> BinSummary<'a, P> {
        let members = self.members();
        let n = members.len() as f64;
        let mean = |f: fn(&P) -> f64| members.iter().map(|p| f(p)).sum::<f64>() / n;

        BinSummary {
            count: members.len(),
            counts: Category::ALL.into_iter().map(|c| (c, self.count(c))).collect(),
            mean_x: mean(P::x),
            mean_y: mean(P::y),
            mean_value: mean(P::value),
            dominant: self.dominant_category(),
            sample: members.iter().take(SUMMARY_SAMPLE_LIMIT).copied().collect(),
        }
    }
}
