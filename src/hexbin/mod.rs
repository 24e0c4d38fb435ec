//! Hexagonal binning for large scatter plots.
//!
//! Points are projected to pixel space through a pair of linear scales,
//! then assigned to the nearest centre of a pointy-top hexagon lattice
//! anchored on the viewport origin. Each non-empty cell carries its members,
//! per-category counts and the aggregates a tooltip needs.

mod binner;
mod scale;
mod summary;

pub use binner::{max_bin_size, HexBin, HexBinner};
pub use scale::{compute_scales, LinearScale};
pub use summary::{BinSummary, MAX_OPACITY, MIN_OPACITY, SUMMARY_SAMPLE_LIMIT};

use crate::db::models::Category;

/// A record that can be placed on the scatter plot.
pub trait ScatterPoint {
    fn x(&self) -> f64;

    fn y(&self) -> f64;

    fn category(&self) -> Category;

    /// Auxiliary magnitude averaged in bin summaries (revenue, for example).
    fn value(&self) -> f64 {
        0.0
    }
}

/// Rectangular pixel region, `[x0, x1] × [y0, y1]` with y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Extent {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// A `width × height` viewport with its origin at the top-left corner.
    pub fn viewport(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize)]
    pub struct Dot {
        pub id: usize,
        pub x: f64,
        pub y: f64,
        pub category: Category,
        pub value: f64,
    }

    impl Dot {
        pub fn new(id: usize, x: f64, y: f64, category: Category) -> Self {
            Self {
                id,
                x,
                y,
                category,
                value: 0.0,
            }
        }

        pub fn with_value(mut self, value: f64) -> Self {
            self.value = value;
            self
        }
    }

    impl ScatterPoint for Dot {
        fn x(&self) -> f64 {
            self.x
        }

        fn y(&self) -> f64 {
            self.y
        }

        fn category(&self) -> Category {
            self.category
        }

        fn value(&self) -> f64 {
            self.value
        }
    }
}
