use serde::Serialize;
use tokio_postgres::Row;

use crate::db::postgres::{column, FromRow};
use crate::error::Result;

/// One point of the city investment matrix (demand vs conversion).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityInvestment {
    pub city: String,
    pub demand: i64,
    pub conversion: f64,
    pub revenue: f64,
    pub quadrant: String,
}

impl FromRow for CityInvestment {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            city: column(row, "city")?,
            demand: column(row, "demand")?,
            conversion: column(row, "conversion")?,
            revenue: column(row, "revenue")?,
            quadrant: column(row, "quadrant")?,
        })
    }
}

/// Viewers → initiated bookings → completed bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Funnel {
    pub viewers: i64,
    pub bookers: i64,
    pub completed: i64,
}

impl FromRow for Funnel {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            viewers: column(row, "viewers")?,
            bookers: column(row, "bookers")?,
            completed: column(row, "completed")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityFunnel {
    pub city: String,
    pub days: i32,
    pub funnel: Funnel,
}
