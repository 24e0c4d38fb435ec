use serde::Serialize;
use tokio_postgres::Row;

use crate::db::postgres::{column, FromRow};
use crate::error::Result;

/// Booking confirmation lift attributed to an amenity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amenity {
    pub name: String,
    pub lift: f64,
    pub impact_tier: Option<String>,
}

impl FromRow for Amenity {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: column(row, "name")?,
            lift: column(row, "lift")?,
            impact_tier: column(row, "impact_tier")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopAmenity {
    pub city: String,
    pub property_type: String,
    pub amenity_name: String,
    pub lift: f64,
    pub rank: i64,
}

impl FromRow for TopAmenity {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            city: column(row, "city")?,
            property_type: column(row, "property_type")?,
            amenity_name: column(row, "amenity_name")?,
            lift: column(row, "lift")?,
            rank: column(row, "rank")?,
        })
    }
}
