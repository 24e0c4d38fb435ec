use std::collections::BTreeMap;

use serde::Serialize;
use tokio_postgres::Row;

use super::Category;
use crate::db::postgres::{column, FromRow};
use crate::error::Result;
use crate::hexbin::ScatterPoint;

/// Property performance metrics as stored (before bucketing).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRow {
    pub id: String,
    pub name: String,
    pub city: String,
    pub property_type: Option<String>,
    pub views: i64,
    pub bookings: i64,
    pub initiation_rate: f64,
    pub completion_rate: f64,
    pub cancel_rate: f64,
    pub payment_fail_rate: f64,
    pub avg_review_rating: Option<f64>,
    pub revenue: f64,
}

impl FromRow for PropertyRow {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            city: column(row, "city")?,
            property_type: column(row, "property_type")?,
            views: column(row, "views")?,
            bookings: column(row, "bookings")?,
            initiation_rate: column(row, "initiation_rate")?,
            completion_rate: column(row, "completion_rate")?,
            cancel_rate: column(row, "cancel_rate")?,
            payment_fail_rate: column(row, "payment_fail_rate")?,
            avg_review_rating: column(row, "avg_review_rating")?,
            revenue: column(row, "revenue")?,
        })
    }
}

/// Property with its performance bucket, as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub city: String,
    pub property_type: Option<String>,
    pub views: i64,
    pub bookings: i64,
    pub initiation_rate: f64,
    pub completion_rate: f64,
    pub cancel_rate: f64,
    pub payment_fail_rate: f64,
    pub avg_review_rating: Option<f64>,
    pub revenue: f64,
    pub bucket: Category,
}

impl Property {
    fn from_row(row: PropertyRow, bucket: Category) -> Self {
        Self {
            id: row.id,
            name: row.name,
            city: row.city,
            property_type: row.property_type,
            views: row.views,
            bookings: row.bookings,
            initiation_rate: row.initiation_rate,
            completion_rate: row.completion_rate,
            cancel_rate: row.cancel_rate,
            payment_fail_rate: row.payment_fail_rate,
            avg_review_rating: row.avg_review_rating,
            revenue: row.revenue,
            bucket,
        }
    }
}

/// Views against booking initiation rate, sized by revenue.
impl ScatterPoint for Property {
    fn x(&self) -> f64 {
        self.views as f64
    }

    fn y(&self) -> f64 {
        self.initiation_rate
    }

    fn category(&self) -> Category {
        self.bucket
    }

    fn value(&self) -> f64 {
        self.revenue
    }
}

/// Per-city baselines used for bucketing and colour coding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityAverages {
    pub avg_views: f64,
    pub avg_initiation_rate: f64,
    pub property_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyPerformance {
    pub city: String,
    pub properties: Vec<Property>,
    /// Only populated when a single city is selected
    pub city_averages: BTreeMap<String, CityAverages>,
}

/// Bucket each property against the averages of its own city.
///
/// - initiation rate above the city average: promote
/// - otherwise views above the city average: intervention (traffic that
///   does not convert)
/// - otherwise: at risk
pub fn assign_buckets(rows: Vec<PropertyRow>) -> (Vec<Property>, BTreeMap<String, CityAverages>) {
    let mut totals: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for row in &rows {
        let entry = totals.entry(row.city.as_str()).or_insert((0.0, 0.0, 0));
        entry.0 += row.views as f64;
        entry.1 += row.initiation_rate;
        entry.2 += 1;
    }

    let averages: BTreeMap<String, CityAverages> = totals
        .into_iter()
        .map(|(city, (views, rate, n))| {
            (
                city.to_string(),
                CityAverages {
                    avg_views: views / n as f64,
                    avg_initiation_rate: rate / n as f64,
                    property_count: n,
                },
            )
        })
        .collect();

    let properties = rows
        .into_iter()
        .map(|row| {
            let avg = &averages[&row.city];
            let bucket = if row.initiation_rate > avg.avg_initiation_rate {
                Category::Promote
            } else if row.views as f64 > avg.avg_views {
                Category::Intervention
            } else {
                Category::AtRisk
            };
            Property::from_row(row, bucket)
        })
        .collect();

    (properties, averages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, city: &str, views: i64, initiation_rate: f64) -> PropertyRow {
        PropertyRow {
            id: id.to_string(),
            name: format!("Property {}", id),
            city: city.to_string(),
            property_type: Some("apartment".to_string()),
            views,
            bookings: 0,
            initiation_rate,
            completion_rate: 0.0,
            cancel_rate: 0.0,
            payment_fail_rate: 0.0,
            avg_review_rating: None,
            revenue: 100.0,
        }
    }

    #[test]
    fn test_buckets_against_city_average() {
        let (properties, averages) = assign_buckets(vec![
            row("a", "Lisbon", 100, 8.0),
            row("b", "Lisbon", 900, 2.0),
            row("c", "Lisbon", 200, 2.0),
        ]);

        let lisbon = &averages["Lisbon"];
        assert_eq!(lisbon.property_count, 3);
        assert_eq!(lisbon.avg_views, 400.0);
        assert_eq!(lisbon.avg_initiation_rate, 4.0);

        let buckets: Vec<_> = properties.iter().map(|p| p.bucket).collect();
        assert_eq!(
            buckets,
            vec![Category::Promote, Category::Intervention, Category::AtRisk]
        );
    }

    #[test]
    fn test_cities_bucket_independently() {
        let (properties, averages) = assign_buckets(vec![
            row("a", "Lisbon", 100, 1.0),
            row("b", "Porto", 100, 9.0),
            row("c", "Porto", 100, 1.0),
        ]);

        assert_eq!(averages.len(), 2);
        // Alone in its city, a property equals the average and is at risk
        assert_eq!(properties[0].bucket, Category::AtRisk);
        assert_eq!(properties[1].bucket, Category::Promote);
        assert_eq!(properties[2].bucket, Category::AtRisk);
    }

    #[test]
    fn test_empty_input() {
        let (properties, averages) = assign_buckets(Vec::new());
        assert!(properties.is_empty());
        assert!(averages.is_empty());
    }

    #[test]
    fn test_scatter_projection() {
        let (properties, _) = assign_buckets(vec![row("a", "Lisbon", 250, 3.5)]);
        let p = &properties[0];
        assert_eq!(p.x(), 250.0);
        assert_eq!(p.y(), 3.5);
        assert_eq!(p.value(), 100.0);
        assert_eq!(ScatterPoint::category(p), Category::AtRisk);
    }
}
