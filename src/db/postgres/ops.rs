use log::debug;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use super::record::{column, FromRow};
use crate::db::models::{
    assign_buckets, Amenity, CityFunnel, CityInvestment, DeviceDiagnosisRow, DeviceFunnelRow,
    DeviceMetrics, DeviceTrendRow, Diagnostics, Funnel, PropertyPerformance, PropertyRow,
    TableCount, TopAmenity,
};
use crate::db::postgres::PostgresClient;
use crate::error::Result;

/// `None` and `"all"` (any case) both mean "every city".
fn selected(filter: Option<&str>) -> Option<&str> {
    filter.filter(|v| !v.eq_ignore_ascii_case("all"))
}

/// Double-quote an identifier for splicing into SQL text.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct Single<T>(T);

impl<T> FromRow for Single<T>
where
    T: for<'a> postgres_types::FromSql<'a>,
{
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Single(column(row, row.columns()[0].name())?))
    }
}

impl PostgresClient {
    // ==================== DIMENSIONS ====================

    /// All cities, for dropdowns
    pub async fn get_cities(&self) -> Result<Vec<String>> {
        let rows: Vec<Single<String>> = self
            .query_as(
                r#"
                SELECT DISTINCT city
                FROM {schema}.city_investment
                ORDER BY city
                "#,
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn get_property_types(&self) -> Result<Vec<String>> {
        let rows: Vec<Single<String>> = self
            .query_as(
                r#"
                SELECT DISTINCT property_type
                FROM {schema}.property_performance
                WHERE property_type IS NOT NULL
                ORDER BY property_type
                "#,
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    // ==================== CITIES ====================

    /// City investment matrix, highest revenue first
    pub async fn get_city_investment(&self) -> Result<Vec<CityInvestment>> {
        self.query_as(
            r#"
            SELECT
                city,
                COALESCE(total_viewers, 0)::bigint AS demand,
                COALESCE(conversion_rate, 0)::float8 AS conversion,
                COALESCE(estimated_revenue, 0)::float8 AS revenue,
                COALESCE(quadrant, '') AS quadrant
            FROM {schema}.city_investment
            ORDER BY estimated_revenue DESC NULLS LAST
            "#,
            &[],
        )
        .await
    }

    /// Conversion funnel over the last `days` days of data.
    ///
    /// The window is anchored on the latest `event_date` in the table, not
    /// on today, so historical datasets still return a funnel.
    pub async fn get_city_funnel(&self, city: Option<&str>, days: i32) -> Result<CityFunnel> {
        let funnel = match selected(city) {
            Some(city) => {
                self.query_opt::<Funnel>(
                    r#"
                    SELECT
                        COALESCE(SUM(viewers), 0)::bigint AS viewers,
                        COALESCE(SUM(initiated_bookers), 0)::bigint AS bookers,
                        COALESCE(SUM(completers), 0)::bigint AS completed
                    FROM {schema}.city_funnel
                    WHERE city = $1
                      AND event_date >= (SELECT MAX(event_date) FROM {schema}.city_funnel)
                                        - ($2::int * INTERVAL '1 day')
                    "#,
                    &[&city, &days],
                )
                .await?
            },
            None => {
                self.query_opt::<Funnel>(
                    r#"
                    SELECT
                        COALESCE(SUM(viewers), 0)::bigint AS viewers,
                        COALESCE(SUM(initiated_bookers), 0)::bigint AS bookers,
                        COALESCE(SUM(completers), 0)::bigint AS completed
                    FROM {schema}.city_funnel
                    WHERE event_date >= (SELECT MAX(event_date) FROM {schema}.city_funnel)
                                        - ($1::int * INTERVAL '1 day')
                    "#,
                    &[&days],
                )
                .await?
            },
        };

        Ok(CityFunnel {
            city: city.unwrap_or("All Cities").to_string(),
            days,
            funnel: funnel.unwrap_or_default(),
        })
    }

    // ==================== PROPERTIES ====================

    /// Property performance with promote / intervention / at-risk buckets.
    ///
    /// Buckets are always computed against each property's own city;
    /// the averages are only returned when a single city is selected.
    pub async fn get_properties(&self, city: Option<&str>) -> Result<PropertyPerformance> {
        let base_query = r#"
            SELECT
                property_id::text AS id,
                COALESCE(property_name, '') AS name,
                COALESCE(city, '') AS city,
                property_type,
                COALESCE(unique_viewers, 0)::bigint AS views,
                COALESCE(initiated_bookings, 0)::bigint AS bookings,
                COALESCE(initiation_rate, 0)::float8 AS initiation_rate,
                COALESCE(completion_rate, 0)::float8 AS completion_rate,
                COALESCE(cancel_rate, 0)::float8 AS cancel_rate,
                COALESCE(payment_fail_rate, 0)::float8 AS payment_fail_rate,
                avg_review_rating::float8 AS avg_review_rating,
                COALESCE(total_revenue, 0)::float8 AS revenue
            FROM {schema}.property_performance
        "#;

        let selected_city = selected(city);
        let rows: Vec<PropertyRow> = match selected_city {
            Some(city) => {
                self.query_as(
                    &format!("{} WHERE city = $1 ORDER BY unique_viewers DESC", base_query),
                    &[&city],
                )
                .await?
            },
            None => {
                self.query_as(&format!("{} ORDER BY unique_viewers DESC", base_query), &[])
                    .await?
            },
        };

        debug!("Fetched {} properties", rows.len());

        let (properties, averages) = assign_buckets(rows);

        Ok(PropertyPerformance {
            city: city.unwrap_or("All Cities").to_string(),
            properties,
            city_averages: if selected_city.is_some() {
                averages
            } else {
                Default::default()
            },
        })
    }

    // ==================== AMENITIES ====================

    /// Amenity lift, optionally narrowed by city and property type
    pub async fn get_amenities(
        &self,
        city: Option<&str>,
        property_type: Option<&str>,
    ) -> Result<Vec<Amenity>> {
        let city = selected(city);
        let property_type = selected(property_type);

        let mut conditions = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(city) = &city {
            params.push(city);
            conditions.push(format!("city = ${}", params.len()));
        }
        if let Some(property_type) = &property_type {
            params.push(property_type);
            conditions.push(format!("property_type = ${}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        self.query_as(
            &format!(
                r#"
                SELECT
                    amenity_name AS name,
                    COALESCE(confirmation_lift, 0)::float8 AS lift,
                    impact_tier
                FROM {{schema}}.amenity_lift
                {}
                ORDER BY confirmation_lift DESC NULLS LAST
                "#,
                where_clause
            ),
            &params,
        )
        .await
    }

    /// Top three amenities per city
    pub async fn get_top_amenities_by_city(&self) -> Result<Vec<TopAmenity>> {
        self.query_as(
            r#"
            SELECT
                city,
                COALESCE(property_type, '') AS property_type,
                amenity_name,
                COALESCE(confirmation_lift, 0)::float8 AS lift,
                COALESCE(rank, 0)::bigint AS rank
            FROM {schema}.amenity_city_top
            ORDER BY city, rank
            "#,
            &[],
        )
        .await
    }

    // ==================== DEVICES ====================

    /// Device-segmented funnel, weekly completion trends and diagnosis.
    ///
    /// The three reads run concurrently on separate pooled connections.
    pub async fn get_device_metrics(&self, city: Option<&str>, weeks: i32) -> Result<DeviceMetrics> {
        let selected_city = selected(city);
        let city_filter = if selected_city.is_some() {
            "AND city = $2"
        } else {
            ""
        };

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&weeks];
        if let Some(city) = &selected_city {
            params.push(city);
        }

        let funnel_sql = format!(
            r#"
            SELECT
                device,
                COALESCE(SUM(viewers), 0)::bigint AS viewers,
                COALESCE(SUM(initiated_bookers), 0)::bigint AS bookers,
                COALESCE(SUM(completers), 0)::bigint AS completed
            FROM {{schema}}.device_funnel
            WHERE week_start >= (SELECT MAX(week_start) FROM {{schema}}.device_funnel)
                                - ($1::int * INTERVAL '1 week')
            {}
            GROUP BY device
            "#,
            city_filter
        );

        let trend_sql = format!(
            r#"
            SELECT
                DATE_TRUNC('week', week_start)::date AS week,
                device,
                AVG(completion_rate)::float8 AS rate
            FROM {{schema}}.device_funnel
            WHERE week_start >= (SELECT MAX(week_start) FROM {{schema}}.device_funnel)
                                - ($1::int * INTERVAL '1 week')
            {}
            GROUP BY DATE_TRUNC('week', week_start), device
            ORDER BY week
            "#,
            city_filter
        );

        let diagnosis = async {
            match &selected_city {
                Some(city) => {
                    self.query_opt::<DeviceDiagnosisRow>(
                        r#"
                        SELECT
                            desktop_rate::float8 AS desktop_rate,
                            mobile_rate::float8 AS mobile_rate,
                            tablet_rate::float8 AS tablet_rate,
                            device_gap_pct::float8 AS device_gap,
                            diagnosis,
                            mobile_trend
                        FROM {schema}.device_diagnosis
                        WHERE city = $1
                        "#,
                        &[city],
                    )
                    .await
                },
                None => {
                    self.query_opt::<DeviceDiagnosisRow>(
                        r#"
                        SELECT
                            AVG(desktop_rate)::float8 AS desktop_rate,
                            AVG(mobile_rate)::float8 AS mobile_rate,
                            AVG(tablet_rate)::float8 AS tablet_rate,
                            AVG(device_gap_pct)::float8 AS device_gap,
                            MODE() WITHIN GROUP (ORDER BY diagnosis) AS diagnosis,
                            MODE() WITHIN GROUP (ORDER BY mobile_trend) AS mobile_trend
                        FROM {schema}.device_diagnosis
                        "#,
                        &[],
                    )
                    .await
                },
            }
        };

        let (funnels, trends, diagnosis) = futures::try_join!(
            self.query_as::<DeviceFunnelRow>(&funnel_sql, &params),
            self.query_as::<DeviceTrendRow>(&trend_sql, &params),
            diagnosis,
        )?;

        Ok(DeviceMetrics::from_parts(
            city.unwrap_or("All Cities").to_string(),
            funnels,
            trends,
            diagnosis,
        ))
    }

    // ==================== DIAGNOSTICS ====================

    /// Server version, the tables in the analytics schema and their sizes
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let version: Option<Single<String>> = self.query_opt("SELECT version()", &[]).await?;

        let schema = self.schema().to_string();
        let tables: Vec<Single<String>> = self
            .query_as(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = $1
                ORDER BY table_name
                "#,
                &[&schema],
            )
            .await?;

        let mut counts = Vec::with_capacity(tables.len());
        for Single(table) in tables {
            let count: Option<Single<i64>> = self
                .query_opt(
                    &format!("SELECT COUNT(*) FROM {{schema}}.{}", quote_ident(&table)),
                    &[],
                )
                .await?;
            counts.push(TableCount {
                table,
                rows: count.map(|c| c.0).unwrap_or(0),
            });
        }

        Ok(Diagnostics {
            server_version: version.map(|v| v.0).unwrap_or_default(),
            schema,
            tables: counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_means_every_city() {
        assert_eq!(selected(None), None);
        assert_eq!(selected(Some("all")), None);
        assert_eq!(selected(Some("ALL")), None);
        assert_eq!(selected(Some("Lisbon")), Some("Lisbon"));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("city_funnel"), "\"city_funnel\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
