use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_postgres::Row;

use super::Funnel;
use crate::db::postgres::{column, FromRow};
use crate::error::Result;

/// Funnel totals for one device class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFunnelRow {
    pub device: String,
    pub funnel: Funnel,
}

impl FromRow for DeviceFunnelRow {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            device: column(row, "device")?,
            funnel: Funnel::from_row(row)?,
        })
    }
}

/// Average completion rate of one device in one week.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTrendRow {
    pub week: Option<NaiveDate>,
    pub device: String,
    pub rate: Option<f64>,
}

impl FromRow for DeviceTrendRow {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            week: column(row, "week")?,
            device: column(row, "device")?,
            rate: column(row, "rate")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceDiagnosisRow {
    pub desktop_rate: Option<f64>,
    pub mobile_rate: Option<f64>,
    pub tablet_rate: Option<f64>,
    pub device_gap: Option<f64>,
    pub diagnosis: Option<String>,
    pub mobile_trend: Option<String>,
}

impl FromRow for DeviceDiagnosisRow {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            desktop_rate: column(row, "desktop_rate")?,
            mobile_rate: column(row, "mobile_rate")?,
            tablet_rate: column(row, "tablet_rate")?,
            device_gap: column(row, "device_gap")?,
            diagnosis: column(row, "diagnosis")?,
            mobile_trend: column(row, "mobile_trend")?,
        })
    }
}

/// Completion rate per device for one ISO week (`W07`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTrend {
    pub week: String,
    #[serde(flatten)]
    pub rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDiagnosis {
    pub desktop_rate: f64,
    pub mobile_rate: f64,
    pub tablet_rate: f64,
    pub device_gap: f64,
    pub diagnosis: String,
    pub mobile_trend: String,
}

impl From<DeviceDiagnosisRow> for DeviceDiagnosis {
    fn from(row: DeviceDiagnosisRow) -> Self {
        Self {
            desktop_rate: row.desktop_rate.unwrap_or(0.0),
            mobile_rate: row.mobile_rate.unwrap_or(0.0),
            tablet_rate: row.tablet_rate.unwrap_or(0.0),
            device_gap: row.device_gap.unwrap_or(0.0),
            diagnosis: row.diagnosis.unwrap_or_else(|| "unknown".to_string()),
            mobile_trend: row.mobile_trend.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub city: String,
    pub device_funnel: BTreeMap<String, Funnel>,
    pub weekly_trends: Vec<WeeklyTrend>,
    pub diagnosis: DeviceDiagnosis,
}

impl DeviceMetrics {
    /// Assemble the device view; trend rows must arrive ordered by week.
    pub fn from_parts(
        city: String,
        funnels: Vec<DeviceFunnelRow>,
        trends: Vec<DeviceTrendRow>,
        diagnosis: Option<DeviceDiagnosisRow>,
    ) -> Self {
        let device_funnel = funnels.into_iter().map(|r| (r.device, r.funnel)).collect();

        let mut weekly_trends: Vec<WeeklyTrend> = Vec::new();
        for row in trends {
            let week = row
                .week
                .map(|w| w.format("W%V").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let rate = row.rate.unwrap_or(0.0);
            match weekly_trends.iter_mut().find(|t| t.week == week) {
                Some(trend) => {
                    trend.rates.insert(row.device, rate);
                },
                None => {
                    let mut rates = BTreeMap::new();
                    rates.insert(row.device, rate);
                    weekly_trends.push(WeeklyTrend { week, rates });
                },
            }
        }

        Self {
            city,
            device_funnel,
            weekly_trends,
            diagnosis: diagnosis.unwrap_or_default().into(),
        }
    }
}
