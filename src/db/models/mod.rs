mod amenity;
mod category;
mod city;
mod device;
mod diagnostics;
mod property;

pub use amenity::{Amenity, TopAmenity};
pub use category::Category;
pub use city::{CityFunnel, CityInvestment, Funnel};
pub use device::{
    DeviceDiagnosis, DeviceDiagnosisRow, DeviceFunnelRow, DeviceMetrics, DeviceTrendRow,
    WeeklyTrend,
};
pub use diagnostics::{Diagnostics, TableCount};
pub use property::{assign_buckets, CityAverages, Property, PropertyPerformance, PropertyRow};
