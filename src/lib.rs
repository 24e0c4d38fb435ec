pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod hexbin;
pub mod identity;

pub use config::Settings;
pub use cron::CronScheduler;
pub use db::Database;
pub use error::{Error, Result};
