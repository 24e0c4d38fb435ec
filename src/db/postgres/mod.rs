mod client;
mod manager;
mod ops;
mod record;

pub use client::{LeasedConnection, Pool, PoolStatus, PostgresClient, SCHEMA_PLACEHOLDER};
pub use manager::{build_pool, lease, Connect, Endpoint, LakebaseManager, PgConnector};
pub use record::{column, FromRow, Record, Value};
