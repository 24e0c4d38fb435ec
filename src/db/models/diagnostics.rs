use serde::Serialize;

/// Row count of one table in the analytics schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Connectivity report: who answered and what the schema holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub server_version: String,
    pub schema: String,
    pub tables: Vec<TableCount>,
}
