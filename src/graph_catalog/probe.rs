//! Catalog probe interface.
//!
//! The planner builds probe SQL and hands it to a [`CatalogProbe`]; the
//! shipped implementation runs it over a [`clickhouse::Client`]. Probes
//! within one planner invocation are serial, and rows must be consumed in
//! the order the engine emits them (catalog loading depends on the
//! `ORDER BY ColumnId` of the union probe).

use std::env;

use async_trait::async_trait;
use bytes::Bytes;
use clickhouse::Client;
use serde::Deserialize;

use super::errors::ProbeError;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// One row of the union-all catalog probe. `role >= 0` carries a node-table
/// column (the role value is the column role code); `-1` an edge attribute;
/// `-2` a node-view member; `-3` an edge-view component.
#[derive(Debug, Clone, clickhouse::Row, Deserialize)]
pub struct CatalogRow {
    pub role: i64,
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub reference: String,
    pub column_id: i64,
}

/// One row of the batched node-cardinality probe.
#[derive(Debug, Clone, clickhouse::Row, Deserialize)]
pub struct CardinalityRow {
    pub alias: String,
    pub estimated_rows: f64,
}

/// Result of the per-edge degree probe: the sampled sink-id blob
/// (little-endian 8-byte ids), the sample row count recorded in the degree
/// catalog, and the average out-degree.
#[derive(Debug, Clone, clickhouse::Row, Deserialize)]
pub struct EdgeDegreeRow {
    pub sink_sample: Bytes,
    pub sample_row_count: u64,
    pub average_degree: f64,
}

#[async_trait]
pub trait CatalogProbe: Send + Sync {
    /// Run the catalog-loading union probe.
    async fn catalog_rows(&self, sql: &str) -> ProbeResult<Vec<CatalogRow>>;

    /// Run the batched per-node row-estimate probe.
    async fn estimate_node_rows(&self, sql: &str) -> ProbeResult<Vec<CardinalityRow>>;

    /// Catalog row count of one concrete node table.
    async fn node_table_row_count(&self, schema: &str, table: &str) -> ProbeResult<u64>;

    /// Run the per-edge degree probe. `None` when the edge has no sampling
    /// statistics.
    async fn edge_degree(&self, sql: &str) -> ProbeResult<Option<EdgeDegreeRow>>;

    /// Density (`1 / distinct_values`) of the primary-key column of a node
    /// table, or `None` when the engine has no statistics for it.
    async fn primary_key_density(&self, schema: &str, table: &str) -> ProbeResult<Option<f64>>;
}

/// Probe implementation over the host engine's native client.
pub struct ClickHouseProbe {
    client: Client,
}

impl ClickHouseProbe {
    pub fn new(client: Client) -> Self {
        ClickHouseProbe { client }
    }

    /// Build a probe from `CLICKHOUSE_URL` / `CLICKHOUSE_USER` /
    /// `CLICKHOUSE_PASSWORD` / `CLICKHOUSE_DATABASE`.
    pub fn from_env() -> Option<Self> {
        let url = env::var("CLICKHOUSE_URL").ok()?;
        let user = env::var("CLICKHOUSE_USER").ok()?;
        let password = env::var("CLICKHOUSE_PASSWORD").ok()?;
        let database = env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "default".to_string());
        log::info!(
            "connecting catalog probe to {} as {} (database: {})",
            url,
            user,
            database
        );
        Some(ClickHouseProbe::new(
            Client::default()
                .with_url(url)
                .with_user(user)
                .with_password(password)
                .with_database(database)
                .with_option("max_execution_time", "60"),
        ))
    }
}

#[async_trait]
impl CatalogProbe for ClickHouseProbe {
    async fn catalog_rows(&self, sql: &str) -> ProbeResult<Vec<CatalogRow>> {
        Ok(self.client.query(sql).fetch_all::<CatalogRow>().await?)
    }

    async fn estimate_node_rows(&self, sql: &str) -> ProbeResult<Vec<CardinalityRow>> {
        Ok(self.client.query(sql).fetch_all::<CardinalityRow>().await?)
    }

    async fn node_table_row_count(&self, schema: &str, table: &str) -> ProbeResult<u64> {
        let sql = format!("SELECT count() FROM {}.{}", schema, table);
        Ok(self.client.query(&sql).fetch_one::<u64>().await?)
    }

    async fn edge_degree(&self, sql: &str) -> ProbeResult<Option<EdgeDegreeRow>> {
        let rows = self.client.query(sql).fetch_all::<EdgeDegreeRow>().await?;
        Ok(rows.into_iter().next())
    }

    async fn primary_key_density(&self, schema: &str, table: &str) -> ProbeResult<Option<f64>> {
        let sql = format!(
            "SELECT 1 / uniqExact(GlobalNodeId) FROM {}.{}",
            schema, table
        );
        let rows = self.client.query(&sql).fetch_all::<f64>().await?;
        Ok(rows.into_iter().next())
    }
}
