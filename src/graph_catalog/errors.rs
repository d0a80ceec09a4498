use thiserror::Error;

/// Transport-level failures while probing the host catalog. These are
/// infrastructure errors and propagate unchanged.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("catalog probe failed: {0}")]
    Transport(#[from] clickhouse::error::Error),

    #[error("catalog probe returned a malformed row: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum GraphCatalogError {
    #[error("failed to load the graph catalog: {0}")]
    Probe(#[from] ProbeError),

    #[error("catalog row for `{schema}.{table}.{column}` carries unknown role code {role}")]
    UnknownRole {
        role: i64,
        schema: String,
        table: String,
        column: String,
    },

    #[error("edge attribute `{attribute}` references unknown edge column `{column}` on `{schema}.{table}`")]
    DanglingAttribute {
        schema: String,
        table: String,
        column: String,
        attribute: String,
    },

    #[error("edge view mapping references column id {column_id}, which was not loaded yet")]
    DanglingEdgeViewComponent { column_id: i64 },

    #[error("edge view component `{column}` on `{schema}.{table}` is not an edge column")]
    NotAnEdgeColumn {
        schema: String,
        table: String,
        column: String,
    },
}
