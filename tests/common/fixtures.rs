//! Shared fixtures: a small social-graph catalog, a canned catalog probe,
//! and AST construction helpers.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use sqlgraph::graph_catalog::errors::ProbeError;
use sqlgraph::graph_catalog::metadata::{EdgeInfo, GraphMetaData, NodeColumns};
use sqlgraph::graph_catalog::probe::{
    CardinalityRow, CatalogProbe, CatalogRow, EdgeDegreeRow,
};
use sqlgraph::sql_ast::{
    EdgePattern, Expr, MatchClause, MatchHop, MatchPathPattern, ObjectName, QueryBlock,
    SelectClause, SelectItem, TableRef,
};
use sqlgraph::utils::{Ident, ObjectKey};

/// Catalog with Person/Employee/Device node tables, `Knows` and `Owns`
/// edges, and a `People` node view over Person and Employee.
pub fn sample_metadata() -> GraphMetaData {
    let mut meta = GraphMetaData::new();
    let person = ObjectKey::new("dbo", "Person");
    let employee = ObjectKey::new("dbo", "Employee");
    let device = ObjectKey::new("dbo", "Device");

    meta.add_node_column(person.clone(), "GlobalNodeId", NodeColumns::node_id());
    meta.add_node_column(person.clone(), "age", NodeColumns::property());
    meta.add_node_column(person.clone(), "name", NodeColumns::property());
    let mut knows = EdgeInfo::default();
    knows.add_sink(Ident::new("Person"));
    knows.column_attributes.push("weight".to_string());
    meta.add_node_column(person.clone(), "Knows", NodeColumns::edge(knows));
    let mut owns = EdgeInfo::default();
    owns.add_sink(Ident::new("Device"));
    meta.add_node_column(person.clone(), "Owns", NodeColumns::edge(owns));

    meta.add_node_column(employee.clone(), "GlobalNodeId", NodeColumns::node_id());
    meta.add_node_column(employee.clone(), "age", NodeColumns::property());
    let mut employee_knows = EdgeInfo::default();
    employee_knows.add_sink(Ident::new("Employee"));
    meta.add_node_column(employee.clone(), "Knows", NodeColumns::edge(employee_knows));

    meta.add_node_column(device.clone(), "GlobalNodeId", NodeColumns::node_id());
    meta.add_node_column(device.clone(), "model", NodeColumns::property());

    meta.add_node_view(ObjectKey::new("dbo", "People"), "Person");
    meta.add_node_view(ObjectKey::new("dbo", "People"), "Employee");
    meta
}

/// Probe answering from canned data. Edge-degree responses are matched by a
/// substring of the probe SQL (typically the sampling table name).
#[derive(Default)]
pub struct StaticProbe {
    pub cardinalities: Vec<CardinalityRow>,
    pub row_counts: HashMap<(String, String), u64>,
    pub degrees: Vec<(String, EdgeDegreeRow)>,
    pub densities: HashMap<(String, String), f64>,
}

impl StaticProbe {
    /// Uniform fixture: every listed alias estimates `rows`, every table
    /// holds `rows` rows.
    pub fn uniform(aliases: &[&str], tables: &[&str], rows: u64) -> Self {
        StaticProbe {
            cardinalities: aliases
                .iter()
                .map(|alias| CardinalityRow {
                    alias: alias.to_string(),
                    estimated_rows: rows as f64,
                })
                .collect(),
            row_counts: tables
                .iter()
                .map(|table| (("dbo".to_string(), table.to_string()), rows))
                .collect(),
            degrees: Vec::new(),
            densities: tables
                .iter()
                .map(|table| (("dbo".to_string(), table.to_string()), 1.0 / rows as f64))
                .collect(),
        }
    }

    pub fn with_degree(mut self, sql_fragment: &str, row: EdgeDegreeRow) -> Self {
        self.degrees.push((sql_fragment.to_string(), row));
        self
    }
}

#[async_trait]
impl CatalogProbe for StaticProbe {
    async fn catalog_rows(&self, _sql: &str) -> Result<Vec<CatalogRow>, ProbeError> {
        Ok(Vec::new())
    }

    async fn estimate_node_rows(&self, _sql: &str) -> Result<Vec<CardinalityRow>, ProbeError> {
        Ok(self.cardinalities.clone())
    }

    async fn node_table_row_count(&self, schema: &str, table: &str) -> Result<u64, ProbeError> {
        Ok(self
            .row_counts
            .get(&(schema.to_string(), table.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn edge_degree(&self, sql: &str) -> Result<Option<EdgeDegreeRow>, ProbeError> {
        Ok(self
            .degrees
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, row)| row.clone()))
    }

    async fn primary_key_density(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<f64>, ProbeError> {
        Ok(self
            .densities
            .get(&(schema.to_string(), table.to_string()))
            .copied())
    }
}

/// Little-endian sink blob for `ids`.
pub fn sink_blob(ids: &[i64]) -> Bytes {
    let mut blob = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        blob.extend_from_slice(&id.to_le_bytes());
    }
    Bytes::from(blob)
}

pub fn degree_row(ids: &[i64], sample_row_count: u64, average_degree: f64) -> EdgeDegreeRow {
    EdgeDegreeRow {
        sink_sample: sink_blob(ids),
        sample_row_count,
        average_degree,
    }
}

pub fn named_from(table: &str, alias: &str) -> TableRef {
    TableRef::named(ObjectName::qualified("dbo", table), Some(Ident::new(alias)))
}

pub fn select_columns(columns: &[(&str, &str)]) -> SelectClause {
    SelectClause {
        distinct: false,
        items: columns
            .iter()
            .map(|(alias, column)| SelectItem::Expr {
                expr: Expr::column(&[alias, column]),
                alias: None,
            })
            .collect(),
    }
}

pub fn hop(node: &str, edge: EdgePattern) -> MatchHop {
    MatchHop {
        node: Ident::new(node),
        edge,
    }
}

pub fn path(hops: Vec<MatchHop>, tail: &str) -> MatchPathPattern {
    MatchPathPattern {
        hops,
        tail: Ident::new(tail),
    }
}

pub fn query_block(
    select: SelectClause,
    from: Vec<TableRef>,
    where_clause: Option<Expr>,
    paths: Vec<MatchPathPattern>,
) -> QueryBlock {
    QueryBlock {
        select,
        from,
        where_clause,
        match_clause: Some(MatchClause { paths }),
    }
}
