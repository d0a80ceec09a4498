//! Statistics-driven cardinality estimation.
//!
//! Three probe shapes per planned query block: one batched union-all probe
//! for per-node row estimates, one probe per edge joining its sampling
//! table with the degree catalog, and one primary-key density probe per
//! concrete node table. Results are back-annotated onto the match graph.

pub mod histogram;

pub use histogram::{decode_sink_sample, path_degree, update_edge_histogram};

use std::collections::HashMap;

use crate::graph_catalog::loader::EDGE_DEGREE_COLLECTION;
use crate::graph_catalog::metadata::GraphMetaData;
use crate::graph_catalog::probe::CatalogProbe;
use crate::query_planner::config::PlannerConfig;
use crate::query_planner::errors::{Pass, PlannerError};
use crate::query_planner::match_graph::{MatchEdge, MatchGraph, MatchNode};
use crate::query_planner::pattern_builder::GLOBAL_NODE_ID;
use crate::utils::ObjectKey;

pub struct CardinalityEstimator<'a> {
    probe: &'a dyn CatalogProbe,
    metadata: &'a GraphMetaData,
    config: &'a PlannerConfig,
}

impl<'a> CardinalityEstimator<'a> {
    pub fn new(
        probe: &'a dyn CatalogProbe,
        metadata: &'a GraphMetaData,
        config: &'a PlannerConfig,
    ) -> Self {
        CardinalityEstimator {
            probe,
            metadata,
            config,
        }
    }

    pub async fn annotate(&self, graph: &mut MatchGraph) -> Result<(), PlannerError> {
        self.annotate_nodes(graph).await?;
        self.annotate_edges(graph).await?;
        Ok(())
    }

    async fn annotate_nodes(&self, graph: &mut MatchGraph) -> Result<(), PlannerError> {
        if graph.node_count() == 0 {
            return Ok(());
        }

        let sql = self.node_rows_sql(graph);
        let rows = self
            .probe
            .estimate_node_rows(&sql)
            .await
            .map_err(|e| PlannerError::probe(Pass::CardinalityEstimation, e))?;

        // A node table behind a view contributes one row per concrete table;
        // sum them per alias.
        let mut estimated: HashMap<String, f64> = HashMap::new();
        for row in rows {
            *estimated.entry(row.alias.to_lowercase()).or_insert(0.0) += row.estimated_rows;
        }

        // Densities are cached per concrete table; views combine them
        // weighted by row count.
        let mut density_cache: HashMap<ObjectKey, (u64, f64)> = HashMap::new();

        let node_count = graph.node_count();
        for index in 0..node_count {
            let id = crate::query_planner::match_graph::NodeId(index);
            let (alias, key) = {
                let node = graph.node(id);
                (node.alias.clone(), node.table.key())
            };

            let mut table_rows = 0u64;
            let mut weighted_density = 0.0f64;
            for concrete in self.metadata.concrete_tables(&key) {
                let (rows, density) = match density_cache.get(&concrete) {
                    Some(cached) => *cached,
                    None => {
                        let rows = self
                            .probe
                            .node_table_row_count(
                                concrete.schema.as_str(),
                                concrete.name.as_str(),
                            )
                            .await
                            .map_err(|e| PlannerError::probe(Pass::CardinalityEstimation, e))?;
                        let density = self
                            .probe
                            .primary_key_density(concrete.schema.as_str(), concrete.name.as_str())
                            .await
                            .map_err(|e| PlannerError::probe(Pass::CardinalityEstimation, e))?
                            .filter(|d| *d > 0.0 && *d < 1.0)
                            .unwrap_or(self.config.default_density);
                        density_cache.insert(concrete.clone(), (rows, density));
                        (rows, density)
                    }
                };
                table_rows += rows;
                weighted_density += density * rows as f64;
            }

            let node = graph.node_mut(id);
            node.table_row_count = table_rows;
            node.global_node_id_density = if table_rows > 0 {
                weighted_density / table_rows as f64
            } else {
                self.config.default_density
            };
            node.estimated_rows = estimated
                .get(alias.folded())
                .copied()
                .unwrap_or(table_rows as f64);
            log::debug!(
                "node [{}]: estimated_rows={} table_rows={} density={}",
                alias,
                node.estimated_rows,
                node.table_row_count,
                node.global_node_id_density
            );
        }
        Ok(())
    }

    async fn annotate_edges(&self, graph: &mut MatchGraph) -> Result<(), PlannerError> {
        let edge_count = graph.edge_count();
        for index in 0..edge_count {
            let id = crate::query_planner::match_graph::EdgeId(index);
            let sql = edge_degree_sql(graph.edge(id));
            let degree_row = self
                .probe
                .edge_degree(&sql)
                .await
                .map_err(|e| PlannerError::probe(Pass::CardinalityEstimation, e))?;

            let edge = graph.edge_mut(id);
            if let Some(row) = degree_row {
                let ids = decode_sink_sample(&row.sink_sample);
                update_edge_histogram(&mut edge.statistics, &ids);
                // The blob may carry more (or fewer) adjacency rows than the
                // recorded sample; rescale the catalog degree accordingly.
                edge.statistics.average_degree = if row.sample_row_count > 0 {
                    row.average_degree * (ids.len() as f64 / row.sample_row_count as f64)
                } else {
                    row.average_degree
                };
            } else {
                log::warn!(
                    "edge [{}] has no sampling statistics; assuming degree 1",
                    edge.alias
                );
            }

            if let Some(spec) = &edge.path_spec {
                edge.statistics.average_degree = path_degree(
                    edge.statistics.average_degree,
                    spec.min_length,
                    spec.max_length,
                );
            }
            log::debug!(
                "edge [{}]: degree={} histogram_buckets={}",
                edge.alias,
                edge.statistics.average_degree,
                edge.statistics.histogram.len()
            );
        }
        Ok(())
    }

    /// The batched row-estimate probe: one tagged select per node and
    /// concrete table, force-scanned so pushed-down predicates shape the
    /// engine's estimate.
    fn node_rows_sql(&self, graph: &MatchGraph) -> String {
        let mut selects: Vec<String> = Vec::new();
        for (_, node) in graph.nodes() {
            for concrete in self.metadata.concrete_tables(&node.table.key()) {
                selects.push(node_rows_select(node, &concrete));
            }
        }
        selects.join(" UNION ALL ")
    }
}

fn node_rows_select(node: &MatchNode, table: &ObjectKey) -> String {
    let mut sql = format!(
        "SELECT '{alias}' AS alias, toFloat64(count({id_column})) AS estimated_rows \
         FROM {schema}.{table} AS {alias}",
        alias = node.alias,
        id_column = GLOBAL_NODE_ID,
        schema = table.schema,
        table = table.name,
    );
    let mut first = true;
    for predicate in &node.predicates {
        sql.push_str(if first { " WHERE " } else { " AND " });
        sql.push_str(&predicate.to_string());
        first = false;
    }
    sql
}

/// The per-edge degree probe: the sampling table joined with the degree
/// catalog, edge predicates pushed into the sampling scan.
pub(crate) fn edge_degree_sql(edge: &MatchEdge) -> String {
    let schema = edge.bound_table.schema_or_default();
    let sampling = format!("{}_{}_{}_Sampling", schema, edge.bound_table.base, edge.column);
    let mut sql = format!(
        "SELECT groupArray({alias}.Sink) AS sink_sample, \
         any(d.SampleRowCount) AS sample_row_count, \
         any(d.AverageDegree) AS average_degree \
         FROM {schema}.{sampling} AS {alias} \
         CROSS JOIN {degrees} AS d \
         WHERE d.TableSchema = '{schema}' AND d.TableName = '{table}' AND d.ColumnName = '{column}'",
        alias = edge.alias,
        schema = schema,
        sampling = sampling,
        degrees = EDGE_DEGREE_COLLECTION,
        table = edge.bound_table.base,
        column = edge.column,
    );
    for predicate in &edge.predicates {
        sql.push_str(" AND ");
        sql.push_str(&predicate.to_string());
    }
    sql
}
