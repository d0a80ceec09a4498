//! The graph-pattern query planner.
//!
//! [`QueryPlanner::plan_query_block`] runs the full pipeline over one parsed
//! query block: pattern validation and lowering, predicate attachment,
//! statistics-driven cardinality estimation, per-component join-order
//! selection, and in-place emission. Planning a block without a `MATCH`
//! clause is a no-op, which makes the rewrite idempotent.

pub mod config;
pub mod emitter;
pub mod errors;
pub mod estimator;
pub mod join_order;
pub mod match_graph;
pub mod pattern_builder;
pub mod predicate_attachment;
pub mod scope;
pub mod union_find;

use std::sync::Arc;

use crate::graph_catalog::loader::load_graph_metadata;
use crate::graph_catalog::metadata::GraphMetaData;
use crate::graph_catalog::probe::CatalogProbe;
use crate::sql_ast::QueryBlock;

pub use config::PlannerConfig;
pub use errors::{Pass, PlannerError};
pub use match_graph::MatchGraph;
pub use scope::OuterScope;

pub struct QueryPlanner {
    metadata: Arc<GraphMetaData>,
    config: PlannerConfig,
}

impl QueryPlanner {
    pub fn new(metadata: Arc<GraphMetaData>, config: PlannerConfig) -> Self {
        QueryPlanner { metadata, config }
    }

    /// Load the graph catalog once and build a planner over it.
    pub async fn load(
        probe: &dyn CatalogProbe,
        config: PlannerConfig,
    ) -> Result<Self, PlannerError> {
        let metadata = load_graph_metadata(probe)
            .await
            .map_err(|source| PlannerError::Catalog {
                pass: Pass::PatternConstruction,
                source,
            })?;
        Ok(QueryPlanner::new(Arc::new(metadata), config))
    }

    pub fn metadata(&self) -> &Arc<GraphMetaData> {
        &self.metadata
    }

    /// Rewrite `block` in place: the `MATCH` clause is folded into joined
    /// table references on `FROM` and derived predicates on `WHERE`.
    pub async fn plan_query_block(
        &self,
        block: &mut QueryBlock,
        probe: &dyn CatalogProbe,
        outer: &OuterScope,
    ) -> Result<(), PlannerError> {
        if block.match_clause.is_none() {
            return Ok(());
        }

        let mut graph = pattern_builder::build_match_graph(block, &self.metadata, outer)?;
        predicate_attachment::attach_predicates(block, &mut graph, &self.metadata);
        pattern_builder::mark_tails(&mut graph, block);

        estimator::CardinalityEstimator::new(probe, &self.metadata, &self.config)
            .annotate(&mut graph)
            .await?;
        log::debug!("{}", graph);

        let join_planner = join_order::JoinOrderPlanner::new(&graph, &self.config);
        let mut plans = Vec::with_capacity(graph.components.len());
        for component in &graph.components {
            plans.push(join_planner.plan_component(component)?);
        }

        emitter::emit(block, &graph, plans);
        Ok(())
    }
}
