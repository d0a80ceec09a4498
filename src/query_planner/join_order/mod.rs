//! Join-order selection.
//!
//! Per connected component, a bounded-state dynamic program enumerates
//! partial join trees ([`MatchComponent`] states). Seeding creates one state
//! per non-tail node and non-empty subset of its incident edges; extension
//! picks a one-height tree (a root plus a subset of its edges, split into
//! joint edges that close cycles and edges reaching new nodes). States are
//! costed by estimated intermediate sizes, pruned against the best complete
//! plan, and beam-limited by worst cost-per-edge eviction.

pub mod selectivity;

pub use selectivity::joint_edge_selectivity;

use std::collections::{HashMap, HashSet};

use crate::query_planner::config::PlannerConfig;
use crate::query_planner::errors::{Pass, PlannerError};
use crate::query_planner::match_graph::{
    ConnectedComponent, EdgeId, MatchEdge, MatchGraph, MatchNode, NodeId,
};
use crate::query_planner::pattern_builder::GLOBAL_NODE_ID;
use crate::sql_ast::{ColumnRef, Expr, FunctionTable, ObjectName, TableRef};
use crate::utils::Ident;

/// How a materialized edge entered the join tree: `Outgoing` when decoded
/// toward a new (or elided) node, `Incoming` when it closed a cycle onto an
/// already materialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
}

/// A join boundary that needs a DOWNSIZE guard, identified by the 1-based
/// ordinal of the join that introduced the guarded table.
#[derive(Debug, Clone, PartialEq)]
pub struct DownSizeTarget {
    pub join_ordinal: usize,
    pub alias: Ident,
}

/// The selected plan of one connected component.
#[derive(Debug, Clone)]
pub struct ChosenPlan {
    pub table_ref: TableRef,
    pub cost: f64,
    pub size: f64,
    pub join_count: usize,
    pub down_size_targets: Vec<DownSizeTarget>,
    /// Nodes replicated in the join tree, with their replica count.
    pub node_splits: Vec<(NodeId, usize)>,
}

/// One DP state: a partially materialized component.
#[derive(Debug, Clone)]
struct MatchComponent {
    nodes: HashSet<NodeId>,
    edge_directions: HashMap<EdgeId, EdgeDirection>,
    /// Far-side nodes of materialized edges not yet joined, with the edges
    /// waiting on them.
    unmaterialized: HashMap<NodeId, Vec<EdgeId>>,
    size: f64,
    cost: f64,
    /// Host-engine-style size estimate, tracked to place DOWNSIZE guards.
    estimate_size: f64,
    table_ref: TableRef,
    join_count: usize,
    node_splits: HashMap<NodeId, usize>,
    down_size_targets: Vec<DownSizeTarget>,
}

impl MatchComponent {
    fn cost_per_edge(&self) -> f64 {
        self.cost / self.edge_directions.len().max(1) as f64
    }
}

/// One candidate extension: a root node plus a subset of its unmaterialized
/// incident edges, partitioned by whether the far endpoint is already in the
/// component.
#[derive(Debug, Clone)]
struct OneHeightTree {
    root: NodeId,
    joint_edges: Vec<EdgeId>,
    unmaterialized_edges: Vec<EdgeId>,
    split: bool,
}

pub struct JoinOrderPlanner<'a> {
    graph: &'a MatchGraph,
    config: &'a PlannerConfig,
}

impl<'a> JoinOrderPlanner<'a> {
    pub fn new(graph: &'a MatchGraph, config: &'a PlannerConfig) -> Self {
        JoinOrderPlanner { graph, config }
    }

    pub fn plan_component(
        &self,
        component: &ConnectedComponent,
    ) -> Result<ChosenPlan, PlannerError> {
        let mut beam = Beam::new(self.config.max_states);
        self.seed(component, &mut beam);

        let mut states = beam.into_states();
        let mut best: Option<MatchComponent> = None;
        let mut visited = states.len();

        while !states.is_empty() {
            let mut next = Beam::new(self.config.max_states);
            for state in states {
                let trees = self.extensions(&state, component);
                if trees.is_empty() {
                    if self.is_complete(&state, component)
                        && best.as_ref().map_or(true, |b| state.cost < b.cost)
                    {
                        best = Some(state);
                    }
                    continue;
                }
                for tree in trees {
                    if self.config.lower_bound_pruning {
                        if let Some(b) = &best {
                            let candidate_size = self.candidate_size(&tree);
                            // Without a joint edge the candidate only fans
                            // out, so a logarithmic floor stands in for it.
                            let floor = if tree.joint_edges.is_empty() {
                                candidate_size.max(2.0).log2()
                            } else {
                                candidate_size
                            };
                            if state.cost + state.size + floor >= b.cost {
                                continue;
                            }
                        }
                    }
                    next.admit(self.apply(&state, &tree, component));
                    visited += 1;
                }
            }
            states = next.into_states();
        }

        let first_alias = component
            .nodes
            .first()
            .map(|&n| self.graph.node(n).alias.to_string())
            .unwrap_or_default();
        let best = best.ok_or(PlannerError::NoCompletePlan {
            pass: Pass::JoinOrdering,
            alias: first_alias,
        })?;
        log::debug!(
            "component planned: cost={} size={} joins={} states_visited={}",
            best.cost,
            best.size,
            best.join_count,
            visited
        );

        let mut node_splits: Vec<(NodeId, usize)> = best.node_splits.into_iter().collect();
        node_splits.sort_by_key(|(node, _)| *node);
        Ok(ChosenPlan {
            table_ref: best.table_ref,
            cost: best.cost,
            size: best.size,
            join_count: best.join_count,
            down_size_targets: best.down_size_targets,
            node_splits,
        })
    }

    /// One initial state per non-tail node and non-empty subset of its
    /// incident edges. A node without incident edges seeds a bare scan so a
    /// single-node component still completes.
    fn seed(&self, component: &ConnectedComponent, beam: &mut Beam) {
        for &node_id in &component.nodes {
            if component.is_tail(node_id) {
                continue;
            }
            let neighbors = &self.graph.node(node_id).neighbors;
            if neighbors.is_empty() {
                beam.admit(self.initial_state(node_id, &[], component));
                continue;
            }
            let k = neighbors.len().min(MAX_SUBSET_EDGES);
            if k < neighbors.len() {
                log::warn!(
                    "node [{}] has {} incident edges; seeding only the first {}",
                    self.graph.node(node_id).alias,
                    neighbors.len(),
                    k
                );
            }
            for mask in 1u32..(1u32 << k) {
                let subset: Vec<EdgeId> = neighbors
                    .iter()
                    .copied()
                    .take(k)
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, e)| e)
                    .collect();
                beam.admit(self.initial_state(node_id, &subset, component));
            }
        }
    }

    fn initial_state(
        &self,
        root: NodeId,
        edges: &[EdgeId],
        component: &ConnectedComponent,
    ) -> MatchComponent {
        let node = self.graph.node(root);
        let mut state = MatchComponent {
            nodes: HashSet::from([root]),
            edge_directions: HashMap::new(),
            unmaterialized: HashMap::new(),
            size: node.estimated_rows.max(1.0),
            cost: 0.0,
            estimate_size: node.estimated_rows.max(1.0),
            table_ref: TableRef::named(node.table.clone(), Some(node.alias.clone())),
            join_count: 0,
            node_splits: HashMap::new(),
            down_size_targets: Vec::new(),
        };
        let root_alias = node.alias.clone();
        let mut selectivity = 1.0;
        let mut host_selectivity = 1.0;
        for &edge_id in edges {
            state.size *= self.degree(edge_id);
            state.estimate_size *= self.degree(edge_id);
            let edge_selectivity = self.join_edge(&mut state, edge_id, &root_alias, component);
            if edge_selectivity < 1.0 {
                // A self-loop closed at seeding time; the host only has its
                // density prior for it.
                host_selectivity *= node_density(node);
            }
            selectivity *= edge_selectivity;
        }
        state.size = (state.size * selectivity).max(1.0);
        state.estimate_size = (state.estimate_size * host_selectivity).max(1.0);
        state.cost = state.size;
        state
    }

    /// Join one decoded edge onto the tree, rooted at `from_alias`. Returns
    /// the selectivity contribution (1.0 unless the edge closes a cycle).
    fn join_edge(
        &self,
        state: &mut MatchComponent,
        edge_id: EdgeId,
        from_alias: &Ident,
        component: &ConnectedComponent,
    ) -> f64 {
        let edge = self.graph.edge(edge_id);
        let decoder = decoder_table(edge, from_alias);
        let Some(sink) = edge.sink else {
            push_join(state, decoder, None);
            state.edge_directions.insert(edge_id, EdgeDirection::Outgoing);
            return 1.0;
        };

        if state.nodes.contains(&sink) {
            let sink_alias = self.graph.node(sink).alias.clone();
            let condition = Expr::eq(
                Expr::Column(ColumnRef::new(vec![edge.alias.clone(), Ident::new("Sink")])),
                Expr::Column(ColumnRef::new(vec![sink_alias, Ident::new(GLOBAL_NODE_ID)])),
            );
            push_join(state, decoder, Some(condition));
            state.edge_directions.insert(edge_id, EdgeDirection::Incoming);
            joint_edge_selectivity(edge, self.graph.node(sink))
        } else {
            push_join(state, decoder, None);
            state.edge_directions.insert(edge_id, EdgeDirection::Outgoing);
            if !component.is_tail(sink) {
                state.unmaterialized.entry(sink).or_default().push(edge_id);
            }
            1.0
        }
    }

    fn degree(&self, edge_id: EdgeId) -> f64 {
        self.graph.edge(edge_id).statistics.average_degree.max(1.0)
    }

    fn candidate_size(&self, tree: &OneHeightTree) -> f64 {
        let mut size = self.graph.node(tree.root).estimated_rows.max(1.0);
        for &edge_id in tree.joint_edges.iter().chain(&tree.unmaterialized_edges) {
            size *= self.degree(edge_id);
        }
        size
    }

    fn host_candidate_size(&self, tree: &OneHeightTree) -> f64 {
        let mut size = (self.graph.node(tree.root).table_row_count as f64).max(1.0);
        for &edge_id in tree.joint_edges.iter().chain(&tree.unmaterialized_edges) {
            size *= self.degree(edge_id);
        }
        size
    }

    /// Enumerate admissible one-height trees for `state`. A tree is
    /// admissible when (a) its root joins through at least one joint edge,
    /// (b) the component already holds an unmaterialized edge into the root,
    /// or (c) the root is a split copy of a materialized node contributing
    /// new unmaterialized edges.
    fn extensions(
        &self,
        state: &MatchComponent,
        component: &ConnectedComponent,
    ) -> Vec<OneHeightTree> {
        let mut trees = Vec::new();
        for &root in &component.nodes {
            let remaining: Vec<EdgeId> = self
                .graph
                .node(root)
                .neighbors
                .iter()
                .copied()
                .filter(|edge_id| !state.edge_directions.contains_key(edge_id))
                .collect();

            let (joint_candidates, unmat_candidates): (Vec<EdgeId>, Vec<EdgeId>) =
                remaining.iter().copied().partition(|edge_id| {
                    self.graph
                        .edge(*edge_id)
                        .sink
                        .map(|sink| state.nodes.contains(&sink))
                        .unwrap_or(false)
                });

            if state.nodes.contains(&root) {
                // Split copy: only useful when it materializes a new edge to
                // a new node.
                if unmat_candidates.is_empty() {
                    continue;
                }
                for joint_subset in with_empty(prune_joint_edges(&joint_candidates)) {
                    for unmat_subset in edge_subsets(&unmat_candidates) {
                        trees.push(OneHeightTree {
                            root,
                            joint_edges: joint_subset.clone(),
                            unmaterialized_edges: unmat_subset,
                            split: true,
                        });
                    }
                }
            } else {
                if component.is_tail(root) {
                    continue;
                }
                let has_incoming = state.unmaterialized.contains_key(&root);
                for joint_subset in with_empty(prune_joint_edges(&joint_candidates)) {
                    for unmat_subset in with_empty(edge_subsets(&unmat_candidates)) {
                        let admissible = !joint_subset.is_empty() || has_incoming;
                        if !admissible {
                            continue;
                        }
                        trees.push(OneHeightTree {
                            root,
                            joint_edges: joint_subset.clone(),
                            unmaterialized_edges: unmat_subset,
                            split: false,
                        });
                    }
                }
            }
        }
        trees
    }

    fn apply(
        &self,
        state: &MatchComponent,
        tree: &OneHeightTree,
        component: &ConnectedComponent,
    ) -> MatchComponent {
        let mut next = state.clone();
        let root_node = self.graph.node(tree.root);
        let candidate_size = self.candidate_size(tree);
        let host_candidate = self.host_candidate_size(tree);
        // Selectivity of edges resolving into the root as it materializes,
        // and the density-only view of it the host engine would take.
        let mut pending_selectivity = 1.0;
        let mut host_selectivity = 1.0;

        let root_alias = if tree.split {
            let count = next.node_splits.entry(tree.root).or_insert(0);
            *count += 1;
            let replica = Ident::new(format!("{}_{}", root_node.alias, count));
            let condition = Expr::eq(
                Expr::Column(ColumnRef::new(vec![
                    replica.clone(),
                    Ident::new(GLOBAL_NODE_ID),
                ])),
                Expr::Column(ColumnRef::new(vec![
                    root_node.alias.clone(),
                    Ident::new(GLOBAL_NODE_ID),
                ])),
            );
            push_join(
                &mut next,
                TableRef::named(root_node.table.clone(), Some(replica.clone())),
                Some(condition),
            );
            replica
        } else {
            // Edges already pointing into the root become its join keys.
            let mut conditions: Vec<Expr> = Vec::new();
            if let Some(pending) = next.unmaterialized.remove(&tree.root) {
                for edge_id in pending {
                    let edge = self.graph.edge(edge_id);
                    conditions.push(Expr::eq(
                        Expr::Column(ColumnRef::new(vec![
                            edge.alias.clone(),
                            Ident::new("Sink"),
                        ])),
                        Expr::Column(ColumnRef::new(vec![
                            root_node.alias.clone(),
                            Ident::new(GLOBAL_NODE_ID),
                        ])),
                    ));
                    pending_selectivity *= joint_edge_selectivity(edge, root_node);
                    host_selectivity *= node_density(root_node);
                }
            }
            push_join(
                &mut next,
                TableRef::named(root_node.table.clone(), Some(root_node.alias.clone())),
                crate::sql_ast::conjoin(conditions),
            );
            next.nodes.insert(tree.root);
            root_node.alias.clone()
        };
        let root_join_ordinal = next.join_count;

        let mut selectivity = 1.0;
        for &edge_id in tree.joint_edges.iter().chain(&tree.unmaterialized_edges) {
            selectivity *= self.join_edge(&mut next, edge_id, &root_alias, component);
        }
        for &edge_id in &tree.joint_edges {
            if let Some(sink) = self.graph.edge(edge_id).sink {
                host_selectivity *= node_density(self.graph.node(sink));
            }
        }

        next.size = (next.size * candidate_size * selectivity * pending_selectivity).max(1.0);
        next.cost += next.size;

        next.estimate_size =
            (next.estimate_size * host_candidate * host_selectivity).max(1.0);
        if next.estimate_size.is_finite()
            && next.size * self.config.downsize_factor < next.estimate_size
        {
            next.down_size_targets.push(DownSizeTarget {
                join_ordinal: root_join_ordinal,
                alias: root_alias,
            });
            next.estimate_size = next.size;
        }
        next
    }

    fn is_complete(&self, state: &MatchComponent, component: &ConnectedComponent) -> bool {
        component
            .edges
            .iter()
            .all(|edge_id| state.edge_directions.contains_key(edge_id))
            && component
                .nodes
                .iter()
                .all(|&node| component.is_tail(node) || state.nodes.contains(&node))
    }
}

const MAX_SUBSET_EDGES: usize = 16;

/// The host engine's join-selectivity prior for a node-id column.
fn node_density(node: &MatchNode) -> f64 {
    if node.global_node_id_density > 0.0 {
        node.global_node_id_density.min(1.0)
    } else {
        1.0
    }
}

fn push_join(state: &mut MatchComponent, right: TableRef, condition: Option<Expr>) {
    let placeholder = TableRef::named(ObjectName::bare("placeholder"), None);
    let left = std::mem::replace(&mut state.table_ref, placeholder);
    state.table_ref = TableRef::join(left, right, condition);
    state.join_count += 1;
}

/// Candidate joint-edge subsets: each singleton plus the full set.
fn prune_joint_edges(joint: &[EdgeId]) -> Vec<Vec<EdgeId>> {
    let mut subsets: Vec<Vec<EdgeId>> = joint.iter().map(|&edge| vec![edge]).collect();
    if joint.len() > 1 {
        subsets.push(joint.to_vec());
    }
    subsets
}

/// Non-empty subsets; beyond a handful of edges only singletons and the full
/// set are tried.
fn edge_subsets(edges: &[EdgeId]) -> Vec<Vec<EdgeId>> {
    if edges.is_empty() {
        return Vec::new();
    }
    if edges.len() <= 3 {
        let mut subsets = Vec::new();
        for mask in 1u32..(1u32 << edges.len()) {
            subsets.push(
                edges
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, e)| e)
                    .collect(),
            );
        }
        subsets
    } else {
        prune_joint_edges(edges)
    }
}

fn with_empty(mut subsets: Vec<Vec<EdgeId>>) -> Vec<Vec<EdgeId>> {
    subsets.insert(0, Vec::new());
    subsets
}

/// The table-valued decoder materializing an edge from its source side.
/// Variable-length edges use the path decoder with their length bounds
/// (-1 encodes an unbounded maximum).
fn decoder_table(edge: &MatchEdge, from_alias: &Ident) -> TableRef {
    let schema = edge.bound_table.schema_or_default();
    let source_column = Expr::Column(ColumnRef::new(vec![
        from_alias.clone(),
        edge.column.clone(),
    ]));
    match &edge.path_spec {
        Some(spec) => TableRef::Function(FunctionTable {
            function: ObjectName::qualified(
                "dbo",
                format!(
                    "{}_{}_{}_PathDecoder",
                    schema, edge.bound_table.base, edge.column
                ),
            ),
            args: vec![
                source_column,
                Expr::integer(spec.min_length as i64),
                Expr::integer(spec.max_length.map(|m| m as i64).unwrap_or(-1)),
            ],
            alias: edge.alias.clone(),
        }),
        None => TableRef::Function(FunctionTable {
            function: ObjectName::qualified(
                "dbo",
                format!("{}_{}_{}_Decoder", schema, edge.bound_table.base, edge.column),
            ),
            args: vec![source_column],
            alias: edge.alias.clone(),
        }),
    }
}

/// Beam over DP states with worst cost-per-edge eviction.
struct Beam {
    states: Vec<MatchComponent>,
    capacity: usize,
    worst_index: Option<usize>,
}

impl Beam {
    fn new(capacity: usize) -> Self {
        Beam {
            states: Vec::new(),
            capacity: capacity.max(1),
            worst_index: None,
        }
    }

    fn admit(&mut self, candidate: MatchComponent) {
        if self.states.len() < self.capacity {
            self.states.push(candidate);
            return;
        }
        match self.worst_index {
            None => {
                // TODO: the first candidate past capacity only seeds the
                // eviction index and is dropped without a comparison; decide
                // whether that is intended before changing it.
                self.worst_index = Some(self.find_worst());
            }
            Some(worst) => {
                if candidate.cost_per_edge() < self.states[worst].cost_per_edge() {
                    self.states[worst] = candidate;
                    self.worst_index = Some(self.find_worst());
                }
            }
        }
    }

    // TODO: keep the ratios in a heap so eviction is O(log n) instead of a
    // rescan.
    fn find_worst(&self) -> usize {
        let mut worst = 0usize;
        for (index, state) in self.states.iter().enumerate() {
            if state.cost_per_edge() > self.states[worst].cost_per_edge() {
                worst = index;
            }
        }
        worst
    }

    fn into_states(self) -> Vec<MatchComponent> {
        self.states
    }
}
