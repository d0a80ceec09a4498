//! The lowered form of a `MATCH` clause.
//!
//! Nodes and edges form a cyclic object graph (a node holds its outgoing
//! edges, an edge holds source and sink), so both live in per-query arenas
//! indexed by [`NodeId`] / [`EdgeId`]. A [`MatchGraph`] is built per query
//! block and discarded after emission.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::sql_ast::{Expr, ObjectName};
use crate::utils::Ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl EdgeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Length bounds and projection info of a variable-length edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSpec {
    pub min_length: u32,
    /// `None` is unbounded.
    pub max_length: Option<u32>,
    /// True when the query projects the path value (`alias.*`).
    pub reference_path_info: bool,
    pub attributes: HashMap<String, String>,
}

impl PathSpec {
    pub fn new(min_length: u32, max_length: Option<u32>) -> Self {
        PathSpec {
            min_length,
            max_length,
            reference_path_info: false,
            attributes: HashMap::new(),
        }
    }
}

/// Statistics back-annotated onto an edge by the cardinality estimator.
#[derive(Debug, Clone)]
pub struct EdgeStatistics {
    pub density: f64,
    /// Sink id -> (frequency, is_range_bucket).
    pub histogram: HashMap<i64, (f64, bool)>,
    /// Number of sampled adjacency rows behind the histogram.
    pub row_count: u64,
    pub max_value: i64,
    pub selectivity: f64,
    pub average_degree: f64,
}

impl Default for EdgeStatistics {
    fn default() -> Self {
        EdgeStatistics {
            density: 0.0,
            histogram: HashMap::new(),
            row_count: 0,
            max_value: 0,
            selectivity: 1.0,
            average_degree: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchNode {
    pub alias: Ident,
    pub table: ObjectName,
    /// Edges whose source is this node, in declaration order.
    pub neighbors: Vec<EdgeId>,
    /// True when the alias is inherited from an enclosing block.
    pub external: bool,
    pub predicates: Vec<Expr>,
    pub estimated_rows: f64,
    pub table_row_count: u64,
    pub global_node_id_density: f64,
}

#[derive(Debug, Clone)]
pub struct MatchEdge {
    pub source: NodeId,
    pub column: Ident,
    pub alias: Ident,
    /// The concrete node table declaring the edge column, view indirection
    /// resolved.
    pub bound_table: ObjectName,
    /// Assigned while chaining the path; always present after construction.
    pub sink: Option<NodeId>,
    pub predicates: Vec<Expr>,
    pub statistics: EdgeStatistics,
    pub path_spec: Option<PathSpec>,
}

impl MatchEdge {
    pub fn is_path(&self) -> bool {
        self.path_spec.is_some()
    }
}

/// A maximal set of pattern nodes transitively linked by pattern edges.
/// Node and edge order is declaration order, which keeps join-order
/// enumeration deterministic.
#[derive(Debug, Clone, Default)]
pub struct ConnectedComponent {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Nodes that contribute nothing beyond terminating an edge and can be
    /// elided from the join tree.
    pub tails: HashSet<NodeId>,
}

impl ConnectedComponent {
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn is_tail(&self, node: NodeId) -> bool {
        self.tails.contains(&node)
    }
}

#[derive(Debug, Default)]
pub struct MatchGraph {
    nodes: Vec<MatchNode>,
    edges: Vec<MatchEdge>,
    alias_to_node: HashMap<Ident, NodeId>,
    alias_to_edge: HashMap<Ident, EdgeId>,
    pub components: Vec<ConnectedComponent>,
}

impl MatchGraph {
    pub fn new() -> Self {
        MatchGraph::default()
    }

    pub fn add_node(&mut self, node: MatchNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.alias_to_node.insert(node.alias.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn add_edge(&mut self, edge: MatchEdge) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.alias_to_edge.insert(edge.alias.clone(), id);
        self.edges.push(edge);
        id
    }

    pub fn node(&self, id: NodeId) -> &MatchNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut MatchNode {
        &mut self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &MatchEdge {
        &self.edges[id.0]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut MatchEdge {
        &mut self.edges[id.0]
    }

    pub fn node_by_alias(&self, alias: &Ident) -> Option<NodeId> {
        self.alias_to_node.get(alias).copied()
    }

    pub fn edge_by_alias(&self, alias: &Ident) -> Option<EdgeId> {
        self.alias_to_edge.get(alias).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &MatchNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &MatchEdge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i), e))
    }

    /// Re-key a node under a new alias (external rematerialization).
    pub(crate) fn rename_node(&mut self, id: NodeId, new_alias: Ident) {
        let old_alias = self.nodes[id.0].alias.clone();
        self.alias_to_node.remove(&old_alias);
        self.alias_to_node.insert(new_alias.clone(), id);
        self.nodes[id.0].alias = new_alias;
    }
}

impl fmt::Display for MatchGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MatchGraph ({} components)", self.components.len())?;
        for (ci, component) in self.components.iter().enumerate() {
            writeln!(f, "  component #{}", ci)?;
            for &node_id in &component.nodes {
                let node = self.node(node_id);
                writeln!(
                    f,
                    "    node [{}] {} rows={} tail={}",
                    node.alias,
                    node.table,
                    node.estimated_rows,
                    component.is_tail(node_id)
                )?;
            }
            for &edge_id in &component.edges {
                let edge = self.edge(edge_id);
                let sink = edge
                    .sink
                    .map(|s| self.node(s).alias.to_string())
                    .unwrap_or_else(|| "?".to_string());
                writeln!(
                    f,
                    "    edge [{}] {} -> {} degree={}",
                    edge.alias,
                    self.node(edge.source).alias,
                    sink,
                    edge.statistics.average_degree
                )?;
            }
        }
        Ok(())
    }
}
