//! Predicate attachment.
//!
//! Splits the WHERE clause into top-level conjuncts and pushes each one down
//! to the single node or edge it references; everything else stays in the
//! residual clause. Unqualified column names resolve through the visible
//! columns of the pattern's nodes (catalog columns) and edges (declared
//! attributes); a name visible from more than one alias stays residual.

use std::collections::HashSet;

use crate::graph_catalog::metadata::GraphMetaData;
use crate::query_planner::match_graph::{EdgeId, MatchGraph, NodeId};
use crate::sql_ast::{conjoin, conjuncts, Expr, QueryBlock};
use crate::utils::Ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Owner {
    Node(NodeId),
    Edge(EdgeId),
}

pub fn attach_predicates(block: &mut QueryBlock, graph: &mut MatchGraph, metadata: &GraphMetaData) {
    let Some(where_clause) = block.where_clause.take() else {
        return;
    };

    let mut residual: Vec<Expr> = Vec::new();
    let mut attached = 0usize;
    for conjunct in conjuncts(&where_clause) {
        match classify(&conjunct, graph, metadata) {
            Some(Owner::Node(node)) => {
                graph.node_mut(node).predicates.push(conjunct);
                attached += 1;
            }
            Some(Owner::Edge(edge)) => {
                graph.edge_mut(edge).predicates.push(conjunct);
                attached += 1;
            }
            None => residual.push(conjunct),
        }
    }

    log::debug!(
        "predicate attachment: {} pushed down, {} residual",
        attached,
        residual.len()
    );
    block.where_clause = conjoin(residual);
}

/// The owner of a conjunct, when every column it references falls under one
/// node or one edge alias.
fn classify(conjunct: &Expr, graph: &MatchGraph, metadata: &GraphMetaData) -> Option<Owner> {
    let mut owners: HashSet<Owner> = HashSet::new();
    let mut unresolvable = false;

    conjunct.for_each_column_ref(&mut |column_ref| {
        let owner = match column_ref.qualifier() {
            Some(qualifier) => resolve_alias(qualifier, graph),
            None => resolve_unqualified(column_ref.column(), graph, metadata),
        };
        match owner {
            Some(owner) => {
                owners.insert(owner);
            }
            None => unresolvable = true,
        }
    });

    if unresolvable || owners.len() != 1 {
        return None;
    }
    owners.into_iter().next()
}

fn resolve_alias(alias: &Ident, graph: &MatchGraph) -> Option<Owner> {
    if let Some(node) = graph.node_by_alias(alias) {
        return Some(Owner::Node(node));
    }
    graph.edge_by_alias(alias).map(Owner::Edge)
}

fn resolve_unqualified(
    column: &Ident,
    graph: &MatchGraph,
    metadata: &GraphMetaData,
) -> Option<Owner> {
    let mut found: Option<Owner> = None;
    for (id, node) in graph.nodes() {
        let key = node.table.key();
        let visible = metadata
            .node_table_columns(&key)
            .map(|columns| columns.contains_key(column))
            .unwrap_or(false);
        if visible {
            if found.is_some() {
                return None;
            }
            found = Some(Owner::Node(id));
        }
    }
    for (id, edge) in graph.edges() {
        let key = edge.bound_table.key();
        let visible = metadata
            .column(&key, &edge.column)
            .and_then(|c| c.edge_info.as_ref())
            .map(|info| {
                info.column_attributes
                    .iter()
                    .any(|attribute| Ident::new(attribute.as_str()) == *column)
            })
            .unwrap_or(false);
        if visible {
            if found.is_some() {
                return None;
            }
            found = Some(Owner::Edge(id));
        }
    }
    found
}
