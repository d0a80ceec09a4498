//! AST emission.
//!
//! Rewrites the query block once every component has a chosen plan: schema
//! qualifiers are stripped from aliased references, the consumed node-table
//! entries leave the FROM clause in favor of the chosen join trees, DOWNSIZE
//! guards land on their recorded join boundaries, attached predicates are
//! re-appended (replicated for split nodes), and the MATCH clause is
//! cleared last.

use std::collections::HashSet;

use crate::query_planner::join_order::{ChosenPlan, DownSizeTarget};
use crate::query_planner::match_graph::MatchGraph;
use crate::sql_ast::{
    ColumnRef, Expr, ObjectName, QueryBlock, SelectItem, TableRef,
};
use crate::utils::Ident;

const DOWNSIZE_FUNCTION: &str = "DownSizeFunction";
const LOCAL_NODE_ID: &str = "LocalNodeId";

pub fn emit(block: &mut QueryBlock, graph: &MatchGraph, plans: Vec<ChosenPlan>) {
    strip_schema_qualifiers(block, graph);

    // The chosen join trees replace the node tables the pattern consumed.
    let consumed: HashSet<Ident> = graph.nodes().map(|(_, node)| node.alias.clone()).collect();
    block.from.retain(|table_ref| match table_ref {
        TableRef::Named(named) => {
            let alias = named
                .alias
                .clone()
                .unwrap_or_else(|| named.object.base.clone());
            !consumed.contains(&alias)
        }
        _ => true,
    });

    for (component, plan) in graph.components.iter().zip(plans) {
        let mut tree = plan.table_ref;
        for target in &plan.down_size_targets {
            inject_downsize_guard(&mut tree, plan.join_count, target);
        }
        block.from.push(tree);

        // Attached predicates come back onto WHERE; they were carried on the
        // graph for probing and costing.
        for &node_id in &component.nodes {
            for predicate in &graph.node(node_id).predicates {
                block.append_where_conjunct(predicate.clone());
            }
        }
        for &edge_id in &component.edges {
            for predicate in &graph.edge(edge_id).predicates {
                block.append_where_conjunct(predicate.clone());
            }
        }

        // Predicates of split nodes hold for every replica.
        for (node_id, split_count) in &plan.node_splits {
            let node = graph.node(*node_id);
            for k in 1..=*split_count {
                let replica = Ident::new(format!("{}_{}", node.alias, k));
                for predicate in &node.predicates {
                    let mut replicated = predicate.clone();
                    replicated.rewrite_column_refs(&mut |column_ref| {
                        if column_ref.qualifier() == Some(&node.alias) {
                            let position = column_ref.parts.len() - 2;
                            column_ref.parts[position] = replica.clone();
                        }
                    });
                    block.append_where_conjunct(replicated);
                }
            }
        }
    }

    block.match_clause = None;
    log::debug!("match clause emitted and cleared");
}

/// `schema.alias.column` through an alias is invalid once the table is
/// aliased; drop the qualifier wherever the alias is known.
fn strip_schema_qualifiers(block: &mut QueryBlock, graph: &MatchGraph) {
    let mut aliases: HashSet<Ident> = HashSet::new();
    for (_, node) in graph.nodes() {
        aliases.insert(node.alias.clone());
    }
    for (_, edge) in graph.edges() {
        aliases.insert(edge.alias.clone());
    }
    for table_ref in &block.from {
        if let Some(alias) = table_ref.alias() {
            aliases.insert(alias.clone());
        }
    }

    let mut strip = |column_ref: &mut ColumnRef| {
        if column_ref.parts.len() == 3 && aliases.contains(&column_ref.parts[1]) {
            column_ref.parts.remove(0);
        }
    };
    for item in &mut block.select.items {
        if let SelectItem::Expr { expr, .. } = item {
            expr.rewrite_column_refs(&mut strip);
        }
    }
    if let Some(where_clause) = &mut block.where_clause {
        where_clause.rewrite_column_refs(&mut strip);
    }
}

/// AND the DOWNSIZE disjunction onto the condition of the targeted join.
/// Join ordinals are 1-based in creation order; the tree is left-deep, so
/// ordinal `i` of `total` sits `total - i` left-hops below the root.
fn inject_downsize_guard(tree: &mut TableRef, total_joins: usize, target: &DownSizeTarget) {
    let mut hops = total_joins.saturating_sub(target.join_ordinal);
    let mut current = tree;
    loop {
        let TableRef::Join(join) = current else {
            log::warn!(
                "downsize target {} does not resolve to a join boundary",
                target.join_ordinal
            );
            return;
        };
        if hops == 0 {
            let guard = downsize_disjunction(&target.alias);
            join.condition = Some(match join.condition.take() {
                Some(existing) => Expr::and(existing, guard),
                None => guard,
            });
            return;
        }
        hops -= 1;
        current = &mut join.left;
    }
}

fn downsize_disjunction(alias: &Ident) -> Expr {
    let call = || {
        Expr::function(
            ObjectName::qualified("dbo", DOWNSIZE_FUNCTION),
            vec![Expr::Column(ColumnRef::new(vec![
                alias.clone(),
                Ident::new(LOCAL_NODE_ID),
            ]))],
        )
    };
    Expr::or(
        Expr::eq(call(), Expr::string("1")),
        Expr::eq(call(), Expr::string("2")),
    )
}
