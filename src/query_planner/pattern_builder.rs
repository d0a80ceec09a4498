//! Pattern validation and lowering.
//!
//! Walks the `(node, edge, next-node)` triples of every `MATCH` path,
//! validates them against the graph catalog, and lowers them into a
//! [`MatchGraph`]: nodes get-or-created by alias, unnamed edges given
//! synthesized aliases, sinks chained, components split via union-find.
//! Three AST-facing passes follow construction: ambiguous edge-column
//! references are rewritten to assigned edge aliases, externally-scoped
//! aliases are rematerialized as node-identity joins, and `alias.*`
//! projections of path edges become path-decoder calls.

use std::collections::HashMap;

use crate::graph_catalog::metadata::{ColumnRole, GraphMetaData};
use crate::query_planner::errors::PlannerError;
use crate::query_planner::match_graph::{
    ConnectedComponent, EdgeStatistics, MatchEdge, MatchGraph, MatchNode, NodeId, PathSpec,
};
use crate::query_planner::scope::OuterScope;
use crate::query_planner::union_find::UnionFind;
use crate::sql_ast::{
    Expr, MatchClause, ObjectName, QueryBlock, SelectItem, TableRef,
};
use crate::utils::{Ident, ObjectKey};

pub const GLOBAL_NODE_ID: &str = "GlobalNodeId";
pub const PATH_MESSAGE: &str = "PathMessage";

/// Alias -> bound table object, collected from the FROM clause.
type FromBindings = HashMap<Ident, ObjectName>;

pub fn build_match_graph(
    block: &mut QueryBlock,
    metadata: &GraphMetaData,
    outer: &OuterScope,
) -> Result<MatchGraph, PlannerError> {
    let Some(clause) = block.match_clause.clone() else {
        return Ok(MatchGraph::new());
    };

    let bindings = collect_from_bindings(block);
    validate_match_clause(&clause, &bindings, metadata)?;

    let mut graph = MatchGraph::new();
    let mut uf = UnionFind::new();
    // Written column name -> aliases assigned to edges using it.
    let mut edge_column_to_aliases: HashMap<Ident, Vec<Ident>> = HashMap::new();
    let mut binding_cache: HashMap<(ObjectKey, Ident), (ObjectKey, Ident)> = HashMap::new();

    for path in &clause.paths {
        for (index, hop) in path.hops.iter().enumerate() {
            let next_alias = path
                .hops
                .get(index + 1)
                .map(|next| &next.node)
                .unwrap_or(&path.tail);

            let source_id = get_or_create_node(&mut graph, &mut uf, &bindings, &hop.node);

            let edge_alias = match &hop.edge.alias {
                Some(alias) => {
                    if graph.edge_by_alias(alias).is_some() {
                        return Err(PlannerError::DuplicateEdgeAlias {
                            alias: alias.to_string(),
                        });
                    }
                    alias.clone()
                }
                None => Ident::new(format!(
                    "{}_{}_{}",
                    hop.node, hop.edge.column, next_alias
                )),
            };
            edge_column_to_aliases
                .entry(hop.edge.column.clone())
                .or_default()
                .push(edge_alias.clone());

            let source_key = graph.node(source_id).table.key();
            let (bound_table, bound_column) =
                resolve_binding(&mut binding_cache, metadata, &source_key, &hop.edge.column);

            let path_spec = if hop.edge.is_plain() {
                None
            } else {
                Some(PathSpec::new(hop.edge.min_length, hop.edge.max_length))
            };

            let edge_id = graph.add_edge(MatchEdge {
                source: source_id,
                column: bound_column,
                alias: edge_alias,
                bound_table: ObjectName::qualified(
                    bound_table.schema.clone(),
                    bound_table.name.clone(),
                ),
                sink: None,
                predicates: Vec::new(),
                statistics: EdgeStatistics::default(),
                path_spec,
            });

            let next_id = get_or_create_node(&mut graph, &mut uf, &bindings, next_alias);
            graph.edge_mut(edge_id).sink = Some(next_id);
            uf.union(source_id.index(), next_id.index());
            graph.node_mut(source_id).neighbors.push(edge_id);
        }
    }

    build_components(&mut graph, &mut uf);
    log::debug!(
        "match pattern lowered: {} nodes, {} edges, {} components",
        graph.node_count(),
        graph.edge_count(),
        graph.components.len()
    );

    replace_edge_column_references(block, &graph, &edge_column_to_aliases)?;
    rematerialize_external_aliases(block, &mut graph, outer);
    rewrite_path_projections(block, &mut graph);

    Ok(graph)
}

fn collect_from_bindings(block: &QueryBlock) -> FromBindings {
    let mut bindings = FromBindings::new();
    for table_ref in &block.from {
        if let TableRef::Named(named) = table_ref {
            let alias = named
                .alias
                .clone()
                .unwrap_or_else(|| named.object.base.clone());
            bindings.insert(alias, named.object.clone());
        }
    }
    bindings
}

fn validate_match_clause(
    clause: &MatchClause,
    bindings: &FromBindings,
    metadata: &GraphMetaData,
) -> Result<(), PlannerError> {
    for path in &clause.paths {
        for (index, hop) in path.hops.iter().enumerate() {
            let next_alias = path
                .hops
                .get(index + 1)
                .map(|next| &next.node)
                .unwrap_or(&path.tail);

            let source = bound_node_table(&hop.node, bindings, metadata)?;
            let next = bound_node_table(next_alias, bindings, metadata)?;

            let column = &hop.edge.column;
            let declared = metadata.concrete_tables(&source).iter().any(|table| {
                metadata
                    .column(table, column)
                    .map(|c| matches!(c.role, ColumnRole::Edge | ColumnRole::EdgeView))
                    .unwrap_or(false)
            });
            if !declared {
                return Err(PlannerError::UnknownEdgeColumn {
                    column: column.to_string(),
                    table: source.to_string(),
                });
            }

            let edge_bindings = metadata.resolve_edge_bindings(&source, column);
            if edge_bindings.is_empty() {
                return Err(PlannerError::UnboundEdge {
                    column: column.to_string(),
                    table: source.to_string(),
                });
            }

            if let Some(max) = hop.edge.max_length {
                if hop.edge.min_length > max {
                    return Err(PlannerError::InvalidPathLength {
                        column: column.to_string(),
                        min: hop.edge.min_length,
                        max,
                    });
                }
            }

            // Every declared sink must name a node table (or view), and the
            // next node's candidate set must intersect the sink set.
            let mut sink_tables: Vec<ObjectKey> = Vec::new();
            for (table, bound_column) in &edge_bindings {
                let Some(info) = metadata
                    .column(table, bound_column)
                    .and_then(|c| c.edge_info.as_ref())
                else {
                    continue;
                };
                for sink in &info.sink_nodes {
                    let sink_key = ObjectKey::new(table.schema.clone(), sink.clone());
                    if !metadata.is_node_table(&sink_key) && !metadata.is_node_view(&sink_key) {
                        return Err(PlannerError::UnknownSinkTable {
                            column: column.to_string(),
                            sink: sink.to_string(),
                        });
                    }
                    sink_tables.extend(metadata.concrete_tables(&sink_key));
                }
            }
            let next_candidates = metadata.concrete_tables(&next);
            if next_candidates
                .iter()
                .all(|candidate| !sink_tables.contains(candidate))
            {
                return Err(PlannerError::UnreachableSink {
                    alias: next_alias.to_string(),
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn bound_node_table(
    alias: &Ident,
    bindings: &FromBindings,
    metadata: &GraphMetaData,
) -> Result<ObjectKey, PlannerError> {
    let object = bindings.get(alias).ok_or_else(|| PlannerError::NotANodeTable {
        alias: alias.to_string(),
    })?;
    let key = object.key();
    if !metadata.is_node_table(&key) && !metadata.is_node_view(&key) {
        return Err(PlannerError::NotANodeTable {
            alias: alias.to_string(),
        });
    }
    Ok(key)
}

fn get_or_create_node(
    graph: &mut MatchGraph,
    uf: &mut UnionFind,
    bindings: &FromBindings,
    alias: &Ident,
) -> NodeId {
    if let Some(id) = graph.node_by_alias(alias) {
        return id;
    }
    // Validation guarantees the binding exists.
    let table = bindings
        .get(alias)
        .cloned()
        .unwrap_or_else(|| ObjectName::bare(alias.clone()));
    let table = ObjectName::qualified(table.schema_or_default(), table.base);
    let id = graph.add_node(MatchNode {
        alias: alias.clone(),
        table,
        neighbors: Vec::new(),
        external: false,
        predicates: Vec::new(),
        estimated_rows: 0.0,
        table_row_count: 0,
        global_node_id_density: 0.0,
    });
    let uf_index = uf.push();
    debug_assert_eq!(uf_index, id.index());
    id
}

fn build_components(graph: &mut MatchGraph, uf: &mut UnionFind) {
    let mut root_to_component: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<ConnectedComponent> = Vec::new();

    let node_count = graph.node_count();
    for index in 0..node_count {
        let root = uf.find(index);
        let slot = *root_to_component.entry(root).or_insert_with(|| {
            components.push(ConnectedComponent::default());
            components.len() - 1
        });
        components[slot].nodes.push(NodeId(index));
    }
    for (edge_id, edge) in graph.edges() {
        let root = uf.find(edge.source.index());
        let slot = root_to_component[&root];
        components[slot].edges.push(edge_id);
    }
    graph.components = components;
}

/// Rewrite references that qualify columns by an edge-column name to the
/// (unique) assigned edge alias. More than one candidate is an error.
fn replace_edge_column_references(
    block: &mut QueryBlock,
    graph: &MatchGraph,
    edge_column_to_aliases: &HashMap<Ident, Vec<Ident>>,
) -> Result<(), PlannerError> {
    let mut failure: Option<PlannerError> = None;
    let mut rewrite = |column_ref: &mut crate::sql_ast::ColumnRef| {
        if failure.is_some() {
            return;
        }
        let Some(qualifier) = column_ref.qualifier().cloned() else {
            return;
        };
        // A qualifier that already names a node or an edge stays untouched.
        if graph.node_by_alias(&qualifier).is_some() || graph.edge_by_alias(&qualifier).is_some()
        {
            return;
        }
        let Some(aliases) = edge_column_to_aliases.get(&qualifier) else {
            return;
        };
        if aliases.len() > 1 {
            failure = Some(PlannerError::AmbiguousEdgeReference {
                name: qualifier.to_string(),
                candidates: aliases
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
            return;
        }
        let position = column_ref.parts.len() - 2;
        column_ref.parts[position] = aliases[0].clone();
    };

    for item in &mut block.select.items {
        if let SelectItem::Expr { expr, .. } = item {
            expr.rewrite_column_refs(&mut rewrite);
        }
    }
    if let Some(where_clause) = &mut block.where_clause {
        where_clause.rewrite_column_refs(&mut rewrite);
    }

    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Remove FROM entries whose alias is inherited from an enclosing block,
/// rename the pattern node to `{alias}_inner`, and preserve the outer
/// reference as a node-identity join predicate.
fn rematerialize_external_aliases(
    block: &mut QueryBlock,
    graph: &mut MatchGraph,
    outer: &OuterScope,
) {
    if outer.is_empty() {
        return;
    }
    let node_count = graph.node_count();
    for index in 0..node_count {
        let id = NodeId(index);
        let alias = graph.node(id).alias.clone();
        if !outer.contains(&alias) {
            continue;
        }
        let inner_alias = Ident::new(format!("{}_inner", alias));
        log::debug!(
            "rematerializing external alias [{}] as [{}]",
            alias,
            inner_alias
        );
        block.from.retain(|table_ref| match table_ref {
            TableRef::Named(named) => {
                let bound = named
                    .alias
                    .clone()
                    .unwrap_or_else(|| named.object.base.clone());
                bound != alias
            }
            _ => true,
        });
        graph.rename_node(id, inner_alias.clone());
        graph.node_mut(id).external = true;
        block.append_where_conjunct(Expr::eq(
            Expr::Column(crate::sql_ast::ColumnRef::new(vec![
                alias.clone(),
                Ident::new(GLOBAL_NODE_ID),
            ])),
            Expr::Column(crate::sql_ast::ColumnRef::new(vec![
                inner_alias,
                Ident::new(GLOBAL_NODE_ID),
            ])),
        ));
    }
}

/// Replace `alias.*` projections of path edges with a decoder call over the
/// encoded path message plus the sink node's identity columns.
fn rewrite_path_projections(block: &mut QueryBlock, graph: &mut MatchGraph) {
    for item in &mut block.select.items {
        let SelectItem::QualifiedStar(alias) = item else {
            continue;
        };
        let alias = alias.clone();
        let Some(edge_id) = graph.edge_by_alias(&alias) else {
            continue;
        };
        if !graph.edge(edge_id).is_path() {
            continue;
        }
        let (decoder, args) = {
            let edge = graph.edge(edge_id);
            let sink_alias = edge
                .sink
                .map(|sink| graph.node(sink).alias.clone())
                .unwrap_or_else(|| alias.clone());
            let decoder = ObjectName::qualified(
                "dbo",
                format!(
                    "{}_{}_{}_PathMessageDecoder",
                    edge.bound_table.schema_or_default(),
                    edge.bound_table.base,
                    edge.column
                ),
            );
            let args = vec![
                Expr::Column(crate::sql_ast::ColumnRef::new(vec![
                    edge.alias.clone(),
                    Ident::new(PATH_MESSAGE),
                ])),
                Expr::Column(crate::sql_ast::ColumnRef::new(vec![
                    sink_alias.clone(),
                    Ident::new("_NodeType"),
                ])),
                Expr::Column(crate::sql_ast::ColumnRef::new(vec![
                    sink_alias,
                    Ident::new("_NodeId"),
                ])),
            ];
            (decoder, args)
        };
        if let Some(spec) = graph.edge_mut(edge_id).path_spec.as_mut() {
            spec.reference_path_info = true;
        }
        *item = SelectItem::Expr {
            expr: Expr::function(decoder, args),
            alias: Some(alias.clone()),
        };
    }
}

fn resolve_binding(
    cache: &mut HashMap<(ObjectKey, Ident), (ObjectKey, Ident)>,
    metadata: &GraphMetaData,
    source: &ObjectKey,
    column: &Ident,
) -> (ObjectKey, Ident) {
    let key = (source.clone(), column.clone());
    if let Some(bound) = cache.get(&key) {
        return bound.clone();
    }
    // Validation guarantees at least one concrete binding.
    let bound = metadata
        .resolve_edge_bindings(source, column)
        .into_iter()
        .next()
        .unwrap_or_else(|| (source.clone(), column.clone()));
    cache.insert(key, bound.clone());
    bound
}

/// Mark elidable tail nodes. Runs after predicate attachment so attached
/// predicates count as contributions.
pub fn mark_tails(graph: &mut MatchGraph, block: &QueryBlock) {
    let mut referenced: Vec<Ident> = Vec::new();
    let mut reference_everything = false;

    for item in &block.select.items {
        match item {
            SelectItem::Star => reference_everything = true,
            SelectItem::QualifiedStar(alias) => referenced.push(alias.clone()),
            SelectItem::Expr { expr, .. } => {
                expr.for_each_column_ref(&mut |column_ref| {
                    match column_ref.qualifier() {
                        Some(qualifier) => referenced.push(qualifier.clone()),
                        // An unqualified residual reference could belong to
                        // any table; give up on eliding.
                        None => reference_everything = true,
                    }
                });
            }
        }
    }
    if let Some(where_clause) = &block.where_clause {
        where_clause.for_each_column_ref(&mut |column_ref| match column_ref.qualifier() {
            Some(qualifier) => referenced.push(qualifier.clone()),
            None => reference_everything = true,
        });
    }

    if reference_everything {
        return;
    }

    let mut incoming: HashMap<NodeId, usize> = HashMap::new();
    for (_, edge) in graph.edges() {
        if let Some(sink) = edge.sink {
            *incoming.entry(sink).or_insert(0) += 1;
        }
    }

    let mut tails: Vec<NodeId> = Vec::new();
    for (id, node) in graph.nodes() {
        let terminates_an_edge = incoming.get(&id).copied().unwrap_or(0) > 0;
        if terminates_an_edge
            && node.neighbors.is_empty()
            && node.predicates.is_empty()
            && !node.external
            && !referenced.contains(&node.alias)
        {
            tails.push(id);
        }
    }
    for component in &mut graph.components {
        for &tail in &tails {
            if component.nodes.contains(&tail) {
                component.tails.insert(tail);
            }
        }
    }
    if !tails.is_empty() {
        log::debug!("{} tail node(s) elidable", tails.len());
    }
}
