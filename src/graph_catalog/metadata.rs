//! Process-scoped graph catalog metadata.
//!
//! [`GraphMetaData`] is loaded once per planner lifetime and read-only after
//! that; wrap it in an `Arc` to share across concurrent planner invocations.

use std::collections::{HashMap, HashSet};

use crate::utils::{Ident, ObjectKey};

/// Role of a column declared on a node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Property,
    Edge,
    EdgeView,
    NodeId,
}

impl ColumnRole {
    pub fn from_code(code: i64) -> Option<ColumnRole> {
        match code {
            0 => Some(ColumnRole::Property),
            1 => Some(ColumnRole::Edge),
            2 => Some(ColumnRole::EdgeView),
            3 => Some(ColumnRole::NodeId),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ColumnRole::Property => 0,
            ColumnRole::Edge => 1,
            ColumnRole::EdgeView => 2,
            ColumnRole::NodeId => 3,
        }
    }
}

/// Edge-specific metadata of an edge or edge-view column.
///
/// `sink_nodes` keeps insertion order: edge-view sink resolution reads the
/// first declared sink, on the assumption that a concrete edge declares a
/// single sink table.
#[derive(Debug, Clone, Default)]
pub struct EdgeInfo {
    pub sink_nodes: Vec<Ident>,
    /// For edge views: the (source table, edge column) pairs behind the view.
    pub edge_columns: Option<Vec<(Ident, Ident)>>,
    pub column_attributes: Vec<String>,
}

impl EdgeInfo {
    pub fn add_sink(&mut self, sink: Ident) {
        if !self.sink_nodes.contains(&sink) {
            self.sink_nodes.push(sink);
        }
    }

    pub fn first_sink(&self) -> Option<&Ident> {
        self.sink_nodes.first()
    }
}

#[derive(Debug, Clone)]
pub struct NodeColumns {
    pub role: ColumnRole,
    pub edge_info: Option<EdgeInfo>,
}

impl NodeColumns {
    pub fn property() -> Self {
        NodeColumns {
            role: ColumnRole::Property,
            edge_info: None,
        }
    }

    pub fn node_id() -> Self {
        NodeColumns {
            role: ColumnRole::NodeId,
            edge_info: None,
        }
    }

    pub fn edge(info: EdgeInfo) -> Self {
        NodeColumns {
            role: ColumnRole::Edge,
            edge_info: Some(info),
        }
    }

    pub fn edge_view(info: EdgeInfo) -> Self {
        NodeColumns {
            role: ColumnRole::EdgeView,
            edge_info: Some(info),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphMetaData {
    columns_of_node_tables: HashMap<ObjectKey, HashMap<Ident, NodeColumns>>,
    node_view_mapping: HashMap<ObjectKey, HashSet<Ident>>,
}

impl GraphMetaData {
    pub fn new() -> Self {
        GraphMetaData::default()
    }

    pub fn add_node_column(
        &mut self,
        table: ObjectKey,
        column: impl Into<Ident>,
        columns: NodeColumns,
    ) {
        self.columns_of_node_tables
            .entry(table)
            .or_default()
            .insert(column.into(), columns);
    }

    pub fn add_node_view(&mut self, view: ObjectKey, concrete_table: impl Into<Ident>) {
        self.node_view_mapping
            .entry(view)
            .or_default()
            .insert(concrete_table.into());
    }

    pub fn is_node_table(&self, key: &ObjectKey) -> bool {
        self.columns_of_node_tables.contains_key(key)
    }

    pub fn is_node_view(&self, key: &ObjectKey) -> bool {
        self.node_view_mapping.contains_key(key)
    }

    pub fn node_table_columns(&self, key: &ObjectKey) -> Option<&HashMap<Ident, NodeColumns>> {
        self.columns_of_node_tables.get(key)
    }

    pub fn column(&self, key: &ObjectKey, column: &Ident) -> Option<&NodeColumns> {
        self.columns_of_node_tables.get(key)?.get(column)
    }

    pub(crate) fn column_mut(
        &mut self,
        key: &ObjectKey,
        column: &Ident,
    ) -> Option<&mut NodeColumns> {
        self.columns_of_node_tables.get_mut(key)?.get_mut(column)
    }

    pub(crate) fn column_entry(
        &mut self,
        key: ObjectKey,
        column: Ident,
        default: impl FnOnce() -> NodeColumns,
    ) -> &mut NodeColumns {
        self.columns_of_node_tables
            .entry(key)
            .or_default()
            .entry(column)
            .or_insert_with(default)
    }

    pub fn node_view(&self, key: &ObjectKey) -> Option<&HashSet<Ident>> {
        self.node_view_mapping.get(key)
    }

    pub fn node_table_count(&self) -> usize {
        self.columns_of_node_tables.len()
    }

    pub fn node_view_count(&self) -> usize {
        self.node_view_mapping.len()
    }

    /// Concrete node tables behind `key`: the view's members in sorted order,
    /// or the table itself when it is already concrete.
    pub fn concrete_tables(&self, key: &ObjectKey) -> Vec<ObjectKey> {
        if let Some(members) = self.node_view_mapping.get(key) {
            let mut tables: Vec<ObjectKey> = members
                .iter()
                .map(|name| ObjectKey::new(key.schema.clone(), name.clone()))
                .collect();
            tables.sort();
            tables
        } else if self.is_node_table(key) {
            vec![key.clone()]
        } else {
            Vec::new()
        }
    }

    /// Resolve `column` on `key` down to concrete (table, edge column) pairs,
    /// following node-view and edge-view indirection.
    pub fn resolve_edge_bindings(&self, key: &ObjectKey, column: &Ident) -> Vec<(ObjectKey, Ident)> {
        let mut bindings = Vec::new();
        for table in self.concrete_tables(key) {
            let Some(node_column) = self.column(&table, column) else {
                continue;
            };
            match node_column.role {
                ColumnRole::Edge => bindings.push((table.clone(), column.clone())),
                ColumnRole::EdgeView => {
                    if let Some(info) = &node_column.edge_info {
                        if let Some(edge_columns) = &info.edge_columns {
                            for (source_table, edge_column) in edge_columns {
                                bindings.push((
                                    ObjectKey::new(table.schema.clone(), source_table.clone()),
                                    edge_column.clone(),
                                ));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        bindings
    }
}
