//! Catalog loader.
//!
//! One union-all probe over the catalog collections builds the whole
//! [`GraphMetaData`]. Rows arrive in ascending `ColumnId` order, which
//! guarantees that by the time an edge-view mapping row is consumed its
//! component edge columns are already loaded; the loader keeps a
//! column-id side index for that resolution. A load failure is fatal.

use std::collections::HashMap;

use super::errors::GraphCatalogError;
use super::metadata::{ColumnRole, EdgeInfo, GraphMetaData, NodeColumns};
use super::probe::CatalogProbe;
use crate::utils::{Ident, ObjectKey};

pub const NODE_TABLE_COLLECTION: &str = "_NodeTableCollection";
pub const NODE_TABLE_COLUMN_COLLECTION: &str = "_NodeTableColumnCollection";
pub const EDGE_ATTRIBUTE_COLLECTION: &str = "_EdgeAttributeCollection";
pub const EDGE_DEGREE_COLLECTION: &str = "_EdgeAverageDegreeCollection";
pub const NODE_VIEW_COLUMN_COLLECTION: &str = "_NodeViewColumnCollection";
pub const NODE_VIEW_COLLECTION: &str = "_NodeViewCollection";

const ROLE_EDGE_ATTRIBUTE: i64 = -1;
const ROLE_NODE_VIEW: i64 = -2;
const ROLE_EDGE_VIEW: i64 = -3;

/// The union probe. Role tagging matches [`CatalogRow`](super::CatalogRow):
/// node-table columns carry their role code, the other collections carry the
/// negative markers.
pub fn catalog_probe_sql() -> String {
    format!(
        "SELECT ColumnRole AS role, TableSchema AS table_schema, TableName AS table_name, \
         ColumnName AS column_name, Reference AS reference, ColumnId AS column_id \
         FROM {columns} \
         UNION ALL \
         SELECT {attr} AS role, TableSchema, TableName, ColumnName, AttributeName, AttributeId \
         FROM {attributes} \
         UNION ALL \
         SELECT {node_view} AS role, v.TableSchema, v.TableName, '', t.TableName, v.NodeViewTableId \
         FROM {node_views} AS v JOIN {tables} AS t ON v.TableId = t.TableId \
         UNION ALL \
         SELECT {edge_view} AS role, TableSchema, TableName, ColumnName, '', ColumnId \
         FROM {edge_views} \
         ORDER BY column_id ASC",
        columns = NODE_TABLE_COLUMN_COLLECTION,
        attributes = EDGE_ATTRIBUTE_COLLECTION,
        node_views = NODE_VIEW_COLLECTION,
        tables = NODE_TABLE_COLLECTION,
        edge_views = NODE_VIEW_COLUMN_COLLECTION,
        attr = ROLE_EDGE_ATTRIBUTE,
        node_view = ROLE_NODE_VIEW,
        edge_view = ROLE_EDGE_VIEW,
    )
}

pub async fn load_graph_metadata(
    probe: &dyn CatalogProbe,
) -> Result<GraphMetaData, GraphCatalogError> {
    let rows = probe.catalog_rows(&catalog_probe_sql()).await?;
    let mut meta = GraphMetaData::new();
    // ColumnId -> (table, column) for edge-view resolution.
    let mut columns_by_id: HashMap<i64, (ObjectKey, Ident)> = HashMap::new();

    for row in rows {
        let table = ObjectKey::new(row.table_schema.as_str(), row.table_name.as_str());
        match row.role {
            role if role >= 0 => {
                let column_role = ColumnRole::from_code(role).ok_or_else(|| {
                    GraphCatalogError::UnknownRole {
                        role,
                        schema: row.table_schema.clone(),
                        table: row.table_name.clone(),
                        column: row.column_name.clone(),
                    }
                })?;
                let column = Ident::new(row.column_name.as_str());
                columns_by_id.insert(row.column_id, (table.clone(), column.clone()));
                match column_role {
                    ColumnRole::Edge => {
                        // An edge column repeats once per declared sink.
                        if let Some(existing) = meta.column_mut(&table, &column) {
                            if let Some(info) = existing.edge_info.as_mut() {
                                info.add_sink(Ident::new(row.reference.as_str()));
                                continue;
                            }
                        }
                        let mut info = EdgeInfo::default();
                        info.add_sink(Ident::new(row.reference.as_str()));
                        meta.add_node_column(table, column, NodeColumns::edge(info));
                    }
                    ColumnRole::EdgeView => {
                        // The mapping rows for this view column may already
                        // have created the entry; keep what they collected.
                        let entry = meta.column_entry(table, column, || {
                            NodeColumns::edge_view(EdgeInfo {
                                edge_columns: Some(Vec::new()),
                                ..EdgeInfo::default()
                            })
                        });
                        entry.role = ColumnRole::EdgeView;
                    }
                    ColumnRole::NodeId => {
                        meta.add_node_column(table, column, NodeColumns::node_id());
                    }
                    ColumnRole::Property => {
                        meta.add_node_column(table, column, NodeColumns::property());
                    }
                }
            }
            ROLE_EDGE_ATTRIBUTE => {
                let column = Ident::new(row.column_name.as_str());
                let node_column = meta.column_mut(&table, &column).ok_or_else(|| {
                    GraphCatalogError::DanglingAttribute {
                        schema: row.table_schema.clone(),
                        table: row.table_name.clone(),
                        column: row.column_name.clone(),
                        attribute: row.reference.clone(),
                    }
                })?;
                let info =
                    node_column
                        .edge_info
                        .as_mut()
                        .ok_or_else(|| GraphCatalogError::DanglingAttribute {
                            schema: row.table_schema.clone(),
                            table: row.table_name.clone(),
                            column: row.column_name.clone(),
                            attribute: row.reference.clone(),
                        })?;
                info.column_attributes.push(row.reference);
            }
            ROLE_NODE_VIEW => {
                meta.add_node_view(table, Ident::new(row.reference.as_str()));
            }
            ROLE_EDGE_VIEW => {
                // The view column's component edge, loaded earlier by id.
                let (component_table, component_column) = columns_by_id
                    .get(&row.column_id)
                    .cloned()
                    .ok_or(GraphCatalogError::DanglingEdgeViewComponent {
                        column_id: row.column_id,
                    })?;
                let component_info = meta
                    .column(&component_table, &component_column)
                    .filter(|c| c.role == ColumnRole::Edge)
                    .and_then(|c| c.edge_info.clone())
                    .ok_or_else(|| GraphCatalogError::NotAnEdgeColumn {
                        schema: component_table.schema.to_string(),
                        table: component_table.name.to_string(),
                        column: component_column.to_string(),
                    })?;
                let view_column = Ident::new(row.column_name.as_str());
                // Mapping rows are ordered by component id and may precede
                // the view column's own row.
                let view_entry = meta.column_entry(table, view_column, || {
                    NodeColumns::edge_view(EdgeInfo {
                        edge_columns: Some(Vec::new()),
                        ..EdgeInfo::default()
                    })
                });
                let view_info = view_entry.edge_info.get_or_insert_with(|| EdgeInfo {
                    edge_columns: Some(Vec::new()),
                    ..EdgeInfo::default()
                });
                if let Some(sink) = component_info.first_sink() {
                    view_info.add_sink(sink.clone());
                }
                view_info
                    .edge_columns
                    .get_or_insert_with(Vec::new)
                    .push((component_table.name.clone(), component_column));
            }
            role => {
                return Err(GraphCatalogError::UnknownRole {
                    role,
                    schema: row.table_schema,
                    table: row.table_name,
                    column: row.column_name,
                })
            }
        }
    }

    log::debug!(
        "graph catalog loaded: {} node tables, {} node views",
        meta.node_table_count(),
        meta.node_view_count()
    );
    Ok(meta)
}
