pub mod errors;
pub mod loader;
pub mod metadata;
pub mod probe;

pub use errors::{GraphCatalogError, ProbeError};
pub use loader::load_graph_metadata;
pub use metadata::{ColumnRole, EdgeInfo, GraphMetaData, NodeColumns};
pub use probe::{CardinalityRow, CatalogProbe, CatalogRow, ClickHouseProbe, EdgeDegreeRow};
