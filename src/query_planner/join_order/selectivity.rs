//! Join selectivity for edges that close a cycle onto an already
//! materialized node.

use crate::query_planner::match_graph::{MatchEdge, MatchNode};

/// Selectivity of joining `edge`'s sink side against `sink`'s node-id
/// column: the histogram hit fraction scaled by the sink's primary-key
/// density, or the bare density when no histogram was sampled.
pub fn joint_edge_selectivity(edge: &MatchEdge, sink: &MatchNode) -> f64 {
    let density = if sink.global_node_id_density > 0.0 {
        sink.global_node_id_density.min(1.0)
    } else {
        1.0
    };
    let stats = &edge.statistics;
    if stats.histogram.is_empty() || stats.row_count == 0 {
        return density;
    }
    let hits: f64 = stats.histogram.values().map(|(frequency, _)| *frequency).sum();
    let hit_fraction = (hits / stats.row_count as f64).min(1.0);
    (hit_fraction * density).max(f64::MIN_POSITIVE)
}
