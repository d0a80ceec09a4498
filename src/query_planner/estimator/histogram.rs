//! Edge histogram construction from sampled sink ids.

use crate::query_planner::match_graph::EdgeStatistics;

/// Decode the sampled sink blob: consecutive little-endian 8-byte ids.
/// A trailing partial id is ignored.
pub fn decode_sink_sample(blob: &[u8]) -> Vec<i64> {
    blob.chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            i64::from_le_bytes(bytes)
        })
        .collect()
}

/// Runs of at least this many consecutive singleton ids collapse into one
/// range bucket.
const RANGE_RUN_THRESHOLD: usize = 3;

/// Rebuild the sink-side histogram of an edge from its sampled ids.
///
/// Ids with repeats become equality buckets keyed by their value. Runs of
/// consecutive singleton ids collapse into a range bucket keyed by the run's
/// upper bound, with the run length as frequency.
pub fn update_edge_histogram(stats: &mut EdgeStatistics, ids: &[i64]) {
    stats.histogram.clear();
    stats.row_count = ids.len() as u64;
    if ids.is_empty() {
        stats.max_value = 0;
        stats.density = 0.0;
        return;
    }

    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    stats.max_value = sorted[sorted.len() - 1];

    // (value, frequency) in ascending value order.
    let mut grouped: Vec<(i64, u64)> = Vec::new();
    for &id in &sorted {
        match grouped.last_mut() {
            Some((value, frequency)) if *value == id => *frequency += 1,
            _ => grouped.push((id, 1)),
        }
    }
    stats.density = 1.0 / grouped.len() as f64;
    stats.selectivity = grouped.len() as f64 / sorted.len() as f64;

    let mut run: Vec<i64> = Vec::new();
    let mut flush = |run: &mut Vec<i64>, histogram: &mut std::collections::HashMap<i64, (f64, bool)>| {
        if run.len() >= RANGE_RUN_THRESHOLD {
            let upper = run[run.len() - 1];
            histogram.insert(upper, (run.len() as f64, true));
        } else {
            for &value in run.iter() {
                histogram.insert(value, (1.0, false));
            }
        }
        run.clear();
    };

    for (value, frequency) in grouped {
        if frequency > 1 {
            flush(&mut run, &mut stats.histogram);
            stats.histogram.insert(value, (frequency as f64, false));
            continue;
        }
        match run.last() {
            Some(&last) if value == last + 1 => run.push(value),
            Some(_) => {
                flush(&mut run, &mut stats.histogram);
                run.push(value);
            }
            None => run.push(value),
        }
    }
    flush(&mut run, &mut stats.histogram);
}

/// Degree of a multi-hop path with per-hop degree `base` and length bounds
/// `[min, max]`. Unbounded paths have infinite degree. For shrinking paths
/// (`base <= 1`) the exponential formula degenerates, so the bounded
/// geometric mass is used instead.
pub fn path_degree(base: f64, min: u32, max: Option<u32>) -> f64 {
    let Some(max) = max else {
        return f64::INFINITY;
    };
    if base > 1.0 {
        let mut degree = base.powi(max as i32);
        if min > 0 {
            degree -= base.powi(min as i32 - 1);
        }
        degree
    } else {
        base.powi(min as i32) * (max.saturating_sub(min) + 1) as f64
    }
}
