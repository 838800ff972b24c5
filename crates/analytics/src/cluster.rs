//! Centroid-based partitioning over numeric feature columns.
//!
//! A k-means variant with deterministic seeding so cluster assignment is
//! stable for identical input and `k`: initial centroids are the normalized
//! rows at evenly spaced positions, and iteration order never depends on
//! hashing. Features are min-max normalized so differently scaled columns
//! carry equal weight.

use serde::{Deserialize, Serialize};
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAssignment {
    pub data_index: usize,
    pub cluster_id: usize,
}

/// Partition `rows` (one feature vector per row) into `k` clusters.
///
/// Fails with `InvalidK` if `k < 2` or `k` exceeds the row count.
pub fn cluster(rows: &[Vec<f64>], k: usize) -> Result<Vec<ClusterAssignment>> {
    if k < 2 || k > rows.len() {
        return Err(
            VantageError::new(
                ErrorCode::InvalidK,
                format!("k must be in [2, {}], got {}", rows.len(), k),
            )
            .with_context(ErrorContext::Analytics {
                operation: "cluster".to_string(),
                required: Some(2),
                actual: Some(k),
                column: None,
            }),
        );
    }

    let normalized = normalize(rows);
    let dims = normalized[0].len();

    // Evenly spaced seeds across the row range.
    let mut centroids: Vec<Vec<f64>> = (0..k)
        .map(|i| normalized[i * (normalized.len() - 1) / (k - 1).max(1)].clone())
        .collect();

    let mut assignments = vec![0usize; normalized.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, row) in normalized.iter().enumerate() {
            let nearest = nearest_centroid(row, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Recompute centroids; an emptied cluster keeps its previous position.
        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (row, &a) in normalized.iter().zip(assignments.iter()) {
            counts[a] += 1;
            for (s, v) in sums[a].iter_mut().zip(row.iter()) {
                *s += v;
            }
        }
        for (c, (sum, &count)) in centroids.iter_mut().zip(sums.iter().zip(counts.iter())) {
            if count > 0 {
                for (cv, sv) in c.iter_mut().zip(sum.iter()) {
                    *cv = sv / count as f64;
                }
            }
        }
    }

    Ok(assignments
        .into_iter()
        .enumerate()
        .map(|(data_index, cluster_id)| ClusterAssignment {
            data_index,
            cluster_id,
        })
        .collect())
}

fn nearest_centroid(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let dist: f64 = row
            .iter()
            .zip(c.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Min-max normalize each feature column to [0, 1]. Constant columns map
/// to 0 so they contribute nothing to distance.
fn normalize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut mins = vec![f64::INFINITY; dims];
    let mut maxs = vec![f64::NEG_INFINITY; dims];
    for row in rows {
        for (d, &v) in row.iter().enumerate() {
            mins[d] = mins[d].min(v);
            maxs[d] = maxs[d].max(v);
        }
    }

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(d, &v)| {
                    let range = maxs[d] - mins[d];
                    if range == 0.0 {
                        0.0
                    } else {
                        (v - mins[d]) / range
                    }
                })
                .collect()
        })
        .collect()
}
