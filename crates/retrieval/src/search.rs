//! Nearest-neighbour scans over the loaded matrix.

use std::{cmp::Ordering, sync::Arc};

use crate::{embeddings::dot, quantize::QuantizedMatrix, store::EmbeddingMatrix};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub score: f32,
}

/// Similarity search over the rows of one index.
pub trait NeighborSearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return up to `limit` rows ordered by exact cosine similarity
    /// (descending, ties by row). `allowed` restricts the rows considered.
    fn search(&self, query: &[f32], limit: usize, allowed: Option<&[usize]>) -> Vec<Neighbor>;
}

/// Brute-force scan of every row.
pub struct ExactScan {
    matrix: Arc<EmbeddingMatrix>,
}

impl ExactScan {
    pub fn new(matrix: Arc<EmbeddingMatrix>) -> Self {
        Self { matrix }
    }
}

impl NeighborSearch for ExactScan {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn search(&self, query: &[f32], limit: usize, allowed: Option<&[usize]>) -> Vec<Neighbor> {
        let mut hits: Vec<Neighbor> = candidate_rows(self.matrix.rows(), allowed)
            .map(|row| Neighbor {
                row,
                score: dot(query, self.matrix.row(row)),
            })
            .collect();
        rank(&mut hits, limit);
        hits
    }
}

/// Int8 scan for a shortlist, then exact rescoring of the shortlist.
///
/// A row is dropped only when its approximate score plus its error bound
/// falls below the `limit`-th largest lower bound, so no row of the exact
/// top `limit` is ever lost.
pub struct QuantizedScan {
    matrix: Arc<EmbeddingMatrix>,
    quantized: QuantizedMatrix,
}

impl QuantizedScan {
    pub fn new(matrix: Arc<EmbeddingMatrix>, quantized: QuantizedMatrix) -> Self {
        Self { matrix, quantized }
    }

    fn shortlist(&self, query: &[f32], limit: usize, allowed: Option<&[usize]>) -> Vec<usize> {
        let query_l1: f32 = query.iter().map(|x| x.abs()).sum();
        let approx: Vec<(usize, f32, f32)> = candidate_rows(self.quantized.rows(), allowed)
            .map(|row| {
                (
                    row,
                    self.quantized.approx_dot(query, row),
                    self.quantized.error_bound(row, query_l1),
                )
            })
            .collect();
        if approx.len() <= limit {
            return approx.into_iter().map(|(row, ..)| row).collect();
        }

        let mut lower: Vec<f32> = approx.iter().map(|(_, score, bound)| score - bound).collect();
        let (_, &mut threshold, _) = lower.select_nth_unstable_by(limit - 1, |a, b| b.total_cmp(a));
        approx
            .into_iter()
            .filter(|(_, score, bound)| score + bound >= threshold)
            .map(|(row, ..)| row)
            .collect()
    }
}

impl NeighborSearch for QuantizedScan {
    fn name(&self) -> &'static str {
        "quantized"
    }

    fn search(&self, query: &[f32], limit: usize, allowed: Option<&[usize]>) -> Vec<Neighbor> {
        if limit == 0 {
            return Vec::new();
        }
        let mut hits: Vec<Neighbor> = self
            .shortlist(query, limit, allowed)
            .into_iter()
            .map(|row| Neighbor {
                row,
                score: dot(query, self.matrix.row(row)),
            })
            .collect();
        rank(&mut hits, limit);
        hits
    }
}

/// Pick the quantized scan when its matrix is available and matches.
pub fn select_strategy(
    matrix: Arc<EmbeddingMatrix>,
    quantized: Option<QuantizedMatrix>,
) -> Box<dyn NeighborSearch> {
    match quantized {
        Some(q) if q.rows() == matrix.rows() && q.dim() == matrix.dim() => {
            Box::new(QuantizedScan::new(matrix, q))
        },
        _ => Box::new(ExactScan::new(matrix)),
    }
}

fn candidate_rows(rows: usize, allowed: Option<&[usize]>) -> Box<dyn Iterator<Item = usize> + '_> {
    match allowed {
        Some(subset) => Box::new(subset.iter().copied().filter(move |&r| r < rows)),
        None => Box::new(0..rows),
    }
}

fn rank(hits: &mut Vec<Neighbor>, limit: usize) {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.row.cmp(&b.row),
        other => other,
    });
    hits.truncate(limit);
}

#[cfg(test)]
mod tests {
    use {super::*, crate::embeddings::l2_normalize};

    fn matrix() -> Arc<EmbeddingMatrix> {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.9, 0.1, 0.0],
        ]
        .into_iter()
        .map(|mut r| {
            l2_normalize(&mut r);
            r
        })
        .collect();
        Arc::new(EmbeddingMatrix::from_rows(3, rows).unwrap())
    }

    #[test]
    fn exact_scan_orders_by_similarity() {
        let scan = ExactScan::new(matrix());
        let hits = scan.search(&[1.0, 0.0, 0.0], 3, None);
        let rows: Vec<_> = hits.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![0, 4, 2]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn allowed_rows_restrict_candidates() {
        let scan = ExactScan::new(matrix());
        let hits = scan.search(&[1.0, 0.0, 0.0], 10, Some(&[1, 3, 99]));
        let rows: Vec<_> = hits.iter().map(|n| n.row).collect();
        // Rows 1 and 3 tie at zero; lower row wins.
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn quantized_scan_agrees_with_exact() {
        let m = matrix();
        let q = QuantizedMatrix::quantize(&m);
        let exact = ExactScan::new(m.clone());
        let fast = QuantizedScan::new(m, q);

        for query in [[1.0, 0.0, 0.0], [0.0, 0.6, 0.8], [0.6, 0.8, 0.0]] {
            let a: Vec<_> = exact.search(&query, 2, None).iter().map(|n| n.row).collect();
            let b: Vec<_> = fast.search(&query, 2, None).iter().map(|n| n.row).collect();
            assert_eq!(a, b, "query {query:?}");
        }
    }

    #[test]
    fn quantized_scan_keeps_narrow_winner() {
        // One row at cosine 0.5 among many at 0.499: int8 rounding alone
        // cannot separate them, the bound must keep the true best.
        let mut rows = vec![vec![0.5, 0.866_025_4]];
        rows.extend(std::iter::repeat_n(vec![0.499, 0.866_602], 25));
        let m = Arc::new(EmbeddingMatrix::from_rows(2, rows).unwrap());
        let exact = ExactScan::new(m.clone());
        let fast = QuantizedScan::new(m.clone(), QuantizedMatrix::quantize(&m));

        for limit in [1, 2, 5] {
            assert_eq!(
                fast.search(&[1.0, 0.0], limit, None),
                exact.search(&[1.0, 0.0], limit, None),
                "limit {limit}"
            );
        }
        assert_eq!(fast.search(&[1.0, 0.0], 1, None)[0].row, 0);
        assert!(fast.search(&[1.0, 0.0], 0, None).is_empty());
    }

    #[test]
    fn strategy_falls_back_without_quantized() {
        let m = matrix();
        assert_eq!(select_strategy(m.clone(), None).name(), "exact");
        let q = QuantizedMatrix::quantize(&m);
        assert_eq!(select_strategy(m, Some(q)).name(), "quantized");
    }
}
