use crate::utils::create_jobs;

use dashmap::DashMap;
use indicatif::ParallelProgressIterator;
use log::{info, warn};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;
use std::cmp::Ordering;

pub struct KnnGraph {
    /// Symmetric CSC adjacency matrix (n_nodes x n_nodes) holding similarities
    pub adjacency: CscMatrix<f64>,
    /// Sorted edge list (i < j), deduplicated
    pub edges: Vec<(usize, usize)>,
    /// Number of nodes
    pub n_nodes: usize,
}

pub struct KnnGraphArgs {
    pub knn: usize,
    pub block_size: usize,
    /// If true, keep only reciprocal edges (i→j AND j→i).
    /// If false, keep union edges (i→j OR j→i), using max similarity.
    pub reciprocal: bool,
}

/// Rank candidates by descending similarity, then by ascending
/// position in the caller's tie-break order
fn by_similarity_then_order(a: &(usize, f64), b: &(usize, f64), tie_order: &[usize]) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| tie_order[a.0].cmp(&tie_order[b.0]))
}

impl KnnGraph {
    /// Build a KNN graph from a dense similarity matrix.
    ///
    /// Row `i` ranks every other node `j` with `similarity[(i, j)] > 0`;
    /// the `knn` largest are kept. Equal similarities are resolved by
    /// `tie_order[j]` (smaller first), which must be a permutation
    /// of `0..n`, so the result does not depend on thread scheduling.
    ///
    /// * `similarity` - square matrix (n x n), larger means closer
    /// * `tie_order` - rank of each node in a fixed total order
    /// * `args` - KNN graph construction parameters
    pub fn from_similarity_rows(
        similarity: &DMatrix<f64>,
        tie_order: &[usize],
        args: KnnGraphArgs,
    ) -> anyhow::Result<KnnGraph> {
        let nn = similarity.nrows();

        if similarity.ncols() != nn {
            anyhow::bail!(
                "similarity must be square: {} x {}",
                similarity.nrows(),
                similarity.ncols()
            );
        }
        if tie_order.len() != nn {
            anyhow::bail!("tie order has {} entries for {} nodes", tie_order.len(), nn);
        }
        if args.knn == 0 {
            anyhow::bail!("knn must be positive");
        }

        let jobs = create_jobs(nn, args.block_size);
        let njobs = jobs.len() as u64;

        /////////////////////////////////////////////////////////////////
        // step 1: searching nearest neighbours                        //
        /////////////////////////////////////////////////////////////////

        let triplets: DashMap<(usize, usize), f64> = DashMap::new();

        jobs.into_par_iter()
            .progress_count(njobs)
            .for_each(|(lb, ub)| {
                for i in lb..ub {
                    let mut candidates: Vec<(usize, f64)> = similarity
                        .row(i)
                        .iter()
                        .enumerate()
                        .filter(|&(j, &s_ij)| j != i && s_ij.is_finite() && s_ij > 0.0)
                        .map(|(j, &s_ij)| (j, s_ij))
                        .collect();

                    candidates.sort_by(|a, b| by_similarity_then_order(a, b, tie_order));
                    candidates.truncate(args.knn);

                    for (j, s_ij) in candidates {
                        triplets.insert((i, j), s_ij);
                    }
                }
            });

        info!("{} triplets by kNN matching", triplets.len());

        if triplets.is_empty() {
            warn!("no positive similarity between any two nodes; the kNN graph is empty");
        }

        ///////////////////////////////////////////////////
        // step 2: edge filtering (reciprocal or union) //
        ///////////////////////////////////////////////////

        let mut edges: Vec<((usize, usize), f64)> = if args.reciprocal {
            // Intersection: keep (i,j) only if both i→j and j→i exist
            triplets
                .par_iter()
                .filter_map(|entry| {
                    let &(i, j) = entry.key();
                    if i < j {
                        triplets
                            .get(&(j, i))
                            .map(|s_ji| ((i, j), entry.value().max(*s_ji)))
                    } else {
                        None
                    }
                })
                .collect()
        } else {
            // Union: keep (i,j) if either i→j or j→i exists, max similarity
            triplets
                .par_iter()
                .filter_map(|entry| {
                    let &(i, j) = entry.key();
                    if i < j {
                        let s_ij = *entry.value();
                        let s_ji = triplets.get(&(j, i)).map(|e| *e).unwrap_or(s_ij);
                        Some(((i, j), s_ij.max(s_ji)))
                    } else if i > j && !triplets.contains_key(&(j, i)) {
                        // Only (i→j) exists with i > j; emit as canonical (j, i)
                        Some(((j, i), *entry.value()))
                    } else {
                        None
                    }
                })
                .collect()
        };

        edges.par_sort_by_key(|&(ij, _)| ij);
        edges.dedup_by_key(|&mut (ij, _)| ij);

        info!(
            "{} edges after {} matching",
            edges.len(),
            if args.reciprocal {
                "reciprocal"
            } else {
                "union"
            }
        );

        ///////////////////////////////////////////////
        // step 3: construct sparse network backbone //
        ///////////////////////////////////////////////

        let mut coo = CooMatrix::new(nn, nn);
        for &((i, j), v) in edges.iter() {
            coo.push(i, j, v);
            coo.push(j, i, v);
        }

        let adjacency = CscMatrix::from(&coo);

        let edge_pairs = edges.into_iter().map(|(ij, _)| ij).collect();

        Ok(KnnGraph {
            adjacency,
            edges: edge_pairs,
            n_nodes: nn,
        })
    }

    /// Get neighbors of a node from the CSC adjacency matrix
    pub fn neighbors(&self, node: usize) -> &[usize] {
        let offsets = self.adjacency.col_offsets();
        let start = offsets[node];
        let end = offsets[node + 1];
        &self.adjacency.row_indices()[start..end]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }
}
