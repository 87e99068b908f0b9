//! Agglomerative (hierarchical) clustering of a dissimilarity matrix
//!
//! Merges are found with the nearest-neighbour chain algorithm and
//! Lance-Williams distance updates, which is exact for the reducible
//! linkages offered here. The output follows the usual linkage-matrix
//! convention: leaves are `0..n`, the cluster created by the `i`-th
//! merge is `n + i`, and merges are sorted by distance.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// How the distance between two clusters is derived from their members
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum pairwise distance
    Single,
    /// Maximum pairwise distance
    Complete,
    /// Mean pairwise distance (UPGMA)
    #[default]
    Average,
    /// Mean of the two merged clusters' distances (WPGMA)
    Weighted,
}

impl Linkage {
    /// Lance-Williams update: distance from the merge of `x` and `y`
    /// to a third cluster `i`
    fn update(&self, d_xi: f64, d_yi: f64, n_x: usize, n_y: usize) -> f64 {
        match self {
            Linkage::Single => d_xi.min(d_yi),
            Linkage::Complete => d_xi.max(d_yi),
            Linkage::Average => {
                let (n_x, n_y) = (n_x as f64, n_y as f64);
                (n_x * d_xi + n_y * d_yi) / (n_x + n_y)
            }
            Linkage::Weighted => 0.5 * (d_xi + d_yi),
        }
    }
}

/// One agglomeration step
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Merge {
    /// smaller cluster id of the pair
    pub left: usize,
    /// larger cluster id of the pair
    pub right: usize,
    /// linkage distance at which they merged
    pub distance: f64,
    /// number of leaves in the new cluster
    pub size: usize,
}

/// A full agglomeration history over `n_leaves` items
#[derive(Clone, Debug, Serialize)]
pub struct Dendrogram {
    pub n_leaves: usize,
    pub merges: Vec<Merge>,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }
}

impl Dendrogram {
    /// Cut the tree so that exactly `k` clusters remain.
    ///
    /// Labels are `0..k`, numbered in order of each cluster's first
    /// member.
    pub fn cut(&self, k: usize) -> anyhow::Result<Vec<usize>> {
        let n = self.n_leaves;
        if k == 0 || k > n {
            anyhow::bail!("cannot cut {} leaves into {} clusters", n, k);
        }

        let mut uf = UnionFind::new(2 * n);
        for (step, merge) in self.merges.iter().take(n - k).enumerate() {
            let node = n + step;
            uf.parent[merge.left] = node;
            uf.parent[merge.right] = node;
        }

        let mut label_of_root = vec![usize::MAX; 2 * n];
        let mut next = 0;
        let mut labels = Vec::with_capacity(n);
        for leaf in 0..n {
            let root = uf.find(leaf);
            if label_of_root[root] == usize::MAX {
                label_of_root[root] = next;
                next += 1;
            }
            labels.push(label_of_root[root]);
        }
        Ok(labels)
    }
}

/// Hierarchical clustering of a square dissimilarity matrix
pub trait Hclust {
    fn hclust(&self, linkage: Linkage) -> anyhow::Result<Dendrogram>;
}

impl Hclust for DMatrix<f64> {
    fn hclust(&self, linkage: Linkage) -> anyhow::Result<Dendrogram> {
        let n = self.nrows();
        if self.ncols() != n {
            anyhow::bail!(
                "dissimilarity must be square: {} x {}",
                self.nrows(),
                self.ncols()
            );
        }
        if self.iter().any(|x| !x.is_finite()) {
            anyhow::bail!("dissimilarity has non-finite entries");
        }

        if n < 2 {
            return Ok(Dendrogram {
                n_leaves: n,
                merges: vec![],
            });
        }

        // row-major working copy, symmetrised from the upper triangle
        let mut dist = vec![0_f64; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self[(i, j)];
                dist[i * n + j] = d;
                dist[j * n + i] = d;
            }
        }

        let mut size = vec![1_usize; n];
        let mut active = vec![true; n];
        let mut chain: Vec<usize> = Vec::with_capacity(n);
        let mut raw: Vec<(usize, usize, f64, usize)> = Vec::with_capacity(n - 1);

        for _ in 0..(n - 1) {
            if chain.is_empty() {
                if let Some(first) = active.iter().position(|&a| a) {
                    chain.push(first);
                }
            }

            // grow the chain until two clusters are mutual nearest neighbours;
            // ties go to the chain predecessor, then to the smallest index
            let (x, y, d_xy) = loop {
                let x = chain[chain.len() - 1];
                let prev = if chain.len() > 1 {
                    Some(chain[chain.len() - 2])
                } else {
                    None
                };

                let (mut y, mut best) = match prev {
                    Some(p) => (p, dist[x * n + p]),
                    None => (usize::MAX, f64::INFINITY),
                };

                for i in 0..n {
                    if active[i] && i != x && dist[x * n + i] < best {
                        best = dist[x * n + i];
                        y = i;
                    }
                }

                if prev == Some(y) {
                    break (x, y, best);
                }
                chain.push(y);
            };

            chain.truncate(chain.len() - 2);

            // the merged cluster lives on in the larger slot
            let (x, y) = if x < y { (x, y) } else { (y, x) };
            let (n_x, n_y) = (size[x], size[y]);
            raw.push((x, y, d_xy, n_x + n_y));

            active[x] = false;
            for i in 0..n {
                if active[i] && i != y {
                    let d = linkage.update(dist[x * n + i], dist[y * n + i], n_x, n_y);
                    dist[i * n + y] = d;
                    dist[y * n + i] = d;
                }
            }
            size[y] = n_x + n_y;
        }

        // stable sort keeps dependent merges at equal height in order
        raw.sort_by(|a, b| a.2.total_cmp(&b.2));

        // relabel slots into cluster ids
        let mut uf = UnionFind::new(2 * n - 1);
        let mut merges = Vec::with_capacity(n - 1);
        for (step, &(x, y, d, sz)) in raw.iter().enumerate() {
            let rx = uf.find(x);
            let ry = uf.find(y);
            let node = n + step;
            uf.parent[rx] = node;
            uf.parent[ry] = node;
            merges.push(Merge {
                left: rx.min(ry),
                right: rx.max(ry),
                distance: d,
                size: sz,
            });
        }

        Ok(Dendrogram {
            n_leaves: n,
            merges,
        })
    }
}
