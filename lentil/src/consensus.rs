//! Consensus clustering of per-iteration assignments

use crate::common::*;
use crate::driver::Assignment;
use crate::params::ConsensusOptions;
use matrix_util::clustering::{Dendrogram, Hclust};
use serde::{Deserialize, Serialize};

/// Dissimilarity the dendrogram is built on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusDistance {
    /// `1 - C`
    #[default]
    OneMinus,
    /// Euclidean distance between rows of `C`
    Euclidean,
}

#[derive(Clone, Debug)]
pub struct ConsensusResult {
    /// fraction of co-sampled iterations two patients shared a cluster
    pub consensus: Mat,
    pub co_clustering: Mat,
    pub co_sampling: Mat,
    pub dendrogram: Dendrogram,
    /// final label `0..k` of every patient
    pub assignment: Vec<usize>,
}

/// Co-clustering and co-sampling counts, diagonal included
fn count_pairs(assignments: &[Assignment], n: usize) -> (Mat, Mat) {
    let zeros = move || (Mat::zeros(n, n), Mat::zeros(n, n));
    assignments
        .par_iter()
        .fold(zeros, |(mut co_cluster, mut co_sample), a| {
            for (s, (&i, &c_i)) in a.patients.iter().zip(a.labels.iter()).enumerate() {
                co_sample[(i, i)] += 1.0;
                co_cluster[(i, i)] += 1.0;
                for (&j, &c_j) in a.patients[(s + 1)..].iter().zip(a.labels[(s + 1)..].iter()) {
                    let (lo, hi) = (i.min(j), i.max(j));
                    co_sample[(lo, hi)] += 1.0;
                    if c_i == c_j {
                        co_cluster[(lo, hi)] += 1.0;
                    }
                }
            }
            (co_cluster, co_sample)
        })
        .reduce(zeros, |(a_cl, a_sa), (b_cl, b_sa)| (a_cl + b_cl, a_sa + b_sa))
}

fn mirror_upper(x: &mut Mat) {
    let n = x.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            x[(i, j)] = x[(j, i)];
        }
    }
}

/// Aggregate `assignments` over `n_patients` and cut an agglomerative
/// tree of the consensus into exactly `k` clusters.
///
/// The result does not depend on the order of `assignments`.
pub fn consensus_cluster(
    assignments: &[Assignment],
    n_patients: usize,
    k: usize,
    options: &ConsensusOptions,
) -> Result<ConsensusResult> {
    if k == 0 || k > n_patients {
        return Err(NbsError::invalid(
            "k",
            format!("cannot cut {} patients into {} clusters", n_patients, k),
        ));
    }
    for a in assignments {
        if a.patients.len() != a.labels.len() {
            return Err(NbsError::invalid(
                "assignments",
                format!(
                    "iteration {} has {} patients and {} labels",
                    a.index,
                    a.patients.len(),
                    a.labels.len()
                ),
            ));
        }
        if let Some(&i) = a.patients.iter().find(|&&i| i >= n_patients) {
            return Err(NbsError::invalid(
                "assignments",
                format!("iteration {} refers to patient {} of {}", a.index, i, n_patients),
            ));
        }
    }

    let (mut co_clustering, mut co_sampling) = count_pairs(assignments, n_patients);

    let mut consensus = Mat::identity(n_patients, n_patients);
    for j in 0..n_patients {
        for i in 0..j {
            let sampled = co_sampling[(i, j)];
            if sampled > 0.0 {
                consensus[(i, j)] = co_clustering[(i, j)] / sampled;
            }
        }
    }
    mirror_upper(&mut consensus);
    mirror_upper(&mut co_clustering);
    mirror_upper(&mut co_sampling);

    let never = (0..n_patients)
        .filter(|&i| co_sampling[(i, i)] == 0.0)
        .count();
    if never > 0 {
        warn!("{} patients were never kept in any iteration", never);
    }

    let dissimilarity = match options.distance {
        ConsensusDistance::OneMinus => consensus.map(|c| 1.0 - c),
        ConsensusDistance::Euclidean => Mat::from_fn(n_patients, n_patients, |i, j| {
            (consensus.row(i) - consensus.row(j)).norm()
        }),
    };

    let dendrogram = dissimilarity
        .hclust(options.linkage)
        .map_err(|e| NbsError::invalid("consensus", e.to_string()))?;
    let assignment = dendrogram
        .cut(k)
        .map_err(|e| NbsError::invalid("k", e.to_string()))?;

    info!(
        "consensus over {} iterations: {} patients in {} clusters",
        assignments.len(),
        n_patients,
        k
    );

    Ok(ConsensusResult {
        consensus,
        co_clustering,
        co_sampling,
        dendrogram,
        assignment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FitSummary;
    use approx::assert_abs_diff_eq;

    fn assignment(index: usize, patients: &[usize], labels: &[usize]) -> Assignment {
        Assignment {
            index,
            seed: index as u64,
            patients: patients.to_vec(),
            labels: labels.to_vec(),
            fit: FitSummary {
                iterations: 0,
                objective: 0.0,
                residual: 0.0,
                converged: true,
                instability_events: 0,
            },
            propagation_converged: true,
        }
    }

    #[test]
    fn test_half_agreement() {
        let runs = vec![assignment(0, &[0, 1], &[0, 1]), assignment(1, &[0, 1], &[0, 0])];
        let out = consensus_cluster(&runs, 2, 1, &ConsensusOptions::default()).unwrap();
        assert_abs_diff_eq!(out.consensus[(0, 1)], 0.5);
        assert_abs_diff_eq!(out.consensus[(1, 0)], 0.5);
        assert_eq!(out.co_sampling[(0, 1)], 2.0);
        assert_eq!(out.co_clustering[(0, 1)], 1.0);
        assert_eq!(out.assignment, vec![0, 0]);
    }

    #[test]
    fn test_never_co_sampled_is_zero() {
        let runs = vec![assignment(0, &[0, 1], &[0, 0]), assignment(1, &[2], &[1])];
        let out = consensus_cluster(&runs, 4, 2, &ConsensusOptions::default()).unwrap();
        assert_eq!(out.consensus[(0, 2)], 0.0);
        assert_eq!(out.consensus[(3, 3)], 1.0);
        assert_eq!(out.consensus[(0, 1)], 1.0);
    }

    #[test]
    fn test_out_of_range_inputs() {
        let runs = vec![assignment(0, &[0, 5], &[0, 1])];
        assert!(consensus_cluster(&runs, 3, 2, &ConsensusOptions::default()).is_err());

        let runs = vec![assignment(0, &[0, 1], &[0, 1])];
        assert!(matches!(
            consensus_cluster(&runs, 2, 3, &ConsensusOptions::default()),
            Err(NbsError::InvalidParameter { name: "k", .. })
        ));
    }
}
