//! End-to-end stratification: context, iterations, consensus

use crate::common::*;
use crate::consensus::{consensus_cluster, ConsensusResult};
use crate::driver::{run_iterations, Assignment, IterationFailure, NbsContext};
use crate::graph::GeneGraph;
use crate::knn_laplacian::{KnnLaplacian, SimilaritySource};
use crate::mutation::MutationMatrix;
use crate::params::NbsParams;
use crate::propagation::{build_kernel, PropagationConvergence, PropagationKernel};
use serde::Serialize;
use std::sync::atomic::AtomicBool;

#[derive(Debug)]
pub struct Stratification {
    pub consensus: ConsensusResult,
    pub assignments: Vec<Assignment>,
    /// failed iterations that stayed within `max_failed_iterations`
    pub failures: Vec<IterationFailure>,
}

#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub index: usize,
    pub seed: u64,
    pub stage: Option<Stage>,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct StratifySummary<'a> {
    pub params: &'a NbsParams,
    pub num_patients: usize,
    pub num_network_genes: usize,
    pub laplacian_edges: Option<usize>,
    pub kernel: &'a PropagationConvergence,
    pub completed_iterations: usize,
    pub tolerated_failures: Vec<FailureSummary>,
    pub unstable_iterations: usize,
    pub mean_nmf_iterations: f64,
    pub cluster_sizes: Vec<usize>,
}

/// Build the kernel and, when the smoothness term is on, the KNN
/// Laplacian; then join them with the mutations.
pub fn prepare_context(
    graph: &GeneGraph,
    mutations: MutationMatrix,
    params: &NbsParams,
) -> Result<NbsContext> {
    params.validate()?;
    let kernel = build_kernel(graph, &params.propagation)?;
    let laplacian = build_laplacian(graph, &kernel, params)?;
    NbsContext::new(mutations, kernel, laplacian)
}

/// The KNN Laplacian `params` asks for; none when `lambda = 0`
pub fn build_laplacian(
    graph: &GeneGraph,
    kernel: &PropagationKernel,
    params: &NbsParams,
) -> Result<Option<KnnLaplacian>> {
    if params.lambda <= 0.0 {
        info!("lambda = 0: factorizing without the network term");
        return Ok(None);
    }
    let laplacian = match params.knn.source {
        SimilaritySource::Influence => {
            KnnLaplacian::from_graph(graph, params.knn.gamma, &params.knn)?
        }
        SimilaritySource::Kernel => KnnLaplacian::from_kernel(kernel, &params.knn)?,
    };
    Ok(Some(laplacian))
}

/// Run every iteration and consolidate them by consensus clustering.
///
/// Fails on cancellation, or when more than `max_failed_iterations`
/// iterations fail, naming the first failed iteration.
pub fn stratify(ctx: &NbsContext, params: &NbsParams, cancel: &AtomicBool) -> Result<Stratification> {
    let mut report = run_iterations(ctx, params, cancel)?;

    if !report.cancelled.is_empty() {
        return Err(NbsError::Cancelled {
            cancelled: report.cancelled.len(),
            completed: report.assignments.len() + report.failures.len(),
        });
    }

    let nfailed = report.failures.len();
    if (nfailed > params.max_failed_iterations || report.assignments.is_empty())
        && !report.failures.is_empty()
    {
        log::error!(
            "{} of {} iterations failed (tolerating {})",
            nfailed,
            params.niter,
            params.max_failed_iterations
        );
        let first = report.failures.remove(0);
        return Err(first.into_error());
    }
    if nfailed > 0 {
        warn!("tolerating {} failed iterations", nfailed);
    }

    let consensus = consensus_cluster(
        &report.assignments,
        ctx.num_patients(),
        params.k,
        &params.consensus,
    )?;

    Ok(Stratification {
        consensus,
        assignments: report.assignments,
        failures: report.failures,
    })
}

impl Stratification {
    pub fn cluster_sizes(&self, k: usize) -> Vec<usize> {
        let mut sizes = vec![0; k];
        for &c in self.consensus.assignment.iter() {
            if c < k {
                sizes[c] += 1;
            }
        }
        sizes
    }

    pub fn summary<'a>(&self, ctx: &'a NbsContext, params: &'a NbsParams) -> StratifySummary<'a> {
        let completed = self.assignments.len();
        let mean_nmf_iterations = if completed > 0 {
            self.assignments
                .iter()
                .map(|a| a.fit.iterations as f64)
                .sum::<f64>()
                / completed as f64
        } else {
            0.0
        };

        StratifySummary {
            params,
            num_patients: ctx.num_patients(),
            num_network_genes: ctx.kernel().genes().len(),
            laplacian_edges: ctx.laplacian().map(|l| l.num_edges()),
            kernel: ctx.kernel().convergence(),
            completed_iterations: completed,
            tolerated_failures: self
                .failures
                .iter()
                .map(|f| FailureSummary {
                    index: f.index,
                    seed: f.seed,
                    stage: f.error.stage(),
                    error: f.error.to_string(),
                })
                .collect(),
            unstable_iterations: self
                .assignments
                .iter()
                .filter(|a| a.fit.instability_events > 0)
                .count(),
            mean_nmf_iterations,
            cluster_sizes: self.cluster_sizes(params.k),
        }
    }
}
