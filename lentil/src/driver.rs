//! Independent subsample-propagate-factorize iterations over one
//! shared, read-only context

use crate::common::*;
use crate::knn_laplacian::KnnLaplacian;
use crate::mutation::MutationMatrix;
use crate::netnmf::{factorize, Factorization};
use crate::params::NbsParams;
use crate::propagation::PropagationKernel;
use crate::quantile::quantile_normalize;
use crate::subsample::subsample;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Data, kernel and Laplacian of a run, fixed before any iteration
pub struct NbsContext {
    mutations: MutationMatrix,
    kernel: PropagationKernel,
    /// the Laplacian and the kernel columns in its gene order
    laplacian: Option<(KnnLaplacian, Vec<usize>)>,
    /// whether each mutation gene is a network gene
    in_kernel: Vec<bool>,
}

impl NbsContext {
    /// Joins the three gene indexes once: mutated genes outside the
    /// network are dropped with a warning, and every Laplacian gene must
    /// be a kernel gene.
    pub fn new(
        mutations: MutationMatrix,
        kernel: PropagationKernel,
        laplacian: Option<KnnLaplacian>,
    ) -> Result<Self> {
        let to_kernel = mutations
            .genes()
            .align(kernel.genes())
            .require_overlap(Stage::Propagation)?;

        let mut in_kernel = vec![false; mutations.num_genes()];
        for &j in to_kernel.source.iter() {
            in_kernel[j] = true;
        }
        let outside = mutations.num_genes() - to_kernel.num_shared();
        if outside > 0 {
            warn!(
                "{} of {} mutated genes are not in the network",
                outside,
                mutations.num_genes()
            );
        }

        let laplacian = match laplacian {
            Some(lap) => {
                let columns = kernel
                    .genes()
                    .align(lap.genes())
                    .require_complete(Stage::Alignment)?;
                if !columns.dropped.is_empty() {
                    info!(
                        "{} network genes are outside the laplacian and not factorized",
                        columns.dropped.len()
                    );
                }
                Some((lap, columns.source))
            }
            None => None,
        };

        info!(
            "context: {} patients, {} mutated genes in a {}-gene network",
            mutations.num_patients(),
            to_kernel.num_shared(),
            kernel.genes().len()
        );

        Ok(Self {
            mutations,
            kernel,
            laplacian,
            in_kernel,
        })
    }

    pub fn mutations(&self) -> &MutationMatrix {
        &self.mutations
    }

    pub fn kernel(&self) -> &PropagationKernel {
        &self.kernel
    }

    pub fn laplacian(&self) -> Option<&KnnLaplacian> {
        self.laplacian.as_ref().map(|(lap, _)| lap)
    }

    pub fn num_patients(&self) -> usize {
        self.mutations.num_patients()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FitSummary {
    pub iterations: usize,
    pub objective: f64,
    pub residual: f64,
    pub converged: bool,
    pub instability_events: usize,
}

impl From<&Factorization> for FitSummary {
    fn from(fit: &Factorization) -> Self {
        Self {
            iterations: fit.iterations,
            objective: fit.objective,
            residual: fit.residual,
            converged: fit.converged,
            instability_events: fit.instability_events,
        }
    }
}

/// Cluster labels of one iteration over the patients it kept
#[derive(Clone, Debug, Serialize)]
pub struct Assignment {
    pub index: usize,
    pub seed: u64,
    /// distinct patient rows
    pub patients: Vec<usize>,
    /// label of each patient in `patients`
    pub labels: Vec<usize>,
    pub fit: FitSummary,
    pub propagation_converged: bool,
}

#[derive(Debug)]
pub struct IterationFailure {
    pub index: usize,
    pub seed: u64,
    pub error: NbsError,
}

impl IterationFailure {
    pub fn into_error(self) -> NbsError {
        NbsError::Iteration {
            index: self.index,
            seed: self.seed,
            source: Box::new(self.error),
        }
    }
}

/// Outcome of all iterations, each list ordered by iteration index
#[derive(Debug, Default)]
pub struct IterationReport {
    pub assignments: Vec<Assignment>,
    pub failures: Vec<IterationFailure>,
    pub cancelled: Vec<usize>,
}

enum Outcome {
    Done(Assignment),
    Failed(IterationFailure),
    Cancelled(usize),
}

/// One iteration: subsample, propagate, normalize, align, factorize
/// and assign. A pure function of the context and the seed.
pub fn run_iteration(ctx: &NbsContext, params: &NbsParams, index: usize, seed: u64) -> Result<Assignment> {
    let mutations = &ctx.mutations;
    let mut rng = StdRng::seed_from_u64(seed);

    let draw = subsample(
        mutations.num_patients(),
        mutations.num_genes(),
        &params.subsample,
        &mut rng,
    )?;

    let genes: Vec<usize> = draw
        .genes
        .iter()
        .copied()
        .filter(|&j| ctx.in_kernel[j])
        .collect();
    if genes.is_empty() {
        let sampled = draw
            .genes
            .iter()
            .take(10)
            .map(|&j| Box::from(mutations.genes().name(j)))
            .collect();
        return Err(NbsError::mismatch(
            Stage::Subsample,
            "no sampled gene is in the network",
            sampled,
        ));
    }

    let min_mutations = params.subsample.min_mutations;
    let (rows, dropped): (Vec<usize>, Vec<usize>) = draw
        .patients
        .iter()
        .copied()
        .partition(|&i| mutations.count_mutations(i, &genes) >= min_mutations);
    if rows.len() < params.k {
        return Err(NbsError::mismatch(
            Stage::Subsample,
            format!(
                "{} of {} sampled patients carry at least {} mutations, fewer than k = {}",
                rows.len(),
                draw.patients.len(),
                min_mutations,
                params.k
            ),
            dropped
                .iter()
                .map(|&i| mutations.patients()[i].clone())
                .collect(),
        ));
    }

    let signal = Mat::from_fn(rows.len(), genes.len(), |a, b| {
        mutations.data()[(rows[a], genes[b])]
    });
    let names: Vec<&str> = genes.iter().map(|&j| mutations.genes().name(j)).collect();
    let propagated = ctx.kernel.propagate(&signal, &names)?;

    let normalized = quantile_normalize(&propagated.matrix);

    let fit = match &ctx.laplacian {
        Some((lap, columns)) => {
            let x = normalized.select_columns(columns.iter());
            factorize(&x, params.k, Some(lap.matrix()), params.lambda, &params.nmf, &mut rng)?
        }
        None => factorize(&normalized, params.k, None, params.lambda, &params.nmf, &mut rng)?,
    };

    // a patient drawn more than once keeps the label of its first draw
    let mut seen = HashSet::default();
    let (patients, labels): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .zip(fit.assign())
        .filter(|(i, _)| seen.insert(**i))
        .map(|(&i, c)| (i, c))
        .unzip();

    Ok(Assignment {
        index,
        seed,
        patients,
        labels,
        fit: FitSummary::from(&fit),
        propagation_converged: propagated.convergence.converged,
    })
}

/// Run `params.niter` iterations on the rayon pool.
///
/// Iteration `i` uses seed `params.seed + i`. Setting `cancel` stops
/// tasks that have not started; they are reported as cancelled.
pub fn run_iterations(ctx: &NbsContext, params: &NbsParams, cancel: &AtomicBool) -> Result<IterationReport> {
    params.validate()?;

    let niter = params.niter;
    info!("running {} iterations (k = {})", niter, params.k);

    let outcomes: Vec<Outcome> = (0..niter)
        .into_par_iter()
        .progress_count(niter as u64)
        .map(|index| {
            if cancel.load(Ordering::Relaxed) {
                return Outcome::Cancelled(index);
            }
            let seed = params.seed.wrapping_add(index as u64);
            match run_iteration(ctx, params, index, seed) {
                Ok(assignment) => Outcome::Done(assignment),
                Err(error) => Outcome::Failed(IterationFailure { index, seed, error }),
            }
        })
        .collect();

    let mut report = IterationReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Done(a) => report.assignments.push(a),
            Outcome::Failed(f) => {
                warn!("iteration {} failed: {}", f.index, f.error);
                report.failures.push(f);
            }
            Outcome::Cancelled(index) => report.cancelled.push(index),
        }
    }

    let unstable: usize = report
        .assignments
        .iter()
        .filter(|a| a.fit.instability_events > 0)
        .count();
    if unstable > 0 {
        warn!("{} iterations saw objective increases", unstable);
    }

    info!(
        "{} iterations done, {} failed, {} cancelled",
        report.assignments.len(),
        report.failures.len(),
        report.cancelled.len()
    );
    Ok(report)
}
