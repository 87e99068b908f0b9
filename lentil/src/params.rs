//! Run configuration, defaulting to the published NBS settings

use crate::consensus::ConsensusDistance;
use crate::error::{NbsError, Result};
use crate::knn_laplacian::{LaplacianKind, SimilaritySource};
use matrix_util::clustering::Linkage;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct PropagationParams {
    /// weight on the walk; `1 - alpha` restarts at the source
    pub alpha: f64,
    /// `D^{-1/2} A D^{-1/2}` instead of `D^{-1} A`
    pub symmetric_norm: bool,
    /// Frobenius norm of successive differences
    pub tolerance: f64,
    pub max_iter: usize,
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            symmetric_norm: false,
            tolerance: 1e-6,
            max_iter: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct KnnParams {
    /// number of nearest neighbours per gene
    pub knn: usize,
    /// keep only mutual neighbours
    pub reciprocal: bool,
    pub kind: LaplacianKind,
    pub source: SimilaritySource,
    /// ridge of the regularized Laplacian influence kernel
    pub gamma: f64,
    /// genes per parallel job
    pub block_size: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            knn: 11,
            reciprocal: false,
            kind: LaplacianKind::Combinatorial,
            source: SimilaritySource::Influence,
            gamma: 0.01,
            block_size: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NmfOptions {
    pub eps: f64,
    pub max_iter: usize,
    /// stop once `||X - WH|| / ||X||` falls below this
    pub residual_tol: f64,
    /// stop once the relative objective change falls below this
    pub delta_tol: f64,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            eps: 1e-15,
            max_iter: 250,
            residual_tol: 1e-4,
            delta_tol: 1e-8,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SubsampleParams {
    pub patient_fraction: f64,
    pub gene_fraction: f64,
    pub replace: bool,
    /// patients with fewer mutations among the kept genes are dropped
    pub min_mutations: usize,
}

impl Default for SubsampleParams {
    fn default() -> Self {
        Self {
            patient_fraction: 0.8,
            gene_fraction: 0.8,
            replace: false,
            min_mutations: 10,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ConsensusOptions {
    pub linkage: Linkage,
    pub distance: ConsensusDistance,
}

/// Everything a stratification run needs besides the data
#[derive(Clone, Debug, Serialize)]
pub struct NbsParams {
    /// number of subtypes
    pub k: usize,
    /// number of subsampling iterations
    pub niter: usize,
    /// iteration `i` is seeded with `seed + i`
    pub seed: u64,
    /// failed iterations tolerated before the run fails
    pub max_failed_iterations: usize,
    /// weight of the graph smoothness term; 0 disables it
    pub lambda: f64,
    pub propagation: PropagationParams,
    pub knn: KnnParams,
    pub nmf: NmfOptions,
    pub subsample: SubsampleParams,
    pub consensus: ConsensusOptions,
}

impl Default for NbsParams {
    fn default() -> Self {
        Self {
            k: 3,
            niter: 100,
            seed: 42,
            max_failed_iterations: 0,
            lambda: 200.0,
            propagation: PropagationParams::default(),
            knn: KnnParams::default(),
            nmf: NmfOptions::default(),
            subsample: SubsampleParams::default(),
            consensus: ConsensusOptions::default(),
        }
    }
}

pub(crate) fn check_fraction(name: &'static str, x: f64) -> Result<()> {
    if x > 0.0 && x <= 1.0 {
        Ok(())
    } else {
        Err(NbsError::invalid(name, format!("{} is not in (0, 1]", x)))
    }
}

pub(crate) fn check_positive(name: &'static str, x: f64) -> Result<()> {
    if x.is_finite() && x > 0.0 {
        Ok(())
    } else {
        Err(NbsError::invalid(name, format!("{} is not positive", x)))
    }
}

impl PropagationParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(NbsError::invalid(
                "alpha",
                format!("{} is not in (0, 1)", self.alpha),
            ));
        }
        check_positive("propagation tolerance", self.tolerance)?;
        if self.max_iter == 0 {
            return Err(NbsError::invalid("propagation max_iter", "must be positive"));
        }
        Ok(())
    }
}

impl KnnParams {
    /// The upper bound `knn < #genes` is checked once genes are known
    pub fn validate(&self) -> Result<()> {
        if self.knn == 0 {
            return Err(NbsError::invalid("knn", "must be at least 1"));
        }
        check_positive("gamma", self.gamma)
    }
}

impl NmfOptions {
    pub fn validate(&self) -> Result<()> {
        check_positive("eps", self.eps)?;
        if self.max_iter == 0 {
            return Err(NbsError::invalid("nmf max_iter", "must be positive"));
        }
        if !(self.residual_tol >= 0.0 && self.delta_tol >= 0.0) {
            return Err(NbsError::invalid("nmf tolerance", "must be non-negative"));
        }
        Ok(())
    }
}

impl SubsampleParams {
    pub fn validate(&self) -> Result<()> {
        check_fraction("patient_fraction", self.patient_fraction)?;
        check_fraction("gene_fraction", self.gene_fraction)
    }
}

impl NbsParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(NbsError::invalid("k", "must be at least 1"));
        }
        if self.niter == 0 {
            return Err(NbsError::invalid("niter", "must be at least 1"));
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(NbsError::invalid(
                "lambda",
                format!("{} is not a finite non-negative weight", self.lambda),
            ));
        }
        self.propagation.validate()?;
        self.knn.validate()?;
        self.nmf.validate()?;
        self.subsample.validate()
    }
}
