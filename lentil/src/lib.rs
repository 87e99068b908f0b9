//! Network-based stratification of tumour mutation profiles.
//!
//! Binary somatic mutation profiles are smoothed over a gene
//! interaction network by random walk with restart, factorized with a
//! network-regularized NMF on many random subsamples, and consolidated
//! into robust subtypes by consensus clustering.
//!
//! # Orientation
//!
//! Mutation data are patients (rows) by genes (columns) throughout;
//! `X ~ W H` with patient loadings `W` and a gene basis `H`.
//!
//! # References
//!
//! Hofree, Shen, Carter, Gross & Ideker (2013). "Network-based
//! stratification of tumor mutations." Nature Methods 10, 1108-1115.

pub(crate) mod common;

/// Error taxonomy and the `Result` alias
pub mod error;

/// Run configuration with defaults
pub mod params;

/// Ordered gene sets and explicit joins between them
pub mod gene_index;

/// Simple undirected gene-interaction graph
pub mod graph;

/// Binary patient-by-gene mutation matrix
pub mod mutation;

/// Random walk with restart: kernel and direct propagation
pub mod propagation;

/// KNN graph Laplacian over genes
pub mod knn_laplacian;

/// Row-wise quantile normalization
pub mod quantile;

/// Graph-regularized multiplicative-update NMF
pub mod netnmf;

/// Patient and gene subsampling
pub mod subsample;

/// Parallel subsample-and-factorize iterations
pub mod driver;

/// Co-clustering consensus and hierarchical cut
pub mod consensus;

/// End-to-end `stratify`
pub mod pipeline;

/// Edge list, mutation and result files
pub mod io;

pub use driver::{run_iterations, NbsContext};
pub use error::{NbsError, Result, Stage};
pub use gene_index::GeneIndex;
pub use graph::GeneGraph;
pub use knn_laplacian::{build_knn_laplacian, KnnLaplacian};
pub use mutation::MutationMatrix;
pub use netnmf::{factorize, Factorization};
pub use params::NbsParams;
pub use pipeline::{prepare_context, stratify, Stratification};
pub use propagation::{build_kernel, propagate, PropagationKernel};
pub use consensus::{consensus_cluster, ConsensusResult};
