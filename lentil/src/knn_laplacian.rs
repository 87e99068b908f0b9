//! K-nearest-neighbour graph Laplacian over genes

use crate::common::*;
use crate::graph::GeneGraph;
use crate::params::{check_positive, KnnParams};
use crate::propagation::{local_positions, PropagationKernel};
use matrix_util::knn_graph::{KnnGraph, KnnGraphArgs};
use matrix_util::traits::MatOps;
use nalgebra::Cholesky;
use serde::{Deserialize, Serialize};

/// symmetry tolerance for injected Laplacians
const SYMMETRY_TOL: f64 = 1e-8;
/// ridge added before the Cholesky test of semi-definiteness
const PSD_RIDGE: f64 = 1e-8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaplacianKind {
    /// `D - A`
    #[default]
    Combinatorial,
    /// `I - D^{-1/2} A D^{-1/2}`
    Normalized,
}

/// Which gene-gene similarity the neighbours are ranked by
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilaritySource {
    /// regularized Laplacian inverse `(L + gamma I)^{-1}` of the network
    #[default]
    Influence,
    /// rows of the propagation kernel
    Kernel,
}

/// Symmetric positive semi-definite gene-by-gene Laplacian
#[derive(Clone, Debug)]
pub struct KnnLaplacian {
    genes: GeneIndex,
    matrix: CscMat,
    kind: LaplacianKind,
    num_edges: usize,
}

/// Build the Laplacian of the KNN graph over `similarity` rows.
///
/// Neighbours of a gene are the others with strictly positive
/// similarity, ranked by descending similarity and then by ascending
/// gene identifier. The KNN graph itself is unweighted.
pub fn build_knn_laplacian(
    similarity: &Mat,
    genes: &GeneIndex,
    params: &KnnParams,
) -> Result<KnnLaplacian> {
    let nn = genes.len();
    if similarity.nrows() != nn || similarity.ncols() != nn {
        return Err(NbsError::mismatch(
            Stage::Laplacian,
            format!(
                "similarity is {} x {} for {} genes",
                similarity.nrows(),
                similarity.ncols(),
                nn
            ),
            vec![],
        ));
    }
    if params.knn == 0 || params.knn >= nn {
        return Err(NbsError::invalid(
            "knn",
            format!("{} is not in [1, {})", params.knn, nn),
        ));
    }

    let tie_order = genes.lexicographic_rank();
    let knn = KnnGraph::from_similarity_rows(
        similarity,
        &tie_order,
        KnnGraphArgs {
            knn: params.knn,
            block_size: params.block_size,
            reciprocal: params.reciprocal,
        },
    )
    .map_err(|e| NbsError::invalid("knn", e.to_string()))?;

    let degree: Vec<f64> = (0..nn).map(|i| knn.degree(i) as f64).collect();

    let mut coo = CooMat::new(nn, nn);
    for i in 0..nn {
        if degree[i] > 0.0 {
            let l_ii = match params.kind {
                LaplacianKind::Combinatorial => degree[i],
                LaplacianKind::Normalized => 1.0,
            };
            coo.push(i, i, l_ii);
        }
    }
    for &(i, j) in knn.edges.iter() {
        let l_ij = match params.kind {
            LaplacianKind::Combinatorial => -1.0,
            LaplacianKind::Normalized => -1.0 / (degree[i] * degree[j]).sqrt(),
        };
        coo.push(i, j, l_ij);
        coo.push(j, i, l_ij);
    }

    let isolated = degree.iter().filter(|&&d| d == 0.0).count();
    if isolated > 0 {
        warn!("{} genes have no neighbour in the kNN graph", isolated);
    }
    info!(
        "kNN laplacian over {} genes: {} edges (k = {})",
        nn,
        knn.num_edges(),
        params.knn
    );

    Ok(KnnLaplacian {
        genes: genes.clone(),
        matrix: CscMat::from(&coo),
        kind: params.kind,
        num_edges: knn.num_edges(),
    })
}

/// Network influence `(L + gamma I)^{-1}` with `L = D - A` of `graph`,
/// inverted component by component
pub fn regularized_laplacian_inverse(graph: &GeneGraph, gamma: f64) -> Result<Mat> {
    check_positive("gamma", gamma)?;

    let components = graph.connected_components();
    let local = local_positions(graph.num_genes(), &components);
    let ncomp = components.len() as u64;

    let blocks: Vec<Mat> = components
        .par_iter()
        .progress_count(ncomp)
        .map(|members| {
            let c = members.len();
            let mut l_c = Mat::from_diagonal_element(c, c, gamma);
            for (a, &i) in members.iter().enumerate() {
                l_c[(a, a)] += graph.degree(i) as f64;
                for &j in graph.neighbors(i) {
                    l_c[(a, local[j])] = -1.0;
                }
            }
            Cholesky::new(l_c).map(|chol| chol.inverse())
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| NbsError::invalid("gamma", "regularized laplacian is not positive definite"))?;

    let nn = graph.num_genes();
    let mut influence = Mat::zeros(nn, nn);
    for (members, block) in components.iter().zip(blocks) {
        for (b, &j) in members.iter().enumerate() {
            for (a, &i) in members.iter().enumerate() {
                influence[(i, j)] = block[(a, b)];
            }
        }
    }
    Ok(influence)
}

impl KnnLaplacian {
    /// Rank neighbours by the rows of a propagation kernel
    pub fn from_kernel(kernel: &PropagationKernel, params: &KnnParams) -> Result<Self> {
        build_knn_laplacian(kernel.matrix(), kernel.genes(), params)
    }

    /// Rank neighbours by the network influence of `graph`
    pub fn from_graph(graph: &GeneGraph, gamma: f64, params: &KnnParams) -> Result<Self> {
        let influence = regularized_laplacian_inverse(graph, gamma)?;
        build_knn_laplacian(&influence, graph.genes(), params)
    }

    /// Accept a precomputed Laplacian over `genes`; it must be square,
    /// symmetric and positive semi-definite
    pub fn from_parts(genes: Vec<Box<str>>, matrix: Mat, kind: LaplacianKind) -> Result<Self> {
        let genes = GeneIndex::new(genes)?;
        let nn = genes.len();

        if matrix.nrows() != nn || matrix.ncols() != nn {
            return Err(NbsError::structural(
                format!(
                    "laplacian is {} x {} for {} genes",
                    matrix.nrows(),
                    matrix.ncols(),
                    nn
                ),
                vec![],
            ));
        }
        if matrix.iter().any(|x| !x.is_finite()) {
            return Err(NbsError::structural("laplacian has non-finite entries", vec![]));
        }

        if let Some(d) = matrix.asymmetry().filter(|&d| d > SYMMETRY_TOL) {
            let asymmetric: Vec<Box<str>> = (0..nn)
                .filter(|&i| (0..nn).any(|j| (matrix[(i, j)] - matrix[(j, i)]).abs() > SYMMETRY_TOL))
                .map(|i| Box::from(genes.name(i)))
                .collect();
            return Err(NbsError::structural(
                format!("laplacian is not symmetric (max deviation {:.3e})", d),
                asymmetric,
            ));
        }

        let ridge = Mat::identity(nn, nn) * PSD_RIDGE;
        if Cholesky::new(&matrix + ridge).is_none() {
            return Err(NbsError::structural(
                "laplacian is not positive semi-definite",
                vec![],
            ));
        }

        let csc = CscMat::from(&matrix);
        let num_edges = csc
            .triplet_iter()
            .filter(|&(i, j, &v)| i < j && v != 0.0)
            .count();

        Ok(Self {
            genes,
            matrix: csc,
            kind,
            num_edges,
        })
    }

    pub fn genes(&self) -> &GeneIndex {
        &self.genes
    }

    pub fn matrix(&self) -> &CscMat {
        &self.matrix
    }

    pub fn kind(&self) -> LaplacianKind {
        self.kind
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }
}
