//! Network propagation by random walk with restart.
//!
//! Signals are rows. With `F_0 = S` the walk iterates
//! `F_{t+1} = alpha * F_t * A_norm + (1 - alpha) * F_0`
//! inside every connected component separately, so no signal crosses
//! components. A singleton component keeps its signal unchanged.

use crate::common::*;
use crate::graph::GeneGraph;
use crate::params::PropagationParams;
use matrix_util::traits::CompositeOps;
use serde::Serialize;

/// How the walk over one or more components ended
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropagationConvergence {
    pub converged: bool,
    /// most iterations taken by any component
    pub iterations: usize,
    /// largest final update norm over components
    pub delta: f64,
    pub unconverged_components: usize,
}

impl PropagationConvergence {
    fn trivial() -> Self {
        Self {
            converged: true,
            iterations: 0,
            delta: 0.0,
            unconverged_components: 0,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            converged: self.converged && other.converged,
            iterations: self.iterations.max(other.iterations),
            delta: self.delta.max(other.delta),
            unconverged_components: self.unconverged_components + other.unconverged_components,
        }
    }
}

/// Gene-by-gene influence kernel; row `g` is the stationary signal of
/// a unit source at gene `g`
#[derive(Clone, Debug)]
pub struct PropagationKernel {
    genes: GeneIndex,
    components: Vec<Vec<usize>>,
    matrix: Mat,
    alpha: f64,
    symmetric_norm: bool,
    convergence: PropagationConvergence,
}

/// Signals spread over every gene of the graph, in graph order
#[derive(Clone, Debug)]
pub struct Propagated {
    pub genes: GeneIndex,
    pub matrix: Mat,
    pub convergence: PropagationConvergence,
}

/// position of each gene inside its own component
pub(crate) fn local_positions(nn: usize, components: &[Vec<usize>]) -> Vec<usize> {
    let mut local = vec![0; nn];
    for members in components {
        for (a, &g) in members.iter().enumerate() {
            local[g] = a;
        }
    }
    local
}

/// `D^{-1} A` or `D^{-1/2} A D^{-1/2}` restricted to one component
fn normalized_block(
    graph: &GeneGraph,
    members: &[usize],
    local: &[usize],
    symmetric_norm: bool,
) -> CscMat {
    let c = members.len();
    let mut coo = CooMat::new(c, c);
    for (a, &i) in members.iter().enumerate() {
        let d_i = graph.degree(i) as f64;
        for &j in graph.neighbors(i) {
            let v = if symmetric_norm {
                1.0 / (d_i * graph.degree(j) as f64).sqrt()
            } else {
                1.0 / d_i
            };
            coo.push(a, local[j], v);
        }
    }
    CscMat::from(&coo)
}

fn random_walk(
    f0: &Mat,
    a_norm: &CscMat,
    params: &PropagationParams,
) -> (Mat, PropagationConvergence) {
    let alpha = params.alpha;
    let mut f = f0.clone();
    let mut delta = f64::INFINITY;
    let mut iterations = 0;

    while iterations < params.max_iter {
        let next = f.mul_csc(a_norm) * alpha + f0 * (1.0 - alpha);
        delta = (&next - &f).norm();
        f = next;
        iterations += 1;
        if delta < params.tolerance {
            break;
        }
    }

    let converged = delta < params.tolerance;
    let convergence = PropagationConvergence {
        converged,
        iterations,
        delta,
        unconverged_components: if converged { 0 } else { 1 },
    };
    (f, convergence)
}

/// Run the walk from `f0` (signals x all graph genes) component by
/// component
fn propagate_components(
    graph: &GeneGraph,
    components: &[Vec<usize>],
    f0: &Mat,
    params: &PropagationParams,
) -> (Mat, PropagationConvergence) {
    let local = local_positions(graph.num_genes(), components);
    let ncomp = components.len() as u64;

    let blocks: Vec<Option<(Mat, PropagationConvergence)>> = components
        .par_iter()
        .progress_count(ncomp)
        .map(|members| {
            let f0_c = f0.select_columns(members.iter());
            if members.len() == 1 || f0_c.iter().all(|&x| x == 0.0) {
                return None;
            }
            let a_norm = normalized_block(graph, members, &local, params.symmetric_norm);
            Some(random_walk(&f0_c, &a_norm, params))
        })
        .collect();

    let mut out = f0.clone();
    let mut convergence = PropagationConvergence::trivial();
    for (members, block) in components.iter().zip(blocks) {
        if let Some((f_c, conv)) = block {
            for (b, &g) in members.iter().enumerate() {
                out.set_column(g, &f_c.column(b));
            }
            convergence = convergence.merge(conv);
        }
    }

    if !convergence.converged {
        warn!(
            "propagation did not converge in {} of {} components (delta {:.3e} after {} iterations)",
            convergence.unconverged_components,
            components.len(),
            convergence.delta,
            convergence.iterations
        );
    }
    (out, convergence)
}

/// Build the propagation kernel of `graph`: the walk started from the
/// identity inside every component, blocks assembled into one matrix.
pub fn build_kernel(graph: &GeneGraph, params: &PropagationParams) -> Result<PropagationKernel> {
    params.validate()?;

    let components = graph.connected_components();
    let nn = graph.num_genes();
    info!(
        "building propagation kernel over {} genes in {} components (alpha = {})",
        nn,
        components.len(),
        params.alpha
    );

    let (matrix, convergence) = propagate_components(graph, &components, &Mat::identity(nn, nn), params);

    Ok(PropagationKernel {
        genes: graph.genes().clone(),
        components,
        matrix,
        alpha: params.alpha,
        symmetric_norm: params.symmetric_norm,
        convergence,
    })
}

/// Propagate `signal` (signals x `genes`) over `graph`.
///
/// With a kernel the result is `S * K`; the kernel must have been built
/// on the graph's gene index with the same walk parameters. Without one
/// the walk is iterated directly.
pub fn propagate<S: AsRef<str>>(
    graph: &GeneGraph,
    kernel: Option<&PropagationKernel>,
    signal: &Mat,
    genes: &[S],
    params: &PropagationParams,
) -> Result<Propagated> {
    params.validate()?;
    check_signal_shape(signal, genes.len())?;

    let positions = graph.lookup(genes)?;

    if let Some(kernel) = kernel {
        kernel.check_graph(graph)?;
        kernel.check_params(params)?;
        return kernel.propagate(signal, genes);
    }

    let mut f0 = Mat::zeros(signal.nrows(), graph.num_genes());
    for (c, &g) in positions.iter().enumerate() {
        let mut f0_g = f0.column_mut(g);
        f0_g += signal.column(c);
    }

    let (matrix, convergence) =
        propagate_components(graph, &graph.connected_components(), &f0, params);

    Ok(Propagated {
        genes: graph.genes().clone(),
        matrix,
        convergence,
    })
}

fn check_signal_shape(signal: &Mat, ngenes: usize) -> Result<()> {
    if signal.ncols() != ngenes {
        return Err(NbsError::invalid(
            "signal",
            format!("{} columns for {} gene names", signal.ncols(), ngenes),
        ));
    }
    Ok(())
}

impl PropagationKernel {
    /// Accept a precomputed kernel over `genes`.
    ///
    /// The matrix must be square over unique genes with finite
    /// non-negative entries. Components are recovered from its support.
    pub fn from_parts(
        genes: Vec<Box<str>>,
        matrix: Mat,
        alpha: f64,
        symmetric_norm: bool,
    ) -> Result<Self> {
        let genes = GeneIndex::new(genes)?;
        let nn = genes.len();

        if matrix.nrows() != nn || matrix.ncols() != nn {
            return Err(NbsError::structural(
                format!(
                    "kernel is {} x {} for {} genes",
                    matrix.nrows(),
                    matrix.ncols(),
                    nn
                ),
                vec![],
            ));
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(NbsError::invalid("alpha", format!("{} is not in (0, 1)", alpha)));
        }

        let bad: Vec<Box<str>> = (0..nn)
            .filter(|&i| matrix.row(i).iter().any(|&x| !x.is_finite() || x < 0.0))
            .map(|i| Box::from(genes.name(i)))
            .collect();
        if !bad.is_empty() {
            return Err(NbsError::structural(
                "kernel rows with negative or non-finite entries",
                bad,
            ));
        }

        let edges: Vec<(&str, &str)> = (0..nn)
            .flat_map(|i| ((i + 1)..nn).map(move |j| (i, j)))
            .filter(|&(i, j)| matrix[(i, j)] > 0.0 || matrix[(j, i)] > 0.0)
            .map(|(i, j)| (genes.name(i), genes.name(j)))
            .collect();
        let support = GeneGraph::new(genes.names().to_vec(), &edges)?;
        let components = support.connected_components();

        info!(
            "loaded a propagation kernel over {} genes in {} components",
            nn,
            components.len()
        );

        Ok(Self {
            genes,
            components,
            matrix,
            alpha,
            symmetric_norm,
            convergence: PropagationConvergence::trivial(),
        })
    }

    pub fn genes(&self) -> &GeneIndex {
        &self.genes
    }

    pub fn matrix(&self) -> &Mat {
        &self.matrix
    }

    pub fn components(&self) -> &[Vec<usize>] {
        &self.components
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn symmetric_norm(&self) -> bool {
        self.symmetric_norm
    }

    pub fn convergence(&self) -> &PropagationConvergence {
        &self.convergence
    }

    /// The kernel must cover the same genes as `graph` and split them
    /// into the same connected components
    pub fn check_graph(&self, graph: &GeneGraph) -> Result<()> {
        if self.genes != *graph.genes() {
            let differ: Vec<Box<str>> = self
                .genes
                .align(graph.genes())
                .missing
                .into_iter()
                .chain(graph.genes().align(&self.genes).missing)
                .collect();
            return Err(NbsError::mismatch(
                Stage::Propagation,
                "kernel was built on a different gene index",
                differ,
            ));
        }

        let graph_components = graph.connected_components();
        if self.components != graph_components {
            let mut kernel_label = vec![0; self.genes.len()];
            for (c, members) in self.components.iter().enumerate() {
                for &g in members {
                    kernel_label[g] = c;
                }
            }
            // genes whose graph component is not exactly one kernel component
            let differ: Vec<Box<str>> = graph_components
                .iter()
                .filter(|members| {
                    let c = kernel_label[members[0]];
                    self.components[c] != **members
                })
                .flatten()
                .map(|&g| Box::from(self.genes.name(g)))
                .collect();
            return Err(NbsError::mismatch(
                Stage::Propagation,
                format!(
                    "kernel has {} components, the network {}",
                    self.components.len(),
                    graph_components.len()
                ),
                differ,
            ));
        }
        Ok(())
    }

    fn check_params(&self, params: &PropagationParams) -> Result<()> {
        if self.alpha != params.alpha {
            return Err(NbsError::invalid(
                "alpha",
                format!(
                    "kernel was built with {}, requested {}",
                    self.alpha, params.alpha
                ),
            ));
        }
        if self.symmetric_norm != params.symmetric_norm {
            return Err(NbsError::invalid(
                "symmetric_norm",
                format!(
                    "kernel was built with {}, requested {}",
                    self.symmetric_norm, params.symmetric_norm
                ),
            ));
        }
        Ok(())
    }

    /// `S * K` over the kernel's genes.
    ///
    /// Kernel rows vanish outside their component, so multiplying by the
    /// rows of the signal genes only is the per-component product.
    pub fn propagate<S: AsRef<str>>(&self, signal: &Mat, genes: &[S]) -> Result<Propagated> {
        check_signal_shape(signal, genes.len())?;

        let mut positions = Vec::with_capacity(genes.len());
        let mut absent = vec![];
        for x in genes {
            match self.genes.position(x.as_ref()) {
                Some(g) => positions.push(g),
                None => absent.push(Box::from(x.as_ref())),
            }
        }
        if !absent.is_empty() {
            return Err(NbsError::structural("genes absent from the graph", absent));
        }

        let k_rows = self.matrix.select_rows(positions.iter());
        Ok(Propagated {
            genes: self.genes.clone(),
            matrix: signal * k_rows,
            convergence: self.convergence.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A - B - C and an isolated D
    fn path_graph() -> GeneGraph {
        GeneGraph::new(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            &[("A", "B"), ("B", "C")],
        )
        .unwrap()
    }

    fn params(alpha: f64) -> PropagationParams {
        PropagationParams {
            alpha,
            tolerance: 1e-12,
            ..Default::default()
        }
    }

    #[test]
    fn test_path_and_isolated_gene() {
        let kernel = build_kernel(&path_graph(), &params(0.7)).unwrap();
        let k = kernel.matrix();

        assert!(k[(0, 2)] > 0.0);
        assert!(k[(2, 0)] > 0.0);
        for i in 0..3 {
            assert_eq!(k[(i, 3)], 0.0);
            assert_eq!(k[(3, i)], 0.0);
        }
        assert_eq!(k[(3, 3)], 1.0);
        assert!(kernel.convergence().converged);
        assert_eq!(kernel.components().len(), 2);
    }

    #[test]
    fn test_row_normalized_kernel_rows_sum_to_one() {
        let graph = GeneGraph::from_edges(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "A"),
            ("C", "D"),
            ("E", "F"),
        ])
        .unwrap();
        let kernel = build_kernel(&graph, &params(0.5)).unwrap();
        for row in kernel.matrix().row_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
            assert!(row.iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn test_symmetric_kernel_is_symmetric() {
        let graph = GeneGraph::from_edges(&[("A", "B"), ("B", "C"), ("C", "D"), ("B", "D")]).unwrap();
        let p = PropagationParams {
            symmetric_norm: true,
            ..params(0.6)
        };
        let kernel = build_kernel(&graph, &p).unwrap();
        let k = kernel.matrix();
        assert_abs_diff_eq!(k.clone(), k.transpose(), epsilon = 1e-10);
    }

    #[test]
    fn test_kernel_matches_direct_walk() {
        let graph = GeneGraph::from_edges(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "D"),
            ("D", "A"),
            ("A", "C"),
            ("E", "F"),
            ("F", "G"),
        ])
        .unwrap();
        let p = params(0.7);
        let kernel = build_kernel(&graph, &p).unwrap();

        let genes = ["C", "A", "F"];
        let signal = Mat::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

        let fast = propagate(&graph, Some(&kernel), &signal, &genes, &p).unwrap();
        let slow = propagate(&graph, None, &signal, &genes, &p).unwrap();

        assert_eq!(fast.matrix.shape(), (2, 7));
        assert_abs_diff_eq!(fast.matrix, slow.matrix, epsilon = 1e-9);
    }

    #[test]
    fn test_absent_genes_are_named() {
        let graph = path_graph();
        let signal = Mat::from_element(1, 2, 1.0);
        match propagate(&graph, None, &signal, &["A", "Z"], &params(0.7)) {
            Err(NbsError::StructuralViolation { nodes, .. }) => {
                assert_eq!(nodes, vec![Box::<str>::from("Z")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kernel_components_must_match_graph() {
        // same genes, but {A, B, C} {D} against {A, B} {C, D}
        let kernel = build_kernel(&path_graph(), &params(0.7)).unwrap();
        let split = GeneGraph::new(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            &[("A", "B"), ("C", "D")],
        )
        .unwrap();
        let signal = Mat::from_element(1, 1, 1.0);

        match propagate(&split, Some(&kernel), &signal, &["A"], &params(0.7)) {
            Err(NbsError::DataMismatch {
                stage: Stage::Propagation,
                identifiers,
                ..
            }) => {
                let names: Vec<&str> = identifiers.iter().map(|x| &**x).collect();
                assert_eq!(names, vec!["A", "B", "C", "D"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(kernel.check_graph(&path_graph()).is_ok());
    }

    #[test]
    fn test_kernel_must_match_graph_and_params() {
        let graph = path_graph();
        let kernel = build_kernel(&graph, &params(0.7)).unwrap();
        let signal = Mat::from_element(1, 1, 1.0);

        let other = GeneGraph::from_edges(&[("A", "B"), ("B", "E")]).unwrap();
        assert!(matches!(
            propagate(&other, Some(&kernel), &signal, &["A"], &params(0.7)),
            Err(NbsError::DataMismatch {
                stage: Stage::Propagation,
                ..
            })
        ));

        assert!(matches!(
            propagate(&graph, Some(&kernel), &signal, &["A"], &params(0.5)),
            Err(NbsError::InvalidParameter { name: "alpha", .. })
        ));
    }

    #[test]
    fn test_from_parts_recovers_components() {
        let kernel = build_kernel(&path_graph(), &params(0.7)).unwrap();
        let loaded = PropagationKernel::from_parts(
            kernel.genes().names().to_vec(),
            kernel.matrix().clone(),
            0.7,
            false,
        )
        .unwrap();
        assert_eq!(loaded.components(), kernel.components());

        let mut negative = kernel.matrix().clone();
        negative[(0, 1)] = -0.1;
        assert!(PropagationKernel::from_parts(
            kernel.genes().names().to_vec(),
            negative,
            0.7,
            false
        )
        .is_err());
    }
}
