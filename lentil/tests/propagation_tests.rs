use approx::assert_abs_diff_eq;
use lentil::knn_laplacian::{KnnLaplacian, LaplacianKind};
use lentil::params::{KnnParams, PropagationParams};
use lentil::*;
use nalgebra::DMatrix;

/// A scale-free-ish graph: gene `i` links to `i / 2` and `i / 3`,
/// plus a detached triangle
fn tree_like_graph() -> GeneGraph {
    let mut edges = vec![];
    for i in 2..30_usize {
        edges.push((format!("g{:02}", i), format!("g{:02}", i / 2)));
        if i / 3 != i / 2 && i / 3 > 0 {
            edges.push((format!("g{:02}", i), format!("g{:02}", i / 3)));
        }
    }
    edges.push(("t0".into(), "t1".into()));
    edges.push(("t1".into(), "t2".into()));
    edges.push(("t2".into(), "t0".into()));
    GeneGraph::from_edges(&edges).unwrap()
}

#[test]
fn path_scenario_keeps_components_apart() {
    let graph = GeneGraph::new(
        vec!["A".into(), "B".into(), "C".into(), "D".into()],
        &[("A", "B"), ("B", "C")],
    )
    .unwrap();
    let params = PropagationParams {
        alpha: 0.7,
        ..Default::default()
    };
    let kernel = build_kernel(&graph, &params).unwrap();
    let k = kernel.matrix();

    assert!(k[(0, 2)] > 0.0);
    for i in 0..3 {
        assert_eq!(k[(i, 3)], 0.0);
        assert_eq!(k[(3, i)], 0.0);
    }

    // a signal on D alone stays on D
    let signal = DMatrix::from_element(1, 1, 1.0);
    let out = propagate(&graph, Some(&kernel), &signal, &["D"], &params).unwrap();
    assert_eq!(out.matrix.row(0).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn kernel_and_direct_walk_agree() {
    let graph = tree_like_graph();
    for symmetric_norm in [false, true] {
        let params = PropagationParams {
            alpha: 0.6,
            symmetric_norm,
            tolerance: 1e-12,
            ..Default::default()
        };
        let kernel = build_kernel(&graph, &params).unwrap();
        assert!(kernel.matrix().iter().all(|&x| x >= 0.0));
        if !symmetric_norm {
            for row in kernel.matrix().row_iter() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
            }
        }

        let genes = ["g05", "g17", "t1", "g02"];
        let signal = DMatrix::from_fn(3, 4, |i, j| ((i + 2 * j) % 3) as f64);
        let fast = propagate(&graph, Some(&kernel), &signal, &genes, &params).unwrap();
        let slow = propagate(&graph, None, &signal, &genes, &params).unwrap();
        assert_abs_diff_eq!(fast.matrix, slow.matrix, epsilon = 1e-9);
        assert!(slow.convergence.converged);
    }
}

#[test]
fn walk_that_runs_out_of_iterations_is_flagged() {
    let graph = tree_like_graph();
    let params = PropagationParams {
        alpha: 0.9,
        tolerance: 1e-14,
        max_iter: 3,
        ..Default::default()
    };
    let kernel = build_kernel(&graph, &params).unwrap();
    assert!(!kernel.convergence().converged);
    assert_eq!(kernel.convergence().iterations, 3);
    // the detached triangle and the tree both fail to settle
    assert_eq!(kernel.convergence().unconverged_components, 2);
}

#[test]
fn laplacian_from_kernel_is_psd() {
    let graph = tree_like_graph();
    let kernel = build_kernel(&graph, &PropagationParams::default()).unwrap();
    for kind in [LaplacianKind::Combinatorial, LaplacianKind::Normalized] {
        let params = KnnParams {
            knn: 4,
            kind,
            ..Default::default()
        };
        let lap = KnnLaplacian::from_kernel(&kernel, &params).unwrap();
        let dense = DMatrix::from(lap.matrix());
        assert_abs_diff_eq!(dense.clone(), dense.transpose(), epsilon = 1e-12);
        let eig = dense.symmetric_eigenvalues();
        assert!(eig.iter().all(|&x| x > -1e-9));

        // no kNN edge crosses components
        for (i, j, &v) in lap.matrix().triplet_iter() {
            let ti = graph.genes().name(i).starts_with('t');
            let tj = graph.genes().name(j).starts_with('t');
            if v != 0.0 {
                assert_eq!(ti, tj);
            }
        }
    }
}
