use lentil::driver::run_iteration;
use lentil::params::{KnnParams, NbsParams, SubsampleParams};
use lentil::*;
use std::sync::atomic::AtomicBool;

/// Two ten-gene modules (ring plus chords) joined by a single bridge
fn two_module_network() -> GeneGraph {
    let mut edges = vec![];
    for m in ["M1", "M2"] {
        for i in 0..10 {
            edges.push((format!("{}_{}", m, i), format!("{}_{}", m, (i + 1) % 10)));
            edges.push((format!("{}_{}", m, i), format!("{}_{}", m, (i + 3) % 10)));
        }
    }
    edges.push(("M1_0".to_string(), "M2_0".to_string()));
    GeneGraph::from_edges(&edges).unwrap()
}

/// Patients 0..12 mutate four genes of the first module, 12..24 of the
/// second
fn planted_mutations() -> MutationMatrix {
    let mut pairs = vec![];
    for p in 0..24 {
        let module = if p < 12 { "M1" } else { "M2" };
        for t in 0..4 {
            pairs.push((format!("P{:02}", p), format!("{}_{}", module, (p + 3 * t) % 10)));
        }
    }
    MutationMatrix::from_pairs(&pairs).unwrap()
}

fn small_params() -> NbsParams {
    NbsParams {
        k: 2,
        niter: 12,
        seed: 7,
        lambda: 1.0,
        knn: KnnParams {
            knn: 3,
            ..Default::default()
        },
        subsample: SubsampleParams {
            min_mutations: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn planted_subtypes_are_recovered() {
    let graph = two_module_network();
    let params = small_params();
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();

    let result = stratify(&ctx, &params, &AtomicBool::new(false)).unwrap();
    assert_eq!(result.assignments.len(), params.niter);
    assert!(result.failures.is_empty());

    let c = &result.consensus.consensus;
    assert_eq!(c.shape(), (24, 24));
    for i in 0..24 {
        assert_eq!(c[(i, i)], 1.0);
        for j in 0..24 {
            assert_eq!(c[(i, j)], c[(j, i)]);
            assert!((0.0..=1.0).contains(&c[(i, j)]));
        }
    }

    let labels = &result.consensus.assignment;
    assert!(labels[..12].iter().all(|&x| x == labels[0]));
    assert!(labels[12..].iter().all(|&x| x == labels[12]));
    assert_ne!(labels[0], labels[12]);
    assert_eq!(result.cluster_sizes(2), vec![12, 12]);

    let summary = serde_json::to_string(&result.summary(&ctx, &params)).unwrap();
    assert!(summary.contains("\"cluster_sizes\":[12,12]"));
}

#[test]
fn same_seed_same_consensus() {
    let graph = two_module_network();
    let params = NbsParams {
        niter: 4,
        ..small_params()
    };
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();
    let a = stratify(&ctx, &params, &AtomicBool::new(false)).unwrap();
    let b = stratify(&ctx, &params, &AtomicBool::new(false)).unwrap();
    assert_eq!(a.consensus.consensus, b.consensus.consensus);

    let one = run_iteration(&ctx, &params, 2, params.seed + 2).unwrap();
    assert_eq!(one.labels, a.assignments[2].labels);
}

#[test]
fn no_shared_genes_is_a_mismatch() {
    let graph = two_module_network();
    let mutations = MutationMatrix::from_pairs(&[("P1", "TP53"), ("P2", "KRAS")]).unwrap();
    let out = prepare_context(&graph, mutations, &small_params());
    assert!(matches!(
        out,
        Err(NbsError::DataMismatch {
            stage: Stage::Propagation,
            ..
        })
    ));
}

#[test]
fn knn_at_gene_count_is_rejected() {
    let graph = two_module_network();
    let mut params = small_params();
    params.knn.knn = graph.num_genes();
    assert!(matches!(
        prepare_context(&graph, planted_mutations(), &params),
        Err(NbsError::InvalidParameter { name: "knn", .. })
    ));
}

#[test]
fn failures_beyond_tolerance_name_the_iteration() {
    let graph = two_module_network();
    let mut params = small_params();
    params.niter = 3;
    params.subsample.min_mutations = 100;
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();

    match stratify(&ctx, &params, &AtomicBool::new(false)) {
        Err(NbsError::Iteration { index, seed, source }) => {
            assert_eq!(index, 0);
            assert_eq!(seed, params.seed);
            assert!(matches!(
                *source,
                NbsError::DataMismatch {
                    stage: Stage::Subsample,
                    ..
                }
            ));
        }
        other => panic!("unexpected {:?}", other.map(|r| r.assignments.len())),
    }
}

#[test]
fn tolerated_failures_without_assignments_still_fail() {
    let graph = two_module_network();
    let mut params = small_params();
    params.niter = 3;
    params.max_failed_iterations = 3;
    params.subsample.min_mutations = 100;
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();

    assert!(matches!(
        stratify(&ctx, &params, &AtomicBool::new(false)),
        Err(NbsError::Iteration { index: 0, .. })
    ));
}

#[test]
fn tolerated_failures_are_reported_with_the_result() {
    let graph = GeneGraph::from_edges(&[("A", "B"), ("B", "C")]).unwrap();
    // every draw keeps either the network gene or the off-network one
    let mut pairs = vec![];
    for p in 0..4 {
        pairs.push((format!("P{}", p), "A".to_string()));
        pairs.push((format!("P{}", p), "X".to_string()));
    }
    let mutations = MutationMatrix::from_pairs(&pairs).unwrap();
    let params = NbsParams {
        k: 1,
        niter: 20,
        lambda: 0.0,
        max_failed_iterations: 20,
        subsample: SubsampleParams {
            patient_fraction: 1.0,
            gene_fraction: 0.5,
            min_mutations: 0,
            replace: false,
        },
        ..Default::default()
    };
    let ctx = prepare_context(&graph, mutations, &params).unwrap();

    let result = stratify(&ctx, &params, &AtomicBool::new(false)).unwrap();
    assert!(!result.failures.is_empty());
    assert!(!result.assignments.is_empty());
    assert_eq!(result.failures.len() + result.assignments.len(), params.niter);
    assert!(result.failures.iter().all(|f| matches!(
        f.error,
        NbsError::DataMismatch {
            stage: Stage::Subsample,
            ..
        }
    )));
    assert_eq!(result.cluster_sizes(1), vec![4]);

    let summary = serde_json::to_string(&result.summary(&ctx, &params)).unwrap();
    assert!(summary.contains("\"stage\":\"subsample\""));
}

#[test]
fn cancelled_run_is_not_a_partial_result() {
    let graph = two_module_network();
    let params = small_params();
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();
    assert!(matches!(
        stratify(&ctx, &params, &AtomicBool::new(true)),
        Err(NbsError::Cancelled { completed: 0, .. })
    ));
}

#[test]
fn zero_lambda_skips_the_laplacian() {
    let graph = two_module_network();
    let params = NbsParams {
        lambda: 0.0,
        niter: 3,
        ..small_params()
    };
    let ctx = prepare_context(&graph, planted_mutations(), &params).unwrap();
    assert!(ctx.laplacian().is_none());
    let result = stratify(&ctx, &params, &AtomicBool::new(false)).unwrap();
    assert_eq!(result.assignments.len(), 3);
}
