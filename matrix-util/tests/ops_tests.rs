use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_util::DMatrix;
use matrix_util::traits::{CompositeOps, MatOps, SampleOps};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn runif_is_reproducible() {
    let a = DMatrix::<f64>::runif_with(5, 4, &mut StdRng::seed_from_u64(3));
    let b = DMatrix::<f64>::runif_with(5, 4, &mut StdRng::seed_from_u64(3));
    assert_eq!(a, b);
    assert!(a.iter().all(|&x| (0.0..1.0).contains(&x)));
}

#[test]
fn sparse_products_match_dense() {
    let mut rng = StdRng::seed_from_u64(42);
    let x = DMatrix::<f64>::runif_with(6, 20, &mut rng);

    // path graph laplacian
    let mut coo = CooMatrix::new(20, 20);
    for i in 0..20 {
        let deg = if i == 0 || i == 19 { 1.0 } else { 2.0 };
        coo.push(i, i, deg);
        if i + 1 < 20 {
            coo.push(i, i + 1, -1.0);
            coo.push(i + 1, i, -1.0);
        }
    }
    let lap = CscMatrix::from(&coo);
    let dense = DMatrix::from(&lap);

    assert_abs_diff_eq!(x.mul_csc(&lap), &x * &dense, epsilon = 1e-12);

    // trace(X L X') = sum of squared differences along the path
    let smooth: f64 = (0..6)
        .map(|r| (0..19).map(|i| (x[(r, i)] - x[(r, i + 1)]).powi(2)).sum::<f64>())
        .sum();
    assert_abs_diff_eq!(x.quadratic_trace_csc(&lap), smooth, epsilon = 1e-10);
    assert_abs_diff_eq!(dense.asymmetry().unwrap(), 0.0);
}
