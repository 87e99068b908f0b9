//! Graph-regularized non-negative matrix factorization.
//!
//! `X ~ W H` with `X` (patients x genes), `W` (patients x k) and
//! `H` (k x genes) minimizing
//! `||X - W H||_F^2 + lambda * trace(H L H')`.
//! The Laplacian is split as `L = L+ - L-` with
//! `L+ = (|L| + L) / 2` and `L- = (|L| - L) / 2`, which keeps every
//! multiplicative update non-negative.

use crate::common::*;
use crate::params::NmfOptions;
use matrix_util::traits::{CompositeOps, SampleOps};
use rand::Rng;
use serde::Serialize;

/// relative slack before an objective increase counts as unstable
const INCREASE_SLACK: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIter,
    Residual,
    ObjectiveDelta,
}

#[derive(Clone, Debug)]
pub struct Factorization {
    /// patients x k, non-negative
    pub w: Mat,
    /// k x genes, non-negative, unit-norm rows
    pub h: Mat,
    /// objective of the returned, rescaled `(w, h)`
    pub objective: f64,
    /// `||X - W H||_F / ||X||_F`
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
    pub stop: StopReason,
    /// number of updates that increased the objective
    pub instability_events: usize,
}

impl Factorization {
    /// Arg-max over the columns of `W` for every patient; ties go to the
    /// lowest cluster index
    pub fn assign(&self) -> Vec<usize> {
        self.w
            .row_iter()
            .map(|row| {
                let mut best = 0;
                for (c, &v) in row.iter().enumerate().skip(1) {
                    if v > row[best] {
                        best = c;
                    }
                }
                best
            })
            .collect()
    }
}

/// `(L+, L-)`: positive part and magnitude of the negative part
fn split_laplacian(laplacian: &CscMat) -> (CscMat, CscMat) {
    let (nr, nc) = (laplacian.nrows(), laplacian.ncols());
    let mut pos = CooMat::new(nr, nc);
    let mut neg = CooMat::new(nr, nc);
    for (i, j, &v) in laplacian.triplet_iter() {
        if v > 0.0 {
            pos.push(i, j, v);
        } else if v < 0.0 {
            neg.push(i, j, -v);
        }
    }
    (CscMat::from(&pos), CscMat::from(&neg))
}

fn validate(x: &Mat, k: usize, laplacian: Option<&CscMat>, lambda: f64) -> Result<()> {
    let (n, p) = x.shape();
    if x.iter().any(|&v| !v.is_finite() || v < 0.0) {
        return Err(NbsError::invalid(
            "x",
            "entries must be finite and non-negative",
        ));
    }
    if k == 0 || k > n.min(p) {
        return Err(NbsError::invalid(
            "k",
            format!("{} is not in [1, {}] for a {} x {} matrix", k, n.min(p), n, p),
        ));
    }
    if !(lambda.is_finite() && lambda >= 0.0) {
        return Err(NbsError::invalid(
            "lambda",
            format!("{} is not a finite non-negative weight", lambda),
        ));
    }
    if let Some(l) = laplacian {
        if l.nrows() != p || l.ncols() != p {
            return Err(NbsError::mismatch(
                Stage::Factorization,
                format!(
                    "laplacian is {} x {} for {} gene columns",
                    l.nrows(),
                    l.ncols(),
                    p
                ),
                vec![],
            ));
        }
    }
    Ok(())
}

/// `H <- H o numer / (denom + eps)`, clamped at zero
fn multiplicative_update(x: &mut Mat, numer: &Mat, denom: &Mat, eps: f64) {
    x.zip_zip_apply(numer, denom, |x_ij, a, b| {
        *x_ij = (*x_ij * a / (b + eps)).max(0.0);
    });
}

/// Factorize `x` at rank `k`.
///
/// `lambda = 0` or no Laplacian runs the plain Lee-Seung updates. The
/// generator is only used for the uniform initialization. The best
/// iterate seen is returned, with rows of `H` scaled to unit norm and
/// the scales moved into `W`.
pub fn factorize<R: Rng>(
    x: &Mat,
    k: usize,
    laplacian: Option<&CscMat>,
    lambda: f64,
    options: &NmfOptions,
    rng: &mut R,
) -> Result<Factorization> {
    options.validate()?;
    validate(x, k, laplacian, lambda)?;

    let w = Mat::runif_with(x.nrows(), k, rng);
    let h = Mat::runif_with(k, x.ncols(), rng);
    Ok(run_updates(x, w, h, laplacian, lambda, options))
}

/// Multiplicative updates from `(w, h)`; inputs are already validated
fn run_updates(
    x: &Mat,
    mut w: Mat,
    mut h: Mat,
    laplacian: Option<&CscMat>,
    lambda: f64,
    options: &NmfOptions,
) -> Factorization {
    let graph = laplacian
        .filter(|_| lambda > 0.0)
        .map(|l| (l, split_laplacian(l)));

    let eps = options.eps;
    let x_norm = x.norm();

    let objective = |w: &Mat, h: &Mat| -> (f64, f64) {
        let resid_sq = (x - w * h).norm_squared();
        let penalty = match &graph {
            Some((l, _)) => lambda * h.quadratic_trace_csc(l),
            None => 0.0,
        };
        let residual = if x_norm > 0.0 {
            resid_sq.sqrt() / x_norm
        } else {
            0.0
        };
        (resid_sq + penalty, residual)
    };

    let (mut prev, residual) = objective(&w, &h);
    let mut best = (w.clone(), h.clone(), prev, residual);
    let mut instability_events = 0;
    let mut iterations = 0;
    let mut stop = StopReason::MaxIter;

    while iterations < options.max_iter {
        iterations += 1;

        let wt = w.transpose();
        let mut numer = &wt * x;
        let mut denom = (&wt * &w) * &h;
        if let Some((_, (l_pos, l_neg))) = &graph {
            numer += h.mul_csc(l_neg) * lambda;
            denom += h.mul_csc(l_pos) * lambda;
        }
        multiplicative_update(&mut h, &numer, &denom, eps);

        let ht = h.transpose();
        let numer = x * &ht;
        let denom = &w * (&h * &ht);
        multiplicative_update(&mut w, &numer, &denom, eps);

        let (obj, residual) = objective(&w, &h);

        if obj > prev + INCREASE_SLACK * prev.abs() {
            instability_events += 1;
        }
        if obj < best.2 {
            best = (w.clone(), h.clone(), obj, residual);
        }

        if residual < options.residual_tol {
            stop = StopReason::Residual;
            break;
        }
        let delta = (prev - obj).abs() / prev.abs().max(f64::MIN_POSITIVE);
        if delta < options.delta_tol {
            stop = StopReason::ObjectiveDelta;
            break;
        }
        prev = obj;
    }

    if instability_events > 0 {
        warn!(
            "objective increased in {} of {} updates; keeping the best iterate",
            instability_events, iterations
        );
    }

    let (mut w, mut h, _, _) = best;
    for r in 0..h.nrows() {
        let norm = h.row(r).norm();
        if norm > 0.0 {
            h.row_mut(r).unscale_mut(norm);
            w.column_mut(r).scale_mut(norm);
        }
    }

    // rescaling leaves W H alone but moves the smoothness penalty
    let (objective, residual) = objective(&w, &h);

    Factorization {
        w,
        h,
        objective,
        residual,
        iterations,
        converged: stop != StopReason::MaxIter,
        stop,
        instability_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// patients 0..4 mutate genes 0..3, patients 4..8 genes 3..6
    fn two_blocks() -> Mat {
        Mat::from_fn(8, 6, |i, j| if (i < 4) == (j < 3) { 1.0 } else { 0.0 })
    }

    fn path_laplacian(p: usize) -> CscMat {
        let mut coo = CooMat::new(p, p);
        for i in 0..p {
            let deg = if i == 0 || i == p - 1 { 1.0 } else { 2.0 };
            coo.push(i, i, deg);
            if i + 1 < p {
                coo.push(i, i + 1, -1.0);
                coo.push(i + 1, i, -1.0);
            }
        }
        CscMat::from(&coo)
    }

    #[test]
    fn test_zero_lambda_is_plain_nmf() {
        let x = two_blocks();
        let l = path_laplacian(6);
        let opts = NmfOptions::default();

        let plain = factorize(&x, 2, None, 200.0, &opts, &mut StdRng::seed_from_u64(7)).unwrap();
        let zero = factorize(&x, 2, Some(&l), 0.0, &opts, &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(plain.w, zero.w);
        assert_eq!(plain.h, zero.h);
        assert_eq!(plain.iterations, zero.iterations);
    }

    #[test]
    fn test_factors_are_non_negative_and_rows_unit() {
        let x = two_blocks();
        let l = path_laplacian(6);
        let fit = factorize(
            &x,
            2,
            Some(&l),
            1.0,
            &NmfOptions::default(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        assert!(fit.w.iter().all(|&v| v >= 0.0));
        assert!(fit.h.iter().all(|&v| v >= 0.0));
        for row in fit.h.row_iter() {
            let norm = row.norm();
            assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-12);
        }
        let resid = (&x - &fit.w * &fit.h).norm() / x.norm();
        assert_abs_diff_eq!(resid, fit.residual, epsilon = 1e-10);
    }

    #[test]
    fn test_recovers_planted_blocks() {
        let x = two_blocks();
        let fit = factorize(&x, 2, None, 0.0, &NmfOptions::default(), &mut StdRng::seed_from_u64(3)).unwrap();
        let labels = fit.assign();
        assert!(labels[..4].iter().all(|&c| c == labels[0]));
        assert!(labels[4..].iter().all(|&c| c == labels[4]));
        assert_ne!(labels[0], labels[4]);
        assert!(fit.residual < 0.1);
    }

    #[test]
    fn test_argmax_ties_go_to_lowest_index() {
        let fit = Factorization {
            w: Mat::from_row_slice(3, 3, &[0.5, 0.5, 0.1, 0.0, 0.0, 0.0, 0.1, 0.2, 0.2]),
            h: Mat::identity(3, 3),
            objective: 0.0,
            residual: 0.0,
            iterations: 0,
            converged: true,
            stop: StopReason::Residual,
            instability_events: 0,
        };
        assert_eq!(fit.assign(), vec![0, 0, 1]);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let x = two_blocks();
        let opts = NmfOptions::default();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            factorize(&x, 0, None, 0.0, &opts, &mut rng),
            Err(NbsError::InvalidParameter { name: "k", .. })
        ));
        assert!(matches!(
            factorize(&x, 7, None, 0.0, &opts, &mut rng),
            Err(NbsError::InvalidParameter { name: "k", .. })
        ));
        assert!(matches!(
            factorize(&x, 2, Some(&path_laplacian(5)), 1.0, &opts, &mut rng),
            Err(NbsError::DataMismatch {
                stage: Stage::Factorization,
                ..
            })
        ));
        let mut neg = x.clone();
        neg[(0, 0)] = -1.0;
        assert!(factorize(&neg, 2, None, 0.0, &opts, &mut rng).is_err());
    }

    #[test]
    fn test_objective_increase_keeps_best_iterate() {
        // start at an exact factorization; a large eps shrinks H on the
        // first update and the objective rises from zero
        let w0 = Mat::from_fn(8, 2, |i, c| if (i < 4) == (c == 0) { 1.0 } else { 0.0 });
        let h0 = Mat::from_fn(2, 6, |c, j| if (c == 0) == (j < 3) { 1.0 } else { 0.0 });
        let x = &w0 * &h0;
        assert_eq!(x, two_blocks());

        let opts = NmfOptions {
            eps: 10.0,
            max_iter: 20,
            ..Default::default()
        };
        let fit = run_updates(&x, w0, h0, None, 0.0, &opts);

        assert!(fit.instability_events > 0);
        assert_abs_diff_eq!(fit.objective, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(&fit.w * &fit.h, x, epsilon = 1e-12);
        for row in fit.h.row_iter() {
            assert_abs_diff_eq!(row.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_objective_matches_returned_factors() {
        let x = two_blocks();
        let l = path_laplacian(6);
        let lambda = 5.0;
        let fit = factorize(
            &x,
            2,
            Some(&l),
            lambda,
            &NmfOptions::default(),
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        let expected =
            (&x - &fit.w * &fit.h).norm_squared() + lambda * fit.h.quadratic_trace_csc(&l);
        assert_abs_diff_eq!(fit.objective, expected, epsilon = 1e-9);
    }
}
