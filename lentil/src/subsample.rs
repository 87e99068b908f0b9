//! Random subsets of patients and genes for one iteration

use crate::common::*;
use crate::params::{check_fraction, SubsampleParams};
use rand::Rng;

/// Rows and columns drawn for one iteration
#[derive(Clone, Debug)]
pub struct Subsample {
    /// patient rows in draw order; may repeat when drawn with replacement
    pub patients: Vec<usize>,
    /// distinct gene columns, ascending
    pub genes: Vec<usize>,
}

/// `round(fraction * n)`, at least one
pub fn subsample_size(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).round() as usize).clamp(1, n.max(1))
}

/// Draw `subsample_size(n, fraction)` indices out of `0..n`.
///
/// Without replacement the indices come back sorted. With replacement
/// they keep their draw order.
pub fn draw_indices<R: Rng>(n: usize, fraction: f64, replace: bool, rng: &mut R) -> Result<Vec<usize>> {
    check_fraction("fraction", fraction)?;
    if n == 0 {
        return Ok(vec![]);
    }
    let size = subsample_size(n, fraction);
    if replace {
        Ok((0..size).map(|_| rng.random_range(0..n)).collect())
    } else {
        let mut drawn = rand::seq::index::sample(rng, n, size).into_vec();
        drawn.sort_unstable();
        Ok(drawn)
    }
}

/// Patients first, then genes, from the same generator
pub fn subsample<R: Rng>(
    num_patients: usize,
    num_genes: usize,
    params: &SubsampleParams,
    rng: &mut R,
) -> Result<Subsample> {
    let patients = draw_indices(num_patients, params.patient_fraction, params.replace, rng)?;
    let mut genes = draw_indices(num_genes, params.gene_fraction, params.replace, rng)?;
    genes.sort_unstable();
    genes.dedup();
    Ok(Subsample { patients, genes })
}
