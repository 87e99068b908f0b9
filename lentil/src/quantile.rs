use crate::common::*;

/// Quantile-normalize the rows of `x` so every row shares one
/// distribution: the mean of the sorted rows. Tied values within a row
/// get the mean reference value over the ranks they span.
pub fn quantile_normalize(x: &Mat) -> Mat {
    let (nrows, ncols) = x.shape();
    if nrows == 0 || ncols == 0 {
        return x.clone();
    }

    let orders: Vec<Vec<usize>> = (0..nrows)
        .into_par_iter()
        .map(|i| {
            let row = x.row(i);
            let mut order: Vec<usize> = (0..ncols).collect();
            order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));
            order
        })
        .collect();

    let mut reference = vec![0_f64; ncols];
    for (i, order) in orders.iter().enumerate() {
        for (r, &j) in order.iter().enumerate() {
            reference[r] += x[(i, j)];
        }
    }
    for v in reference.iter_mut() {
        *v /= nrows as f64;
    }

    let rows: Vec<Vec<f64>> = orders
        .par_iter()
        .enumerate()
        .map(|(i, order)| {
            let mut out = vec![0_f64; ncols];
            let mut lb = 0;
            while lb < ncols {
                let value = x[(i, order[lb])];
                let mut ub = lb + 1;
                while ub < ncols && x[(i, order[ub])] == value {
                    ub += 1;
                }
                let tied = reference[lb..ub].iter().sum::<f64>() / (ub - lb) as f64;
                for &j in &order[lb..ub] {
                    out[j] = tied;
                }
                lb = ub;
            }
            out
        })
        .collect();

    Mat::from_row_iterator(nrows, ncols, rows.into_iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rows_share_one_distribution() {
        let x = Mat::from_row_slice(3, 4, &[5.0, 2.0, 3.0, 4.0, 4.0, 1.0, 4.0, 2.0, 3.0, 4.0, 6.0, 8.0]);
        let q = quantile_normalize(&x);

        // sorted rows: [2,3,4,5], [1,2,4,4], [3,4,6,8]
        let reference = [2.0, 3.0, 14.0 / 3.0, 17.0 / 3.0];

        assert_abs_diff_eq!(q[(0, 1)], reference[0]);
        assert_abs_diff_eq!(q[(0, 0)], reference[3]);
        assert_abs_diff_eq!(q[(2, 3)], reference[3]);

        // the two 4s in row 1 share ranks 2 and 3
        let tied = 0.5 * (reference[2] + reference[3]);
        assert_abs_diff_eq!(q[(1, 0)], tied);
        assert_abs_diff_eq!(q[(1, 2)], tied);
        assert_abs_diff_eq!(q[(1, 1)], reference[0]);
    }

    #[test]
    fn test_preserves_within_row_order() {
        let x = Mat::from_fn(5, 7, |i, j| ((i * 3 + j * 5) % 11) as f64);
        let q = quantile_normalize(&x);
        for i in 0..5 {
            for a in 0..7 {
                for b in 0..7 {
                    if x[(i, a)] < x[(i, b)] {
                        assert!(q[(i, a)] <= q[(i, b)]);
                    }
                }
            }
        }
    }
}
