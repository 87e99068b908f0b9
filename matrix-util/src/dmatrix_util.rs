use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use rand::distr::{Distribution, StandardUniform};
use rand::Rng;

impl<T> MatOps for DMatrix<T>
where
    T: nalgebra::RealField + Copy,
{
    type Scalar = T;

    fn asymmetry(&self) -> Option<T> {
        if self.nrows() != self.ncols() {
            return None;
        }
        let n = self.nrows();
        let mut worst = T::zero();
        for j in 0..n {
            for i in (j + 1)..n {
                let d = self[(i, j)] - self[(j, i)];
                let d = if d < T::zero() { -d } else { d };
                if d > worst {
                    worst = d;
                }
            }
        }
        Some(worst)
    }
}

impl<T> SampleOps for DMatrix<T>
where
    T: nalgebra::Scalar,
    StandardUniform: Distribution<T>,
{
    type Mat = Self;

    fn runif_with<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::<T>::from_fn(dd, nn, |_, _| rng.random::<T>())
    }
}

impl<T> CompositeOps for DMatrix<T>
where
    T: nalgebra::RealField + Copy,
{
    type Scalar = T;
    type Mat = DMatrix<T>;
    type Other = CscMatrix<T>;

    fn mul_csc(&self, other: &CscMatrix<T>) -> DMatrix<T> {
        assert_eq!(self.ncols(), other.nrows(), "dimension mismatch in mul_csc");
        let mut ret = DMatrix::<T>::zeros(self.nrows(), other.ncols());
        for (j, col) in other.col_iter().enumerate() {
            let mut ret_j = ret.column_mut(j);
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                ret_j.axpy(v, &self.column(i), T::one());
            }
        }
        ret
    }

    fn quadratic_trace_csc(&self, other: &CscMatrix<T>) -> T {
        assert_eq!(self.ncols(), other.nrows(), "dimension mismatch");
        let mut tot = T::zero();
        for (j, col) in other.col_iter().enumerate() {
            let x_j = self.column(j);
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                tot += v * self.column(i).dot(&x_j);
            }
        }
        tot
    }
}
