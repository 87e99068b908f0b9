use crate::common_io::Delimiter;
use rand::Rng;

/// Structural checks on a matrix
pub trait MatOps {
    type Scalar;

    /// Maximum absolute difference between `self` and its transpose;
    /// `None` if not square
    fn asymmetry(&self) -> Option<Self::Scalar>;
}

/// Operations to sample random matrices from a caller-owned generator
/// so that results are reproducible under a fixed seed
pub trait SampleOps {
    type Mat;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif_with<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;
}

/// Operations that involves multiple types
pub trait CompositeOps {
    type Scalar;
    type Mat;
    type Other;

    /// `self * other` where `other` is a `CscMatrix`
    fn mul_csc(&self, other: &Self::Other) -> Self::Mat;

    /// `sum_ij other[i,j] * (self[,i]' self[,j])`, i.e., `trace(self * other * self')`
    /// for `self` stored as (k x n) and `other` as (n x n)
    fn quadratic_trace_csc(&self, other: &Self::Other) -> Self::Scalar;
}

/// Read and write matrices with row and column names
pub trait IoOps {
    type Mat;

    /// Write with a header line of column names and a leading column
    /// of row names
    fn write_with_names(
        &self,
        file: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
        delim: &str,
    ) -> anyhow::Result<()>;

    /// Read back what `write_with_names` wrote
    fn read_with_names(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;
}

/// A matrix together with its row and column names
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}
