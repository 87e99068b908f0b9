#![allow(unused)]

pub use crate::error::{NbsError, Result, Stage};
pub use crate::gene_index::GeneIndex;

pub use indicatif::ParallelProgressIterator;
pub use log::{info, warn};
pub use rayon::prelude::*;

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;
pub type CscMat = nalgebra_sparse::CscMatrix<f64>;
pub type CooMat = nalgebra_sparse::CooMatrix<f64>;

pub use fnv::FnvHashMap as HashMap;
pub use fnv::FnvHashSet as HashSet;
