//! Error taxonomy of the stratification pipeline

use std::fmt;

/// Pipeline stage an error is attributed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Graph,
    Propagation,
    Laplacian,
    Subsample,
    Normalization,
    Alignment,
    Factorization,
    Consensus,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Graph => "graph",
            Stage::Propagation => "propagation",
            Stage::Laplacian => "laplacian",
            Stage::Subsample => "subsample",
            Stage::Normalization => "normalization",
            Stage::Alignment => "alignment",
            Stage::Factorization => "factorization",
            Stage::Consensus => "consensus",
        };
        f.write_str(name)
    }
}

/// Show at most a handful of identifiers in a message
fn preview(ids: &[Box<str>]) -> String {
    const MAX_SHOWN: usize = 10;
    let shown = ids
        .iter()
        .take(MAX_SHOWN)
        .map(|x| x.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > MAX_SHOWN {
        format!("{} (+{} more)", shown, ids.len() - MAX_SHOWN)
    } else {
        shown
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NbsError {
    /// Out-of-range configuration; raised before any computation
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Identifier sets of two inputs do not intersect sufficiently
    #[error("data mismatch at {stage}: {detail} [{}]", preview(.identifiers))]
    DataMismatch {
        stage: Stage,
        detail: String,
        identifiers: Vec<Box<str>>,
    },

    /// Malformed graph or genes missing from it
    #[error("structural violation: {detail} [{}]", preview(.nodes))]
    StructuralViolation {
        detail: String,
        nodes: Vec<Box<str>>,
    },

    /// A subsampling iteration failed
    #[error("iteration {index} (seed {seed}) failed: {source}")]
    Iteration {
        index: usize,
        seed: u64,
        #[source]
        source: Box<NbsError>,
    },

    /// The run was cancelled before every iteration started
    #[error("cancelled: {cancelled} iterations never ran ({completed} completed)")]
    Cancelled { cancelled: usize, completed: usize },
}

impl NbsError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        NbsError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn mismatch(stage: Stage, detail: impl Into<String>, identifiers: Vec<Box<str>>) -> Self {
        NbsError::DataMismatch {
            stage,
            detail: detail.into(),
            identifiers,
        }
    }

    pub fn structural(detail: impl Into<String>, nodes: Vec<Box<str>>) -> Self {
        NbsError::StructuralViolation {
            detail: detail.into(),
            nodes,
        }
    }

    /// Stage of the innermost data mismatch, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            NbsError::DataMismatch { stage, .. } => Some(*stage),
            NbsError::Iteration { source, .. } => source.stage(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NbsError>;
