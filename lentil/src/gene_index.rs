//! Named, ordered gene sets and the explicit joins between them

use crate::error::{NbsError, Result, Stage};
use fnv::FnvHashMap as HashMap;

/// An ordered set of unique gene identifiers with O(1) lookup
#[derive(Clone, Debug)]
pub struct GeneIndex {
    names: Vec<Box<str>>,
    position: HashMap<Box<str>, usize>,
}

impl PartialEq for GeneIndex {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

/// How the entries of one index map onto another
#[derive(Clone, Debug)]
pub struct GeneAlignment {
    /// positions in the source index, in target order
    pub source: Vec<usize>,
    /// positions in the target index of the shared genes
    pub target: Vec<usize>,
    /// target genes absent from the source
    pub missing: Vec<Box<str>>,
    /// source genes absent from the target
    pub dropped: Vec<Box<str>>,
}

impl GeneAlignment {
    pub fn num_shared(&self) -> usize {
        self.source.len()
    }

    /// Every target gene must be found in the source
    pub fn require_complete(self, stage: Stage) -> Result<Self> {
        if self.missing.is_empty() {
            Ok(self)
        } else {
            Err(NbsError::mismatch(
                stage,
                format!("{} genes have no counterpart", self.missing.len()),
                self.missing,
            ))
        }
    }

    /// At least one gene must be shared; the error names source genes
    pub fn require_overlap(self, stage: Stage) -> Result<Self> {
        if self.source.is_empty() {
            Err(NbsError::mismatch(
                stage,
                "no shared genes",
                self.dropped.into_iter().take(10).collect(),
            ))
        } else {
            Ok(self)
        }
    }
}

impl GeneIndex {
    /// Duplicate names are a structural violation
    pub fn new(names: Vec<Box<str>>) -> Result<Self> {
        let mut position = HashMap::default();
        let mut dups = vec![];
        for (i, x) in names.iter().enumerate() {
            if position.insert(x.clone(), i).is_some() {
                dups.push(x.clone());
            }
        }
        if !dups.is_empty() {
            return Err(NbsError::structural("duplicate gene identifiers", dups));
        }
        Ok(Self { names, position })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.position.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position.contains_key(name)
    }

    /// Rank of each gene when identifiers are sorted lexicographically
    pub fn lexicographic_rank(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.names[a].cmp(&self.names[b]));
        let mut rank = vec![0; self.len()];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        rank
    }

    /// Map `self` (source) onto `target`, reporting both differences
    pub fn align(&self, target: &GeneIndex) -> GeneAlignment {
        let mut source = Vec::with_capacity(target.len());
        let mut shared = Vec::with_capacity(target.len());
        let mut missing = vec![];
        for (t, name) in target.names.iter().enumerate() {
            match self.position(name) {
                Some(s) => {
                    source.push(s);
                    shared.push(t);
                }
                None => missing.push(name.clone()),
            }
        }
        let dropped = self
            .names
            .iter()
            .filter(|x| !target.contains(x))
            .cloned()
            .collect();

        GeneAlignment {
            source,
            target: shared,
            missing,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(names: &[&str]) -> GeneIndex {
        GeneIndex::new(names.iter().map(|&x| x.into()).collect()).unwrap()
    }

    #[test]
    fn test_duplicates_rejected() {
        let out = GeneIndex::new(vec!["A".into(), "B".into(), "A".into()]);
        assert!(matches!(out, Err(NbsError::StructuralViolation { .. })));
    }

    #[test]
    fn test_align_reports_both_sides() {
        let source = index(&["A", "B", "C", "E"]);
        let target = index(&["C", "A", "D"]);
        let aligned = source.align(&target);
        assert_eq!(aligned.source, vec![2, 0]);
        assert_eq!(aligned.target, vec![0, 1]);
        assert_eq!(aligned.missing, vec![Box::<str>::from("D")]);
        assert_eq!(
            aligned.dropped,
            vec![Box::<str>::from("B"), Box::<str>::from("E")]
        );
        assert!(aligned.clone().require_overlap(Stage::Subsample).is_ok());
        assert!(matches!(
            aligned.require_complete(Stage::Alignment),
            Err(NbsError::DataMismatch {
                stage: Stage::Alignment,
                ..
            })
        ));
    }

    #[test]
    fn test_lexicographic_rank() {
        let genes = index(&["TP53", "APC", "KRAS"]);
        assert_eq!(genes.lexicographic_rank(), vec![2, 0, 1]);
    }
}
