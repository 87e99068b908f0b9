//! Binary patient-by-gene mutation profiles

use crate::common::*;

/// Patients (rows) by genes (columns), entries in {0, 1}
#[derive(Clone, Debug)]
pub struct MutationMatrix {
    patients: Vec<Box<str>>,
    genes: GeneIndex,
    data: Mat,
}

impl MutationMatrix {
    pub fn new(patients: Vec<Box<str>>, genes: Vec<Box<str>>, data: Mat) -> Result<Self> {
        if data.nrows() != patients.len() || data.ncols() != genes.len() {
            return Err(NbsError::invalid(
                "mutations",
                format!(
                    "{} x {} names for a {} x {} matrix",
                    patients.len(),
                    genes.len(),
                    data.nrows(),
                    data.ncols()
                ),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::default();
        let dups: Vec<Box<str>> = patients
            .iter()
            .filter(|&x| !seen.insert(x.as_ref()))
            .cloned()
            .collect();
        if !dups.is_empty() {
            return Err(NbsError::invalid(
                "mutations",
                format!("duplicate patients: {}", dups.join(", ")),
            ));
        }

        if let Some(x) = data.iter().find(|&&x| x != 0.0 && x != 1.0) {
            return Err(NbsError::invalid(
                "mutations",
                format!("entries must be 0 or 1, found {}", x),
            ));
        }

        let genes = GeneIndex::new(genes).map_err(|e| NbsError::invalid("mutations", e.to_string()))?;

        Ok(Self {
            patients,
            genes,
            data,
        })
    }

    /// Build from `(patient, gene)` pairs; names keep first-seen order
    /// and repeated pairs count once
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, S)]) -> Result<Self> {
        let mut patient_pos: HashMap<&str, usize> = HashMap::default();
        let mut gene_pos: HashMap<&str, usize> = HashMap::default();
        let mut patients: Vec<Box<str>> = vec![];
        let mut genes: Vec<Box<str>> = vec![];
        let mut hits = Vec::with_capacity(pairs.len());

        for (p, g) in pairs {
            let (p, g) = (p.as_ref(), g.as_ref());
            let i = *patient_pos.entry(p).or_insert_with(|| {
                patients.push(p.into());
                patients.len() - 1
            });
            let j = *gene_pos.entry(g).or_insert_with(|| {
                genes.push(g.into());
                genes.len() - 1
            });
            hits.push((i, j));
        }

        let mut data = Mat::zeros(patients.len(), genes.len());
        for (i, j) in hits {
            data[(i, j)] = 1.0;
        }
        Self::new(patients, genes, data)
    }

    pub fn num_patients(&self) -> usize {
        self.patients.len()
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn patients(&self) -> &[Box<str>] {
        &self.patients
    }

    pub fn genes(&self) -> &GeneIndex {
        &self.genes
    }

    pub fn data(&self) -> &Mat {
        &self.data
    }

    /// Mutations of `patient` among the gene columns `genes`
    pub fn count_mutations(&self, patient: usize, genes: &[usize]) -> usize {
        genes
            .iter()
            .filter(|&&j| self.data[(patient, j)] > 0.0)
            .count()
    }
}
