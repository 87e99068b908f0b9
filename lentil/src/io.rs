//! Plain-text readers and writers for the command-line front end

use crate::common::*;
use crate::consensus::ConsensusResult;
use crate::graph::GeneGraph;
use crate::mutation::MutationMatrix;
use crate::propagation::PropagationKernel;

use matrix_util::clustering::Dendrogram;
use matrix_util::common_io::{
    detect_delimiter, mkdir, open_buf_writer, read_lines_of_words_delim, write_lines,
};
use matrix_util::traits::IoOps;
use serde::Serialize;
use std::io::Write;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MutationFormat {
    /// two columns: patient, gene
    #[default]
    Pairs,
    /// header of gene names, then a patient name and 0/1 per gene
    Matrix,
}

/// Read a two-column edge list. Self-loops and repeated pairs are
/// skipped with a warning.
pub fn read_network(file: &str) -> anyhow::Result<GeneGraph> {
    let lines = read_lines_of_words_delim(file, detect_delimiter(file), -1)?.lines;

    let mut seen: HashSet<(Box<str>, Box<str>)> = HashSet::default();
    let mut edges = Vec::with_capacity(lines.len());
    let (mut self_loops, mut repeated) = (0, 0);

    for (i, words) in lines.into_iter().enumerate() {
        if words.len() < 2 {
            anyhow::bail!("{}: line {} has fewer than two genes", file, i + 1);
        }
        let (a, b) = (words[0].clone(), words[1].clone());
        if a == b {
            self_loops += 1;
            continue;
        }
        let key = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
        if !seen.insert(key) {
            repeated += 1;
            continue;
        }
        edges.push((a, b));
    }

    if self_loops > 0 || repeated > 0 {
        warn!(
            "{}: skipped {} self-loops and {} repeated edges",
            file, self_loops, repeated
        );
    }

    let graph = GeneGraph::from_edges(&edges)?;
    info!(
        "read a network of {} genes and {} edges from {}",
        graph.num_genes(),
        graph.num_edges(),
        file
    );
    Ok(graph)
}

pub fn read_mutations(file: &str, format: MutationFormat) -> anyhow::Result<MutationMatrix> {
    let delim = detect_delimiter(file);
    let mutations = match format {
        MutationFormat::Pairs => {
            let lines = read_lines_of_words_delim(file, delim, -1)?.lines;
            let mut pairs = Vec::with_capacity(lines.len());
            for (i, words) in lines.into_iter().enumerate() {
                if words.len() < 2 {
                    anyhow::bail!("{}: line {} needs a patient and a gene", file, i + 1);
                }
                pairs.push((words[0].clone(), words[1].clone()));
            }
            MutationMatrix::from_pairs(&pairs)?
        }
        MutationFormat::Matrix => {
            let out = read_lines_of_words_delim(file, delim, 0)?;
            let ngenes = out.lines.first().map(|w| w.len().saturating_sub(1)).unwrap_or(0);

            // the header may or may not carry a corner cell
            let genes: Vec<Box<str>> = if out.header.len() == ngenes + 1 {
                out.header[1..].to_vec()
            } else {
                out.header.clone()
            };
            if genes.len() != ngenes {
                anyhow::bail!(
                    "{}: {} gene names in the header, {} values per row",
                    file,
                    genes.len(),
                    ngenes
                );
            }

            let mut patients = Vec::with_capacity(out.lines.len());
            let mut data = Vec::with_capacity(out.lines.len() * ngenes);
            for (i, words) in out.lines.into_iter().enumerate() {
                if words.len() != ngenes + 1 {
                    anyhow::bail!("{}: row {} has {} fields", file, i + 1, words.len());
                }
                let mut words = words.into_iter();
                if let Some(p) = words.next() {
                    patients.push(p);
                }
                for w in words {
                    data.push(w.parse::<f64>().map_err(|e| {
                        anyhow::anyhow!("{}: row {}: cannot parse `{}`: {}", file, i + 1, w, e)
                    })?);
                }
            }
            let x = Mat::from_row_iterator(patients.len(), ngenes, data);
            MutationMatrix::new(patients, genes, x)?
        }
    };

    info!(
        "read mutations of {} patients over {} genes from {}",
        mutations.num_patients(),
        mutations.num_genes(),
        file
    );
    Ok(mutations)
}

pub fn write_kernel(file: &str, kernel: &PropagationKernel) -> anyhow::Result<()> {
    mkdir(file)?;
    let genes = kernel.genes().names();
    kernel.matrix().write_with_names(file, genes, genes, "\t")
}

/// Reload a kernel written by [`write_kernel`]
pub fn read_kernel(file: &str, alpha: f64, symmetric_norm: bool) -> anyhow::Result<PropagationKernel> {
    let named = Mat::read_with_names(file, "\t")?;
    if named.rows != named.cols {
        anyhow::bail!("{}: row and column genes differ", file);
    }
    Ok(PropagationKernel::from_parts(
        named.rows,
        named.mat,
        alpha,
        symmetric_norm,
    )?)
}

pub fn write_consensus(file: &str, result: &ConsensusResult, patients: &[Box<str>]) -> anyhow::Result<()> {
    mkdir(file)?;
    result
        .consensus
        .write_with_names(file, patients, patients, "\t")
}

pub fn write_assignment(file: &str, assignment: &[usize], patients: &[Box<str>]) -> anyhow::Result<()> {
    mkdir(file)?;
    let lines: Vec<Box<str>> = patients
        .iter()
        .zip(assignment)
        .map(|(p, c)| format!("{}\t{}", p, c).into_boxed_str())
        .collect();
    write_lines(&lines, file)
}

/// One merge per line: `left right distance size`, cluster ids as in
/// a linkage matrix
pub fn write_linkage(file: &str, dendrogram: &Dendrogram) -> anyhow::Result<()> {
    mkdir(file)?;
    let lines: Vec<Box<str>> = std::iter::once("#left\tright\tdistance\tsize".to_string())
        .chain(
            dendrogram
                .merges
                .iter()
                .map(|m| format!("{}\t{}\t{}\t{}", m.left, m.right, m.distance, m.size)),
        )
        .map(String::into_boxed_str)
        .collect();
    write_lines(&lines, file)
}

pub fn write_json<T: Serialize>(file: &str, value: &T) -> anyhow::Result<()> {
    mkdir(file)?;
    let mut buf = open_buf_writer(file)?;
    serde_json::to_writer_pretty(&mut buf, value)?;
    writeln!(buf)?;
    buf.flush()?;
    Ok(())
}
