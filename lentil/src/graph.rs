//! Undirected, unweighted, simple gene-interaction graph

use crate::common::*;
use std::collections::VecDeque;

/// slope and intercept of the edge-count heuristic for the restart weight
const ALPHA_SLOPE: f64 = -0.02935302;
const ALPHA_INTERCEPT: f64 = 0.74842057;

/// An immutable simple graph over gene identifiers.
///
/// Node order is the order genes were introduced; every gene-indexed
/// structure derived from the graph follows it.
#[derive(Clone, Debug)]
pub struct GeneGraph {
    genes: GeneIndex,
    /// sorted neighbour lists
    adjacency: Vec<Vec<usize>>,
    /// canonical `(i, j)` with `i < j`, sorted
    edges: Vec<(usize, usize)>,
}

impl GeneGraph {
    /// Build from an edge list alone; nodes appear in first-seen order
    pub fn from_edges<S: AsRef<str>>(edges: &[(S, S)]) -> Result<Self> {
        let mut seen = HashSet::default();
        let mut nodes: Vec<Box<str>> = vec![];
        for (a, b) in edges {
            for x in [a.as_ref(), b.as_ref()] {
                if seen.insert(x) {
                    nodes.push(x.into());
                }
            }
        }
        Self::new(nodes, edges)
    }

    /// Build from an explicit node list (isolated genes allowed) and
    /// edges between them.
    ///
    /// Self-loops, repeated edges (in either orientation), duplicate
    /// nodes and edges to unknown nodes are structural violations.
    pub fn new<S: AsRef<str>>(nodes: Vec<Box<str>>, edges: &[(S, S)]) -> Result<Self> {
        let genes = GeneIndex::new(nodes)?;
        let nn = genes.len();

        let mut unknown = vec![];
        let mut self_loops = vec![];
        let mut pairs = Vec::with_capacity(edges.len());

        for (a, b) in edges {
            let (a, b) = (a.as_ref(), b.as_ref());
            match (genes.position(a), genes.position(b)) {
                (Some(i), Some(j)) if i == j => self_loops.push(Box::from(a)),
                (Some(i), Some(j)) => pairs.push((i.min(j), i.max(j))),
                (i, j) => {
                    if i.is_none() {
                        unknown.push(Box::from(a));
                    }
                    if j.is_none() {
                        unknown.push(Box::from(b));
                    }
                }
            }
        }

        if !unknown.is_empty() {
            return Err(NbsError::structural("edges refer to unknown genes", unknown));
        }
        if !self_loops.is_empty() {
            return Err(NbsError::structural("self-loops", self_loops));
        }

        pairs.sort_unstable();
        let duplicated: Vec<Box<str>> = pairs
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| format!("{}-{}", genes.name(w[0].0), genes.name(w[0].1)).into_boxed_str())
            .collect();
        if !duplicated.is_empty() {
            return Err(NbsError::structural("duplicate edges", duplicated));
        }

        let mut adjacency = vec![vec![]; nn];
        for &(i, j) in pairs.iter() {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        for nbrs in adjacency.iter_mut() {
            nbrs.sort_unstable();
        }

        Ok(Self {
            genes,
            adjacency,
            edges: pairs,
        })
    }

    pub fn genes(&self) -> &GeneIndex {
        &self.genes
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// Positions of `names`; genes absent from the graph are a
    /// structural violation naming them
    pub fn lookup<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let mut found = Vec::with_capacity(names.len());
        let mut absent = vec![];
        for x in names {
            match self.genes.position(x.as_ref()) {
                Some(i) => found.push(i),
                None => absent.push(Box::from(x.as_ref())),
            }
        }
        if absent.is_empty() {
            Ok(found)
        } else {
            Err(NbsError::structural("genes absent from the graph", absent))
        }
    }

    /// Connected components by breadth-first search; each component's
    /// members are sorted and components are ordered by their smallest
    /// member
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let nn = self.num_genes();
        let mut label = vec![usize::MAX; nn];
        let mut queue = VecDeque::new();
        let mut components = vec![];

        for start in 0..nn {
            if label[start] != usize::MAX {
                continue;
            }
            let comp = components.len();
            let mut members = vec![start];
            label[start] = comp;
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                for &v in self.neighbors(u) {
                    if label[v] == usize::MAX {
                        label[v] = comp;
                        members.push(v);
                        queue.push_back(v);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    /// Restart-weight heuristic from the network size:
    /// `round(m * log10(|E|) + b, 3)`
    pub fn suggest_alpha(&self) -> Result<f64> {
        if self.edges.is_empty() {
            return Err(NbsError::structural(
                "cannot suggest alpha for a graph without edges",
                vec![],
            ));
        }
        let alpha = ALPHA_SLOPE * (self.num_edges() as f64).log10() + ALPHA_INTERCEPT;
        let alpha = (alpha * 1000.0).round() / 1000.0;
        if alpha <= 0.0 {
            return Err(NbsError::invalid(
                "alpha",
                format!("suggested value {} for {} edges is not positive", alpha, self.num_edges()),
            ));
        }
        info!("suggested alpha {} for {} edges", alpha, self.num_edges());
        Ok(alpha)
    }
}
