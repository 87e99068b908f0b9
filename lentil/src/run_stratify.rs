use anyhow::Context;
use clap::Args;
use lentil::consensus::ConsensusDistance;
use lentil::io::*;
use lentil::knn_laplacian::{LaplacianKind, SimilaritySource};
use lentil::params::*;
use lentil::pipeline::build_laplacian;
use lentil::{build_kernel, stratify, NbsContext};
use log::info;
use matrix_util::clustering::Linkage;
use std::sync::atomic::AtomicBool;

#[derive(Args, Debug)]
pub struct StratifyArgs {
    /// gene-gene edge list (`.tsv`, `.csv` or whitespace, optionally `.gz`)
    #[arg(short, long, required = true)]
    network: Box<str>,

    /// somatic mutations
    #[arg(short, long, required = true)]
    mutations: Box<str>,

    /// layout of the mutation file
    #[arg(long, value_enum, default_value = "pairs")]
    mutation_format: MutationFormat,

    /// precomputed kernel from `lentil kernel`, built with the same
    /// alpha and normalization
    #[arg(long)]
    kernel: Option<Box<str>>,

    /// number of subtypes
    #[arg(short, long, default_value_t = 3)]
    k: usize,

    /// number of subsampling iterations
    #[arg(long, default_value_t = 100)]
    niter: usize,

    /// random seed; iteration `i` uses `seed + i`
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// failed iterations tolerated before giving up
    #[arg(long, default_value_t = 0)]
    max_failed: usize,

    /// restart weight of the random walk
    #[arg(short, long, default_value_t = 0.7)]
    alpha: f64,

    /// pick alpha from the number of network edges instead
    #[arg(long, default_value_t = false)]
    suggest_alpha: bool,

    /// symmetric `D^{-1/2} A D^{-1/2}` instead of row normalization
    #[arg(long, default_value_t = false)]
    symmetric_norm: bool,

    /// convergence tolerance of the walk
    #[arg(long, default_value_t = 1e-6)]
    propagation_tol: f64,

    /// maximum number of walk iterations
    #[arg(long, default_value_t = 1000)]
    propagation_max_iter: usize,

    /// nearest neighbours per gene in the Laplacian graph
    #[arg(long, default_value_t = 11)]
    knn: usize,

    /// keep only mutual nearest neighbours
    #[arg(long, default_value_t = false)]
    reciprocal: bool,

    /// Laplacian of the kNN graph
    #[arg(long, value_enum, default_value = "combinatorial")]
    laplacian: LaplacianKind,

    /// similarity the gene neighbours are ranked by
    #[arg(long, value_enum, default_value = "influence")]
    similarity: SimilaritySource,

    /// ridge of the network influence kernel
    #[arg(long, default_value_t = 0.01)]
    gamma: f64,

    /// weight of the network smoothness term (0 disables it)
    #[arg(short, long, default_value_t = 200.0)]
    lambda: f64,

    /// maximum number of NMF updates
    #[arg(long, default_value_t = 250)]
    nmf_max_iter: usize,

    /// stop once the relative residual falls below this
    #[arg(long, default_value_t = 1e-4)]
    residual_tol: f64,

    /// stop once the relative objective change falls below this
    #[arg(long, default_value_t = 1e-8)]
    delta_tol: f64,

    /// fraction of patients per iteration
    #[arg(long, default_value_t = 0.8)]
    patient_fraction: f64,

    /// fraction of genes per iteration
    #[arg(long, default_value_t = 0.8)]
    gene_fraction: f64,

    /// subsample with replacement
    #[arg(long, default_value_t = false)]
    replace: bool,

    /// patients with fewer mutations among the sampled genes are left out
    #[arg(long, default_value_t = 10)]
    min_mutations: usize,

    /// linkage of the consensus dendrogram
    #[arg(long, value_enum, default_value = "average")]
    linkage: Linkage,

    /// dissimilarity of the consensus dendrogram
    #[arg(long, value_enum, default_value = "one-minus")]
    distance: ConsensusDistance,

    /// number of worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// output header
    #[arg(short, long, required = true)]
    out: Box<str>,
}

impl StratifyArgs {
    fn to_params(&self, alpha: f64) -> NbsParams {
        NbsParams {
            k: self.k,
            niter: self.niter,
            seed: self.seed,
            max_failed_iterations: self.max_failed,
            lambda: self.lambda,
            propagation: PropagationParams {
                alpha,
                symmetric_norm: self.symmetric_norm,
                tolerance: self.propagation_tol,
                max_iter: self.propagation_max_iter,
            },
            knn: KnnParams {
                knn: self.knn,
                reciprocal: self.reciprocal,
                kind: self.laplacian,
                source: self.similarity,
                gamma: self.gamma,
                ..Default::default()
            },
            nmf: NmfOptions {
                max_iter: self.nmf_max_iter,
                residual_tol: self.residual_tol,
                delta_tol: self.delta_tol,
                ..Default::default()
            },
            subsample: SubsampleParams {
                patient_fraction: self.patient_fraction,
                gene_fraction: self.gene_fraction,
                replace: self.replace,
                min_mutations: self.min_mutations,
            },
            consensus: ConsensusOptions {
                linkage: self.linkage,
                distance: self.distance,
            },
        }
    }
}

pub fn run_stratify(args: &StratifyArgs) -> anyhow::Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let graph = read_network(&args.network)?;
    let mutations = read_mutations(&args.mutations, args.mutation_format)?;

    let alpha = if args.suggest_alpha {
        graph.suggest_alpha()?
    } else {
        args.alpha
    };
    let params = args.to_params(alpha);
    params.validate()?;

    let kernel = match &args.kernel {
        Some(file) => {
            info!("loading the propagation kernel from {}", file);
            let kernel = read_kernel(file, alpha, args.symmetric_norm)?;
            kernel
                .check_graph(&graph)
                .with_context(|| format!("{} was built on a different network", file))?;
            kernel
        }
        None => build_kernel(&graph, &params.propagation)?,
    };

    let laplacian = build_laplacian(&graph, &kernel, &params)?;
    let ctx = NbsContext::new(mutations, kernel, laplacian)?;

    let cancel = AtomicBool::new(false);
    let result = stratify(&ctx, &params, &cancel)?;

    let patients = ctx.mutations().patients();
    let out = &args.out;

    write_consensus(&format!("{}.consensus.tsv.gz", out), &result.consensus, patients)?;
    write_assignment(
        &format!("{}.assignment.tsv", out),
        &result.consensus.assignment,
        patients,
    )?;
    write_linkage(&format!("{}.linkage.tsv", out), &result.consensus.dendrogram)?;
    write_json(
        &format!("{}.summary.json", out),
        &result.summary(&ctx, &params),
    )?;

    info!(
        "{} patients in {} subtypes: sizes {:?}",
        patients.len(),
        params.k,
        result.cluster_sizes(params.k)
    );
    info!("done");
    Ok(())
}
