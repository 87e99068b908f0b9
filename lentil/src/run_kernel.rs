use clap::Args;
use lentil::io::{read_network, write_kernel};
use lentil::params::PropagationParams;
use lentil::build_kernel;
use log::info;

#[derive(Args, Debug)]
pub struct KernelArgs {
    /// gene-gene edge list (`.tsv`, `.csv` or whitespace, optionally `.gz`)
    #[arg(short, long, required = true)]
    network: Box<str>,

    /// restart weight; suggested from the number of edges if omitted
    #[arg(short, long)]
    alpha: Option<f64>,

    /// symmetric `D^{-1/2} A D^{-1/2}` instead of row normalization
    #[arg(long, default_value_t = false)]
    symmetric_norm: bool,

    /// convergence tolerance of the walk
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    /// maximum number of walk iterations
    #[arg(long, default_value_t = 1000)]
    max_iter: usize,

    /// number of worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// output kernel file (e.g., `kernel.tsv.gz`)
    #[arg(short, long, required = true)]
    output: Box<str>,
}

pub fn run_kernel(args: &KernelArgs) -> anyhow::Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let graph = read_network(&args.network)?;
    let alpha = match args.alpha {
        Some(alpha) => alpha,
        None => graph.suggest_alpha()?,
    };

    let params = PropagationParams {
        alpha,
        symmetric_norm: args.symmetric_norm,
        tolerance: args.tolerance,
        max_iter: args.max_iter,
    };
    let kernel = build_kernel(&graph, &params)?;

    write_kernel(&args.output, &kernel)?;
    info!("wrote the kernel (alpha = {}) to {}", alpha, args.output);
    Ok(())
}
