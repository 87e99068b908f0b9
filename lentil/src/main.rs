mod run_kernel;
mod run_stratify;

use clap::{Parser, Subcommand};
use run_kernel::*;
use run_stratify::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stratify patients by network-smoothed mutation profiles
    Run(StratifyArgs),
    /// Build and save the network propagation kernel
    Kernel(KernelArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.commands {
        Commands::Run(args) => {
            run_stratify(args)?;
        }
        Commands::Kernel(args) => {
            run_kernel(args)?;
        }
    }

    Ok(())
}
