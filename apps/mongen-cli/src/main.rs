use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{ConfigCmd, GenerateArgs, PlanArgs};

#[derive(Parser)]
#[command(
    name = "mongen",
    version,
    about = "Generate the Foundry deployment script for a mon roster"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the roster, analyze module sources and write the deployment script
    Generate(GenerateArgs),
    /// Show which modules each mon deploys or reuses, without writing anything
    Plan(PlanArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

fn main() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Config { cmd } => commands::config::run(cmd),
    };
    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
