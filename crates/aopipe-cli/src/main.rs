mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aopipe", about = "Adaptive-optics image reduction tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS file dimensions and header cards
    Info(commands::info::InfoArgs),
    /// Register and median-combine a set of frames
    Stack(commands::stack::StackArgs),
    /// Compute the contrast curve of a stacked image
    Contrast(commands::contrast::ContrastArgs),
    /// Locate the primary star, list detected sources and measure its contrast
    Analyze(commands::analyze::AnalyzeArgs),
    /// Reduce a whole observing night
    Run(commands::run::RunArgs),
    /// Print or save a default night configuration
    Config(commands::config::ConfigArgs),
    /// Collect a reduced night's contrast curves and final images
    Summarize(commands::summarize::SummarizeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Stack(args) => commands::stack::run(args),
        Commands::Contrast(args) => commands::contrast::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Summarize(args) => commands::summarize::run(args),
    }
}
