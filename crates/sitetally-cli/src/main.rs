//! Sitetally CLI
//!
//! Command-line interface for:
//! - Running an enrichment over a catalog (default, user input, or both)
//! - Inspecting what a catalog would enrich (`discover`) and what the last run left behind (`status`)
//! - Previewing merges and metric formatting

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use sitetally_catalog::MergePolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sitetally")]
#[command(author, version, about = "Sitetally: enrich a site catalog with monthly metrics")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every entry of the selected catalog.
    ///
    /// The catalog is the saved default, the given input, or both merged,
    /// depending on `--mode`. Array and bare-identifier input always replaces
    /// the default.
    Run(RunArgs),

    /// List the entries a catalog would enrich, in processing order.
    Discover {
        /// Catalog JSON (default: latest checkpoint, then the saved default).
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Only entries not yet enriched today.
        #[arg(long)]
        pending: bool,
        #[arg(long, env = "SITETALLY_STATE_DIR", default_value = ".sitetally")]
        state_dir: PathBuf,
    },

    /// Print the merge of two catalogs.
    Merge {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        custom: PathBuf,
        #[arg(long, default_value_t = MergePolicy::Merge)]
        mode: MergePolicy,
    },

    /// Format a raw value the way entries store it (`25000` → `2.5万`).
    Format {
        /// Number, or an empty string for "unavailable".
        value: String,
    },

    /// Summarize the latest checkpoint.
    Status {
        #[arg(long, env = "SITETALLY_STATE_DIR", default_value = ".sitetally")]
        state_dir: PathBuf,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// JSON object, JSON array of identifiers, or a single identifier.
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,
    /// Read the input from a file (`-` for stdin).
    #[arg(long)]
    pub input_file: Option<PathBuf>,
    /// How object input combines with the default catalog (default: last used).
    #[arg(long)]
    pub mode: Option<MergePolicy>,
    /// Replace the saved default catalog with this file first.
    #[arg(long)]
    pub default_catalog: Option<PathBuf>,
    /// JSON config file (see `EnrichConfig`).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Run-state directory (overrides config and SITETALLY_STATE_DIR).
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// Continue from the latest checkpoint, skipping entries finished today.
    #[arg(long, conflicts_with_all = ["input", "input_file", "default_catalog"])]
    pub resume: bool,
    /// Write the final catalog here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub chunk_min: Option<usize>,
    #[arg(long)]
    pub chunk_max: Option<usize>,
    #[arg(long)]
    pub pause_min: Option<u64>,
    #[arg(long)]
    pub pause_max: Option<u64>,
    /// Fixed RNG seed for chunk sizes and pauses.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::cmd_run(args).await,
        Commands::Discover {
            catalog,
            pending,
            state_dir,
        } => commands::cmd_discover(catalog.as_deref(), pending, &state_dir).await,
        Commands::Merge { base, custom, mode } => commands::cmd_merge(&base, &custom, mode),
        Commands::Format { value } => commands::cmd_format(&value),
        Commands::Status { state_dir } => commands::cmd_status(&state_dir).await,
    }
}
