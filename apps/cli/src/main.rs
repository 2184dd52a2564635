//! hfmd CLI - Download models and datasets from a Hugging Face hub
//!
//! Lists repository files, lets the user pick which ones to fetch and
//! downloads them with resumable, concurrent transfers.

mod commands;
mod output;
mod progress;
mod select;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hfmd_core::{HfmdCore, Storage};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// hfmd - Hugging Face model and dataset downloader
#[derive(Parser)]
#[command(name = "hfmd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory for hfmd settings
    #[arg(long, env = "HFMD_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Hub endpoint, overrides the configured one
    #[arg(long, env = "HF_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Access token for gated or private repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Output format
    #[arg(long, default_value = "human", global = true)]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

/// Repository addressing shared by every repository command
#[derive(Args, Clone, Debug)]
struct RepoArgs {
    /// Repository id, e.g. `google-bert/bert-base-uncased`
    repo: String,

    /// Treat the repository as a dataset
    #[arg(long)]
    dataset: bool,

    /// Branch, tag or commit (defaults to the configured revision)
    #[arg(short, long)]
    revision: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search models or datasets
    Search {
        /// Free-text query
        query: Option<String>,

        /// Search datasets instead of models
        #[arg(long)]
        datasets: bool,

        /// Only repositories owned by this user or organisation
        #[arg(short, long)]
        author: Option<String>,

        /// Sort key, e.g. downloads, likes, lastModified
        #[arg(short, long, default_value = "downloads")]
        sort: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// List the files of a repository
    Files {
        #[command(flatten)]
        target: RepoArgs,
    },

    /// Print the repository card (README.md)
    Card {
        #[command(flatten)]
        target: RepoArgs,
    },

    /// Download files of a repository
    Download {
        #[command(flatten)]
        target: RepoArgs,

        /// Destination directory (defaults to <default_destination>/<repo>)
        #[arg(short = 'o', long = "out-dir")]
        out_dir: Option<PathBuf>,

        /// Download every file without asking
        #[arg(long, conflicts_with = "include")]
        all: bool,

        /// Download files whose path contains this text (repeatable)
        #[arg(short, long)]
        include: Vec<String>,

        /// Maximum simultaneous transfers (0 = unlimited)
        #[arg(short, long)]
        jobs: Option<u32>,
    },

    /// Show/update settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,

        /// Config value
        value: String,
    },

    /// Show all config
    Show,

    /// Reset to defaults
    Reset,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,hfmd_core=debug,hfmd_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stderr keeps stdout clean for --output json
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        use clap::CommandFactory;
        clap_complete::generate(shell, &mut Cli::command(), "hfmd", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    // Determine data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("hfmd"))
            .unwrap_or_else(|| PathBuf::from(".hfmd"))
    });

    // Persisted settings plus per-invocation overrides
    let storage = Storage::new(data_dir).await?;
    let mut settings = storage.load_settings().await?;
    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(token) = cli.token.filter(|t| !t.is_empty()) {
        settings.token = Some(token);
    }
    let core = HfmdCore::with_settings(storage, settings)?;

    match cli.command {
        Commands::Search {
            query,
            datasets,
            author,
            sort,
            limit,
        } => commands::search(&core, query, datasets, author, sort, limit, cli.output).await?,

        Commands::Files { target } => commands::list_files(&core, target, cli.output).await?,

        Commands::Card { target } => commands::show_card(&core, target, cli.output).await?,

        Commands::Download {
            target,
            out_dir,
            all,
            include,
            jobs,
        } => {
            let selection = select::Selection::from_flags(all, include);
            return commands::download(&core, target, out_dir, selection, jobs, cli.output).await;
        }

        Commands::Config { action } => commands::config_action(&core, action, cli.output).await?,

        Commands::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
