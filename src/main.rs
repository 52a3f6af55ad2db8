use clap::{Parser, Subcommand};
use logtide::cli::search::SearchArgs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logtide")]
#[command(about = "Log ingestion from sockets, HTTP endpoints and search backends", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured sources and print delivered records
    Run {
        #[arg(long)]
        json: bool,
    },
    /// Fetch a URL once and print its normalized records
    Load {
        url: String,
        #[arg(long)]
        json: bool,
    },
    /// Page through a search backend
    Search(SearchArgs),
    /// Normalize a local log file (plain, .gz or .zip)
    Normalize {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries records.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logtide=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Run { json }) => logtide::cli::run::run(config_path, json).await?,
        None => logtide::cli::run::run(config_path, false).await?,
        Some(Commands::Load { url, json }) => {
            let (config, _) = logtide::config::load_or_default(config_path)?;
            logtide::cli::load::load(&config, &url, json).await?;
        }
        Some(Commands::Search(args)) => {
            let (config, _) = logtide::config::load_or_default(config_path)?;
            logtide::cli::search::search(&config, &args).await?;
        }
        Some(Commands::Normalize { path, json }) => {
            logtide::cli::normalize::normalize_file(&path, json).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => logtide::cli::config::init(stdout)?,
            ConfigAction::Validate => logtide::cli::config::validate(config_path)?,
        },
    }

    Ok(())
}
