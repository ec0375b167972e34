mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(about = "Run code in isolated per-request runtimes")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover environments and keep the file sweeper running until ctrl-c
    Serve,
    /// Execute code once and print the outcome as JSON
    Run {
        /// Code to execute
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,

        /// Read the code from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Execution environment
        #[arg(short, long, default_value = "python")]
        env: String,

        /// Seconds of runtime silence before the cell is abandoned
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Packages to install before running (repeatable)
        #[arg(short, long = "package")]
        packages: Vec<String>,

        /// Local files to place in the working directory (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,

        /// User recorded in the request log
        #[arg(short, long, default_value = "cli")]
        user: String,
    },
    /// List the selectable environments as JSON
    Envs,
    /// Persist a local file in the store and print its URL
    Upload {
        /// File to upload
        path: PathBuf,

        /// Keep the file for the long retention period
        #[arg(long)]
        long: bool,
    },
    /// Run a single sweep pass over the file store
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => commands::execute_serve(config).await,
        Commands::Run {
            code,
            file,
            env,
            timeout,
            packages,
            attachments,
            user,
        } => {
            commands::execute_run(
                config,
                commands::RunArgs {
                    code,
                    file,
                    env,
                    timeout,
                    packages,
                    attachments,
                    user,
                },
            )
            .await
        }
        Commands::Envs => commands::execute_envs(config),
        Commands::Upload { path, long } => commands::execute_upload(config, path, long).await,
        Commands::Sweep => commands::execute_sweep(config).await,
    }
}
