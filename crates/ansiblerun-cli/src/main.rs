//! AnsibleRun CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "ansiblerun")]
#[command(about = "Prepare and run AnsibleRun resources", long_about = None)]
struct Cli {
    /// Controller configuration file
    #[arg(long, env = "ANSIBLERUN_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect an AnsibleRun: stage its working directory and init the runner
    Connect {
        /// AnsibleRun name
        name: String,
        /// Execute ansible-runner once connected
        #[arg(long)]
        run: bool,
    },
    /// Validate a controller configuration
    ValidateConfig {
        /// Path to the configuration file
        #[arg(default_value = "ansiblerun.kdl")]
        path: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Connect { name, run } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::connect::connect(config, &name, run).await?;
        }
        Commands::ValidateConfig { path } => {
            commands::validate_config(&path)?;
        }
    }

    Ok(())
}
