mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codecraft-cli")]
#[command(about = "CodeCraft CLI - Manage judge languages, problems and sandbox images", long_about = None)]
struct Cli {
    /// Path to languages.json
    #[arg(long, global = true, default_value = "config/languages.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new judge deployment directory
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// List configured languages
    Langs,

    /// Validate languages.json and every problem file
    Check {
        /// Directory holding <id>.json problem files
        #[arg(short, long, default_value = "problems")]
        problems: String,
    },

    /// Build the sandbox Docker image for a language
    BuildImage {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip build cache
        #[arg(long, default_value = "false")]
        no_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            commands::init_project(&path).await?;
        }
        Commands::Langs => {
            commands::list_languages(&cli.config).await?;
        }
        Commands::Check { problems } => {
            commands::check(&cli.config, &problems).await?;
        }
        Commands::BuildImage { name, no_cache } => {
            commands::build_docker_image(&cli.config, &name, no_cache).await?;
        }
    }

    Ok(())
}
