//! twintrack - local chat with normal and deep-thinking answers side by side

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use twintrack::app::{run_chat, ChatArgs};
use twintrack::dataset::{self, OpenAiClient};

#[derive(Parser)]
#[command(name = "twintrack")]
#[command(about = "Chat with a local model in normal and deep-thinking modes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat(ChatArgs),

    /// Generate a training corpus through a hosted chat-completion API
    Synth(SynthArgs),

    /// Merge corpus files in a folder into one file
    Merge(MergeArgs),
}

#[derive(Args)]
struct SynthArgs {
    /// Passes over every addressee and scene
    #[arg(short, long, default_value_t = 2)]
    rounds: usize,

    /// Directory to write the corpus into
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Remote model name
    #[arg(long)]
    model: Option<String>,

    /// Seed for style and hint selection
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct MergeArgs {
    /// Folder containing corpus .json files
    folder: PathBuf,

    /// Merged output file
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "twintrack=info",
        1 => "twintrack=debug",
        _ => "twintrack=trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    info!("Starting twintrack v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or_else(|| Commands::Chat(ChatArgs::default())) {
        Commands::Chat(args) => run_chat(&args).context("chat failed")?,
        Commands::Synth(args) => {
            let mut client = OpenAiClient::from_env()?;
            if let Some(model) = args.model {
                client = OpenAiClient::new(dataset::OpenAiConfig {
                    model,
                    ..client.config().clone()
                });
            }
            let runtime = tokio::runtime::Runtime::new()?;
            let items = runtime.block_on(dataset::synthesize(&client, args.rounds, args.seed));
            let path = dataset::write_corpus(&args.out_dir, &items)?;
            println!("Wrote {} exchanges to {}", items.len(), path.display());
        }
        Commands::Merge(args) => {
            let count = dataset::merge_corpus(&args.folder, &args.output)
                .with_context(|| format!("failed to merge {}", args.folder.display()))?;
            println!("Merged {} entries into {}", count, args.output.display());
        }
    }
    Ok(())
}
