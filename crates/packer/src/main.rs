use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use packer::{Artifact, BackendConfig, PushRequest, Pusher};

#[derive(Parser, Debug)]
#[command(name = "nydusify", version, about = "Push nydus image artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push a bootstrap and its blob to an OSS bucket
    Push(Push),
}

#[derive(Args, Debug)]
struct Push {
    /// Directory containing the build outputs and output.json
    #[arg(long)]
    output_dir: PathBuf,

    /// JSON file with the OSS endpoint, credentials and key prefixes
    #[arg(long)]
    backend_config: PathBuf,

    /// Bootstrap file name inside the output directory
    #[arg(long)]
    meta: String,

    /// Blob file name inside the output directory
    #[arg(long)]
    blob: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Push(args) => {
            let config = BackendConfig::load(&args.backend_config)?;
            let artifact = Artifact::new(args.output_dir)?;
            let pusher = Pusher::new(artifact, config)?;
            let result = pusher
                .push(&PushRequest {
                    meta: args.meta,
                    blob: args.blob,
                })
                .await?;
            println!("{}", result.remote_meta);
            println!("{}", result.remote_blob);
        }
    }
    Ok(())
}
