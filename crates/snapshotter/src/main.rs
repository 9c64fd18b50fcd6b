use clap::Parser;

mod cli;

use cli::op::{Op, OpContext};
use cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;

    let file_dir = config.log_to_file.then(|| config.log_dir());
    let _guard = snapshotter::logging::init(&config.log_level, file_dir.as_deref());

    let ctx = OpContext::new(config).await?;
    let output = args.command.execute(&ctx).await?;
    println!("{}", output);
    Ok(())
}
