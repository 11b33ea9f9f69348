use clap::Parser;
use irisml_serve::{build_context, logging, registry_from_config, server};
use std::path::PathBuf;

/// Iris species prediction service
#[derive(Parser, Debug)]
#[command(name = "irisml-serve", version, about)]
struct Cli {
    /// Configuration file (defaults to ./irisml.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = irisml_core::load_config(cli.config.as_deref())?;
    let _guard = logging::init(&config.logging)?;

    let registry = registry_from_config(&config.registry);
    let ctx = build_context(&config, registry.as_deref()).await?;

    server::run(&config.server, ctx.into_shared()).await?;
    Ok(())
}
