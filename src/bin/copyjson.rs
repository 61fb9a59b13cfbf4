use anyhow::Result;
use clap::Parser;

use publish_flat::cli::CopyJsonCli;
use publish_flat::copyjson;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let cli = CopyJsonCli::parse();
    copyjson::copy_entries(&cli.input, &cli.output, &cli.keys)
}
