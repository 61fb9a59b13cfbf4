use anyhow::Result;
use clap::Parser;

use publish_flat::cli::Cli;
use publish_flat::flatten::{FlattenOptions, Flattener};

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let cli = Cli::parse();

    let flattener = Flattener::new(FlattenOptions {
        dir_to_flatten: cli.flatten,
        output_dir: cli.output,
        package_dir: cli.dir,
        publish_arguments: cli.publish_args,
        use_yarn: cli.yarn,
    })?;

    let Some(output_dir) = flattener.build()? else {
        return Ok(());
    };
    if cli.publish {
        flattener.publish(&output_dir)?;
    }
    Ok(())
}
