use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "publish-flat")]
#[command(version)]
#[command(about = "Flatten a build output directory into the package root before publishing to npm")]
pub struct Cli {
    /// Which directory to flatten
    #[arg(
        short = 'f',
        long = "flatten",
        value_name = "DIR",
        default_value = "dist"
    )]
    pub flatten: String,
    /// Set the output directory (default: temp directory)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// Use yarn for publishing
    #[arg(short = 'c', long = "yarn")]
    pub yarn: bool,
    /// Publish the flattened package
    #[arg(short = 'p', long = "publish")]
    pub publish: bool,
    /// Package directory
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
    /// Arguments after `--` are forwarded verbatim to npm/yarn publish
    #[arg(value_name = "PUBLISH_ARGS", last = true)]
    pub publish_args: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(name = "publish-flat-copyjson")]
#[command(version)]
#[command(about = "Copy entries from one JSON file to the other (example: publish-flat-copyjson version)")]
pub struct CopyJsonCli {
    /// Set the input JSON file
    #[arg(
        short = 'i',
        long = "input",
        value_name = "FILE",
        default_value = "./flattened/package.json"
    )]
    pub input: PathBuf,
    /// Set the output JSON file
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        default_value = "./package.json"
    )]
    pub output: PathBuf,
    /// Top-level entries to copy
    #[arg(value_name = "KEYS", required = true)]
    pub keys: Vec<String>,
}
