//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// sitepipe static site asset pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file, or a directory containing sitepipe.toml
    /// (default: search upward from the current directory)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::AnyPath)]
    pub config: Option<PathBuf>,

    /// Ignore any config file and build with defaults
    #[arg(long, global = true, conflicts_with = "config")]
    pub no_config: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Stream every document and transform the assets it references
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },
}

/// Build command arguments
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Source directory (overrides build.src)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub input: Option<PathBuf>,

    /// Output directory (overrides build.out)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Clean output directory completely before building
    #[arg(short, long)]
    pub clean: bool,

    /// Hide the progress line
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}
