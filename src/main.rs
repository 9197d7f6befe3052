//! sitepipe - A static site asset pipeline.
//!
//! Streams every HTML document of a source tree into a mirrored output
//! tree, and transforms each script and stylesheet those documents
//! reference exactly once.

mod asset;
mod cli;
mod config;
mod logger;
mod pipeline;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands, build::build_site};
use config::SiteConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    match &cli.command {
        Commands::Build { build_args } => {
            logger::set_verbose(build_args.verbose);
            let config = SiteConfig::load(&cli)?;
            build_site(&config, build_args.quiet).map(|_| ())
        }
    }
}
