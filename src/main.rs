//! # vendrs CLI Entry Point
//!
//! Parses command-line flags with clap and hands everything to
//! [`vendrs::run::run`]. All real work, and all error handling besides the
//! final exit code, lives in the library.

use clap::Parser;
use colored::*;
use std::path::PathBuf;

use vendrs::run::{self, Options};

#[derive(Parser)]
#[command(name = "vendrs")]
#[command(about = "Vendor imported packages and throw away the rest", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Vendored packages list
    #[arg(short, long, default_value = "vendor.toml")]
    file: String,

    /// The directory in which to run; --file is relative to this
    #[arg(short = 'C', long, default_value = ".")]
    directory: String,

    /// The directory to store results
    #[arg(short = 'T', long, default_value = "vendor")]
    target: String,

    /// Keep all downloaded vendor code (preserving .git dirs)
    #[arg(short, long)]
    keep: bool,

    /// Update all packages
    #[arg(short, long)]
    update: bool,

    /// Allow insecure transport for automatic package fetches
    #[arg(long)]
    insecure: bool,

    /// Cache directory
    #[arg(long, env = "VENDRS_CACHE")]
    cache: Option<PathBuf>,

    /// Whether to include nested vendor dirs when running with --keep
    #[arg(long)]
    include_vendor: bool,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let cache = cli.cache.unwrap_or_else(default_cache_dir);
    let opts = Options {
        file: cli.file,
        directory: cli.directory,
        target: cli.target,
        keep: cli.keep,
        update: cli.update,
        insecure: cli.insecure,
        cache,
        include_vendor: cli.include_vendor,
    };

    if let Err(err) = run::run(opts) {
        eprintln!("{} {:#}", "x".red(), err);
        std::process::exit(1);
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vendrs-cache")
}
