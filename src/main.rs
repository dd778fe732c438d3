//! Main entry point for the microtaxa application.
//!
//! Turns per-sample alignment search results against a reference database
//! (e.g. SILVA 16S) into taxon abundance tables and compares relative
//! abundance between sample groups:
//! 1. Reading alignment tables and merged reads per sample.
//! 2. Resolving each read to its best reference hit.
//! 3. Aggregating counts and identity statistics into taxa x samples tables.
//! 4. Normalizing to relative abundance.
//! 5. Mann-Whitney U tests per group pair with Benjamini-Hochberg correction.

mod abundance_matrix;
mod bio;
mod cli;
mod config;
mod io;
mod metadata;
mod normalization;
mod pipeline;
mod stats;
mod utils;
mod visualization;

use anyhow::Result;
use clap::Parser;
use cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    run_cli(cli)
}
