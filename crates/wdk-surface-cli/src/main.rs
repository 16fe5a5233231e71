// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Main entry point for the wdk-surface CLI application.
//!
//! This module initializes the CLI, sets up tracing, and runs the specified
//! command. It uses the `clap` crate for command-line argument parsing and the
//! `tracing` crate for tracing.

mod cli;
mod trace;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing::error;

/// Main function for the wdk-surface CLI application.
///
/// # Errors
///
/// This function will return an error if the command fails. The error is
/// logged before the process exits with a non-zero status code.
fn main() -> Result<()> {
    let cli = Cli::parse();
    trace::init_tracing(cli.verbose);
    cli.run().inspect_err(|e| error!("{}", e))?;
    Ok(())
}
