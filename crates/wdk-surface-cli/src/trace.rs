// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0
//! This module configures logging based on the verbosity level specified via
//! clap.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber with a filter based on clap's verbosity
/// level.
///
/// Log output goes to stderr so that rendered headers and listings written to
/// stdout can be piped.
pub fn init_tracing(verbosity_level: clap_verbosity_flag::Verbosity) {
    // Change default log level to
    // * INFO if no verbosity level is set
    // * Debug level when -v is set
    // * Trace level when -vv is set
    let level = match verbosity_level.filter() {
        clap_verbosity_flag::VerbosityFilter::Off => LevelFilter::OFF,
        clap_verbosity_flag::VerbosityFilter::Error => LevelFilter::INFO,
        clap_verbosity_flag::VerbosityFilter::Warn => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let tracing_filter = EnvFilter::default().add_directive(level.into());

    tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_target(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_filter)
        .init();
}
