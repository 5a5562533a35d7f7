//! Route Discovery - Command-line tool for finding API routes and measuring their test coverage.
//!
//! # Usage
//!
//! ```bash
//! route-discovery discover [OPTIONS] [SOURCE_PATH]
//! route-discovery coverage [OPTIONS]
//! ```
//!
//! # Examples
//!
//! Discover the routes of a Flask app and write them as YAML:
//! ```bash
//! route-discovery discover ./my-flask-app -f yaml -o routes.yaml
//! ```
//!
//! Combine an OpenAPI document with source analysis:
//! ```bash
//! route-discovery discover ./service --openapi ./service/openapi.yaml
//! ```
//!
//! Measure coverage from a directory of JUnit reports:
//! ```bash
//! route-discovery coverage --openapi openapi.yaml --junit reports/ -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use route_discovery::cli;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("Route discovery starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    Ok(())
}
