use crate::coverage::{build_route_coverage, CoverageOptions, RouteHint};
use crate::discovery::{discover_routes, DiscoveryOptions};
use crate::extractor::ParserKind;
use crate::serializer::{serialize_coverage_json, write_to_file, ExportFormat};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Route Discovery - Find the HTTP routes of a backend and measure how many of them tests exercise
#[derive(Parser, Debug)]
#[command(name = "route-discovery")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover routes from an OpenAPI document and/or a source tree
    Discover(DiscoverArgs),
    /// Measure route coverage from JUnit test reports
    Coverage(CoverageArgs),
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Path to the project source directory
    #[arg(value_name = "SOURCE_PATH")]
    pub source: Option<PathBuf>,

    /// OpenAPI document (file path or http(s) URL)
    #[arg(long = "openapi", value_name = "PATH_OR_URL")]
    pub openapi: Option<String>,

    /// Specify the framework to parse (if not specified, auto-detect)
    #[arg(short = 'w', long = "framework", value_enum)]
    pub framework: Option<ParserKind>,

    /// Treat the source directory (or the current directory) as a Next.js App Router project
    #[arg(long = "nextjs")]
    pub nextjs: bool,

    /// Output format (json or yaml)
    #[arg(short = 'f', long = "format", value_enum, default_value = "json")]
    pub output_format: ExportFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CoverageArgs {
    /// OpenAPI document (file path or http(s) URL)
    #[arg(long = "openapi", value_name = "PATH_OR_URL")]
    pub openapi: Option<String>,

    /// Project source directory to discover routes from
    #[arg(long = "source", value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Specify the framework to parse (if not specified, auto-detect)
    #[arg(short = 'w', long = "framework", value_enum)]
    pub framework: Option<ParserKind>,

    /// JUnit XML report file or directory of reports (repeatable)
    #[arg(long = "junit", value_name = "PATH")]
    pub junit: Vec<PathBuf>,

    /// Free-text hint naming a covered operation, e.g. "GET /users" (repeatable)
    #[arg(long = "hint", value_name = "TEXT")]
    pub hints: Vec<String>,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,
}

fn validate_source_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Source path does not exist: {}", path.display());
    }
    if !path.is_dir() {
        anyhow::bail!("Source path is not a directory: {}", path.display());
    }
    Ok(())
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    match &args.command {
        Command::Discover(discover) => {
            if discover.openapi.is_none() && discover.source.is_none() && !discover.nextjs {
                anyhow::bail!("Nothing to discover: pass a SOURCE_PATH, --openapi or --nextjs");
            }
            if let Some(source) = &discover.source {
                validate_source_dir(source)?;
                info!("Source path: {}", source.display());
            }
            match discover.framework {
                Some(framework) => info!("Framework: {}", framework),
                None => info!("Framework: auto-detect"),
            }
            info!("Output format: {:?}", discover.output_format);
        }
        Command::Coverage(coverage) => {
            if coverage.openapi.is_none() && coverage.source.is_none() {
                anyhow::bail!("Coverage needs operations: pass --openapi and/or --source");
            }
            if let Some(source) = &coverage.source {
                validate_source_dir(source)?;
            }
            if coverage.junit.is_empty() && coverage.hints.is_empty() {
                warn!("No --junit reports or --hint given; every operation will be uncovered");
            }
        }
    }

    Ok(args)
}

fn emit(content: &str, output_path: Option<&Path>) -> Result<()> {
    match output_path {
        Some(path) => {
            write_to_file(content, path).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote output to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn run_discover(args: DiscoverArgs) -> Result<()> {
    let options = DiscoveryOptions {
        openapi: args.openapi,
        source: args.source,
        framework: args.framework,
        nextjs: args.nextjs,
    };
    let routes = discover_routes(&options).context("Route discovery failed")?;
    if routes.is_empty() {
        warn!("No routes found");
    }

    let content = args.output_format.serialize_routes(&routes)?;
    emit(&content, args.output_path.as_deref())?;

    info!("Summary:");
    info!("  - Routes found: {}", routes.len());
    info!("  - Auth required: {}", routes.iter().filter(|r| r.auth_required).count());
    Ok(())
}

fn run_coverage(args: CoverageArgs) -> Result<()> {
    let routes = match &args.source {
        Some(source) => discover_routes(&DiscoveryOptions {
            source: Some(source.clone()),
            framework: args.framework,
            ..Default::default()
        })
        .context("Route discovery failed")?,
        None => Vec::new(),
    };

    let options = CoverageOptions {
        openapi: args.openapi,
        routes,
        junit_files: args.junit,
        case_names: Vec::new(),
        route_hints: args.hints.into_iter().map(RouteHint::Text).collect(),
    };
    let Some(report) = build_route_coverage(&options).context("Coverage computation failed")? else {
        warn!("No operations found; nothing to measure");
        return Ok(());
    };

    emit(&serialize_coverage_json(&report)?, args.output_path.as_deref())?;
    info!(
        "Covered {}/{} operations ({:.1}%)",
        report.covered, report.total, report.pct
    );
    Ok(())
}

/// Run the selected subcommand
pub fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Discover(discover) => run_discover(discover),
        Command::Coverage(coverage) => run_coverage(coverage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_discover_args() {
        let args = CliArgs::try_parse_from([
            "route-discovery",
            "discover",
            "./app",
            "-w",
            "fastapi",
            "-f",
            "yaml",
            "--openapi",
            "https://example.com/openapi.json",
        ])
        .unwrap();
        let Command::Discover(discover) = args.command else {
            panic!("expected discover");
        };
        assert_eq!(discover.source, Some(PathBuf::from("./app")));
        assert_eq!(discover.framework, Some(ParserKind::FastApi));
        assert_eq!(discover.output_format, ExportFormat::Yaml);
        assert_eq!(discover.openapi.as_deref(), Some("https://example.com/openapi.json"));
    }

    #[test]
    fn test_parse_coverage_args() {
        let args = CliArgs::try_parse_from([
            "route-discovery",
            "coverage",
            "--openapi",
            "api.yaml",
            "--junit",
            "a.xml",
            "--junit",
            "reports",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        let Command::Coverage(coverage) = args.command else {
            panic!("expected coverage");
        };
        assert_eq!(coverage.junit, vec![PathBuf::from("a.xml"), PathBuf::from("reports")]);
    }

    #[test]
    fn test_rejects_unknown_framework() {
        assert!(CliArgs::try_parse_from(["route-discovery", "discover", ".", "-w", "express"]).is_err());
    }

    #[test]
    fn test_validation() {
        let nothing = CliArgs::try_parse_from(["route-discovery", "discover"]).unwrap();
        assert!(parse_args_from_parsed(nothing).is_err());

        let missing = CliArgs::try_parse_from(["route-discovery", "discover", "/nonexistent/dir"]).unwrap();
        let err = parse_args_from_parsed(missing).unwrap_err().to_string();
        assert!(err.contains("does not exist"));

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.py");
        std::fs::write(&file, "").unwrap();
        let not_dir = CliArgs::try_parse_from(["route-discovery", "discover", file.to_str().unwrap()]).unwrap();
        let err = parse_args_from_parsed(not_dir).unwrap_err().to_string();
        assert!(err.contains("not a directory"));

        let no_ops = CliArgs::try_parse_from(["route-discovery", "coverage", "--junit", "r.xml"]).unwrap();
        assert!(parse_args_from_parsed(no_ops).is_err());
    }
}
