//! Route Discovery - HTTP API route discovery and route-level test coverage.
//!
//! Routes are discovered from two kinds of sources: an OpenAPI/Swagger document and
//! static analysis of backend source code. Every source produces the same
//! [`model::Route`] record; duplicates across sources are merged by exact
//! `(method, path)`, and the result can be measured against JUnit test reports.
//!
//! # Supported Frameworks
//!
//! - **FastAPI**, **Flask**, **Django / DRF** (Python)
//! - **net/http**, **Gin**, **Echo**, **chi** (Go)
//! - **Rails**, **Sinatra** (Ruby)
//! - **Actix-Web**, **Axum** (Rust, parsed with `syn`)
//! - **Next.js App Router** (TypeScript / JavaScript)
//!
//! # Architecture
//!
//! 1. [`scanner`] - Recursively collects candidate source files
//! 2. [`parser`] - Source reading, bracket matching and Rust AST parsing
//! 3. [`detector`] - Detects the project type of a source tree
//! 4. [`extractor`] - One route parser per framework dialect, plus path normalization
//! 5. [`openapi`] - Loads OpenAPI documents and turns operations into routes
//! 6. [`discovery`] - Runs the sources and deduplicates their routes
//! 7. [`junit`] - Reads test-case names from JUnit XML
//! 8. [`coverage`] - Matches test evidence against canonical operations
//! 9. [`serializer`] - JSON / YAML output
//!
//! # Example Usage
//!
//! ```no_run
//! use route_discovery::coverage::{build_route_coverage, CoverageOptions};
//! use route_discovery::discovery::{discover_routes, DiscoveryOptions};
//! use std::path::PathBuf;
//!
//! let routes = discover_routes(&DiscoveryOptions {
//!     source: Some(PathBuf::from("./my-project")),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let report = build_route_coverage(&CoverageOptions {
//!     routes,
//!     junit_files: vec![PathBuf::from("reports/")],
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! if let Some(report) = report {
//!     println!("{}/{} operations covered", report.covered, report.total);
//! }
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod cli;
pub mod coverage;
pub mod detector;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod junit;
pub mod model;
pub mod openapi;
pub mod parser;
pub mod scanner;
pub mod serializer;
