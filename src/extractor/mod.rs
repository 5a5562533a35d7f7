//! Framework route parsers.
//!
//! This module provides a unified interface for extracting routes from the source code of
//! different web frameworks. Each dialect has its own [`RouteParser`] implementation that
//! knows how to find candidate files and read route declarations out of them; they all
//! funnel their findings through [`normalize_route`] so every parser emits the same
//! [`Route`] shape.
//!
//! # Supported Frameworks
//!
//! - **FastAPI**: See [`fastapi::FastApiParser`]
//! - **Flask**: See [`flask::FlaskParser`]
//! - **Django / DRF**: See [`django::DjangoParser`]
//! - **Go (net/http, Gin, Echo)**: See [`go::GoParser`]
//! - **Ruby (Rails, Sinatra)**: See [`ruby::RubyParser`]
//! - **Rust (Actix-Web, Axum)**: See [`rust::RustParser`]
//! - **Next.js App Router**: See [`nextjs::NextJsParser`]
//!
//! # Example
//!
//! ```no_run
//! use route_discovery::extractor::ParserKind;
//! use std::path::Path;
//!
//! let outcome = ParserKind::Flask.parser().parse(Path::new("./my-flask-app"));
//! println!("Found {} routes", outcome.routes.len());
//! ```

pub mod django;
pub mod fastapi;
pub mod flask;
pub mod go;
pub mod nextjs;
pub mod python;
pub mod ruby;
pub mod rust;

use crate::error::ParseDiagnostic;
use crate::model::{HttpMethod, Metadata, ParamLocation, Route, RouteParam, RouteParams, RouteSource};
use crate::parser::read_source;
use crate::scanner::FileScanner;
use clap::ValueEnum;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Trait implemented by every dialect parser.
///
/// Parsers never fail as a whole: unreadable or malformed files are reported in
/// [`ParseOutcome::diagnostics`] and skipped, and the routes from the rest of the tree
/// are still returned.
pub trait RouteParser: Send + Sync {
    /// Which dialect this parser handles.
    fn kind(&self) -> ParserKind;

    /// Files under `source_dir` that may contain route declarations.
    ///
    /// Test, vendor, build and virtualenv directories are never returned.
    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf>;

    /// Discover every route declared under `source_dir`.
    fn parse(&self, source_dir: &Path) -> ParseOutcome;
}

/// Routes found by one parser invocation plus the problems it stepped over.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub routes: Vec<Route>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseOutcome {
    pub fn from_routes(routes: Vec<Route>) -> Self {
        Self {
            routes,
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(diagnostic: ParseDiagnostic) -> Self {
        Self {
            routes: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }

    pub fn merge(&mut self, other: ParseOutcome) {
        self.routes.extend(other.routes);
        self.diagnostics.extend(other.diagnostics);
    }
}

/// The closed set of source dialects a project can be parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ParserKind {
    #[value(name = "fastapi")]
    FastApi,
    Flask,
    Django,
    Go,
    Ruby,
    Rust,
    #[value(name = "nextjs")]
    NextJs,
}

impl ParserKind {
    pub const ALL: [ParserKind; 7] = [
        ParserKind::FastApi,
        ParserKind::Flask,
        ParserKind::Django,
        ParserKind::Go,
        ParserKind::Ruby,
        ParserKind::Rust,
        ParserKind::NextJs,
    ];

    /// Framework label recorded in route metadata and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ParserKind::FastApi => "fastapi",
            ParserKind::Flask => "flask",
            ParserKind::Django => "django",
            ParserKind::Go => "go",
            ParserKind::Ruby => "ruby",
            ParserKind::Rust => "rust",
            ParserKind::NextJs => "nextjs",
        }
    }

    /// Looks a dialect up by its label; `None` for unknown or parser-less frameworks.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The concrete parser for this dialect.
    pub fn parser(&self) -> Box<dyn RouteParser> {
        match self {
            ParserKind::FastApi => Box::new(fastapi::FastApiParser),
            ParserKind::Flask => Box::new(flask::FlaskParser),
            ParserKind::Django => Box::new(django::DjangoParser),
            ParserKind::Go => Box::new(go::GoParser),
            ParserKind::Ruby => Box::new(ruby::RubyParser),
            ParserKind::Rust => Box::new(rust::RustParser),
            ParserKind::NextJs => Box::new(nextjs::NextJsParser),
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Confidence of ordinary code-analysis matches.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

static ANGLE_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(?:\w+:)?(\w+)>").unwrap());
static COLON_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":(\w+)").unwrap());
static BRACKET_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:\.\.\.)?(\w+)\]").unwrap());
static BRACE_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());
static VERSION_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v\d+$").unwrap());
static NAMED_WILDCARD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([A-Za-z_]\w*)").unwrap());
static REST_WILDCARD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\.\.\.\}").unwrap());
static REPEATED_SLASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").unwrap());

/// A route as a parser sees it, before normalization.
///
/// Only `path` and `method` are mandatory; everything else has the defaults
/// documented on [`normalize_route`].
#[derive(Debug, Clone)]
pub struct RouteDraft {
    pub path: String,
    pub method: HttpMethod,
    pub params: RouteParams,
    pub auth_required: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub responses: BTreeMap<String, Value>,
    pub metadata: Metadata,
    pub confidence: f64,
}

impl RouteDraft {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
            params: RouteParams::new(),
            auth_required: false,
            summary: None,
            description: None,
            tags: Vec::new(),
            responses: BTreeMap::new(),
            metadata: Metadata::new(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn param(mut self, location: ParamLocation, param: RouteParam) -> Self {
        self.params
            .entry(location.as_str().to_string())
            .or_default()
            .push(param);
        self
    }

    pub fn params(mut self, location: ParamLocation, params: Vec<RouteParam>) -> Self {
        if !params.is_empty() {
            self.params
                .entry(location.as_str().to_string())
                .or_default()
                .extend(params);
        }
        self
    }

    pub fn auth(mut self, auth_required: bool) -> Self {
        self.auth_required = auth_required;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Route {
        normalize_route(self)
    }
}

/// Converts a parser's draft into a [`Route`].
///
/// - Dialect parameter syntax (`<int:id>`, `<id>`, `:id`, `[id]`, `[...id]`) becomes `{id}`
/// - The path gets a leading `/`, no repeated slashes and no trailing slash (except root)
/// - `summary` defaults to `"METHOD path"`
/// - `tags` defaults to `[extract_tag(path)]`
/// - `responses` defaults to `{"200": {"description": "Success"}}`
/// - `source` is always [`RouteSource::CodeAnalysis`]; confidence is clamped to `0..=1`
pub fn normalize_route(draft: RouteDraft) -> Route {
    let path = normalize_path_syntax(&draft.path);
    let method = draft.method;

    let summary = draft
        .summary
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{} {}", method, path));
    let tags = if draft.tags.is_empty() {
        vec![extract_tag(&path)]
    } else {
        draft.tags
    };
    let responses = if draft.responses.is_empty() {
        BTreeMap::from([("200".to_string(), json!({"description": "Success"}))])
    } else {
        draft.responses
    };

    debug!("Normalized route: {} {}", method, path);

    let mut route = Route::new(path, method)
        .with_source(RouteSource::CodeAnalysis)
        .with_confidence(draft.confidence);
    route.auth_required = draft.auth_required;
    route.summary = Some(summary);
    route.description = draft.description;
    route.tags = tags;
    route.params = draft.params;
    route.responses = responses;
    route.metadata = draft.metadata;
    route
}

/// Rewrites dialect parameter syntax to `{name}` and tidies slashes.
pub fn normalize_path_syntax(path: &str) -> String {
    let path = ANGLE_PARAM.replace_all(path, "{$1}");
    let path = COLON_PARAM.replace_all(&path, "{$1}");
    let path = BRACKET_PARAM.replace_all(&path, "{$1}");
    tidy_path(&path)
}

/// Glob segments used by Go and Ruby routers.
///
/// `*name` becomes `{name}`, a bare `*` becomes `{wildcard}` and `{name...}` becomes `{name}`.
pub fn normalize_wildcards(path: &str) -> String {
    let path = NAMED_WILDCARD.replace_all(path, "{$1}");
    let path = path.replace('*', "{wildcard}");
    REST_WILDCARD.replace_all(&path, "{$1}").into_owned()
}

/// Leading `/`, no repeated slashes, no trailing slash except for the root.
pub fn tidy_path(path: &str) -> String {
    let trimmed = path.trim();
    let with_root = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    let collapsed = REPEATED_SLASHES.replace_all(&with_root, "/");
    let stripped = collapsed.trim_end_matches('/');
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Joins a router prefix and a local path with exactly one slash between them.
pub fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('/');
    let path = path.trim();
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => tidy_path(path),
        (false, true) => tidy_path(prefix),
        (false, false) => tidy_path(&format!("{}/{}", prefix, path.trim_start_matches('/'))),
    }
}

/// First path segment that is neither a parameter nor a version marker (`v1`).
///
/// Falls back to the first non-parameter segment, then to `"api"`.
pub fn extract_tag(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && !p.starts_with('{'))
        .collect();
    parts
        .iter()
        .find(|p| !VERSION_SEGMENT.is_match(p))
        .or_else(|| parts.first())
        .map(|p| p.to_string())
        .unwrap_or_else(|| "api".to_string())
}

/// `{name}` placeholders of an already-normalized path, in order.
pub fn path_placeholders(path: &str) -> Vec<String> {
    BRACE_PARAM
        .captures_iter(path)
        .map(|c| c[1].to_string())
        .collect()
}

/// Collects files with one of `extensions` under `source_dir`, skipping `skip_dirs`.
///
/// A missing directory yields no files; walk warnings are logged by the scanner.
pub(crate) fn scan_files(source_dir: &Path, extensions: &[&str], skip_dirs: &[&str]) -> Vec<PathBuf> {
    match FileScanner::new(source_dir.to_path_buf())
        .with_extensions(extensions)
        .with_skip_dirs(skip_dirs)
        .scan()
    {
        Ok(result) => result.files,
        Err(e) => {
            debug!("{}", e);
            Vec::new()
        }
    }
}

/// Runs `extract` over every file on the rayon pool and folds the results in file order.
///
/// Files that cannot be read become diagnostics attributed to `parser`.
pub(crate) fn parse_files<F>(parser: ParserKind, files: &[PathBuf], extract: F) -> ParseOutcome
where
    F: Fn(&Path, &str) -> ParseOutcome + Sync,
{
    let per_file: Vec<ParseOutcome> = files
        .par_iter()
        .map(|file| match read_source(file) {
            Ok(content) => extract(file, &content),
            Err(e) => ParseOutcome::failed(ParseDiagnostic::for_file(parser.name(), file, format!("{:#}", e))),
        })
        .collect();

    let mut outcome = ParseOutcome::default();
    for result in per_file {
        outcome.merge(result);
    }
    for diagnostic in &outcome.diagnostics {
        warn!("{}", diagnostic);
    }
    debug!(
        "{} parser: {} routes from {} files",
        parser,
        outcome.routes.len(),
        files.len()
    );
    outcome
}

/// Path relative to `root` for metadata, falling back to the full path.
pub(crate) fn relative_display(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_path_syntax_dialects() {
        assert_eq!(normalize_path_syntax("/users/<int:user_id>"), "/users/{user_id}");
        assert_eq!(normalize_path_syntax("/users/<name>"), "/users/{name}");
        assert_eq!(normalize_path_syntax("/users/:id/posts"), "/users/{id}/posts");
        assert_eq!(normalize_path_syntax("/blog/[slug]"), "/blog/{slug}");
        assert_eq!(normalize_path_syntax("/docs/[...parts]"), "/docs/{parts}");
        assert_eq!(normalize_path_syntax("/items/{item_id}"), "/items/{item_id}");
    }

    #[test]
    fn test_normalize_wildcards() {
        assert_eq!(normalize_wildcards("/files/*path"), "/files/{path}");
        assert_eq!(normalize_wildcards("/static/*"), "/static/{wildcard}");
        assert_eq!(normalize_wildcards("/files/{rest...}"), "/files/{rest}");
    }

    #[test]
    fn test_tidy_path() {
        assert_eq!(tidy_path("users/"), "/users");
        assert_eq!(tidy_path("//api//v1///items/"), "/api/v1/items");
        assert_eq!(tidy_path(""), "/");
        assert_eq!(tidy_path("/"), "/");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/api/v1", "/items"), "/api/v1/items");
        assert_eq!(join_path("/api/", "items"), "/api/items");
        assert_eq!(join_path("", "/items"), "/items");
        assert_eq!(join_path("/api", ""), "/api");
        assert_eq!(join_path("/api", "/"), "/api");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn test_extract_tag() {
        assert_eq!(extract_tag("/api/v1/users/{id}"), "api");
        assert_eq!(extract_tag("/v1/users"), "users");
        assert_eq!(extract_tag("/v2"), "v2");
        assert_eq!(extract_tag("/{id}"), "api");
        assert_eq!(extract_tag("/"), "api");
    }

    #[test]
    fn test_normalize_route_defaults() {
        let route = RouteDraft::new("/users/<int:id>/", HttpMethod::Get)
            .param(ParamLocation::Path, RouteParam::new("id", "integer", true))
            .build();

        assert_eq!(route.path, "/users/{id}");
        assert_eq!(route.summary.as_deref(), Some("GET /users/{id}"));
        assert_eq!(route.tags, vec!["users"]);
        assert_eq!(route.responses["200"], json!({"description": "Success"}));
        assert_eq!(route.source, RouteSource::CodeAnalysis);
        assert_eq!(route.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(route.path_param_names(), vec!["id"]);
    }

    #[test]
    fn test_normalize_route_keeps_explicit_fields() {
        let route = RouteDraft::new("/admin/stats", HttpMethod::Post)
            .tags(vec!["reports".to_string()])
            .summary("Collect stats")
            .auth(true)
            .confidence(0.75)
            .meta("framework", "flask")
            .build();

        assert_eq!(route.tags, vec!["reports"]);
        assert_eq!(route.summary.as_deref(), Some("Collect stats"));
        assert!(route.auth_required);
        assert_eq!(route.confidence, 0.75);
        assert_eq!(route.metadata["framework"], "flask");
    }

    #[test]
    fn test_path_placeholders() {
        assert_eq!(path_placeholders("/a/{x}/b/{y}"), vec!["x", "y"]);
        assert!(path_placeholders("/a").is_empty());
    }

    #[test]
    fn test_parser_kind_lookup() {
        assert_eq!(ParserKind::from_name("FastAPI"), Some(ParserKind::FastApi));
        assert_eq!(ParserKind::from_name("nextjs"), Some(ParserKind::NextJs));
        assert_eq!(ParserKind::from_name("express"), None);
        for kind in ParserKind::ALL {
            assert_eq!(kind.parser().kind(), kind);
        }
    }

    #[test]
    fn test_parse_files_reports_unreadable_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("ok.txt");
        let bad = dir.path().join("bad.txt");
        std::fs::write(&good, "GET /ok").unwrap();
        std::fs::write(&bad, [0xffu8, 0xfe]).unwrap();

        let outcome = parse_files(ParserKind::Go, &[good, bad.clone()], |_, content| {
            let path = content.trim_start_matches("GET ");
            ParseOutcome::from_routes(vec![RouteDraft::new(path, HttpMethod::Get).build()])
        });

        assert_eq!(outcome.routes.len(), 1);
        assert_eq!(outcome.routes[0].path, "/ok");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].file.as_deref(), Some(bad.as_path()));
    }
}
