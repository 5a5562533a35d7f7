//! Route aggregation across discovery sources.
//!
//! [`discover_routes`] runs the OpenAPI pass and at most one source-code parser,
//! concatenates their routes and collapses duplicates with [`deduplicate_routes`].

use crate::detector::ProjectDetector;
use crate::error::Result;
use crate::extractor::ParserKind;
use crate::model::{HttpMethod, Route};
use crate::openapi;
use crate::serializer::{write_to_file, ExportFormat};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// What to discover routes from.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// OpenAPI document path or URL.
    pub openapi: Option<String>,
    /// Source tree to analyse.
    pub source: Option<PathBuf>,
    /// Parser to use instead of auto-detection.
    pub framework: Option<ParserKind>,
    /// Parse the tree as a Next.js App Router project even when it is not detected as one.
    pub nextjs: bool,
}

/// Chooses the parser for `root`: the override, Next.js when forced or detected,
/// then whatever [`ProjectDetector`] finds.
pub fn select_parser(root: &Path, options: &DiscoveryOptions) -> Option<ParserKind> {
    if let Some(kind) = options.framework {
        return Some(kind);
    }
    let detector = ProjectDetector::new(root);
    if options.nextjs || detector.is_nextjs() {
        return Some(ParserKind::NextJs);
    }
    match detector.detect() {
        Some(project) => {
            let kind = project.parser_kind();
            if kind.is_none() {
                info!("{} projects have no route parser; skipping source analysis", project);
            }
            kind
        }
        None => {
            info!("No supported framework detected in {}", root.display());
            None
        }
    }
}

/// Routes from a source tree; parser diagnostics are logged by the parser.
pub fn discover_from_source(root: &Path, kind: ParserKind) -> Vec<Route> {
    let outcome = kind.parser().parse(root);
    info!(
        "{} parser: {} routes ({} diagnostics)",
        kind,
        outcome.routes.len(),
        outcome.diagnostics.len()
    );
    outcome.routes
}

/// Discovers and deduplicates routes from every configured source.
///
/// With `nextjs` set and no `source`, the current directory is parsed.
///
/// # Errors
///
/// OpenAPI load failures are returned. A `source` that is not a directory is logged
/// and contributes no routes. Parser problems are never errors.
pub fn discover_routes(options: &DiscoveryOptions) -> Result<Vec<Route>> {
    let mut routes = Vec::new();

    if let Some(spec) = &options.openapi {
        routes.extend(openapi::discover_from_openapi(spec)?);
    }

    let root = match (&options.source, options.nextjs) {
        (Some(source), _) => Some(source.clone()),
        (None, true) => Some(PathBuf::from(".")),
        (None, false) => None,
    };
    if let Some(root) = root {
        if !root.is_dir() {
            warn!("Source path is not a directory, skipping: {}", root.display());
        } else if let Some(kind) = select_parser(&root, options) {
            routes.extend(discover_from_source(&root, kind));
        }
    }

    let total = routes.len();
    let routes = deduplicate_routes(routes);
    info!("Discovered {} routes ({} before deduplication)", routes.len(), total);
    Ok(routes)
}

/// Collapses routes sharing `(method, path)`.
///
/// The highest-confidence route for a key supplies the core fields; ties keep the
/// earliest. Tags from every duplicate are unioned and sorted, `params` gain any
/// entry not already present, and `metadata` keys are merged with the
/// lower-confidence route filling gaps but later equal-or-lower routes overriding
/// on collision. Output keeps first-seen key order.
pub fn deduplicate_routes(routes: Vec<Route>) -> Vec<Route> {
    let mut index: HashMap<(HttpMethod, String), usize> = HashMap::new();
    let mut merged: Vec<Route> = Vec::new();

    for route in routes {
        let key = (route.method, route.path.clone());
        let Some(slot) = index.get(&key).copied() else {
            index.insert(key, merged.len());
            merged.push(route);
            continue;
        };

        let existing = &mut merged[slot];
        if route.confidence > existing.confidence {
            debug!("Replacing {} {} with higher-confidence route", route.method, route.path);
            let displaced = std::mem::replace(existing, route);
            absorb(existing, displaced, false);
        } else {
            absorb(existing, route, true);
        }
    }
    merged
}

fn absorb(retained: &mut Route, other: Route, other_overrides_metadata: bool) {
    let tags: BTreeSet<String> = retained.tags.drain(..).chain(other.tags).collect();
    retained.tags = tags.into_iter().collect();

    for (key, value) in other.metadata {
        if other_overrides_metadata || !retained.metadata.contains_key(&key) {
            retained.metadata.insert(key, value);
        }
    }

    for (location, items) in other.params {
        let existing = retained.params.entry(location).or_default();
        for item in items {
            if !existing.contains(&item) {
                existing.push(item);
            }
        }
    }
}

/// Writes routes to `dest` in `format`, creating parent directories.
pub fn export_routes(routes: &[Route], dest: &Path, format: ExportFormat) -> Result<()> {
    let content = format.serialize_routes(routes)?;
    write_to_file(&content, dest)?;
    info!("Exported {} routes to {}", routes.len(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RouteParam, RouteSource};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn route(method: HttpMethod, path: &str, confidence: f64, tags: &[&str]) -> Route {
        let mut route = Route::new(path, method).with_confidence(confidence);
        route.tags = tags.iter().map(|t| t.to_string()).collect();
        route
    }

    #[test]
    fn test_dedup_keeps_higher_confidence_and_unions_tags() {
        let mut spec = route(HttpMethod::Post, "/users", 1.0, &["users"]);
        spec.summary = Some("Create user".into());
        let code = route(HttpMethod::Post, "/users", 0.9, &["accounts"])
            .with_source(RouteSource::CodeAnalysis);

        let merged = deduplicate_routes(vec![spec.clone(), code.clone()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, 1.0);
        assert_eq!(merged[0].source, RouteSource::OpenApi);
        assert_eq!(merged[0].summary.as_deref(), Some("Create user"));
        assert_eq!(merged[0].tags, vec!["accounts", "users"]);

        // Same outcome when the lower-confidence route comes first
        let merged = deduplicate_routes(vec![code, spec]);
        assert_eq!(merged[0].confidence, 1.0);
        assert_eq!(merged[0].summary.as_deref(), Some("Create user"));
        assert_eq!(merged[0].tags, vec!["accounts", "users"]);
    }

    #[test]
    fn test_dedup_is_exact_on_path_and_method() {
        let merged = deduplicate_routes(vec![
            route(HttpMethod::Get, "/users/{id}", 0.9, &[]),
            route(HttpMethod::Get, "/users/{pk}", 0.9, &[]),
            route(HttpMethod::Delete, "/users/{id}", 0.9, &[]),
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_dedup_merges_params_and_metadata() {
        let mut first = route(HttpMethod::Get, "/items/{id}", 0.9, &[]);
        first.params.insert("path".into(), vec![RouteParam::path("id")]);
        first.metadata.insert("file".into(), json!("a.py"));
        let mut second = route(HttpMethod::Get, "/items/{id}", 0.8, &[]);
        second.params.insert(
            "path".into(),
            vec![RouteParam::path("id"), RouteParam::new("verbose", "boolean", false)],
        );
        second.params.insert("query".into(), vec![RouteParam::new("q", "string", false)]);
        second.metadata.insert("file".into(), json!("b.py"));
        second.metadata.insert("framework".into(), json!("flask"));

        let merged = deduplicate_routes(vec![first, second]);
        let route = &merged[0];
        assert_eq!(route.confidence, 0.9);
        assert_eq!(
            route.params["path"],
            vec![RouteParam::path("id"), RouteParam::new("verbose", "boolean", false)]
        );
        assert_eq!(route.params["query"].len(), 1);
        assert_eq!(route.metadata["file"], json!("b.py"));
        assert_eq!(route.metadata["framework"], json!("flask"));
    }

    #[test]
    fn test_dedup_preserves_every_key_with_max_confidence() {
        let input = vec![
            route(HttpMethod::Get, "/a", 0.75, &[]),
            route(HttpMethod::Get, "/b", 0.8, &[]),
            route(HttpMethod::Get, "/a", 0.9, &[]),
            route(HttpMethod::Get, "/a", 0.85, &[]),
            route(HttpMethod::Post, "/b", 1.0, &[]),
        ];
        let merged = deduplicate_routes(input);
        let summary: Vec<(HttpMethod, &str, f64)> = merged
            .iter()
            .map(|r| (r.method, r.path.as_str(), r.confidence))
            .collect();
        assert_eq!(
            summary,
            vec![
                (HttpMethod::Get, "/a", 0.9),
                (HttpMethod::Get, "/b", 0.8),
                (HttpMethod::Post, "/b", 1.0),
            ]
        );
    }

    #[test]
    fn test_select_parser_override_and_detection() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module x\n").unwrap();

        let auto = DiscoveryOptions::default();
        assert_eq!(select_parser(dir.path(), &auto), Some(ParserKind::Go));

        let forced = DiscoveryOptions {
            framework: Some(ParserKind::Ruby),
            ..Default::default()
        };
        assert_eq!(select_parser(dir.path(), &forced), Some(ParserKind::Ruby));

        let nextjs = DiscoveryOptions {
            nextjs: true,
            ..Default::default()
        };
        assert_eq!(select_parser(dir.path(), &nextjs), Some(ParserKind::NextJs));
    }

    #[test]
    fn test_select_parser_express_has_none() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies": {"express": "4"}}"#).unwrap();
        assert_eq!(select_parser(dir.path(), &DiscoveryOptions::default()), None);
    }

    #[test]
    fn test_discover_routes_skips_missing_source() {
        let options = DiscoveryOptions {
            source: Some(PathBuf::from("/nonexistent/project")),
            ..Default::default()
        };
        assert!(discover_routes(&options).unwrap().is_empty());
    }

    #[test]
    fn test_discover_routes_without_sources_is_empty() {
        assert!(discover_routes(&DiscoveryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_export_routes_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let routes = vec![route(HttpMethod::Get, "/health", 0.9, &["health"])];

        let json_path = dir.path().join("out/routes.json");
        export_routes(&routes, &json_path, ExportFormat::Json).unwrap();
        let back: Vec<Route> = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(back, routes);

        let yaml_path = dir.path().join("out/routes.yaml");
        export_routes(&routes, &yaml_path, ExportFormat::Yaml).unwrap();
        assert!(fs::read_to_string(&yaml_path).unwrap().contains("path: /health"));
    }
}
