//! Route-level test coverage.
//!
//! Operations from an OpenAPI document and/or discovered [`Route`]s are collapsed
//! onto a canonical `(method, path)` key and matched against `METHOD /path`
//! mentions in test-case names. The canonical form here is coarser than the one
//! parsers emit: besides `{id}`, `:id`, `[id]` and `<id>` segments, integer and
//! UUID literals also become `{param}`, so `/orders/42` and `/orders/{order_id}`
//! are the same operation for coverage purposes while remaining distinct routes.

use crate::error::Result;
use crate::junit;
use crate::model::{HttpMethod, Route};
use crate::openapi;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Placeholder every dynamic segment collapses to.
pub const PARAM_PLACEHOLDER: &str = "{param}";

const UNCOVERED_SAMPLE_LIMIT: usize = 20;
const PRIORITY_SAMPLE_LIMIT: usize = 10;

const SENSITIVE_PATH_SEGMENTS: &[&str] = &[
    "admin", "auth", "internal", "billing", "payment", "payments", "token", "tokens", "secret",
    "secrets",
];
const SENSITIVE_TAGS: &[&str] = &[
    "admin",
    "auth",
    "authentication",
    "authorization",
    "billing",
    "payment",
    "payments",
    "security",
    "internal",
];

static DYNAMIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\{[^{}]+\}|:[^/]+|\[[^\]]+\]|<[^>]+>)$").unwrap());
static INT_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").unwrap()
});
static OPERATION_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(GET|POST|PUT|PATCH|DELETE|OPTIONS|HEAD)\b\s+([^\s\]]+)").unwrap());
static OPERATION_MENTION_ANY_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(GET|POST|PUT|PATCH|DELETE|OPTIONS|HEAD)\b\s+([^\s\]]+)").unwrap()
});

/// Canonical coverage form of a path.
///
/// Query strings and fragments are dropped, slashes are tidied and every dynamic
/// segment (templated or a literal integer/UUID) becomes `{param}`. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let raw = path.trim();
    let raw = raw.split('?').next().unwrap_or_default();
    let raw = raw.split('#').next().unwrap_or_default();

    let segments: Vec<&str> = raw
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if is_dynamic_segment(segment) {
                PARAM_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

fn is_dynamic_segment(segment: &str) -> bool {
    DYNAMIC_SEGMENT.is_match(segment) || INT_SEGMENT.is_match(segment) || UUID_SEGMENT.is_match(segment)
}

/// Canonical `(method, path)` key.
pub fn canonical_operation_key(method: HttpMethod, path: &str) -> (HttpMethod, String) {
    (method, normalize_path(path))
}

/// One canonical operation being measured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageOperation {
    pub method: HttpMethod,
    pub path: String,
    pub auth_required: bool,
    /// Sorted, without duplicates.
    pub tags: Vec<String>,
    /// `openapi` or `routes`.
    pub source: String,
}

impl CoverageOperation {
    fn new(method: HttpMethod, path: &str, auth_required: bool, tags: &[String], source: &str) -> Self {
        let (method, path) = canonical_operation_key(method, path);
        let tags: BTreeSet<String> = tags.iter().cloned().collect();
        Self {
            method,
            path,
            auth_required,
            tags: tags.into_iter().collect(),
            source: source.to_string(),
        }
    }

    fn key(&self) -> (HttpMethod, String) {
        (self.method, self.path.clone())
    }
}

pub fn operations_from_routes(routes: &[Route]) -> Vec<CoverageOperation> {
    routes
        .iter()
        .map(|route| CoverageOperation::new(route.method, &route.path, route.auth_required, &route.tags, "routes"))
        .collect()
}

/// Loads `source` and converts its operations, using the same auth rule as route discovery.
pub fn operations_from_openapi(source: &str) -> Result<Vec<CoverageOperation>> {
    let document = openapi::load_openapi(source)?;
    Ok(openapi::routes_from_document(&document)
        .iter()
        .map(|route| CoverageOperation::new(route.method, &route.path, route.auth_required, &route.tags, "openapi"))
        .collect())
}

/// Additional evidence that an operation was exercised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteHint {
    /// An explicit method and path.
    Operation(HttpMethod, String),
    /// Free text searched (case-insensitively) for a `METHOD /path` mention.
    Text(String),
}

/// Covered keys mentioned in test-case names (upper-case methods only) and hints.
pub fn extract_covered_operations(case_names: &[String], hints: &[RouteHint]) -> BTreeSet<(HttpMethod, String)> {
    let mentioned = |pattern: &Regex, text: &str| {
        pattern.captures(text).and_then(|caps| {
            let method = HttpMethod::parse(&caps[1])?;
            Some(canonical_operation_key(method, &caps[2]))
        })
    };

    let mut covered: BTreeSet<(HttpMethod, String)> = case_names
        .iter()
        .filter_map(|name| mentioned(&*OPERATION_MENTION, name))
        .collect();
    for hint in hints {
        let key = match hint {
            RouteHint::Operation(method, path) => Some(canonical_operation_key(*method, path)),
            RouteHint::Text(text) => mentioned(&*OPERATION_MENTION_ANY_CASE, text),
        };
        covered.extend(key);
    }
    covered
}

/// Merges `operation` into `merged`: tags are unioned, auth is OR-ed and the first source label is kept.
fn merge_operation(merged: &mut BTreeMap<(HttpMethod, String), CoverageOperation>, operation: CoverageOperation) {
    match merged.get_mut(&operation.key()) {
        Some(existing) => {
            let tags: BTreeSet<String> = existing.tags.drain(..).chain(operation.tags).collect();
            existing.tags = tags.into_iter().collect();
            existing.auth_required |= operation.auth_required;
        }
        None => {
            merged.insert(operation.key(), operation);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn score(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// Priority of testing an uncovered operation, with the rule that decided it.
pub fn priority_for_operation(operation: &CoverageOperation) -> (Priority, &'static str) {
    let sensitive_tag = operation
        .tags
        .iter()
        .any(|tag| SENSITIVE_TAGS.contains(&tag.to_lowercase().as_str()));
    let sensitive_segment = operation
        .path
        .split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .any(|s| SENSITIVE_PATH_SEGMENTS.contains(&s.to_lowercase().as_str()));

    if operation.auth_required {
        (Priority::High, "auth-required route")
    } else if sensitive_tag {
        (Priority::High, "sensitive route tags")
    } else if sensitive_segment {
        (Priority::High, "sensitive route path")
    } else if operation.method.is_write() {
        (Priority::Medium, "state-changing method")
    } else if operation.path.contains(PARAM_PLACEHOLDER) {
        (Priority::Medium, "parameterized route")
    } else {
        (Priority::Low, "read-oriented route")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncoveredOperation {
    pub method: HttpMethod,
    pub path: String,
    pub priority: Priority,
    pub priority_reason: &'static str,
    pub auth_required: bool,
    pub tags: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritySample {
    pub priority: Priority,
    pub method: HttpMethod,
    pub path: String,
}

/// Coverage summary; operation pairs serialize as `["GET", "/path"]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    /// The OpenAPI source, when one was used.
    pub spec: Option<String>,
    pub covered: usize,
    pub total: usize,
    /// Percentage covered, rounded to one decimal.
    pub pct: f64,
    pub covered_operations: Vec<(HttpMethod, String)>,
    pub uncovered_samples: Vec<(HttpMethod, String)>,
    pub priority_uncovered_samples: Vec<PrioritySample>,
    pub uncovered: Vec<UncoveredOperation>,
}

/// Inputs to [`build_route_coverage`].
///
/// `case_names` takes precedence: JUnit reports are only read when it is empty.
#[derive(Debug, Clone, Default)]
pub struct CoverageOptions {
    pub openapi: Option<String>,
    pub routes: Vec<Route>,
    pub junit_files: Vec<PathBuf>,
    pub case_names: Vec<String>,
    pub route_hints: Vec<RouteHint>,
}

fn by_method_then_path(a: (HttpMethod, &str), b: (HttpMethod, &str)) -> std::cmp::Ordering {
    a.0.as_str().cmp(b.0.as_str()).then_with(|| a.1.cmp(b.1))
}

/// Computes the coverage report, or `None` when there is nothing to measure.
///
/// # Errors
///
/// Fails only when `openapi` is set and the document cannot be loaded.
pub fn build_route_coverage(options: &CoverageOptions) -> Result<Option<CoverageReport>> {
    let mut merged = BTreeMap::new();

    if let Some(source) = &options.openapi {
        for operation in operations_from_openapi(source)? {
            merge_operation(&mut merged, operation);
        }
    }
    for operation in operations_from_routes(&options.routes) {
        merge_operation(&mut merged, operation);
    }

    if merged.is_empty() {
        debug!("No operations to measure coverage against");
        return Ok(None);
    }

    let names = if options.case_names.is_empty() && !options.junit_files.is_empty() {
        junit::load_case_names(&options.junit_files)
    } else {
        options.case_names.clone()
    };
    let covered = extract_covered_operations(&names, &options.route_hints);

    let mut operations: Vec<CoverageOperation> = merged.into_values().collect();
    operations.sort_by(|a, b| by_method_then_path((a.method, &a.path), (b.method, &b.path)));

    let total = operations.len();
    let (covered_ops, uncovered_ops): (Vec<CoverageOperation>, Vec<CoverageOperation>) =
        operations.into_iter().partition(|op| covered.contains(&op.key()));
    let covered_count = covered_ops.len();

    let mut uncovered: Vec<UncoveredOperation> = uncovered_ops
        .into_iter()
        .map(|op| {
            let (priority, reason) = priority_for_operation(&op);
            UncoveredOperation {
                method: op.method,
                path: op.path,
                priority,
                priority_reason: reason,
                auth_required: op.auth_required,
                tags: op.tags,
                source: op.source,
            }
        })
        .collect();
    uncovered.sort_by(|a, b| {
        b.priority
            .score()
            .cmp(&a.priority.score())
            .then_with(|| by_method_then_path((a.method, &a.path), (b.method, &b.path)))
    });

    let mut covered_operations: Vec<(HttpMethod, String)> = covered.into_iter().collect();
    covered_operations.sort_by(|a, b| by_method_then_path((a.0, &a.1), (b.0, &b.1)));

    let pct = if total == 0 {
        0.0
    } else {
        (covered_count as f64 * 1000.0 / total as f64).round() / 10.0
    };
    info!("Route coverage: {}/{} operations ({:.1}%)", covered_count, total, pct);

    Ok(Some(CoverageReport {
        spec: options.openapi.clone(),
        covered: covered_count,
        total,
        pct,
        covered_operations,
        uncovered_samples: uncovered
            .iter()
            .take(UNCOVERED_SAMPLE_LIMIT)
            .map(|op| (op.method, op.path.clone()))
            .collect(),
        priority_uncovered_samples: uncovered
            .iter()
            .take(PRIORITY_SAMPLE_LIMIT)
            .map(|op| PrioritySample {
                priority: op.priority,
                method: op.method,
                path: op.path.clone(),
            })
            .collect(),
        uncovered,
    }))
}
