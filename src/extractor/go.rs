//! Go route extraction for `net/http`, Gin, Echo and chi.
//!
//! Router variables are tracked per file: roots come from the framework constructors,
//! `Group` calls derive a child with a joined prefix, and middleware whose name looks like
//! an auth check (passed to `Group` or `Use`) marks everything registered on that variable
//! as protected.

use super::{
    join_path, normalize_path_syntax, normalize_wildcards, parse_files, path_placeholders,
    relative_display, scan_files, ParseOutcome, ParserKind, RouteDraft, RouteParser,
};
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::{bracket_contents, line_of, mask_c_comments, read_source, split_top_level};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const GO_SKIP_DIRS: &[&str] = &["testdata"];

const PREFILTER_TOKENS: &[&str] = &[
    "HandleFunc(", ".GET(", ".POST(", ".PUT(", ".PATCH(", ".DELETE(", ".Group(", "gin.", "echo.",
];

/// Lowercase fragments that mark a middleware as an auth check.
const AUTH_TOKENS: &[&str] = &["auth", "jwt", "token", "session", "oauth", "bearer"];

const CONFIDENCE: f64 = 0.85;

static ROOT_ROUTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s*:?=\s*(gin\.(?:Default|New)|echo\.New|http\.NewServeMux|chi\.NewRouter)\(\)")
        .unwrap()
});
static GROUP_OR_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:([A-Za-z_]\w*)\s*:?=\s*)?([A-Za-z_]\w*)\.(Group|Use)\(").unwrap()
});
static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\.(?:HandleFunc|Handle)\(").unwrap());
static ROUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_]\w*)\.(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS|Any)\(").unwrap()
});
static METHOD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s+(.+)$").unwrap()
});

pub struct GoParser;

impl RouteParser for GoParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Go
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        scan_files(source_dir, &["go"], GO_SKIP_DIRS)
            .into_iter()
            .filter(|file| {
                !file
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().ends_with("_test.go"))
            })
            .filter(|file| {
                read_source(file)
                    .map(|content| PREFILTER_TOKENS.iter().any(|t| content.contains(t)))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let files = self.find_route_files(source_dir);
        debug!("Go: {} candidate files", files.len());

        parse_files(ParserKind::Go, &files, |file, content| {
            ParseOutcome::from_routes(extract_file(&relative_display(source_dir, file), content))
        })
    }
}

/// What is known about one router variable.
#[derive(Debug, Clone)]
struct RouterVar {
    prefix: String,
    auth: bool,
    framework: &'static str,
}

impl Default for RouterVar {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            auth: false,
            framework: "go",
        }
    }
}

fn framework_of(constructor: &str) -> &'static str {
    match constructor.split('.').next().unwrap_or("") {
        "gin" => "gin",
        "echo" => "echo",
        "chi" => "chi",
        _ => "nethttp",
    }
}

pub fn contains_auth(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    AUTH_TOKENS.iter().any(|t| lowered.contains(t))
}

/// Contents of a Go interpreted (`"..."`) or raw (`` `...` ``) string literal.
pub fn go_string(token: &str) -> Option<String> {
    let token = token.trim();
    let quote = token.chars().next().filter(|c| *c == '"' || *c == '`')?;
    let inner = token.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(inner.to_string())
}

/// Splits a Go 1.22 `"METHOD /path"` mux pattern; plain patterns are GET.
pub fn parse_mux_pattern(pattern: &str) -> (HttpMethod, String) {
    if let Some(caps) = METHOD_PATTERN.captures(pattern) {
        if let Some(method) = HttpMethod::parse(&caps[1]) {
            return (method, caps[2].trim().to_string());
        }
    }
    (HttpMethod::Get, pattern.trim().to_string())
}

/// Arguments of the call whose `(` is the last byte of the regex match ending at `end`.
fn call_args(content: &str, end: usize) -> Option<Vec<&str>> {
    bracket_contents(content, end - 1).map(split_top_level)
}

fn extract_file(rel_file: &str, content: &str) -> Vec<Route> {
    let masked = mask_c_comments(content);
    let mut vars: HashMap<String, RouterVar> = HashMap::new();

    for caps in ROOT_ROUTER.captures_iter(&masked) {
        vars.insert(
            caps[1].to_string(),
            RouterVar {
                framework: framework_of(&caps[2]),
                ..RouterVar::default()
            },
        );
    }

    // Group and Use calls are applied in source order so a group inherits what its
    // parent had at the point it was created.
    for caps in GROUP_OR_USE.captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(args) = call_args(&masked, whole.end()) else {
            continue;
        };
        let base = vars.get(&caps[2]).cloned().unwrap_or_default();
        if &caps[3] == "Use" {
            if args.iter().any(|a| contains_auth(a)) {
                vars.entry(caps[2].to_string()).or_default().auth = true;
            }
            continue;
        }
        let Some(target) = caps.get(1) else { continue };
        let prefix = args.first().and_then(|a| go_string(a)).unwrap_or_default();
        let middleware_auth = args.iter().skip(1).any(|a| contains_auth(a));
        vars.insert(
            target.as_str().to_string(),
            RouterVar {
                prefix: join_path(&base.prefix, &prefix),
                auth: base.auth || middleware_auth,
                framework: base.framework,
            },
        );
    }

    let mut routes = Vec::new();

    for m in HANDLE.find_iter(&masked) {
        let Some(args) = call_args(&masked, m.end()) else {
            continue;
        };
        let Some(pattern) = args.first().and_then(|a| go_string(a)) else {
            continue;
        };
        let (method, path) = parse_mux_pattern(&pattern);
        let handler = args.get(1).copied().unwrap_or("");
        routes.push(build_route(
            &path,
            method,
            contains_auth(handler),
            "nethttp",
            rel_file,
            line_of(&masked, m.start()),
        ));
    }

    for caps in ROUTE_CALL.captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let receiver = &caps[1];
        if receiver == "http" {
            continue;
        }
        let Some(args) = call_args(&masked, whole.end()) else {
            continue;
        };
        let Some(path) = args.first().and_then(|a| go_string(a)) else {
            continue;
        };
        // `c.Get("user")` on a gin context is a lookup, not a route
        let known = vars.contains_key(receiver);
        if path.contains("://") || (!known && !path.starts_with('/')) {
            continue;
        }
        let var = vars.get(receiver).cloned().unwrap_or_default();
        let full_path = join_path(&var.prefix, &path);
        let auth = var.auth || args.iter().skip(1).any(|a| contains_auth(a));
        let methods: Vec<HttpMethod> = if caps[2].eq_ignore_ascii_case("any") {
            HttpMethod::ALL.to_vec()
        } else {
            HttpMethod::parse(&caps[2]).into_iter().collect()
        };
        let line = line_of(&masked, whole.start());
        for method in methods {
            routes.push(build_route(&full_path, method, auth, var.framework, rel_file, line));
        }
    }

    routes
}

fn build_route(path: &str, method: HttpMethod, auth: bool, framework: &str, rel_file: &str, line: usize) -> Route {
    let path = normalize_path_syntax(&normalize_wildcards(path));
    let params = path_placeholders(&path)
        .into_iter()
        .map(RouteParam::path)
        .collect();
    RouteDraft::new(path, method)
        .params(ParamLocation::Path, params)
        .auth(auth)
        .confidence(CONFIDENCE)
        .meta("source", "go")
        .meta("framework", framework)
        .meta("file", rel_file)
        .meta("line", line)
        .build()
}
