//! FastAPI route extraction.
//!
//! Routes are found in two passes. The first pass walks every Python file and builds a
//! [`RouterTable`] from `X = APIRouter(prefix=...)` assignments and
//! `Y.include_router(X, prefix=...)` calls; an include *prepends* its prefix (and the
//! including router's own prefixes) to `X`'s. The second pass reads the files that
//! carry `@X.get(...)`-style decorators and resolves each one through the table.

use super::python::{
    find_constructor_assignments, find_method_calls, keyword_arg, mask_source, module_stem,
    positional_args, python_files, sequence_items, string_literal, PyFunction, PyModule,
};
use super::{
    join_path, parse_files, path_placeholders, relative_display, ParseOutcome, ParserKind,
    RouteDraft, RouteParser,
};
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::{read_source, split_top_level};
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const ROUTE_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Dependency callables and security classes that imply an authenticated caller.
const AUTH_DEPENDENCIES: &[&str] = &[
    "get_current_user",
    "get_current_active_user",
    "current_user",
    "require_auth",
    "HTTPBearer",
    "HTTPBasic",
    "OAuth2PasswordBearer",
    "Security",
];

/// Handler arguments injected by the framework or the app, never client parameters.
const FRAMEWORK_PARAMS: &[&str] = &["self", "cls", "request", "response", "db", "session"];
const INJECTED_TYPES: &[&str] = &[
    "Request",
    "Response",
    "BackgroundTasks",
    "WebSocket",
    "Session",
    "AsyncSession",
];
const DEPENDENCY_MARKERS: &[&str] = &["Depends", "Security", "Header", "Cookie"];
const BODY_MARKERS: &[&str] = &["Body", "Form", "File"];

/// Maximum include_router chain followed when resolving prefixes.
const MAX_INCLUDE_DEPTH: usize = 8;

static PREFILTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+\.(get|post|put|patch|delete|head|options|api_route)\(").unwrap());
static DEPENDENCY_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(Depends|Security)\(\s*([\w.]*)").unwrap());
static IMPORT_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"from\s+\.*(?:[\w.]*\.)?(\w+)\s+import\s+(\w+)\s+as\s+(\w+)").unwrap()
});
static PATH_CONVERTOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+):\w+\}").unwrap());
static CALL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([\w.]+)\s*\(").unwrap());

pub struct FastApiParser;

impl RouteParser for FastApiParser {
    fn kind(&self) -> ParserKind {
        ParserKind::FastApi
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        python_files(source_dir)
            .into_iter()
            .filter(|file| {
                read_source(file)
                    .map(|content| PREFILTER.is_match(&content))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let table = RouterTable::collect(&python_files(source_dir));
        let files = self.find_route_files(source_dir);
        debug!("FastAPI: {} candidate files, {} routers", files.len(), table.own.len());

        parse_files(ParserKind::FastApi, &files, |file, content| {
            ParseOutcome::from_routes(extract_file(&table, source_dir, file, content))
        })
    }
}

/// Router variables keyed `module.var`, with their own prefix and every place they are included.
#[derive(Debug, Default)]
pub struct RouterTable {
    own: BTreeMap<String, String>,
    /// router key -> (including router key, if the includer is itself a router; include prefix)
    parents: HashMap<String, Vec<(Option<String>, String)>>,
}

struct Include {
    module: String,
    aliases: HashMap<String, String>,
    receiver: String,
    target: String,
    prefix: String,
}

impl RouterTable {
    pub fn collect(files: &[PathBuf]) -> Self {
        let mut table = RouterTable::default();
        let mut includes = Vec::new();

        for file in files {
            let content = match read_source(file) {
                Ok(content) => content,
                Err(e) => {
                    debug!("FastAPI prefix pass skipped {}: {:#}", file.display(), e);
                    continue;
                }
            };
            let masked = mask_source(&content);
            let module = module_stem(file);

            for (var, args) in find_constructor_assignments(&masked, "APIRouter") {
                let prefix = keyword_arg(&split_top_level(&args), "prefix")
                    .and_then(string_literal)
                    .unwrap_or_default();
                table.own.insert(format!("{}.{}", module, var), prefix);
            }

            let aliases: HashMap<String, String> = IMPORT_ALIAS
                .captures_iter(&masked)
                .map(|c| (c[3].to_string(), format!("{}.{}", &c[1], &c[2])))
                .collect();

            for (receiver, args) in find_method_calls(&masked, "include_router") {
                let parts = split_top_level(&args);
                let target = positional_args(&parts)
                    .first()
                    .copied()
                    .or_else(|| keyword_arg(&parts, "router"))
                    .map(str::to_string);
                let Some(target) = target else { continue };
                let prefix = keyword_arg(&parts, "prefix")
                    .and_then(string_literal)
                    .unwrap_or_default();
                includes.push(Include {
                    module: module.clone(),
                    aliases: aliases.clone(),
                    receiver,
                    target,
                    prefix,
                });
            }
        }

        for include in includes {
            let Some(target) = table.resolve(&include.module, &include.aliases, &include.target) else {
                debug!("include_router target {} is not a known router", include.target);
                continue;
            };
            let receiver = table.resolve(&include.module, &include.aliases, &include.receiver);
            table
                .parents
                .entry(target)
                .or_default()
                .push((receiver, include.prefix));
        }
        table
    }

    /// Maps a variable reference in `module` to a router key.
    fn resolve(&self, module: &str, aliases: &HashMap<String, String>, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if let Some((owner, var)) = reference.rsplit_once('.') {
            let owner = owner.rsplit('.').next().unwrap_or(owner);
            let key = format!("{}.{}", owner, var);
            return self.own.contains_key(&key).then_some(key);
        }
        let local = format!("{}.{}", module, reference);
        if self.own.contains_key(&local) {
            return Some(local);
        }
        if let Some(key) = aliases.get(reference).filter(|k| self.own.contains_key(*k)) {
            return Some(key.clone());
        }
        let suffix = format!(".{}", reference);
        self.own.keys().find(|k| k.ends_with(&suffix)).cloned()
    }

    /// Every full prefix the router `key` ends up mounted under.
    pub fn prefixes(&self, key: &str) -> Vec<String> {
        self.prefixes_at(key, 0)
    }

    fn prefixes_at(&self, key: &str, depth: usize) -> Vec<String> {
        let own = self.own.get(key).cloned().unwrap_or_default();
        let Some(parents) = self.parents.get(key).filter(|p| !p.is_empty()) else {
            return vec![own];
        };
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (receiver, extra) in parents {
            let bases = match receiver {
                Some(r) if depth < MAX_INCLUDE_DEPTH && r != key => self.prefixes_at(r, depth + 1),
                _ => vec![String::new()],
            };
            for base in bases {
                let full = format!("{}{}{}", base.trim_end_matches('/'), extra.trim_end_matches('/'), own);
                if seen.insert(full.clone()) {
                    out.push(full);
                }
            }
        }
        out
    }

    /// Prefixes for a decorator receiver used inside `module`; `[""]` for the app itself.
    fn prefixes_for(&self, module: &str, receiver: &str) -> Vec<String> {
        let key = format!("{}.{}", module, receiver);
        if self.own.contains_key(&key) {
            self.prefixes(&key)
        } else {
            vec![String::new()]
        }
    }
}

fn extract_file(table: &RouterTable, root: &Path, file: &Path, content: &str) -> Vec<Route> {
    let module = PyModule::parse(content);
    let module_key = module_stem(file);
    let rel = relative_display(root, file);
    let mut routes = Vec::new();

    for function in &module.functions {
        for decorator in &function.decorators {
            let Some((receiver, attr)) = decorator.receiver_attr() else {
                continue;
            };
            let methods: Vec<HttpMethod> = if ROUTE_METHODS.contains(&attr) {
                HttpMethod::parse(attr).into_iter().collect()
            } else if attr == "api_route" {
                let args = decorator.arg_list();
                let listed: Vec<HttpMethod> = keyword_arg(&args, "methods")
                    .map(sequence_items)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|m| string_literal(m))
                    .filter_map(|m| HttpMethod::parse(&m))
                    .collect();
                if listed.is_empty() {
                    vec![HttpMethod::Get]
                } else {
                    listed
                }
            } else {
                continue;
            };

            let args = decorator.arg_list();
            let local_path = positional_args(&args)
                .first()
                .copied()
                .or_else(|| keyword_arg(&args, "path"))
                .and_then(string_literal)
                .unwrap_or_else(|| "/".to_string());
            let local_path = PATH_CONVERTOR.replace_all(&local_path, "{$1}").into_owned();

            let tags: Vec<String> = keyword_arg(&args, "tags")
                .map(sequence_items)
                .unwrap_or_default()
                .iter()
                .filter_map(|t| string_literal(t))
                .collect();
            let response_model = keyword_arg(&args, "response_model").map(str::to_string);
            let auth = requires_auth(function, keyword_arg(&args, "dependencies"));

            for prefix in table.prefixes_for(&module_key, receiver) {
                let full_path = join_path(&prefix, &local_path);
                let (path_params, query_params, body_params) = split_params(function, &full_path);

                for method in &methods {
                    let mut draft = RouteDraft::new(full_path.clone(), *method)
                        .params(ParamLocation::Path, path_params.clone())
                        .params(ParamLocation::Query, query_params.clone())
                        .params(ParamLocation::Body, body_params.clone())
                        .auth(auth)
                        .tags(tags.clone())
                        .meta("framework", "fastapi")
                        .meta("file", rel.clone())
                        .meta("function", function.name.clone())
                        .meta("line", function.line);
                    if let Some(model) = &response_model {
                        draft = draft.meta("response_model", model.clone());
                    }
                    routes.push(draft.build());
                }
            }
        }
    }
    routes
}

/// Path, query and body parameters of a handler, cross-referenced against the path.
fn split_params(function: &PyFunction, path: &str) -> (Vec<RouteParam>, Vec<RouteParam>, Vec<RouteParam>) {
    let placeholders = path_placeholders(path);
    let mut path_params = Vec::new();
    let mut query_params = Vec::new();
    let mut body_params = Vec::new();

    for param in &function.params {
        if FRAMEWORK_PARAMS.contains(&param.name.as_str()) {
            continue;
        }
        let annotation = param.annotation.as_deref().unwrap_or("");
        let param_type = resolve_type(annotation);
        let marker = param
            .default
            .as_deref()
            .and_then(|d| CALL_NAME.captures(d))
            .map(|c| c[1].rsplit('.').next().unwrap_or("").to_string());

        if placeholders.contains(&param.name) {
            path_params.push(RouteParam::new(&param.name, param_type, true));
            continue;
        }
        if INJECTED_TYPES.contains(&param_type.as_str())
            || is_auth_annotation(annotation)
            || annotation.contains("Depends(")
            || marker.as_deref().is_some_and(|m| DEPENDENCY_MARKERS.contains(&m))
        {
            continue;
        }
        let is_model = param_type.chars().next().is_some_and(char::is_uppercase);
        if marker.as_deref().is_some_and(|m| BODY_MARKERS.contains(&m)) || is_model {
            body_params.push(RouteParam::new(&param.name, param_type, param.default.is_none()));
            continue;
        }
        let required = match param.default.as_deref() {
            None => true,
            Some(d) => d.starts_with("Query(...") || d.starts_with("Query(default=..."),
        };
        query_params.push(RouteParam::new(&param.name, param_type, required));
    }
    (path_params, query_params, body_params)
}

/// Maps a Python annotation to a parameter type name.
fn resolve_type(annotation: &str) -> String {
    let annotation = annotation.trim().trim_matches(|c| c == '"' || c == '\'');
    if annotation.is_empty() {
        return "string".to_string();
    }
    // `int | None` and `Optional[int]` are both just `int` here
    if let Some((first, _)) = annotation.split_once('|') {
        return resolve_type(first);
    }
    if let Some(open) = annotation.find('[') {
        let outer = annotation[..open].rsplit('.').next().unwrap_or("");
        let inner = annotation[open + 1..].trim_end_matches(']');
        return match outer {
            "Optional" | "Annotated" => {
                let first = split_top_level(inner).first().copied().unwrap_or("");
                resolve_type(first)
            }
            "List" | "list" | "Sequence" | "Set" | "set" => "array".to_string(),
            "Dict" | "dict" => "object".to_string(),
            other => other.to_string(),
        };
    }
    match annotation {
        "int" => "integer",
        "float" => "number",
        "str" => "string",
        "bool" => "boolean",
        other => other,
    }
    .to_string()
}

fn is_auth_annotation(annotation: &str) -> bool {
    annotation
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| AUTH_DEPENDENCIES.contains(&token))
}

fn requires_auth(function: &PyFunction, dependencies: Option<&str>) -> bool {
    let is_auth_dependency = |text: &str| {
        DEPENDENCY_CALL.captures_iter(text).any(|c| {
            let target = c[2].rsplit('.').next().unwrap_or("");
            &c[1] == "Security" || AUTH_DEPENDENCIES.contains(&target)
        })
    };

    function.params.iter().any(|param| {
        let annotation = param.annotation.as_deref().unwrap_or("");
        is_auth_annotation(annotation)
            || is_auth_dependency(annotation)
            || param.default.as_deref().is_some_and(is_auth_dependency)
    }) || dependencies.is_some_and(is_auth_dependency)
}
