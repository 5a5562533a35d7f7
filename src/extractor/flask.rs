//! Flask route extraction.
//!
//! Blueprint prefixes come from `bp = Blueprint(..., url_prefix=...)`, and a later
//! `X.register_blueprint(bp, url_prefix=...)` replaces the blueprint's own prefix.
//! A blueprint registered on another blueprint is mounted under that blueprint's prefix.

use super::python::{
    find_constructor_assignments, find_method_calls, keyword_arg, mask_source, module_stem,
    positional_args, python_files, sequence_items, string_literal, PyModule,
};
use super::{
    join_path, parse_files, relative_display, ParseOutcome, ParserKind, RouteDraft, RouteParser,
};
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::{line_of, read_source, split_top_level};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Decorators that guard a view behind a login or permission check.
pub const AUTH_DECORATORS: &[&str] = &[
    "login_required",
    "auth_required",
    "requires_auth",
    "jwt_required",
    "token_required",
    "permission_required",
    "roles_required",
    "admin_required",
];

const SHORTCUT_METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];

static PREFILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\w+\.(route|get|post|put|patch|delete)\(|\.add_url_rule\(").unwrap()
});
static CONVERTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(?:(\w+):)?(\w+)>").unwrap());

const MAX_NESTING: usize = 8;

pub struct FlaskParser;

impl RouteParser for FlaskParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Flask
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
        let blueprints = BlueprintTable::collect(&python_files(source_dir));
        let files = self.find_route_files(source_dir);
        debug!("Flask: {} candidate files", files.len());

        parse_files(ParserKind::Flask, &files, |file, content| {
            ParseOutcome::from_routes(extract_file(&blueprints, source_dir, file, content))
        })
    }
}

#[derive(Debug, Default)]
struct Blueprint {
    prefix: String,
    /// Blueprint this one is registered on, if any
    parent: Option<String>,
}

/// Blueprint variables (keyed `module.var`) and their effective registration.
#[derive(Debug, Default)]
pub struct BlueprintTable {
    blueprints: HashMap<String, Blueprint>,
}

impl BlueprintTable {
    pub fn collect(files: &[PathBuf]) -> Self {
        let mut table = BlueprintTable::default();
        let mut registrations = Vec::new();

        for file in files {
            let Ok(content) = read_source(file) else {
                continue;
            };
            let masked = mask_source(&content);
            let module = module_stem(file);

            for (var, args) in find_constructor_assignments(&masked, "Blueprint") {
                let prefix = keyword_arg(&split_top_level(&args), "url_prefix")
                    .and_then(string_literal)
                    .unwrap_or_default();
                table.blueprints.insert(
                    format!("{}.{}", module, var),
                    Blueprint {
                        prefix,
                        parent: None,
                    },
                );
            }
            for (receiver, args) in find_method_calls(&masked, "register_blueprint") {
                let parts = split_top_level(&args);
                let Some(target) = positional_args(&parts).first().map(|t| t.to_string()) else {
                    continue;
                };
                let prefix = keyword_arg(&parts, "url_prefix").and_then(string_literal);
                registrations.push((module.clone(), receiver, target, prefix));
            }
        }

        for (module, receiver, target, prefix) in registrations {
            let Some(key) = table.resolve(&module, &target) else {
                continue;
            };
            let parent = table.resolve(&module, &receiver).filter(|p| *p != key);
            if let Some(bp) = table.blueprints.get_mut(&key) {
                if let Some(prefix) = prefix {
                    bp.prefix = prefix;
                }
                bp.parent = parent;
            }
        }
        table
    }

    fn resolve(&self, module: &str, reference: &str) -> Option<String> {
        let reference = reference.trim();
        let key = match reference.rsplit_once('.') {
            Some((owner, var)) => format!("{}.{}", owner.rsplit('.').next().unwrap_or(owner), var),
            None => format!("{}.{}", module, reference),
        };
        if self.blueprints.contains_key(&key) {
            return Some(key);
        }
        let suffix = format!(".{}", reference);
        let mut matches: Vec<&String> = self.blueprints.keys().filter(|k| k.ends_with(&suffix)).collect();
        matches.sort();
        matches.first().map(|k| k.to_string())
    }

    /// Full prefix of a decorator receiver in `module`; empty for the app object.
    pub fn prefix_for(&self, module: &str, receiver: &str) -> String {
        let mut key = format!("{}.{}", module, receiver);
        let mut parts = Vec::new();
        for _ in 0..MAX_NESTING {
            let Some(bp) = self.blueprints.get(&key) else {
                break;
            };
            parts.push(bp.prefix.clone());
            match &bp.parent {
                Some(parent) => key = parent.clone(),
                None => break,
            }
        }
        parts
            .iter()
            .rev()
            .fold(String::new(), |acc, p| format!("{}{}", acc.trim_end_matches('/'), p))
    }
}

/// Path parameters from Flask converters, typed by converter name.
pub fn converter_params(path: &str) -> Vec<RouteParam> {
    CONVERTER
        .captures_iter(path)
        .map(|c| {
            let param_type = match c.get(1).map(|m| m.as_str()) {
                Some("int") => "integer",
                Some("float") => "number",
                Some("uuid") => "uuid",
                _ => "string",
            };
            RouteParam::new(&c[2], param_type, true)
        })
        .collect()
}

fn methods_from(args: &[&str]) -> Vec<HttpMethod> {
    let listed: Vec<HttpMethod> = keyword_arg(args, "methods")
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
}

fn extract_file(blueprints: &BlueprintTable, root: &Path, file: &Path, content: &str) -> Vec<Route> {
    let module = PyModule::parse(content);
    let module_key = module_stem(file);
    let rel = relative_display(root, file);
    let mut routes = Vec::new();

    let mut emit = |receiver: &str, path: &str, methods: Vec<HttpMethod>, auth: bool, function: &str, line: usize| {
        let prefix = blueprints.prefix_for(&module_key, receiver);
        let full_path = join_path(&prefix, path);
        let params = converter_params(&full_path);
        for method in methods {
            routes.push(
                RouteDraft::new(full_path.clone(), method)
                    .params(ParamLocation::Path, params.clone())
                    .auth(auth)
                    .meta("framework", "flask")
                    .meta("file", rel.clone())
                    .meta("function", function)
                    .meta("line", line)
                    .build(),
            );
        }
    };

    for function in &module.functions {
        let auth = function.has_decorator(AUTH_DECORATORS);
        for decorator in &function.decorators {
            let Some((receiver, attr)) = decorator.receiver_attr() else {
                continue;
            };
            let args = decorator.arg_list();
            let methods = if attr == "route" {
                methods_from(&args)
            } else if SHORTCUT_METHODS.contains(&attr) {
                HttpMethod::parse(attr).into_iter().collect()
            } else {
                continue;
            };
            let path = positional_args(&args)
                .first()
                .and_then(|p| string_literal(p))
                .unwrap_or_else(|| "/".to_string());
            emit(receiver, &path, methods, auth, &function.name, function.line);
        }
    }

    // app.add_url_rule("/path", view_func=handler, methods=[...])
    for (receiver, args) in find_method_calls(&module.masked, "add_url_rule") {
        let parts = split_top_level(&args);
        let positional = positional_args(&parts);
        let Some(path) = positional.first().and_then(|p| string_literal(p)) else {
            continue;
        };
        let view = keyword_arg(&parts, "view_func")
            .or_else(|| positional.get(2).copied())
            .unwrap_or("")
            .to_string();
        let view_name = view.split(['.', '(']).next().unwrap_or("").to_string();
        let auth = module
            .functions
            .iter()
            .find(|f| f.name == view_name)
            .is_some_and(|f| f.has_decorator(AUTH_DECORATORS));
        let line = module
            .masked
            .find(&args)
            .map(|offset| line_of(&module.masked, offset))
            .unwrap_or(0);
        emit(&receiver, &path, methods_from(&parts), auth, &view, line);
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn keys(outcome: &ParseOutcome) -> Vec<String> {
        outcome
            .routes
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    #[test]
    fn test_routes_under_excluded_directories_are_ignored() {
        let dir = TempDir::new().unwrap();
        let app = "from flask import Flask\napp = Flask(__name__)\n\n@app.route(\"/ok\")\ndef ok():\n    pass\n";
        write(&dir, "app.py", app);
        for excluded in ["tests", "test", "vendor", "build", "dist", "venv", "env"] {
            write(&dir, &format!("{}/app.py", excluded), &app.replace("/ok", "/hidden"));
        }

        assert_eq!(keys(&FlaskParser.parse(dir.path())), vec!["GET /ok"]);
    }

    #[test]
    fn test_app_routes_with_methods_and_converters() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "app.py",
            r#"
from flask import Flask

app = Flask(__name__)

@app.route("/")
def index():
    return "ok"

@app.route("/users/<int:user_id>", methods=["GET", "DELETE"])
@login_required
def user(user_id):
    return ""
"#,
        );

        let outcome = FlaskParser.parse(dir.path());
        assert_eq!(keys(&outcome), vec!["GET /", "GET /users/{user_id}", "DELETE /users/{user_id}"]);
        assert!(!outcome.routes[0].auth_required);
        assert!(outcome.routes[1].auth_required);
        assert_eq!(
            outcome.routes[1].params["path"],
            vec![RouteParam::new("user_id", "integer", true)]
        );
    }

    #[test]
    fn test_register_blueprint_overrides_prefix() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "views/posts.py",
            r#"
from flask import Blueprint

posts_bp = Blueprint("posts", __name__, url_prefix="/posts")

@posts_bp.route("/<uuid:post_id>")
def show(post_id):
    pass

@posts_bp.post("/")
@jwt_required()
def create():
    pass
"#,
        );
        write(
            &dir,
            "app.py",
            r#"
from views.posts import posts_bp
app = Flask(__name__)
app.register_blueprint(posts_bp, url_prefix="/api/posts")
"#,
        );

        let outcome = FlaskParser.parse(dir.path());
        assert_eq!(keys(&outcome), vec!["GET /api/posts/{post_id}", "POST /api/posts"]);
        assert_eq!(outcome.routes[0].params["path"][0].param_type, "uuid");
        assert!(outcome.routes[1].auth_required);
    }

    #[test]
    fn test_blueprint_without_registration_keeps_own_prefix() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "auth.py",
            r#"
bp = Blueprint("auth", __name__, url_prefix="/auth")

@bp.route("/login", methods=["POST"])
def login():
    pass
"#,
        );
        let outcome = FlaskParser.parse(dir.path());
        assert_eq!(keys(&outcome), vec!["POST /auth/login"]);
        assert_eq!(outcome.routes[0].tags, vec!["auth"]);
    }

    #[test]
    fn test_nested_blueprints() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "api.py",
            r#"
api = Blueprint("api", __name__, url_prefix="/api")
users = Blueprint("users", __name__, url_prefix="/users")

@users.route("/<name>")
def by_name(name):
    pass

api.register_blueprint(users)
"#,
        );
        let outcome = FlaskParser.parse(dir.path());
        assert_eq!(keys(&outcome), vec!["GET /api/users/{name}"]);
    }

    #[test]
    fn test_add_url_rule() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "app.py",
            r#"
@login_required
def report():
    pass

app.add_url_rule("/reports", view_func=report, methods=["POST"])
"#,
        );
        let outcome = FlaskParser.parse(dir.path());
        assert_eq!(keys(&outcome), vec!["POST /reports"]);
        assert!(outcome.routes[0].auth_required);
        assert_eq!(outcome.routes[0].metadata["function"], "report");
    }

    #[test]
    fn test_converter_params() {
        let params = converter_params("/a/<int:x>/<float:y>/<path:rest>/<z>");
        let types: Vec<&str> = params.iter().map(|p| p.param_type.as_str()).collect();
        assert_eq!(types, vec!["integer", "number", "string", "string"]);
    }
}
