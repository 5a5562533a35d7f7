//! Ruby route extraction for Rails `config/routes.rb` and Sinatra applications.
//!
//! Rails route files are read statement by statement while a stack of open `do` blocks
//! tracks the current path prefix: `namespace :x`, `scope "y"`, a nested `resources :items`
//! (which mounts children under `/items/:item_id`) and Devise-style `authenticate` blocks
//! all push a frame that the matching `end` pops. Inside a resource, `member do` mounts
//! under `/items/:id` and `collection do` under `/items`.

use super::{
    join_path, normalize_path_syntax, normalize_wildcards, parse_files, path_placeholders,
    relative_display, scan_files, ParseOutcome, ParserKind, RouteDraft, RouteParser,
};
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::read_source;
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const RUBY_SKIP_DIRS: &[&str] = &["tmp", "log", "spec"];

const PREFILTER_TOKENS: &[&str] = &["routes.draw", "resources :", "resource :", "get ", "post ", "Sinatra::Base"];

const AUTH_TOKENS: &[&str] = &["authenticate", "authorize", "current_user", "jwt", "token"];

const RAILS_CONFIDENCE: f64 = 0.85;
const SINATRA_CONFIDENCE: f64 = 0.8;

/// Lines after a Sinatra route header searched for auth helpers.
const SINATRA_AUTH_WINDOW: usize = 5;

static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^namespace\s+:([A-Za-z_]\w*)(.*)\bdo\b").unwrap());
static SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^scope\s*\(?\s*(?:path:\s*)?["']([^"']+)["'].*\bdo\b"#).unwrap()
});
static AUTH_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^authenticated?\b.*\bdo\b").unwrap());
static VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(get|post|put|patch|delete|head|options)\s*\(?\s*["']([^"']*)["']"#).unwrap()
});
static MATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^match\s*\(?\s*["']([^"']+)["'].*\bvia:\s*(.+)$"#).unwrap());
static SYMBOL_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(get|post|put|patch|delete|head|options)\s*\(?\s*:([A-Za-z_]\w*)(.*)$").unwrap()
});
static ON_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bon:\s*:(member|collection)\b").unwrap());
static MEMBER_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^member\s+do\b").unwrap());
static COLLECTION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^collection\s+do\b").unwrap());
static ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^root\b").unwrap());
static RESOURCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(resources|resource)\s+:([A-Za-z_]\w*)(.*)$").unwrap());
static VIA_METHOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i):(get|post|put|patch|delete|head|options)\b").unwrap());
static VIA_ALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i):all\b|\bany\b").unwrap());
static SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":([a-z_]+)").unwrap());
static INLINE_DO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\sdo(?:\s*\|[^|]*\|)?\s+").unwrap());
static TRAILING_DO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\sdo(?:\s*\|[^|]*\|)?$").unwrap());

pub struct RubyParser;

impl RouteParser for RubyParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Ruby
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        scan_files(source_dir, &["rb"], RUBY_SKIP_DIRS)
            .into_iter()
            .filter(|file| {
                is_routes_file(file)
                    || read_source(file)
                        .map(|content| PREFILTER_TOKENS.iter().any(|t| content.contains(t)))
                        .unwrap_or(false)
            })
            .collect()
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let files = self.find_route_files(source_dir);
        debug!("Ruby: {} candidate files", files.len());

        parse_files(ParserKind::Ruby, &files, |file, content| {
            let rel = relative_display(source_dir, file);
            let routes = if is_routes_file(file) || content.contains("routes.draw") {
                parse_rails_routes(content, &rel)
            } else {
                parse_sinatra_routes(content, &rel)
            };
            ParseOutcome::from_routes(routes)
        })
    }
}

fn is_routes_file(file: &Path) -> bool {
    file.file_name().is_some_and(|name| name == "routes.rb")
}

pub fn contains_auth(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    AUTH_TOKENS.iter().any(|t| lowered.contains(t))
}

/// One open `do` block.
#[derive(Debug)]
enum Frame {
    /// `namespace` or `scope`.
    Scope(String),
    /// `authenticate`.
    Auth,
    /// A `resources`/`resource` block and the three paths its children can mount under.
    Resource {
        collection: String,
        member: String,
        nested: String,
    },
    Member,
    Collection,
    /// Any other block.
    Plain,
}

/// Source lines with comments and `=begin`/`=end` blocks removed, split into statements.
///
/// `namespace :api do resources :posts end` yields `namespace :api do`,
/// `resources :posts` and `end`, so one-line blocks nest like multi-line ones.
fn statements(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut in_doc = false;
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with("=begin") {
            in_doc = true;
            continue;
        }
        if in_doc {
            in_doc = !line.starts_with("=end");
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for part in line.split(';') {
            let mut rest = part.trim();
            while let Some(m) = INLINE_DO.find(rest) {
                let head = rest[..m.start()].trim_end();
                out.push((index + 1, format!("{} do", head)));
                rest = rest[m.end()..].trim();
            }
            let mut ends = 0;
            while rest != "end" && rest.ends_with(" end") {
                rest = rest[..rest.len() - 4].trim_end();
                ends += 1;
            }
            if !rest.is_empty() {
                out.push((index + 1, rest.to_string()));
            }
            out.extend(std::iter::repeat((index + 1, "end".to_string())).take(ends));
        }
    }
    out
}

/// The resource's member parameter when nesting under it: `posts` gives `post_id`.
fn member_param(resource: &str) -> String {
    let singular = if let Some(stem) = resource.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = resource.strip_suffix('s') {
        stem.to_string()
    } else {
        resource.to_string()
    };
    format!("{}_id", singular)
}

/// Symbols listed in `key: [:a, :b]` or `key: :a`.
fn action_list(options: &str, key: &str) -> Option<Vec<String>> {
    let start = options.find(&format!("{}:", key))? + key.len() + 1;
    let rest = options[start..].trim_start();
    let list = if rest.starts_with('[') {
        &rest[..rest.find(']').map_or(rest.len(), |end| end + 1)]
    } else {
        rest.split([',', ' ']).next().unwrap_or("")
    };
    let actions: Vec<String> = SYMBOL.captures_iter(list).map(|c| c[1].to_string()).collect();
    (!actions.is_empty()).then_some(actions)
}

const PLURAL_DEFAULT: &[&str] = &["index", "create", "show", "update", "destroy"];
const SINGULAR_DEFAULT: &[&str] = &["show", "create", "update", "destroy"];

/// `(method, suffix)` pairs a resource action expands to.
fn action_routes(action: &str, singular: bool) -> &'static [(HttpMethod, &'static str)] {
    use HttpMethod::*;
    match (action, singular) {
        ("index", false) => &[(Get, "")],
        ("create", _) => &[(Post, "")],
        ("new", _) => &[(Get, "/new")],
        ("show", false) => &[(Get, "/:id")],
        ("edit", false) => &[(Get, "/:id/edit")],
        ("update", false) => &[(Put, "/:id"), (Patch, "/:id")],
        ("destroy", false) => &[(Delete, "/:id")],
        ("show", true) => &[(Get, "")],
        ("edit", true) => &[(Get, "/edit")],
        ("update", true) => &[(Put, ""), (Patch, "")],
        ("destroy", true) => &[(Delete, "")],
        _ => &[],
    }
}

/// Expands `resources :name` / `resource :name` honouring `only:` and `except:`.
pub fn resource_routes(name: &str, singular: bool, options: &str) -> Vec<(HttpMethod, String)> {
    let defaults = if singular { SINGULAR_DEFAULT } else { PLURAL_DEFAULT };
    let mut actions: Vec<String> = action_list(options, "only")
        .unwrap_or_else(|| defaults.iter().map(|a| a.to_string()).collect());
    if let Some(except) = action_list(options, "except") {
        actions.retain(|a| !except.contains(a));
    }
    actions
        .iter()
        .flat_map(|action| action_routes(action, singular))
        .map(|(method, suffix)| (*method, format!("/{}{}", name, suffix)))
        .collect()
}

fn via_methods(via: &str) -> Vec<HttpMethod> {
    let mut methods: Vec<HttpMethod> = VIA_METHOD
        .captures_iter(via)
        .filter_map(|c| HttpMethod::parse(&c[1]))
        .collect();
    methods.sort();
    methods.dedup();
    if !methods.is_empty() {
        methods
    } else if VIA_ALL.is_match(via) {
        HttpMethod::ALL.to_vec()
    } else {
        vec![HttpMethod::Get]
    }
}

/// Path prefix of the open blocks, with `extra` treated as one more frame on top.
fn stack_prefix(stack: &[Frame], extra: Option<&Frame>) -> String {
    let frames: Vec<&Frame> = stack.iter().chain(extra).collect();
    let mut prefix = String::new();
    for (index, frame) in frames.iter().enumerate() {
        let segment = match (frame, frames.get(index + 1)) {
            (Frame::Scope(path), _) => path,
            (Frame::Resource { collection, .. }, Some(Frame::Collection)) => collection,
            (Frame::Resource { member, .. }, Some(Frame::Member)) => member,
            (Frame::Resource { nested, .. }, _) => nested,
            _ => continue,
        };
        prefix = join_path(&prefix, segment);
    }
    prefix
}

pub fn parse_rails_routes(content: &str, rel_file: &str) -> Vec<Route> {
    let mut routes = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for (line_no, stmt) in statements(content) {
        let line = stmt.as_str();
        if line == "end" {
            stack.pop();
            continue;
        }

        let prefix = stack_prefix(&stack, None);
        let block_auth = stack.iter().any(|f| matches!(f, Frame::Auth));
        let opens_block = TRAILING_DO.is_match(line);
        let mut pushed = false;
        let mut emit = |base: &str, path: &str, methods: &[HttpMethod]| {
            let full = join_path(base, path);
            for method in methods {
                routes.push(build_route(
                    &full,
                    *method,
                    block_auth || contains_auth(line),
                    "rails",
                    rel_file,
                    line_no,
                ));
            }
        };

        if let Some(caps) = NAMESPACE.captures(line) {
            stack.push(Frame::Scope(format!("/{}", &caps[1])));
            pushed = true;
        } else if let Some(caps) = SCOPE.captures(line) {
            stack.push(Frame::Scope(caps[1].to_string()));
            pushed = true;
        } else if AUTH_BLOCK.is_match(line) {
            stack.push(Frame::Auth);
            pushed = true;
        } else if MEMBER_BLOCK.is_match(line) {
            stack.push(Frame::Member);
            pushed = true;
        } else if COLLECTION_BLOCK.is_match(line) {
            stack.push(Frame::Collection);
            pushed = true;
        } else if let Some(caps) = VERB.captures(line) {
            if let Some(method) = HttpMethod::parse(&caps[1]) {
                emit(&prefix, &caps[2], &[method]);
            }
        } else if let Some(caps) = SYMBOL_VERB.captures(line) {
            if let Some(method) = HttpMethod::parse(&caps[1]) {
                // `get :preview, on: :member` mounts as if inside a `member do` block
                let base = match ON_OPTION.captures(&caps[3]) {
                    Some(on) if &on[1] == "member" => stack_prefix(&stack, Some(&Frame::Member)),
                    Some(_) => stack_prefix(&stack, Some(&Frame::Collection)),
                    None => prefix.clone(),
                };
                emit(&base, &caps[2], &[method]);
            }
        } else if let Some(caps) = MATCH.captures(line) {
            emit(&prefix, &caps[1], &via_methods(&caps[2]));
        } else if ROOT.is_match(line) {
            emit(&prefix, "/", &[HttpMethod::Get]);
        } else if let Some(caps) = RESOURCES.captures(line) {
            let singular = &caps[1] == "resource";
            let name = &caps[2];
            let options = TRAILING_DO.replace(&caps[3], "");
            for (method, path) in resource_routes(name, singular, &options) {
                emit(&prefix, &path, &[method]);
            }
            if opens_block {
                let collection = format!("/{}", name);
                let frame = if singular {
                    Frame::Resource {
                        member: collection.clone(),
                        nested: collection.clone(),
                        collection,
                    }
                } else {
                    Frame::Resource {
                        member: format!("{}/:id", collection),
                        nested: format!("{}/:{}", collection, member_param(name)),
                        collection,
                    }
                };
                stack.push(frame);
                pushed = true;
            }
        }

        if opens_block && !pushed {
            stack.push(Frame::Plain);
        }
    }

    routes
}

pub fn parse_sinatra_routes(content: &str, rel_file: &str) -> Vec<Route> {
    let lines: Vec<&str> = content.lines().collect();
    let mut routes = Vec::new();
    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some(caps) = VERB.captures(line) else {
            continue;
        };
        let Some(method) = HttpMethod::parse(&caps[1]) else {
            continue;
        };
        let end = (index + SINATRA_AUTH_WINDOW).min(lines.len());
        let window = lines[index..end].join("\n");
        routes.push(build_route(
            &caps[2],
            method,
            contains_auth(&window),
            "sinatra",
            rel_file,
            index + 1,
        ));
    }
    routes
}

fn build_route(path: &str, method: HttpMethod, auth: bool, framework: &str, rel_file: &str, line: usize) -> Route {
    let path = normalize_path_syntax(&normalize_wildcards(path));
    let params = path_placeholders(&path)
        .into_iter()
        .map(RouteParam::path)
        .collect();
    let confidence = if framework == "rails" {
        RAILS_CONFIDENCE
    } else {
        SINATRA_CONFIDENCE
    };
    RouteDraft::new(path, method)
        .params(ParamLocation::Path, params)
        .auth(auth)
        .confidence(confidence)
        .meta("source", "ruby")
        .meta("framework", framework)
        .meta("file", rel_file)
        .meta("line", line)
        .build()
}
