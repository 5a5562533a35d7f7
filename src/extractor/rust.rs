//! Rust route extraction for Actix-Web and Axum.
//!
//! Files are parsed with `syn`. A first pass over every file collects three things:
//!
//! - attribute-macro handlers (`#[get("/path")]`, `#[route("/path", method = "POST")]`)
//! - router-building expressions bound to a name, either `let api = Router::new()...` or the
//!   tail expression of a function such as `fn api_routes() -> Router`
//! - every other router-building expression chain
//!
//! The chains are then walked with the current prefix: `web::scope("/x")` and
//! `.nest("/x", router)` extend it, `.merge(router)` and `.service(x)` mount a router or an
//! attribute-macro handler under it, and an auth-looking `.layer`, `.route_layer` or `.wrap`
//! marks the routes it covers. Named routers that are mounted somewhere are only reported
//! where they are mounted.
//!
//! Files `syn` cannot parse fall back to a text scan with lower confidence.

use super::{
    join_path, normalize_path_syntax, normalize_wildcards, path_placeholders, relative_display,
    scan_files, ParseOutcome, ParserKind, RouteDraft, RouteParser,
};
use crate::error::ParseDiagnostic;
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::{find_closing, read_source, split_top_level, AstParser};
use log::{debug, warn};
use quote::ToTokens;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::{Attribute, Block, Expr, ExprMethodCall, Ident, ImplItemFn, ItemFn, Lit, Local, Pat, Signature, Stmt, Token};

pub const RUST_SKIP_DIRS: &[&str] = &["benches"];

const PREFILTER_TOKENS: &[&str] = &["#[get(", "#[post(", ".route(", "axum", "actix_web", "web::"];

const AUTH_TOKENS: &[&str] = &[
    "auth",
    "jwt",
    "token",
    "session",
    "requireauthorizationlayer",
    "middleware::from_fn",
];

const CONFIDENCE: f64 = 0.85;
const FALLBACK_CONFIDENCE: f64 = 0.75;

/// Method calls that make an expression chain a router definition.
const ROUTER_METHODS: &[&str] = &["route", "nest", "nest_service", "merge", "service"];

const MAX_NESTING: usize = 8;

/// Characters around an attribute macro searched for auth hints by the text scan.
const FALLBACK_AUTH_WINDOW: usize = 180;

static HANDLER_METHOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(get|post|put|patch|delete|head|options)\(").unwrap());
static HANDLER_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bany\(").unwrap());
static ACTIX_METHOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"web::(get|post|put|patch|delete|head|options)\(\)").unwrap());
static HANDLER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Za-z_][\w:]*)\)").unwrap());
static REGEX_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+):[^}]*\}").unwrap());
static MACRO_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)#\[\s*(?:[A-Za-z_][\w:]*::)?(get|post|put|patch|delete|head|options)\s*\(\s*"([^"]+)""#)
        .unwrap()
});

pub struct RustParser;

impl RouteParser for RustParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Rust
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        scan_files(source_dir, &["rs"], RUST_SKIP_DIRS)
            .into_iter()
            .filter(|file| {
                read_source(file)
                    .map(|content| PREFILTER_TOKENS.iter().any(|t| content.contains(t)))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let files = self.find_route_files(source_dir);
        debug!("Rust: {} candidate files", files.len());

        // syn trees are not Send, so only the reads run on the pool
        let sources: Vec<(PathBuf, anyhow::Result<String>)> = files
            .par_iter()
            .map(|file| (file.clone(), read_source(file)))
            .collect();

        let mut outcome = ParseOutcome::default();
        let mut parsed = Vec::new();
        let mut fallback = Vec::new();
        for (file, source) in sources {
            let content = match source {
                Ok(content) => content,
                Err(e) => {
                    outcome
                        .diagnostics
                        .push(ParseDiagnostic::for_file(ParserKind::Rust.name(), &file, format!("{:#}", e)));
                    continue;
                }
            };
            let rel = relative_display(source_dir, &file);
            match AstParser::parse_source(&file, &content) {
                Ok(parsed_file) => parsed.push(SourceFile {
                    rel,
                    axum: content.contains("axum") || content.contains("Router::new"),
                    tree: parsed_file.syntax_tree,
                }),
                Err(e) => {
                    outcome.diagnostics.push(ParseDiagnostic::for_file(
                        ParserKind::Rust.name(),
                        &file,
                        format!("{:#}; fell back to text scan", e),
                    ));
                    fallback.extend(scan_text(&content, &rel));
                }
            }
        }

        outcome.routes = ast_routes(&parsed);
        outcome.routes.extend(fallback);
        for diagnostic in &outcome.diagnostics {
            warn!("{}", diagnostic);
        }
        debug!("rust parser: {} routes from {} files", outcome.routes.len(), files.len());
        outcome
    }
}

pub fn contains_auth(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    AUTH_TOKENS.iter().any(|t| lowered.contains(t))
}

/// Token text with all whitespace removed, e.g. `web::get().to(get_item)`.
fn compact(tokens: &impl ToTokens) -> String {
    tokens.to_token_stream().to_string().split_whitespace().collect()
}

/// HTTP methods named by a handler expression.
///
/// Actix `web::get().to(h)` names exactly one; Axum `get(a).post(b)` may name several,
/// and `any(h)` stands for all of them.
pub fn handler_methods(handler: &str) -> Vec<HttpMethod> {
    let lowered = handler.to_ascii_lowercase();
    let pattern: &Regex = if lowered.contains("web::") {
        &*ACTIX_METHOD
    } else {
        &*HANDLER_METHOD
    };
    let mut methods: Vec<HttpMethod> = pattern
        .captures_iter(&lowered)
        .filter_map(|c| HttpMethod::parse(&c[1]))
        .collect();
    if methods.is_empty() && HANDLER_ANY.is_match(&lowered) {
        return HttpMethod::ALL.to_vec();
    }
    methods.sort();
    methods.dedup();
    methods
}

fn handler_name(handler: &str) -> Option<String> {
    HANDLER_NAME
        .captures(handler)
        .and_then(|c| c[1].rsplit("::").next().map(str::to_string))
}

fn str_lit(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        _ => None,
    }
}

/// The last path segment of a call's function, e.g. `scope` for `web::scope("/x")`.
fn call_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Call(call) => match &*call.func {
            Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Splits `a.b(..).c(..)` into its base expression and the method calls in source order.
fn flatten(expr: &Expr) -> (&Expr, Vec<&ExprMethodCall>) {
    let mut calls = Vec::new();
    let mut current = expr;
    loop {
        match current {
            Expr::MethodCall(call) => {
                calls.push(call);
                current = &call.receiver;
            }
            Expr::Paren(paren) => current = &paren.expr,
            _ => break,
        }
    }
    calls.reverse();
    (current, calls)
}

fn is_router_chain(expr: &Expr) -> bool {
    let (base, calls) = flatten(expr);
    calls
        .iter()
        .any(|c| ROUTER_METHODS.contains(&c.method.to_string().as_str()))
        || matches!(call_name(base).as_deref(), Some("scope" | "resource"))
}

fn binding_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(ident) => Some(ident.ident.to_string()),
        Pat::Type(typed) => binding_name(&typed.pat),
        _ => None,
    }
}

struct SourceFile {
    rel: String,
    axum: bool,
    tree: syn::File,
}

/// Where a chain is walked from, for resolving the names it mentions.
#[derive(Debug, Clone)]
struct Ctx {
    file: usize,
    func: Option<String>,
    /// Only `let` bindings collected before this index are visible
    before: Option<usize>,
}

/// A router-building expression bound to a name.
struct Definition {
    name: String,
    /// Enclosing function of a `let` binding; `None` for a function's tail expression
    local_to: Option<String>,
    file: usize,
    expr: Expr,
}

impl Definition {
    fn ctx(&self, index: usize) -> Ctx {
        Ctx {
            file: self.file,
            func: Some(self.local_to.clone().unwrap_or_else(|| self.name.clone())),
            before: self.local_to.is_some().then_some(index),
        }
    }
}

struct Root {
    expr: Expr,
    ctx: Ctx,
}

/// A handler annotated with a route attribute macro.
#[derive(Debug, Clone)]
struct AttrRoute {
    handler: String,
    path: String,
    methods: Vec<HttpMethod>,
    auth: bool,
    file: usize,
}

/// One registration site before it is expanded per method.
#[derive(Debug, Clone)]
struct Site {
    path: String,
    methods: Vec<HttpMethod>,
    auth: bool,
    framework: &'static str,
    handler: Option<String>,
    file: usize,
}

impl AttrRoute {
    fn site(&self, prefix: &str, auth: bool) -> Site {
        Site {
            path: join_path(prefix, &self.path),
            methods: self.methods.clone(),
            auth: self.auth || auth,
            framework: "actix",
            handler: Some(self.handler.clone()),
            file: self.file,
        }
    }
}

/// Parses `#[get("/p")]`, `#[actix_web::post("/p", wrap = "...")]` or
/// `#[route("/p", method = "GET", method = "POST")]`.
fn parse_route_attr(attr: &Attribute) -> Option<(String, Vec<HttpMethod>, String)> {
    let name = attr.path().segments.last()?.ident.to_string();
    let args = attr
        .parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
        .ok()?;
    let mut args = args.into_iter();
    let path = str_lit(&args.next()?)?;
    let rest: Vec<Expr> = args.collect();

    let methods = if name == "route" {
        rest.iter()
            .filter_map(|arg| match arg {
                Expr::Assign(assign) if compact(&assign.left) == "method" => str_lit(&assign.right),
                _ => None,
            })
            .filter_map(|m| HttpMethod::parse(&m))
            .collect()
    } else {
        HttpMethod::parse(&name).into_iter().collect::<Vec<_>>()
    };
    if methods.is_empty() {
        return None;
    }
    let extra = rest.iter().map(compact).collect::<Vec<_>>().join(",");
    Some((path, methods, extra))
}

/// First pass over one file.
struct Collector<'a> {
    file: usize,
    func: Option<String>,
    defs: &'a mut Vec<Definition>,
    roots: &'a mut Vec<Root>,
    attr_routes: &'a mut Vec<AttrRoute>,
}

impl Collector<'_> {
    fn ctx(&self) -> Ctx {
        Ctx {
            file: self.file,
            func: self.func.clone(),
            before: None,
        }
    }

    fn collect_attr_routes(&mut self, attrs: &[Attribute], sig: &Signature) {
        let routes: Vec<_> = attrs.iter().filter_map(parse_route_attr).collect();
        if routes.is_empty() {
            return;
        }
        let other_attrs = attrs
            .iter()
            .filter(|a| parse_route_attr(a).is_none())
            .map(compact)
            .collect::<String>();
        let guarded = contains_auth(&compact(&sig.inputs)) || contains_auth(&other_attrs);
        for (path, methods, extra) in routes {
            debug!("Found route attribute on {}: {:?} {}", sig.ident, methods, path);
            self.attr_routes.push(AttrRoute {
                handler: sig.ident.to_string(),
                path,
                methods,
                auth: guarded || contains_auth(&extra),
                file: self.file,
            });
        }
    }

    /// A router chain, or a chain on a router bound earlier in the same function.
    fn builds_router(&self, expr: &Expr) -> bool {
        if is_router_chain(expr) {
            return true;
        }
        let Expr::Path(path) = flatten(expr).0 else {
            return false;
        };
        path.path.get_ident().is_some_and(|ident| {
            let name = ident.to_string();
            self.defs.iter().any(|def| {
                def.file == self.file && def.local_to.is_some() && def.local_to == self.func && def.name == name
            })
        })
    }

    fn visit_fn_body(&mut self, ident: &Ident, block: &Block) {
        let outer = self.func.replace(ident.to_string());
        for (index, stmt) in block.stmts.iter().enumerate() {
            match stmt {
                Stmt::Expr(expr, None) if index + 1 == block.stmts.len() && self.builds_router(expr) => {
                    self.defs.push(Definition {
                        name: ident.to_string(),
                        local_to: None,
                        file: self.file,
                        expr: expr.clone(),
                    });
                }
                _ => self.visit_stmt(stmt),
            }
        }
        self.func = outer;
    }
}

impl<'ast> Visit<'ast> for Collector<'_> {
    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        self.collect_attr_routes(&node.attrs, &node.sig);
        self.visit_fn_body(&node.sig.ident, &node.block);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast ImplItemFn) {
        self.collect_attr_routes(&node.attrs, &node.sig);
        self.visit_fn_body(&node.sig.ident, &node.block);
    }

    fn visit_local(&mut self, node: &'ast Local) {
        if let (Some(name), Some(init)) = (binding_name(&node.pat), &node.init) {
            if self.builds_router(&init.expr) {
                self.defs.push(Definition {
                    name,
                    local_to: self.func.clone(),
                    file: self.file,
                    expr: (*init.expr).clone(),
                });
                return;
            }
        }
        syn::visit::visit_local(self, node);
    }

    fn visit_expr(&mut self, node: &'ast Expr) {
        if matches!(node, Expr::MethodCall(_)) && self.builds_router(node) {
            self.roots.push(Root {
                expr: node.clone(),
                ctx: self.ctx(),
            });
            return;
        }
        syn::visit::visit_expr(self, node);
    }
}

/// Second pass: expands router chains into registration sites.
struct Walker<'a> {
    files: &'a [SourceFile],
    defs: &'a [Definition],
    attr_routes: &'a [AttrRoute],
    mounted_defs: HashSet<usize>,
    mounted_handlers: HashSet<String>,
    sites: Vec<Site>,
}

impl<'a> Walker<'a> {
    fn new(files: &'a [SourceFile], defs: &'a [Definition], attr_routes: &'a [AttrRoute]) -> Self {
        Self {
            files,
            defs,
            attr_routes,
            mounted_defs: HashSet::new(),
            mounted_handlers: HashSet::new(),
            sites: Vec::new(),
        }
    }

    fn resolve_local(&self, name: &str, ctx: &Ctx) -> Option<usize> {
        self.defs
            .iter()
            .enumerate()
            .filter(|(index, def)| {
                def.file == ctx.file
                    && def.name == name
                    && def.local_to.is_some()
                    && def.local_to == ctx.func
                    && ctx.before.map_or(true, |before| *index < before)
            })
            .map(|(index, _)| index)
            .last()
    }

    fn resolve_fn(&self, name: &str, ctx: &Ctx) -> Option<usize> {
        let candidates = || {
            self.defs
                .iter()
                .enumerate()
                .filter(move |(_, def)| def.local_to.is_none() && def.name == name)
        };
        candidates()
            .find(|(_, def)| def.file == ctx.file)
            .or_else(|| candidates().next())
            .map(|(index, _)| index)
    }

    fn walk_def(&mut self, index: usize, prefix: &str, auth: bool, depth: usize) {
        self.mounted_defs.insert(index);
        let defs = self.defs;
        let def = &defs[index];
        self.walk(&def.expr, prefix, auth, &def.ctx(index), depth + 1);
    }

    fn walk(&mut self, expr: &Expr, prefix: &str, auth: bool, ctx: &Ctx, depth: usize) {
        if depth > MAX_NESTING {
            debug!("Router nesting deeper than {} levels, stopping", MAX_NESTING);
            return;
        }
        let (base, calls) = flatten(expr);
        let start = self.sites.len();
        let mut prefix = prefix.to_string();
        let mut resource: Option<String> = None;

        match base {
            Expr::Call(call) => {
                let name = call_name(base).unwrap_or_default();
                let first = call.args.first().and_then(str_lit);
                match (name.as_str(), first) {
                    ("scope", Some(scope)) => prefix = join_path(&prefix, &scope),
                    ("resource", Some(path)) => resource = Some(join_path(&prefix, &path)),
                    ("new", _) => {}
                    (name, _) => {
                        if let Some(index) = self.resolve_fn(name, ctx) {
                            self.walk_def(index, &prefix, auth, depth);
                        }
                    }
                }
            }
            Expr::Path(path) => {
                if let Some(ident) = path.path.get_ident() {
                    if let Some(index) = self.resolve_local(&ident.to_string(), ctx) {
                        self.walk_def(index, &prefix, auth, depth);
                    }
                }
            }
            _ => {}
        }

        let mut wrapped = false;
        for call in calls {
            let args: Vec<&Expr> = call.args.iter().collect();
            match call.method.to_string().as_str() {
                "route" => self.route_call(&args, &prefix, resource.as_deref(), auth, ctx),
                "nest" | "nest_service" => {
                    if let (Some(path), Some(inner)) = (args.first().and_then(|a| str_lit(a)), args.get(1)) {
                        self.walk(inner, &join_path(&prefix, &path), auth, ctx, depth + 1);
                    }
                }
                "merge" | "service" => {
                    if let Some(inner) = args.first() {
                        self.mount(inner, &prefix, auth, ctx, depth + 1);
                    }
                }
                // Axum layers wrap the routes registered before them
                "layer" | "route_layer" => {
                    if contains_auth(&compact(&call.args)) {
                        self.mark_auth(start);
                    }
                }
                "wrap" | "wrap_fn" => wrapped |= contains_auth(&compact(&call.args)),
                _ => {}
            }
        }
        if wrapped {
            self.mark_auth(start);
        }
    }

    /// `.service(handler)` mounts an attribute-macro handler; anything else is a router.
    fn mount(&mut self, expr: &Expr, prefix: &str, auth: bool, ctx: &Ctx, depth: usize) {
        if let Expr::Path(path) = expr {
            if let Some(ident) = path.path.segments.last().map(|s| s.ident.to_string()) {
                let handlers: Vec<Site> = self
                    .attr_routes
                    .iter()
                    .filter(|r| r.handler == ident)
                    .map(|r| r.site(prefix, auth))
                    .collect();
                if !handlers.is_empty() {
                    self.mounted_handlers.insert(ident);
                    self.sites.extend(handlers);
                    return;
                }
            }
        }
        self.walk(expr, prefix, auth, ctx, depth);
    }

    fn route_call(&mut self, args: &[&Expr], prefix: &str, resource: Option<&str>, auth: bool, ctx: &Ctx) {
        let (path, handler) = match (resource, args) {
            (Some(resource), [handler]) => (resource.to_string(), *handler),
            (_, [path, handler, ..]) => match str_lit(path) {
                Some(path) => (join_path(prefix, &path), *handler),
                None => return,
            },
            _ => return,
        };
        let handler = compact(handler);
        let methods = handler_methods(&handler);
        if methods.is_empty() {
            return;
        }
        let framework = if handler.contains("web::") {
            "actix"
        } else if self.files[ctx.file].axum {
            "axum"
        } else {
            "rust"
        };
        self.sites.push(Site {
            path,
            methods,
            auth: auth || contains_auth(&handler),
            framework,
            handler: handler_name(&handler),
            file: ctx.file,
        });
    }

    fn mark_auth(&mut self, from: usize) {
        for site in &mut self.sites[from..] {
            site.auth = true;
        }
    }
}

fn ast_routes(files: &[SourceFile]) -> Vec<Route> {
    let mut defs = Vec::new();
    let mut roots = Vec::new();
    let mut attr_routes = Vec::new();
    for (index, file) in files.iter().enumerate() {
        let mut collector = Collector {
            file: index,
            func: None,
            defs: &mut defs,
            roots: &mut roots,
            attr_routes: &mut attr_routes,
        };
        collector.visit_file(&file.tree);
    }
    debug!(
        "Rust: {} attribute routes, {} named routers, {} router chains",
        attr_routes.len(),
        defs.len(),
        roots.len()
    );

    // A dry walk finds which named routers and handlers are mounted elsewhere
    let mut probe = Walker::new(files, &defs, &attr_routes);
    for root in &roots {
        probe.walk(&root.expr, "", false, &root.ctx, 0);
    }
    for (index, def) in defs.iter().enumerate() {
        probe.walk(&def.expr, "", false, &def.ctx(index), 0);
    }
    let (mounted_defs, mounted_handlers) = (probe.mounted_defs, probe.mounted_handlers);

    let mut walker = Walker::new(files, &defs, &attr_routes);
    for root in &roots {
        walker.walk(&root.expr, "", false, &root.ctx, 0);
    }
    for (index, def) in defs.iter().enumerate() {
        if !mounted_defs.contains(&index) {
            walker.walk(&def.expr, "", false, &def.ctx(index), 0);
        }
    }

    let mut sites: Vec<Site> = attr_routes
        .iter()
        .filter(|r| !mounted_handlers.contains(&r.handler))
        .map(|r| r.site("", false))
        .collect();
    sites.extend(walker.sites);

    sites
        .iter()
        .flat_map(|site| {
            site.methods.iter().map(move |method| {
                build_route(
                    &site.path,
                    *method,
                    site.auth,
                    site.framework,
                    &files[site.file].rel,
                    site.handler.as_deref(),
                    CONFIDENCE,
                )
            })
        })
        .collect()
}

/// Contents of a plain (`"..."`) or raw (`r#"..."#`) string literal.
fn rust_string(token: &str) -> Option<String> {
    let token = token.trim();
    let body = match token.strip_prefix('r') {
        Some(raw) => {
            let hashes = raw.len() - raw.trim_start_matches('#').len();
            raw.get(hashes..raw.len().checked_sub(hashes)?)?
        }
        None => token,
    };
    body.strip_prefix('"')?.strip_suffix('"').map(str::to_string)
}

fn char_floor(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Regex and bracket-matching scan for files `syn` rejects.
pub fn scan_text(content: &str, rel_file: &str) -> Vec<Route> {
    let mut routes = Vec::new();
    let framework = if content.contains("axum") || content.contains("Router::new") {
        "axum"
    } else {
        "rust"
    };

    for caps in MACRO_ROUTE.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(method) = HttpMethod::parse(&caps[1]) else {
            continue;
        };
        let start = char_floor(content, whole.start().saturating_sub(FALLBACK_AUTH_WINDOW));
        let end = char_floor(content, (whole.end() + FALLBACK_AUTH_WINDOW).min(content.len()));
        routes.push(build_route(
            &caps[2],
            method,
            contains_auth(&content[start..end]),
            "actix",
            rel_file,
            None,
            FALLBACK_CONFIDENCE,
        ));
    }

    for (offset, _) in content.match_indices(".route(") {
        let open = offset + ".route".len();
        let Some(close) = find_closing(content, open) else {
            continue;
        };
        let args = split_top_level(&content[open + 1..close]);
        let [path, handler @ ..] = args.as_slice() else {
            continue;
        };
        let (Some(path), false) = (rust_string(path), handler.is_empty()) else {
            continue;
        };
        let handler: String = handler.join(",").split_whitespace().collect();
        let route_framework = if handler.contains("web::") { "actix" } else { framework };
        for method in handler_methods(&handler) {
            routes.push(build_route(
                &path,
                method,
                contains_auth(&handler),
                route_framework,
                rel_file,
                handler_name(&handler).as_deref(),
                FALLBACK_CONFIDENCE,
            ));
        }
    }

    routes
}

fn build_route(
    path: &str,
    method: HttpMethod,
    auth: bool,
    framework: &str,
    rel_file: &str,
    handler: Option<&str>,
    confidence: f64,
) -> Route {
    let path = REGEX_SEGMENT.replace_all(path, "{$1}");
    let path = normalize_path_syntax(&normalize_wildcards(&path));
    let params = path_placeholders(&path)
        .into_iter()
        .map(RouteParam::path)
        .collect();
    let mut draft = RouteDraft::new(path, method)
        .params(ParamLocation::Path, params)
        .auth(auth)
        .confidence(confidence)
        .meta("source", "rust")
        .meta("framework", framework)
        .meta("file", rel_file);
    if let Some(handler) = handler {
        draft = draft.meta("function", handler);
    }
    draft.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn routes_of(code: &str) -> Vec<Route> {
        let tree = syn::parse_file(code).expect("Failed to parse test code");
        let files = vec![SourceFile {
            rel: "src/main.rs".to_string(),
            axum: code.contains("axum") || code.contains("Router::new"),
            tree,
        }];
        ast_routes(&files)
    }

    fn keys(routes: &[Route]) -> Vec<String> {
        let mut keys: Vec<String> = routes.iter().map(|r| format!("{} {}", r.method, r.path)).collect();
        keys.sort();
        keys
    }

    fn find<'a>(routes: &'a [Route], method: HttpMethod, path: &str) -> &'a Route {
        routes
            .iter()
            .find(|r| r.method == method && r.path == path)
            .unwrap_or_else(|| panic!("missing {} {}", method, path))
    }

    const MIXED: &str = r#"
use actix_web::{get, post, web, HttpResponse, Responder};
use axum::routing::{get, post};
use axum::Router;
use tower_http::auth::RequireAuthorizationLayer;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok()
}

#[post("/login")]
async fn login() -> impl Responder {
    HttpResponse::Created()
}

fn actix_routes() {
    let _ = web::scope("/api")
        .route("/items/{id}", web::get().to(get_item))
        .route("/items", web::post().to(create_item));
}

fn axum_routes() {
    let _app = Router::new()
        .route("/users/:id", get(get_user))
        .route("/users", post(create_user))
        .route("/admin", get(authenticated_admin).post(authenticated_admin_post))
        .layer(RequireAuthorizationLayer::bearer("token"));
}
"#;

    #[test]
    fn test_actix_and_axum_in_one_file() {
        let routes = routes_of(MIXED);
        assert_eq!(
            keys(&routes),
            vec![
                "GET /admin",
                "GET /api/items/{id}",
                "GET /health",
                "GET /users/{id}",
                "POST /admin",
                "POST /api/items",
                "POST /login",
                "POST /users",
            ]
        );

        let health = find(&routes, HttpMethod::Get, "/health");
        assert!(!health.auth_required);
        assert_eq!(health.metadata["framework"], "actix");
        assert_eq!(health.metadata["function"], "health");
        assert_eq!(health.confidence, 0.85);

        let item = find(&routes, HttpMethod::Get, "/api/items/{id}");
        assert_eq!(item.metadata["framework"], "actix");
        assert_eq!(item.metadata["function"], "get_item");

        let user = find(&routes, HttpMethod::Get, "/users/{id}");
        assert_eq!(user.metadata["framework"], "axum");
        assert_eq!(user.params["path"], vec![RouteParam::path("id")]);
        assert!(!user.params.contains_key("query"));

        assert!(find(&routes, HttpMethod::Post, "/admin").auth_required);
    }

    #[test]
    fn test_axum_nest_resolves_let_bindings_and_router_functions() {
        let code = r#"
use axum::{routing::{any, get, post}, Router, middleware};

fn api_routes() -> Router {
    Router::new()
        .route("/items/:id", get(get_item).delete(delete_item))
        .route("/items", post(create_item))
}

async fn app() {
    let admin = Router::new()
        .route("/stats", get(stats))
        .route_layer(middleware::from_fn(require_auth));
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api_routes())
        .nest("/admin", admin)
        .route("/files/*path", any(serve));
    axum::serve(listener, app).await;
}
"#;
        let routes = routes_of(code);
        let mut expected = vec![
            "GET /".to_string(),
            "GET /api/items/{id}".to_string(),
            "DELETE /api/items/{id}".to_string(),
            "POST /api/items".to_string(),
            "GET /admin/stats".to_string(),
        ];
        expected.extend(HttpMethod::ALL.iter().map(|m| format!("{} /files/{{path}}", m)));
        expected.sort();
        assert_eq!(keys(&routes), expected);

        assert!(find(&routes, HttpMethod::Get, "/admin/stats").auth_required);
        assert!(!find(&routes, HttpMethod::Get, "/").auth_required);
        assert!(!find(&routes, HttpMethod::Post, "/api/items").auth_required);
    }

    #[test]
    fn test_axum_rebinding_with_layer() {
        let code = r#"
fn app() -> Router {
    let app = Router::new().route("/me", get(me));
    let app = app.layer(AuthLayer::new());
    app
}
"#;
        let routes = routes_of(code);
        assert_eq!(keys(&routes), vec!["GET /me"]);
        assert!(routes[0].auth_required);
    }

    #[test]
    fn test_actix_scopes_services_and_resources() {
        let code = r#"
use actix_web::{get, route, web, App, HttpResponse};

#[get("/users/{id}")]
async fn get_user() -> HttpResponse { HttpResponse::Ok().finish() }

#[route("/users", method = "GET", method = "POST")]
async fn users() -> HttpResponse { HttpResponse::Ok().finish() }

#[get("/health")]
async fn health() -> HttpResponse { HttpResponse::Ok().finish() }

#[get("/me")]
async fn me(user: AuthenticatedUser) -> HttpResponse { HttpResponse::Ok().finish() }

#[actix_web::main]
async fn main() {
    HttpServer::new(|| {
        App::new()
            .service(health)
            .service(
                web::scope("/api/v1")
                    .wrap(HttpAuthentication::bearer(validator))
                    .service(get_user)
                    .service(users)
                    .service(
                        web::resource("/orders/{order_id}")
                            .route(web::get().to(get_order))
                            .route(web::delete().to(delete_order)),
                    )
                    .route("/files/{tail:.*}", web::get().to(files)),
            )
    })
    .bind(("127.0.0.1", 8080))
    .run()
    .await;
}
"#;
        let routes = routes_of(code);
        assert_eq!(
            keys(&routes),
            vec![
                "DELETE /api/v1/orders/{order_id}",
                "GET /api/v1/files/{tail}",
                "GET /api/v1/orders/{order_id}",
                "GET /api/v1/users",
                "GET /api/v1/users/{id}",
                "GET /health",
                "GET /me",
                "POST /api/v1/users",
            ]
        );
        assert!(!find(&routes, HttpMethod::Get, "/health").auth_required);
        assert!(find(&routes, HttpMethod::Get, "/me").auth_required);
        assert!(routes
            .iter()
            .filter(|r| r.path.starts_with("/api/v1"))
            .all(|r| r.auth_required));
        assert_eq!(
            find(&routes, HttpMethod::Delete, "/api/v1/orders/{order_id}").metadata["function"],
            "delete_order"
        );
    }

    #[test]
    fn test_handler_methods() {
        assert_eq!(handler_methods("get(a).post(b)"), vec![HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(handler_methods("web::put().to(h)"), vec![HttpMethod::Put]);
        assert_eq!(handler_methods("any(h)").len(), HttpMethod::ALL.len());
        assert!(handler_methods("get_service(ServeDir::new(\"assets\"))").is_empty());
    }

    #[test]
    fn test_rust_string() {
        assert_eq!(rust_string(r#""/a""#).as_deref(), Some("/a"));
        assert_eq!(rust_string(r##"r#"/a"#"##).as_deref(), Some("/a"));
        assert_eq!(rust_string(r#"r"/a""#).as_deref(), Some("/a"));
        assert_eq!(rust_string("PATH"), None);
    }

    #[test]
    fn test_parse_falls_back_on_syntax_errors() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/main.rs"),
            r#"
use axum::Router;

#[get("/broken")]
async fn broken( {

fn routes() -> Router {
    Router::new().route("/ok", get(ok)).route("/nested", get(|| async { ")" }))
}
"#,
        )
        .unwrap();

        let outcome = RustParser.parse(dir.path());
        assert_eq!(keys(&outcome.routes), vec!["GET /broken", "GET /nested", "GET /ok"]);
        assert!(outcome.routes.iter().all(|r| r.confidence == 0.75));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("fell back to text scan"));
    }

    #[test]
    fn test_find_route_files_skips_tests_and_target() {
        let dir = TempDir::new().unwrap();
        for rel in ["src/main.rs", "tests/api.rs", "target/debug/build.rs"] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, MIXED).unwrap();
        }
        fs::write(dir.path().join("src/util.rs"), "pub fn add(a: i32) -> i32 { a }\n").unwrap();

        let files = RustParser.find_route_files(dir.path());
        assert_eq!(files, vec![dir.path().join("src/main.rs")]);
    }

    #[test]
    fn test_find_route_files_skips_vendor_build_and_virtualenvs() {
        let dir = TempDir::new().unwrap();
        for rel in ["src/main.rs", "vendor/dep/src/lib.rs", "build/gen.rs", "venv/lib.rs", "dist/out.rs"] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, MIXED).unwrap();
        }

        assert_eq!(RustParser.find_route_files(dir.path()), vec![dir.path().join("src/main.rs")]);
    }
}
