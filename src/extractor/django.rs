//! Django and Django REST Framework route extraction.
//!
//! Two independent passes share one read of the source tree:
//!
//! 1. `urls.py` `path()` / `re_path()` / `url()` entries. The HTTP verb cannot be known
//!    from a URL conf, so every entry is emitted as `GET`. App-level URL confs are
//!    assumed to be mounted under `api/` when the app directory name mentions "api".
//! 2. DRF viewsets, classified by base class and expanded against every
//!    `router.register("prefix", ViewSet)` call.

use super::python::{
    find_method_calls, keyword_arg, positional_args, python_files, sequence_items,
    string_literal, PyClass, PyModule,
};
use super::{join_path, relative_display, ParseOutcome, ParserKind, RouteDraft, RouteParser};
use crate::error::ParseDiagnostic;
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::{bracket_contents, read_source, split_top_level};
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Standard viewset actions: name, method and path suffix.
const VIEWSET_ACTIONS: &[(&str, HttpMethod, &str)] = &[
    ("list", HttpMethod::Get, ""),
    ("create", HttpMethod::Post, ""),
    ("retrieve", HttpMethod::Get, "/{pk}"),
    ("update", HttpMethod::Put, "/{pk}"),
    ("partial_update", HttpMethod::Patch, "/{pk}"),
    ("destroy", HttpMethod::Delete, "/{pk}"),
];

/// Mixins that contribute standard actions to a `GenericViewSet`.
const MIXIN_ACTIONS: &[(&str, &[&str])] = &[
    ("ListModelMixin", &["list"]),
    ("CreateModelMixin", &["create"]),
    ("RetrieveModelMixin", &["retrieve"]),
    ("UpdateModelMixin", &["update", "partial_update"]),
    ("DestroyModelMixin", &["destroy"]),
];

const AUTH_CLASSES: &[&str] = &[
    "IsAuthenticated",
    "IsAdminUser",
    "IsAuthenticatedOrReadOnly",
    "DjangoModelPermissions",
    "DjangoObjectPermissions",
    "TokenAuthentication",
    "SessionAuthentication",
    "JWTAuthentication",
];

const AUTH_DECORATORS: &[&str] = &["login_required", "permission_required", "user_passes_test"];
const AUTH_MIXINS: &[&str] = &["LoginRequiredMixin", "PermissionRequiredMixin", "UserPassesTestMixin"];

const ROUTE_FILES: &[&str] = &["urls.py", "views.py", "viewsets.py", "routers.py"];

const URL_CONFIDENCE: f64 = 0.75;
const VIEWSET_CONFIDENCE: f64 = 0.80;

static URL_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|[^\w.])(re_path|path|url)\s*\(").unwrap());
static NAMED_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\?P<(\w+)>[^)]*\)").unwrap());
static CONVERTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(?:(\w+):)?(\w+)>").unwrap());
static CLASS_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:permission|authentication)_classes\s*=\s*([\[(][^\])]*[\])])").unwrap()
});

pub struct DjangoParser;

impl RouteParser for DjangoParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Django
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        python_files(source_dir)
            .into_iter()
            .filter(|file| {
                file.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| ROUTE_FILES.contains(&n))
            })
            .collect()
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let files = python_files(source_dir);
        let read: Vec<Result<FileFacts, ParseDiagnostic>> = files
            .par_iter()
            .map(|file| {
                read_source(file)
                    .map(|content| FileFacts::gather(source_dir, file, &content))
                    .map_err(|e| ParseDiagnostic::for_file("django", file, format!("{:#}", e)))
            })
            .collect();

        let mut facts = Vec::new();
        let mut outcome = ParseOutcome::default();
        for result in read {
            match result {
                Ok(f) => facts.push(f),
                Err(diagnostic) => {
                    warn!("{}", diagnostic);
                    outcome.diagnostics.push(diagnostic);
                }
            }
        }

        let auth_views: HashSet<&str> = facts
            .iter()
            .flat_map(|f| f.auth_views.iter().map(String::as_str))
            .collect();
        for file in &facts {
            outcome.routes.extend(url_routes(file, &auth_views));
        }

        let viewsets: HashMap<&str, &ViewSetInfo> = facts
            .iter()
            .flat_map(|f| f.viewsets.iter().map(|v| (v.name.as_str(), v)))
            .collect();
        for file in &facts {
            for registration in &file.registrations {
                match viewsets.get(registration.viewset.as_str()) {
                    Some(info) => outcome.routes.extend(viewset_routes(registration, info, &file.rel)),
                    None => debug!("router.register of unknown viewset {}", registration.viewset),
                }
            }
        }

        debug!("Django: {} routes from {} files", outcome.routes.len(), files.len());
        outcome
    }
}

struct UrlPattern {
    path: String,
    view: String,
    name: Option<String>,
}

struct CustomAction {
    methods: Vec<HttpMethod>,
    url_path: String,
    detail: bool,
    function: String,
}

struct ViewSetInfo {
    name: String,
    actions: Vec<&'static str>,
    custom: Vec<CustomAction>,
    auth: bool,
}

struct Registration {
    prefix: String,
    viewset: String,
}

/// Everything one Python file contributes to Django discovery.
struct FileFacts {
    rel: String,
    /// `Some(prefix)` for `urls.py` files
    url_prefix: Option<String>,
    patterns: Vec<UrlPattern>,
    viewsets: Vec<ViewSetInfo>,
    registrations: Vec<Registration>,
    /// Function and class views guarded by a login/permission decorator or mixin
    auth_views: Vec<String>,
}

impl FileFacts {
    fn gather(root: &Path, file: &Path, content: &str) -> Self {
        let module = PyModule::parse(content);
        let rel = relative_display(root, file);
        let is_urls = file.file_name().and_then(|n| n.to_str()) == Some("urls.py");

        let mut auth_views: Vec<String> = module
            .functions
            .iter()
            .filter(|f| f.class_name.is_none() && f.has_decorator(AUTH_DECORATORS))
            .map(|f| f.name.clone())
            .collect();
        auth_views.extend(
            module
                .classes
                .iter()
                .filter(|c| c.has_base(AUTH_MIXINS) || class_has_auth(c))
                .map(|c| c.name.clone()),
        );

        Self {
            url_prefix: is_urls.then(|| infer_url_prefix(root, file)),
            patterns: if is_urls { url_patterns(&module.masked) } else { Vec::new() },
            viewsets: module
                .classes
                .iter()
                .filter_map(|class| classify_viewset(&module, class))
                .collect(),
            registrations: registrations(&module.masked),
            auth_views,
            rel,
        }
    }
}

/// Root URL conf gets no prefix; an app conf gets `api` when its directory name mentions it.
fn infer_url_prefix(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() <= 1 {
        return String::new();
    }
    let app = &parts[parts.len() - 2];
    if app.to_lowercase().contains("api") {
        "api".to_string()
    } else {
        String::new()
    }
}

fn url_patterns(masked: &str) -> Vec<UrlPattern> {
    URL_CALL
        .captures_iter(masked)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let args = bracket_contents(masked, whole.end() - 1)?;
            let parts = split_top_level(args);
            let positional = positional_args(&parts);
            let raw = string_literal(positional.first()?)?;
            let path = if &caps[1] == "path" {
                raw
            } else {
                regex_route(&raw)
            };
            Some(UrlPattern {
                path,
                view: positional.get(1).map(|v| v.to_string()).unwrap_or_default(),
                name: keyword_arg(&parts, "name").and_then(string_literal),
            })
        })
        .collect()
}

/// `^users/(?P<pk>\d+)/$` → `users/<pk>/`
fn regex_route(pattern: &str) -> String {
    let trimmed = pattern.trim_start_matches('^').trim_end_matches('$');
    NAMED_GROUP.replace_all(trimmed, "<$1>").into_owned()
}

fn converter_params(path: &str) -> Vec<RouteParam> {
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

/// `views.detail` → `detail`; `views.ItemView.as_view()` → `ItemView`.
fn view_name(view: &str) -> &str {
    let view = view.split('(').next().unwrap_or(view).trim_end_matches(".as_view");
    view.rsplit('.').next().unwrap_or(view).trim()
}

fn url_routes(file: &FileFacts, auth_views: &HashSet<&str>) -> Vec<Route> {
    let Some(prefix) = &file.url_prefix else {
        return Vec::new();
    };
    file.patterns
        .iter()
        .filter(|p| !p.view.trim_start().starts_with("include"))
        .map(|pattern| {
            let full_path = join_path(prefix, &pattern.path);
            let view = view_name(&pattern.view);
            RouteDraft::new(full_path.clone(), HttpMethod::Get)
                .params(ParamLocation::Path, converter_params(&full_path))
                .auth(auth_views.contains(view))
                .confidence(URL_CONFIDENCE)
                .meta("framework", "django")
                .meta("file", file.rel.clone())
                .meta("view", pattern.view.clone())
                .meta("url_name", pattern.name.clone().unwrap_or_default())
                .build()
        })
        .collect()
}

fn class_has_auth(class: &PyClass) -> bool {
    CLASS_LIST.captures_iter(&class.body).any(|caps| {
        sequence_items(&caps[1])
            .iter()
            .any(|item| AUTH_CLASSES.contains(&item.rsplit('.').next().unwrap_or(item)))
    })
}

fn classify_viewset(module: &PyModule, class: &PyClass) -> Option<ViewSetInfo> {
    if !class.bases.iter().any(|b| b.contains("ViewSet")) {
        return None;
    }
    let defined: HashSet<&str> = module.methods_of(&class.name).map(|f| f.name.as_str()).collect();

    let actions: Vec<&'static str> = if class.has_base(&["ModelViewSet"]) {
        VIEWSET_ACTIONS.iter().map(|(name, _, _)| *name).collect()
    } else if class.has_base(&["ReadOnlyModelViewSet"]) {
        vec!["list", "retrieve"]
    } else {
        let from_mixins: HashSet<&str> = MIXIN_ACTIONS
            .iter()
            .filter(|(mixin, _)| class.has_base(&[*mixin]))
            .flat_map(|(_, actions)| actions.iter().copied())
            .collect();
        VIEWSET_ACTIONS
            .iter()
            .map(|(name, _, _)| *name)
            .filter(|name| defined.contains(name) || from_mixins.contains(name))
            .collect()
    };

    let custom = module
        .methods_of(&class.name)
        .flat_map(|function| {
            function
                .decorators
                .iter()
                .filter(|d| d.base_name() == "action")
                .map(move |d| {
                    let args = d.arg_list();
                    let detail = keyword_arg(&args, "detail") == Some("True");
                    let mut methods: Vec<HttpMethod> = keyword_arg(&args, "methods")
                        .map(sequence_items)
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|m| string_literal(m))
                        .filter_map(|m| HttpMethod::parse(&m))
                        .collect();
                    if methods.is_empty() {
                        methods.push(HttpMethod::Get);
                    }
                    let url_path = keyword_arg(&args, "url_path")
                        .and_then(string_literal)
                        .unwrap_or_else(|| function.name.replace('_', "-"));
                    CustomAction {
                        methods,
                        url_path,
                        detail,
                        function: function.name.clone(),
                    }
                })
        })
        .collect();

    Some(ViewSetInfo {
        name: class.name.clone(),
        actions,
        custom,
        auth: class_has_auth(class),
    })
}

fn registrations(masked: &str) -> Vec<Registration> {
    find_method_calls(masked, "register")
        .into_iter()
        .filter_map(|(_, args)| {
            let parts = split_top_level(&args);
            let positional = positional_args(&parts);
            let prefix = string_literal(positional.first()?)?;
            let viewset = positional.get(1)?.rsplit('.').next()?.trim().to_string();
            Some(Registration { prefix, viewset })
        })
        .collect()
}

fn viewset_routes(registration: &Registration, info: &ViewSetInfo, rel: &str) -> Vec<Route> {
    let base = join_path("", registration.prefix.trim_start_matches('^').trim_end_matches('$'));
    let pk = || RouteParam::new("pk", "integer", true);
    let mut routes = Vec::new();

    for (action, method, suffix) in VIEWSET_ACTIONS {
        if !info.actions.contains(action) {
            continue;
        }
        let detail = !suffix.is_empty();
        let mut draft = RouteDraft::new(format!("{}{}", base.trim_end_matches('/'), suffix), *method)
            .auth(info.auth)
            .confidence(VIEWSET_CONFIDENCE)
            .meta("framework", "django-drf")
            .meta("file", rel)
            .meta("viewset", info.name.clone())
            .meta("action", *action);
        if detail {
            draft = draft.param(ParamLocation::Path, pk());
        }
        routes.push(draft.build());
    }

    for custom in &info.custom {
        let path = if custom.detail {
            join_path(&base, &format!("{{pk}}/{}", custom.url_path))
        } else {
            join_path(&base, &custom.url_path)
        };
        for method in &custom.methods {
            let mut draft = RouteDraft::new(path.clone(), *method)
                .auth(info.auth)
                .confidence(VIEWSET_CONFIDENCE)
                .meta("framework", "django-drf")
                .meta("file", rel)
                .meta("viewset", info.name.clone())
                .meta("action", custom.url_path.clone())
                .meta("function", custom.function.clone())
                .meta("detail", custom.detail);
            if custom.detail {
                draft = draft.param(ParamLocation::Path, pk());
            }
            routes.push(draft.build());
        }
    }
    routes
}
