//! Route data model shared by every discovery source.
//!
//! A [`Route`] is the normalized record of one HTTP endpoint. Parsers, the
//! OpenAPI loader and the deduplicator all produce and consume this shape; the
//! coverage engine converts it into its own, more aggressively canonicalized
//! operation key (see [`crate::coverage`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Every method, in the order used when a registration expands to "any".
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Parse a method token case-insensitively (`get`, `Get`, `GET`).
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// POST, PUT, PATCH and DELETE change server state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a discovered route originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RouteSource {
    #[default]
    #[serde(rename = "openapi")]
    OpenApi,
    #[serde(rename = "code_analysis")]
    CodeAnalysis,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "manual")]
    Manual,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::OpenApi => "openapi",
            RouteSource::CodeAnalysis => "code_analysis",
            RouteSource::Runtime => "runtime",
            RouteSource::Manual => "manual",
        }
    }
}

/// Request location a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Body => "body",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
        }
    }
}

/// One parameter descriptor inside [`Route::params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteParam {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

fn default_required() -> bool {
    true
}

impl RouteParam {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required,
        }
    }

    /// A required string path parameter.
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, "string", true)
    }
}

/// Parameters grouped by location key (`path`, `query`, `body`, ...), order preserved per key.
pub type RouteParams = BTreeMap<String, Vec<RouteParam>>;

/// Open metadata bag attached to a route.
pub type Metadata = BTreeMap<String, Value>;

/// Normalized representation of one discovered API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub method: HttpMethod,
    pub auth_required: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub params: RouteParams,
    #[serde(default)]
    pub responses: BTreeMap<String, Value>,
    #[serde(default)]
    pub source: RouteSource,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_confidence() -> f64 {
    1.0
}

impl Route {
    /// Create a route with empty optional fields, sourced from OpenAPI at full confidence.
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
            auth_required: false,
            summary: None,
            description: None,
            tags: Vec::new(),
            params: RouteParams::new(),
            responses: BTreeMap::new(),
            source: RouteSource::OpenApi,
            confidence: default_confidence(),
            metadata: Metadata::new(),
        }
    }

    /// The merge key: method plus the exact path string.
    pub fn key(&self) -> (HttpMethod, &str) {
        (self.method, self.path.as_str())
    }

    /// Set the trust score, clamped into `0.0..=1.0`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_source(mut self, source: RouteSource) -> Self {
        self.source = source;
        self
    }

    /// Serialize into a JSON object with enum fields as their string values.
    pub fn to_dict(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Rebuild a route from its [`Route::to_dict`] form.
    pub fn from_dict(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Names of the parameters recorded under the `path` key.
    pub fn path_param_names(&self) -> Vec<&str> {
        self.params
            .get(ParamLocation::Path.as_str())
            .map(|params| params.iter().map(|p| p.name.as_str()).collect())
            .unwrap_or_default()
    }
}
