//! OpenAPI / Swagger document loading and operation enumeration.
//!
//! Documents are read from a local path or fetched over HTTP(S), parsed as JSON
//! first and YAML second, and kept as a [`serde_json::Value`] tree. `$ref`
//! schemas are never resolved; only the `paths`, `security` and
//! `components.securitySchemes` sections are consulted.

use crate::error::{Error, Result};
use crate::model::{HttpMethod, Metadata, Route, RouteParam, RouteParams, RouteSource};
use crate::scanner::FileScanner;
use log::{debug, info};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeout applied to OpenAPI fetches over HTTP(S).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// File names recognised as OpenAPI documents by [`find_openapi_candidates`].
pub const CANDIDATE_NAMES: &[&str] = &[
    "openapi.yaml",
    "openapi.yml",
    "openapi.json",
    "swagger.yaml",
    "swagger.yml",
    "swagger.json",
];

/// One `paths.<path>.<method>` entry of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub method: HttpMethod,
    pub path: String,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn read_text(source: &str) -> Result<String> {
    if is_url(source) {
        debug!("Fetching OpenAPI document from {}", source);
        let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
        let response = agent
            .get(source)
            .call()
            .map_err(|e| Error::spec_load(source, e))?;
        return response
            .into_string()
            .map_err(|e| Error::spec_load(source, e));
    }
    fs::read_to_string(source).map_err(|e| Error::spec_load(source, e))
}

/// Loads a document from a file path or URL.
///
/// # Errors
///
/// Returns [`Error::SpecLoad`] when the source cannot be read, is neither JSON nor
/// YAML, or does not contain a mapping at the top level.
pub fn load_openapi(source: &str) -> Result<Value> {
    let text = read_text(source)?;
    let document = parse_document(&text).map_err(|message| Error::spec_load(source, message))?;
    info!("Loaded OpenAPI document {}", source);
    Ok(document)
}

/// Parses document text as JSON, falling back to YAML.
pub fn parse_document(text: &str) -> std::result::Result<Value, String> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(json_err) => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                .map_err(|yaml_err| format!("not JSON ({}) or YAML ({})", json_err, yaml_err))?;
            yaml_to_json(yaml)
        }
    };
    if !value.is_object() {
        return Err("document root is not a mapping".to_string());
    }
    Ok(value)
}

/// Converts a YAML tree to JSON, stringifying non-string mapping keys (`200:` → `"200"`).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!(i)
            } else if let Some(u) = n.as_u64() {
                json!(u)
            } else {
                n.as_f64().map_or(Value::Null, |f| json!(f))
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Null => "null".to_string(),
                    _ => continue,
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn paths_of(document: &Value) -> Option<&Map<String, Value>> {
    document.get("paths").and_then(Value::as_object)
}

/// Every operation under `paths` whose key is a recognised HTTP method.
///
/// Paths come out in document-map order; operations within a path in
/// [`HttpMethod`] order.
pub fn enumerate_operations(document: &Value) -> Vec<Operation> {
    let Some(paths) = paths_of(document) else {
        return Vec::new();
    };

    let mut operations = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let mut per_path: Vec<Operation> = item
            .iter()
            .filter_map(|(key, op)| {
                let method = HttpMethod::parse(key)?;
                Some(Operation {
                    method,
                    path: path.clone(),
                    operation_id: op.get("operationId").and_then(Value::as_str).map(String::from),
                    tags: string_list(op.get("tags")),
                })
            })
            .collect();
        per_path.sort_by_key(|op| op.method);
        operations.extend(per_path);
    }
    operations
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

/// Whether an operation requires authentication.
///
/// Operation-level `security` overrides the document-level list. An empty list, or
/// only empty requirement objects, means no auth. Otherwise a requirement counts
/// only when its scheme name is declared in `components.securitySchemes`.
pub fn operation_auth_required(operation: &Value, global_security: &Value, security_schemes: &Value) -> bool {
    let security = match operation.get("security") {
        Some(Value::Null) | None => global_security,
        Some(own) => own,
    };
    let Some(requirements) = security.as_array() else {
        return false;
    };
    requirements
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|requirement| requirement.keys())
        .any(|scheme| security_schemes.get(scheme).is_some_and(|s| !s.is_null()))
}

/// Path-item and operation parameters grouped by their `in` location (default `query`).
///
/// A `requestBody` is recorded as a single `body` entry named `body`.
pub fn parameters_for_operation(path_item: &Value, operation: &Value) -> RouteParams {
    let mut grouped = RouteParams::new();
    let declared = [path_item, operation]
        .into_iter()
        .filter_map(|v| v.get("parameters").and_then(Value::as_array))
        .flatten();

    for param in declared {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
        let param_type = param
            .pointer("/schema/type")
            .or_else(|| param.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("string");
        let required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == "path");
        grouped
            .entry(location.to_string())
            .or_default()
            .push(RouteParam::new(name, param_type, required));
    }

    if let Some(body) = operation.get("requestBody").filter(|b| !b.is_null()) {
        let body_type = body
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.values().find_map(|media| media.pointer("/schema/type")))
            .and_then(Value::as_str)
            .unwrap_or("object");
        let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
        grouped
            .entry("body".to_string())
            .or_default()
            .push(RouteParam::new("body", body_type, required));
    }
    grouped
}

/// Builds routes from an already loaded document.
pub fn routes_from_document(document: &Value) -> Vec<Route> {
    let empty = Value::Null;
    let schemes = document
        .pointer("/components/securitySchemes")
        .unwrap_or(&empty);
    let global_security = document.get("security").unwrap_or(&empty);
    let Some(paths) = paths_of(document) else {
        return Vec::new();
    };

    enumerate_operations(document)
        .into_iter()
        .map(|op| {
            let path_item = paths.get(&op.path).unwrap_or(&empty);
            let operation = path_item
                .as_object()
                .and_then(|item| {
                    item.iter()
                        .find(|(key, _)| HttpMethod::parse(key) == Some(op.method))
                        .map(|(_, v)| v)
                })
                .unwrap_or(&empty);

            let text = |key: &str| operation.get(key).and_then(Value::as_str).map(String::from);
            let responses = operation
                .get("responses")
                .and_then(Value::as_object)
                .map(|r| r.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();

            let mut metadata = Metadata::new();
            metadata.insert("operation_id".into(), json!(op.operation_id));
            metadata.insert("tags".into(), json!(op.tags));
            metadata.insert(
                "security".into(),
                operation.get("security").unwrap_or(global_security).clone(),
            );
            metadata.insert("summary".into(), json!(text("summary")));
            metadata.insert(
                "deprecated".into(),
                json!(operation.get("deprecated").and_then(Value::as_bool).unwrap_or(false)),
            );

            let mut route = Route::new(op.path.clone(), op.method)
                .with_source(RouteSource::OpenApi)
                .with_confidence(1.0);
            route.auth_required = operation_auth_required(operation, global_security, schemes);
            route.summary = text("summary");
            route.description = text("description");
            route.tags = op.tags;
            route.params = parameters_for_operation(path_item, operation);
            route.responses = responses;
            route.metadata = metadata;
            route
        })
        .collect()
}

/// Loads `source` and returns one route per operation, all at confidence 1.0.
pub fn discover_from_openapi(source: &str) -> Result<Vec<Route>> {
    let document = load_openapi(source)?;
    let routes = routes_from_document(&document);
    info!("OpenAPI {}: {} operations", source, routes.len());
    Ok(routes)
}

/// OpenAPI documents under `root`, sorted.
///
/// Files named like `openapi.yaml` or `swagger.json` win; when none exist, any
/// YAML file with an `openapi:` key in its first five lines is returned instead.
pub fn find_openapi_candidates(root: &Path) -> Vec<PathBuf> {
    let files = match FileScanner::new(root.to_path_buf())
        .with_extensions(&["yaml", "yml", "json"])
        .scan()
    {
        Ok(result) => result.files,
        Err(e) => {
            debug!("{}", e);
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = files
        .iter()
        .filter(|f| {
            f.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| CANDIDATE_NAMES.contains(&n))
        })
        .cloned()
        .collect();

    if candidates.is_empty() {
        candidates = files
            .into_iter()
            .filter(|f| f.extension().is_some_and(|e| e == "yaml"))
            .filter(|f| {
                fs::read_to_string(f).is_ok_and(|text| {
                    text.lines()
                        .take(5)
                        .any(|line| line.trim().starts_with("openapi:"))
                })
            })
            .collect();
    }
    candidates.sort();
    candidates.dedup();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PETSTORE: &str = r#"
openapi: 3.0.0
info:
  title: Pets
  version: "1"
paths:
  /pets:
    get:
      operationId: listPets
      tags: [pets]
      summary: List pets
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
      responses:
        200:
          description: ok
    post:
      operationId: createPet
      tags: [pets]
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
    get:
      operationId: showPet
      deprecated: true
"#;

    #[test]
    fn test_parse_yaml_with_numeric_keys() {
        let doc = parse_document(PETSTORE).unwrap();
        assert_eq!(doc["paths"]["/pets"]["get"]["responses"]["200"]["description"], "ok");
    }

    #[test]
    fn test_parse_rejects_scalars_and_garbage() {
        assert!(parse_document("just a string").is_err());
        assert!(parse_document("{not: [valid").is_err());
    }

    #[test]
    fn test_enumerate_operations() {
        let doc = parse_document(PETSTORE).unwrap();
        let ops = enumerate_operations(&doc);
        let keys: Vec<(HttpMethod, &str)> = ops.iter().map(|o| (o.method, o.path.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (HttpMethod::Get, "/pets"),
                (HttpMethod::Post, "/pets"),
                (HttpMethod::Get, "/pets/{petId}"),
            ]
        );
        assert_eq!(ops[0].operation_id.as_deref(), Some("listPets"));
        assert_eq!(ops[0].tags, vec!["pets"]);
    }

    #[test]
    fn test_routes_without_security_are_open() {
        let doc = parse_document(PETSTORE).unwrap();
        let routes = routes_from_document(&doc);
        assert_eq!(routes.len(), 3);
        assert!(routes.iter().all(|r| !r.auth_required));
        assert!(routes.iter().all(|r| r.confidence == 1.0 && r.source == RouteSource::OpenApi));
    }

    #[test]
    fn test_route_params_and_metadata() {
        let doc = parse_document(PETSTORE).unwrap();
        let routes = routes_from_document(&doc);

        assert_eq!(routes[0].params["query"], vec![RouteParam::new("limit", "integer", false)]);
        assert_eq!(routes[0].summary.as_deref(), Some("List pets"));
        assert!(routes[0].responses.contains_key("200"));
        assert_eq!(routes[1].params["body"], vec![RouteParam::new("body", "object", true)]);
        assert_eq!(routes[2].params["path"], vec![RouteParam::path("petId")]);
        assert_eq!(routes[2].metadata["deprecated"], json!(true));
        assert_eq!(routes[2].metadata["operation_id"], json!("showPet"));
    }

    #[test]
    fn test_operation_auth_required() {
        let schemes = json!({"bearer": {"type": "http", "scheme": "bearer"}});
        let global = json!([{"bearer": []}]);

        assert!(operation_auth_required(&json!({}), &global, &schemes));
        assert!(!operation_auth_required(&json!({"security": []}), &global, &schemes));
        assert!(!operation_auth_required(&json!({"security": [{}]}), &global, &schemes));
        assert!(!operation_auth_required(&json!({"security": [{"apiKey": []}]}), &global, &schemes));
        assert!(operation_auth_required(&json!({"security": [{}, {"bearer": []}]}), &json!([]), &schemes));
        assert!(!operation_auth_required(&json!({}), &global, &Value::Null));
    }

    #[test]
    fn test_load_openapi_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api.json");
        fs::write(&path, r#"{"openapi": "3.0.0", "paths": {"/health": {"get": {}}}}"#).unwrap();

        let routes = discover_from_openapi(path.to_str().unwrap()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/health");
    }

    #[test]
    fn test_load_openapi_missing_file() {
        let err = load_openapi("/nonexistent/openapi.yaml").unwrap_err();
        assert!(matches!(err, Error::SpecLoad { .. }));
    }

    #[test]
    fn test_find_openapi_candidates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/openapi.yaml"), "openapi: 3.0.0\n").unwrap();
        fs::write(dir.path().join("swagger.json"), "{}").unwrap();
        fs::write(dir.path().join("other.yaml"), "openapi: 3.1.0\n").unwrap();

        let found = find_openapi_candidates(dir.path());
        assert_eq!(
            found,
            vec![dir.path().join("docs/openapi.yaml"), dir.path().join("swagger.json")]
        );
    }

    #[test]
    fn test_find_openapi_candidates_by_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("api.yaml"), "# API\nopenapi: 3.1.0\npaths: {}\n").unwrap();
        fs::write(dir.path().join("config.yaml"), "debug: true\n").unwrap();

        assert_eq!(find_openapi_candidates(dir.path()), vec![dir.path().join("api.yaml")]);
    }
}
