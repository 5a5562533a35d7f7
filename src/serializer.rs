//! Serialization of discovered routes and coverage reports.
//!
//! Routes serialize as an array of their dict form (enum fields as their string
//! values), either as pretty-printed JSON or as YAML.

use crate::coverage::CoverageReport;
use crate::error::Result;
use crate::model::Route;
use clap::ValueEnum;
use log::debug;
use std::fs;
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// JSON format
    #[default]
    Json,
    /// YAML format
    Yaml,
}

impl ExportFormat {
    pub fn serialize_routes(&self, routes: &[Route]) -> Result<String> {
        match self {
            ExportFormat::Json => serialize_routes_json(routes),
            ExportFormat::Yaml => serialize_routes_yaml(routes),
        }
    }
}

/// Serializes routes to JSON with pretty printing.
pub fn serialize_routes_json(routes: &[Route]) -> Result<String> {
    debug!("Serializing {} routes to JSON", routes.len());
    Ok(serde_json::to_string_pretty(routes)?)
}

/// Serializes routes to YAML, in the same dict form as the JSON output.
pub fn serialize_routes_yaml(routes: &[Route]) -> Result<String> {
    debug!("Serializing {} routes to YAML", routes.len());
    Ok(serde_yaml::to_string(routes)?)
}

/// Serializes a coverage report to pretty-printed JSON.
pub fn serialize_coverage_json(report: &CoverageReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes string content to a file.
///
/// Creates the file if it doesn't exist, or overwrites it if it does.
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns an error if a directory or the file cannot be written.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, RouteParam, RouteSource};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_routes() -> Vec<Route> {
        let mut route = Route::new("/users/{id}", HttpMethod::Get)
            .with_source(RouteSource::CodeAnalysis)
            .with_confidence(0.9);
        route.tags = vec!["users".into()];
        route
            .params
            .insert("path".into(), vec![RouteParam::path("id")]);
        vec![route, Route::new("/health", HttpMethod::Head)]
    }

    #[test]
    fn test_serialize_routes_json() {
        let json = serialize_routes_json(&sample_routes()).unwrap();

        // Pretty-printed
        assert!(json.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["method"], "GET");
        assert_eq!(parsed[0]["source"], "code_analysis");
        assert_eq!(parsed[0]["params"]["path"][0]["type"], "string");
        assert_eq!(parsed[1]["method"], "HEAD");
        assert_eq!(parsed[1]["source"], "openapi");
    }

    #[test]
    fn test_serialize_routes_yaml_reads_back() {
        let routes = sample_routes();
        let yaml = ExportFormat::Yaml.serialize_routes(&routes).unwrap();
        assert!(yaml.contains("method: GET"));

        let back: Vec<Route> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, routes);
    }

    #[test]
    fn test_serialize_empty_routes() {
        assert_eq!(serialize_routes_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("subdir").join("nested").join("routes.json");

        write_to_file("[]", &file_path).unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "[]");

        write_to_file("[1]", &file_path).unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "[1]");
    }
}
