use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library.
///
/// Only OpenAPI loading is fatal to discovery. Source-code parsing problems are
/// reported as [`ParseDiagnostic`] values and never abort an aggregation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to load OpenAPI document {source_ref}: {message}")]
    SpecLoad { source_ref: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn spec_load(source_ref: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::SpecLoad {
            source_ref: source_ref.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(format!("YAML: {}", err))
    }
}

/// A non-fatal problem found while a parser walked a source tree.
///
/// `file` is `None` when the whole parser invocation failed rather than a
/// single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub parser: &'static str,
    pub file: Option<PathBuf>,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn for_file(parser: &'static str, file: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self {
            parser,
            file: Some(file.into()),
            message: message.to_string(),
        }
    }

    pub fn for_parser(parser: &'static str, message: impl fmt::Display) -> Self {
        Self {
            parser,
            file: None,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "[{}] {}: {}", self.parser, file.display(), self.message),
            None => write!(f, "[{}] {}", self.parser, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_load_message_names_source() {
        let err = Error::spec_load("api.yaml", "neither JSON nor YAML");
        let msg = err.to_string();
        assert!(msg.contains("api.yaml"));
        assert!(msg.contains("neither JSON nor YAML"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = ParseDiagnostic::for_file("flask", "app.py", "invalid UTF-8");
        assert_eq!(diag.to_string(), "[flask] app.py: invalid UTF-8");

        let diag = ParseDiagnostic::for_parser("go", "source directory missing");
        assert_eq!(diag.to_string(), "[go] source directory missing");
    }
}
