use crate::extractor::ParserKind;
use log::debug;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Project types recognised from a repository's layout and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    NextJs,
    FastApi,
    Flask,
    Django,
    Go,
    Ruby,
    Rust,
    /// Recognised, but no route parser exists for it.
    Express,
}

impl ProjectType {
    /// The parser that handles this project type, if any.
    pub fn parser_kind(&self) -> Option<ParserKind> {
        match self {
            ProjectType::NextJs => Some(ParserKind::NextJs),
            ProjectType::FastApi => Some(ParserKind::FastApi),
            ProjectType::Flask => Some(ParserKind::Flask),
            ProjectType::Django => Some(ParserKind::Django),
            ProjectType::Go => Some(ParserKind::Go),
            ProjectType::Ruby => Some(ParserKind::Ruby),
            ProjectType::Rust => Some(ParserKind::Rust),
            ProjectType::Express => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProjectType::NextJs => "nextjs",
            ProjectType::FastApi => "fastapi",
            ProjectType::Flask => "flask",
            ProjectType::Django => "django",
            ProjectType::Go => "go",
            ProjectType::Ruby => "ruby",
            ProjectType::Rust => "rust",
            ProjectType::Express => "express",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Project detector for choosing which route parser to run on a source tree.
///
/// The `ProjectDetector` looks only at the repository root: framework config files,
/// dependency manifests and a few conventional entry-point files. Checks run in a
/// fixed order and the first match wins:
///
/// 1. Next.js (`next.config.*`, or `next` in `package.json` dependencies)
/// 2. FastAPI (`main.py`/`app.py`/`api.py` mentioning FastAPI, or a `fastapi` requirement)
/// 3. Flask (`app.py`/`main.py`/`application.py` mentioning Flask, or a `flask` requirement)
/// 4. Django (`manage.py`, or a `django` requirement)
/// 5. Go (`go.mod`)
/// 6. Ruby (`Gemfile` or `config/routes.rb`)
/// 7. Rust (`Cargo.toml`)
/// 8. Express (`express` in `package.json` dependencies)
///
/// # Example
///
/// ```no_run
/// use route_discovery::detector::ProjectDetector;
/// use std::path::Path;
///
/// if let Some(project) = ProjectDetector::new(Path::new("./my-app")).detect() {
///     println!("Detected {}", project);
/// }
/// ```
pub struct ProjectDetector {
    root: PathBuf,
}

impl ProjectDetector {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Detects the project type, or `None` when nothing matches.
    pub fn detect(&self) -> Option<ProjectType> {
        let detected = if self.is_nextjs() {
            Some(ProjectType::NextJs)
        } else if self.is_fastapi() {
            Some(ProjectType::FastApi)
        } else if self.is_flask() {
            Some(ProjectType::Flask)
        } else if self.is_django() {
            Some(ProjectType::Django)
        } else if self.exists("go.mod") {
            Some(ProjectType::Go)
        } else if self.exists("Gemfile") || self.exists("config/routes.rb") {
            Some(ProjectType::Ruby)
        } else if self.exists("Cargo.toml") {
            Some(ProjectType::Rust)
        } else if self.has_package_dependency("express") {
            Some(ProjectType::Express)
        } else {
            None
        };
        debug!("Project type of {}: {:?}", self.root.display(), detected);
        detected
    }

    /// Next.js projects are recognised on their own, independent of the detection order.
    pub fn is_nextjs(&self) -> bool {
        ["next.config.js", "next.config.mjs", "next.config.ts"]
            .iter()
            .any(|name| self.exists(name))
            || self.has_package_dependency("next")
    }

    fn is_fastapi(&self) -> bool {
        self.any_file_mentions(&["main.py", "app.py", "api.py"], "fastapi")
            || self.any_file_mentions(&["requirements.txt", "pyproject.toml"], "fastapi")
    }

    fn is_flask(&self) -> bool {
        self.any_file_mentions(&["app.py", "main.py", "application.py"], "flask")
            || self.any_file_mentions(&["requirements.txt"], "flask")
    }

    fn is_django(&self) -> bool {
        self.exists("manage.py") || self.any_file_mentions(&["requirements.txt"], "django")
    }

    fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    /// Case-insensitive substring check over the named root files; unreadable files never match.
    fn any_file_mentions(&self, files: &[&str], needle: &str) -> bool {
        files.iter().any(|name| {
            fs::read_to_string(self.root.join(name))
                .is_ok_and(|content| content.to_lowercase().contains(needle))
        })
    }

    fn has_package_dependency(&self, package: &str) -> bool {
        let Ok(content) = fs::read_to_string(self.root.join("package.json")) else {
            return false;
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&content) else {
            debug!("package.json in {} is not valid JSON", self.root.display());
            return false;
        };
        ["dependencies", "devDependencies"]
            .iter()
            .filter_map(|section| manifest.get(section).and_then(Value::as_object))
            .any(|deps| deps.contains_key(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn detect(files: &[(&str, &str)]) -> Option<ProjectType> {
        let dir = project(files);
        ProjectDetector::new(dir.path()).detect()
    }

    #[test]
    fn test_detect_nextjs() {
        assert_eq!(detect(&[("next.config.mjs", "export default {}")]), Some(ProjectType::NextJs));
        assert_eq!(
            detect(&[("package.json", r#"{"dependencies": {"next": "14.0.0", "react": "18"}}"#)]),
            Some(ProjectType::NextJs)
        );
    }

    #[test]
    fn test_detect_python_frameworks() {
        assert_eq!(
            detect(&[("main.py", "from fastapi import FastAPI\napp = FastAPI()\n")]),
            Some(ProjectType::FastApi)
        );
        assert_eq!(
            detect(&[("pyproject.toml", "[project]\ndependencies = [\"FastAPI>=0.100\"]\n")]),
            Some(ProjectType::FastApi)
        );
        assert_eq!(
            detect(&[("app.py", "from flask import Flask\n")]),
            Some(ProjectType::Flask)
        );
        assert_eq!(detect(&[("manage.py", "")]), Some(ProjectType::Django));
        assert_eq!(detect(&[("requirements.txt", "Django==4.2\n")]), Some(ProjectType::Django));
    }

    #[test]
    fn test_detection_order() {
        // A FastAPI service that also ships a Next.js frontend manifest
        assert_eq!(
            detect(&[
                ("package.json", r#"{"devDependencies": {"next": "14"}}"#),
                ("main.py", "import fastapi"),
            ]),
            Some(ProjectType::NextJs)
        );
        assert_eq!(
            detect(&[("requirements.txt", "flask\ndjango\n")]),
            Some(ProjectType::Flask)
        );
    }

    #[test]
    fn test_detect_other_languages() {
        assert_eq!(detect(&[("go.mod", "module example.com/api\n")]), Some(ProjectType::Go));
        assert_eq!(detect(&[("config/routes.rb", "")]), Some(ProjectType::Ruby));
        assert_eq!(detect(&[("Gemfile", "gem 'sinatra'\n")]), Some(ProjectType::Ruby));
        assert_eq!(detect(&[("Cargo.toml", "[package]\n")]), Some(ProjectType::Rust));
    }

    #[test]
    fn test_detect_express_has_no_parser() {
        let detected = detect(&[("package.json", r#"{"dependencies": {"express": "^4"}}"#)]);
        assert_eq!(detected, Some(ProjectType::Express));
        assert_eq!(detected.and_then(|p| p.parser_kind()), None);
    }

    #[test]
    fn test_detect_nothing() {
        assert_eq!(detect(&[]), None);
        assert_eq!(detect(&[("package.json", "not json")]), None);
        assert_eq!(detect(&[("README.md", "# hello")]), None);
    }
}
