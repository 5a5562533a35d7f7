use anyhow::Result;
use log::warn;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Directories no scan ever descends into, whatever extra names a caller adds.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    "tests",
    "test",
    "vendor",
    "build",
    "dist",
    "venv",
    ".venv",
    "env",
    "node_modules",
    "__pycache__",
    "target",
];

/// File scanner for traversing project directories.
///
/// The `FileScanner` recursively walks a source tree and collects files with one of
/// the configured extensions. Hidden directories (those starting with `.`) and any
/// directory named in the skip list are never descended into. Entries are visited
/// in file-name order so the same tree always yields the same file order.
///
/// # Example
///
/// ```no_run
/// use route_discovery::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-project")).with_extensions(&["py"]);
/// let result = scanner.scan().unwrap();
/// println!("Found {} Python files", result.files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
    extensions: Vec<String>,
    skip_dirs: Vec<String>,
}

/// Result of directory scanning operation.
///
/// Contains the list of discovered files and any warnings encountered during scanning.
pub struct ScanResult {
    /// Paths of all matching files, in walk order
    pub files: Vec<PathBuf>,
    /// Warning messages for any issues encountered (e.g., inaccessible directories)
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// Creates a scanner rooted at `root_path` that accepts every file and skips
    /// [`DEFAULT_SKIP_DIRS`].
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            extensions: Vec::new(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Only collect files whose extension is one of `extensions` (without the dot).
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Skip `dirs` in addition to [`DEFAULT_SKIP_DIRS`].
    pub fn with_skip_dirs(mut self, dirs: &[&str]) -> Self {
        for dir in dirs {
            if !self.skip_dirs.iter().any(|d| d == dir) {
                self.skip_dirs.push(dir.to_string());
            }
        }
        self
    }

    fn accepts(&self, path: &std::path::Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    /// Scans the directory tree and collects matching files.
    ///
    /// Unreadable entries are logged and recorded as warnings; scanning continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the root path does not exist.
    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.exists() {
            anyhow::bail!("Source path does not exist: {}", self.root_path.display());
        }

        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // The root itself may be a hidden temp directory
                if e.depth() == 0 {
                    return true;
                }
                if !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && !self.skip_dirs.iter().any(|d| d == name.as_ref())
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file() && self.accepts(path) {
                        files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult { files, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(result: &ScanResult) -> Vec<String> {
        result
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("main.py"), "app = None").unwrap();
        fs::write(root.join("views.py"), "").unwrap();
        fs::write(root.join("readme.md"), "# README").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .with_extensions(&["py"])
            .scan()
            .unwrap();

        assert_eq!(names(&result), vec!["main.py", "views.py"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_without_extensions_accepts_everything() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.go"), "").unwrap();
        fs::write(root.join("b.rb"), "").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan().unwrap();
        assert_eq!(result.files.len(), 2);
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileScanner::new(temp_dir.path().to_path_buf()).scan().unwrap();
        assert!(result.files.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src/models")).unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("src/models/user.rs"), "").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .with_extensions(&["rs"])
            .scan()
            .unwrap();
        assert_eq!(result.files.len(), 2);
    }

    #[test]
    fn test_scan_skips_default_and_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        for dir in ["node_modules", "__pycache__", ".git", "target"] {
            fs::create_dir(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("ignored.py"), "").unwrap();
        }
        fs::write(root.join("app.py"), "").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .with_extensions(&["py"])
            .scan()
            .unwrap();
        assert_eq!(names(&result), vec!["app.py"]);
    }

    #[test]
    fn test_scan_custom_skip_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("vendor")).unwrap();
        fs::write(root.join("vendor/lib.go"), "").unwrap();

        fs::create_dir(root.join("fixtures")).unwrap();
        fs::write(root.join("fixtures/fake.go"), "").unwrap();
        fs::write(root.join("main.go"), "").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .with_extensions(&["go"])
            .with_skip_dirs(&["fixtures"])
            .scan()
            .unwrap();
        assert_eq!(names(&result), vec!["main.go"]);
    }

    #[test]
    fn test_custom_skip_dirs_keep_the_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["tests", "test", "vendor", "build", "dist", "venv", "env"] {
            fs::create_dir(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("routes.py"), "").unwrap();
        }
        fs::write(root.join("app.py"), "").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .with_extensions(&["py"])
            .with_skip_dirs(&["migrations"])
            .scan()
            .unwrap();
        assert_eq!(names(&result), vec!["app.py"]);
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        let result = FileScanner::new(PathBuf::from("/nonexistent/route-discovery")).scan();
        assert!(result.is_err());
    }
}
