//! JUnit XML test-case name loading.
//!
//! Only the `name` attribute of each `<testcase>` element is read; suites,
//! timings and failure bodies are ignored.

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::path::{Path, PathBuf};

/// Names of all `<testcase>` elements in a JUnit document, in document order.
///
/// Elements without a `name` attribute or with an empty name are skipped.
pub fn parse_case_names(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut names = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"testcase" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"name" {
                        let name = attr.unescape_value()?;
                        if !name.is_empty() {
                            names.push(name.into_owned());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

/// Expands directories to their `*.xml` files (sorted, not recursive) and drops
/// paths that do not exist.
pub fn expand_report_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut reports: Vec<PathBuf> = match fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
                    .collect(),
                Err(e) => {
                    warn!("Cannot list JUnit directory {}: {}", path.display(), e);
                    continue;
                }
            };
            reports.sort();
            expanded.extend(reports);
        } else if path.is_file() {
            expanded.push(path.clone());
        } else {
            debug!("Skipping missing JUnit path {}", path.display());
        }
    }
    expanded
}

fn read_case_names(file: &Path) -> Vec<String> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot read JUnit report {}: {}", file.display(), e);
            return Vec::new();
        }
    };
    match parse_case_names(&content) {
        Ok(names) => names,
        Err(e) => {
            warn!("Skipping malformed JUnit report {}: {}", file.display(), e);
            Vec::new()
        }
    }
}

/// Test-case names from every report reachable through `paths`.
///
/// Missing paths, unreadable files and malformed XML are skipped.
pub fn load_case_names(paths: &[PathBuf]) -> Vec<String> {
    let files = expand_report_paths(paths);
    let names: Vec<String> = files.iter().flat_map(|file| read_case_names(file)).collect();
    debug!("Loaded {} test case names from {} JUnit reports", names.len(), files.len());
    names
}
