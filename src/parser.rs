use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads a source file as UTF-8 text.
///
/// Every dialect parser goes through this so read failures carry the same
/// context and can be turned into per-file diagnostics.
pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Finds the byte index of the bracket closing the one at `open`.
///
/// Understands `()`, `[]` and `{}` nesting and skips over quoted strings
/// (`"`, `'`, `` ` ``) with backslash escapes, so handler expressions such as
/// `get(|| async { "(" })` do not throw the count off. A `'` quote ends at the
/// end of its line, which keeps Rust lifetimes from swallowing the rest of a file.
pub fn find_closing(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(open), Some(b'(' | b'[' | b'{')) {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q || (q == b'\'' && c == b'\n') {
                quote = None;
            }
        } else {
            match c {
                b'"' | b'\'' | b'`' => quote = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Returns the text between the bracket at `open` and its partner.
pub fn bracket_contents(text: &str, open: usize) -> Option<&str> {
    find_closing(text, open).map(|close| &text[open + 1..close])
}

/// Splits an argument list on commas that are not nested in brackets or strings.
///
/// Empty trailing pieces (from a trailing comma) are dropped; every piece is trimmed.
pub fn split_top_level(args: &str) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
        } else {
            match c {
                b'"' | b'\'' | b'`' => quote = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b',' if depth == 0 => {
                    parts.push(args[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    let tail = args[start.min(args.len())..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Blanks `//` and `/* */` comments outside string literals, keeping offsets and newlines.
///
/// Double-quoted, single-quoted and backtick literals are skipped, which covers Go
/// runes and raw strings as well as JavaScript strings and templates.
pub fn mask_c_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' && q != b'`' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (c, bytes.get(i + 1)) {
            (b'"' | b'\'' | b'`', _) => {
                quote = Some(c);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let end = source[i + 2..].find("*/").map_or(bytes.len(), |e| i + 2 + e + 2);
                for b in &mut out[i..end] {
                    if *b != b'\n' {
                        *b = b' ';
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// AST (Abstract Syntax Tree) parser for Rust source files.
///
/// The `AstParser` uses the `syn` crate to parse Rust source code into an abstract syntax tree,
/// which the Rust route parser walks to find attribute macros and router builder chains.
///
/// # Example
///
/// ```no_run
/// use route_discovery::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("src/main.rs")).unwrap();
/// println!("Parsed {} items", parsed.syntax_tree.items.len());
/// ```
pub struct AstParser;

/// A successfully parsed Rust file with its abstract syntax tree.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// The parsed abstract syntax tree
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Reads and parses a single Rust source file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file contains invalid Rust syntax
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        let content = read_source(path)?;
        Self::parse_source(path, &content)
    }

    /// Parses already-loaded Rust source, attributing errors to `path`.
    pub fn parse_source(path: &Path, content: &str) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let syntax_tree = syn::parse_file(content)
            .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    #[test]
    fn test_parse_valid_rust_file() {
        let temp_dir = TempDir::new().unwrap();
        let code = r#"
            use actix_web::{get, HttpResponse};

            #[get("/health")]
            async fn health() -> HttpResponse {
                HttpResponse::Ok().finish()
            }
        "#;

        let file_path = create_temp_file(&temp_dir, "main.rs", code);
        let parsed = AstParser::parse_file(&file_path).unwrap();

        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.syntax_tree.items.len(), 2);
    }

    #[test]
    fn test_parse_invalid_rust_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = create_temp_file(&temp_dir, "broken.rs", "fn broken( {\n let x = ;\n}");

        let err = AstParser::parse_file(&file_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse Rust syntax"));
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let err = AstParser::parse_file(Path::new("/nonexistent/file.rs"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read file"));
    }

    #[test]
    fn test_read_source_rejects_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("binary.py");
        fs::write(&file_path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        assert!(read_source(&file_path).is_err());
    }

    #[test]
    fn test_find_closing_skips_nested_calls_and_strings() {
        let text = r#".route("/a", get(handler).post(|| async { ")" }))"#;
        let open = text.find('(').unwrap();
        let close = find_closing(text, open).unwrap();
        assert_eq!(close, text.len() - 1);
        assert_eq!(
            bracket_contents(text, open).unwrap(),
            r#""/a", get(handler).post(|| async { ")" })"#
        );
    }

    #[test]
    fn test_find_closing_unbalanced() {
        assert_eq!(find_closing("(a, (b)", 0), None);
        assert_eq!(find_closing("abc", 0), None);
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level(r#""/items/{id}", tags=["a", "b"], response_model=Dict[str, int],"#);
        assert_eq!(
            parts,
            vec![r#""/items/{id}""#, r#"tags=["a", "b"]"#, "response_model=Dict[str, int]"]
        );
        assert!(split_top_level("  ").is_empty());
    }

    #[test]
    fn test_mask_c_comments() {
        let src = "a := 1 // r.GET(\"/old\")\n/* block\n r.POST(\"/x\") */ b := \"http://x\"\n";
        let masked = mask_c_comments(src);
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains("/old"));
        assert!(!masked.contains("r.POST"));
        assert!(masked.contains("\"http://x\""));
        assert_eq!(masked.lines().count(), 3);
    }

    #[test]
    fn test_mask_c_comments_keeps_single_quoted_and_template_urls() {
        let src = "const res = await fetch('https://x.io'); export async function GET() {}\nconst u = `//${host}`; const t = headers().get('authorization');\nconst slash = '/'; // note\n";
        let masked = mask_c_comments(src);
        assert!(masked.contains("export async function GET()"));
        assert!(masked.contains("headers().get('authorization')"));
        assert!(masked.contains("const slash = '/';"));
        assert!(!masked.contains("note"));
    }

    #[test]
    fn test_line_of() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 4), 3);
    }

    #[test]
    fn test_parse_empty_source() {
        let parsed = AstParser::parse_source(Path::new("empty.rs"), "").unwrap();
        assert!(parsed.syntax_tree.items.is_empty());
    }
}
