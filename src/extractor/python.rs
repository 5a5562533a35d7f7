//! Lightweight Python source scanner shared by the FastAPI, Flask and Django parsers.
//!
//! This is not a Python parser. It understands just enough of the surface syntax to
//! find decorated functions, class declarations and a few call/assignment shapes:
//! comments and triple-quoted strings are blanked out first (byte offsets are kept),
//! then statements are located line by line with bracket matching for anything that
//! spans several lines.

use super::scan_files;
use crate::parser::{bracket_contents, find_closing, line_of, split_top_level};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Directories Python parsers skip on top of the scanner defaults.
pub const PYTHON_SKIP_DIRS: &[&str] = &["migrations", "site-packages"];

static IDENT_CHAIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.]*").unwrap());
static DEF_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap());
static CLASS_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)\s*(\()?").unwrap());
static KWARG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s*=([^=]|$)").unwrap());

/// `@name(args)` attached to a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    /// Dotted callee, e.g. `router.get` or `login_required`
    pub name: String,
    /// Raw text between the parentheses, if the decorator is called
    pub args: Option<String>,
}

impl Decorator {
    /// Receiver and attribute for `x.attr` decorators.
    pub fn receiver_attr(&self) -> Option<(&str, &str)> {
        self.name.rsplit_once('.')
    }

    /// Last dotted component: `auth.login_required` → `login_required`.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn arg_list(&self) -> Vec<&str> {
        self.args.as_deref().map(split_top_level).unwrap_or_default()
    }
}

/// One formal parameter of a `def`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyParam {
    pub name: String,
    pub annotation: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PyFunction {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub params: Vec<PyParam>,
    /// Enclosing class, when the def is indented inside one
    pub class_name: Option<String>,
    pub line: usize,
}

impl PyFunction {
    pub fn has_decorator(&self, names: &[&str]) -> bool {
        self.decorators.iter().any(|d| names.contains(&d.base_name()))
    }
}

#[derive(Debug, Clone)]
pub struct PyClass {
    pub name: String,
    pub bases: Vec<String>,
    /// Masked source of the class body (header excluded)
    pub body: String,
    pub line: usize,
}

impl PyClass {
    /// Whether any base's last dotted component is in `names`.
    pub fn has_base(&self, names: &[&str]) -> bool {
        self.bases
            .iter()
            .any(|b| names.contains(&b.rsplit('.').next().unwrap_or(b)))
    }
}

/// Functions and classes of one module.
#[derive(Debug, Default)]
pub struct PyModule {
    /// Source with comments and triple-quoted strings blanked out
    pub masked: String,
    pub functions: Vec<PyFunction>,
    pub classes: Vec<PyClass>,
}

impl PyModule {
    pub fn parse(source: &str) -> Self {
        let masked = mask_source(source);
        let (functions, classes) = scan_definitions(&masked);
        Self {
            masked,
            functions,
            classes,
        }
    }

    pub fn methods_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a PyFunction> + 'a {
        self.functions
            .iter()
            .filter(move |f| f.class_name.as_deref() == Some(class))
    }
}

/// Non-test `.py` files under `source_dir`.
pub fn python_files(source_dir: &Path) -> Vec<PathBuf> {
    scan_files(source_dir, &["py"], PYTHON_SKIP_DIRS)
        .into_iter()
        .filter(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            !name.starts_with("test_") && !name.ends_with("_test.py") && name != "conftest.py"
        })
        .collect()
}

/// Module key used for cross-file lookups: the file stem (`routers/items.py` → `items`).
pub fn module_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Blanks comments and triple-quoted strings, keeping every other byte and all newlines.
pub fn mask_source(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = bytes.to_vec();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q || c == b'\n' {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            b'"' | b'\'' => {
                if bytes.len() >= i + 3 && bytes[i + 1] == c && bytes[i + 2] == c {
                    let start = i;
                    i += 3;
                    while i < bytes.len() && !(bytes.len() >= i + 3 && bytes[i] == c && bytes[i + 1] == c && bytes[i + 2] == c) {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    let end = (i + 3).min(bytes.len());
                    for b in &mut out[start..end] {
                        if *b != b'\n' {
                            *b = b' ';
                        }
                    }
                    i = end;
                } else {
                    quote = Some(c);
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    // Whole characters are blanked, so the bytes stay valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn scan_definitions(masked: &str) -> (Vec<PyFunction>, Vec<PyClass>) {
    let mut functions = Vec::new();
    let mut classes: Vec<PyClass> = Vec::new();
    // (class index, indent, body start offset)
    let mut class_stack: Vec<(usize, usize, usize)> = Vec::new();
    let mut pending: Vec<Decorator> = Vec::new();
    let mut skip_until = 0usize;
    let mut offset = 0usize;

    for line in masked.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line_start < skip_until {
            continue;
        }
        let stripped = line.trim_start();
        if stripped.trim().is_empty() {
            continue;
        }
        let indent = line.len() - stripped.len();
        let abs = line_start + indent;

        while let Some(&(idx, class_indent, body_start)) = class_stack.last() {
            if class_indent < indent {
                break;
            }
            classes[idx].body = masked[body_start.min(line_start)..line_start].to_string();
            class_stack.pop();
        }

        if let Some(rest) = stripped.strip_prefix('@') {
            let Some(name) = IDENT_CHAIN.find(rest) else {
                continue;
            };
            let after = abs + 1 + name.end();
            let mut args = None;
            let call_open = masked[after..].find(|c: char| !c.is_whitespace() || c == '\n');
            if let Some(rel) = call_open.filter(|&rel| masked.as_bytes()[after + rel] == b'(') {
                if let Some(close) = find_closing(masked, after + rel) {
                    args = Some(masked[after + rel + 1..close].to_string());
                    skip_until = close;
                }
            }
            pending.push(Decorator {
                name: name.as_str().to_string(),
                args,
            });
            continue;
        }

        if let Some(caps) = DEF_HEAD.captures(stripped) {
            let open = caps.get(0).map_or(abs, |m| abs + m.end() - 1);
            let params = match find_closing(masked, open) {
                Some(close) => {
                    skip_until = close;
                    parse_params(&masked[open + 1..close])
                }
                None => Vec::new(),
            };
            functions.push(PyFunction {
                name: caps[1].to_string(),
                decorators: std::mem::take(&mut pending),
                params,
                class_name: class_stack.last().map(|&(idx, _, _)| classes[idx].name.clone()),
                line: line_of(masked, abs),
            });
            continue;
        }

        if let Some(caps) = CLASS_HEAD.captures(stripped) {
            let mut bases = Vec::new();
            let mut header_end = line_start + line.len();
            if let Some(paren) = caps.get(2) {
                let open = abs + paren.start();
                if let Some(close) = find_closing(masked, open) {
                    bases = split_top_level(&masked[open + 1..close])
                        .into_iter()
                        .filter(|b| !KWARG.is_match(b))
                        .map(str::to_string)
                        .collect();
                    header_end = masked[close..]
                        .find('\n')
                        .map(|n| close + n + 1)
                        .unwrap_or(masked.len());
                    skip_until = close;
                }
            }
            pending.clear();
            classes.push(PyClass {
                name: caps[1].to_string(),
                bases,
                body: String::new(),
                line: line_of(masked, abs),
            });
            class_stack.push((classes.len() - 1, indent, header_end));
            continue;
        }

        pending.clear();
    }

    for (idx, _, body_start) in class_stack {
        classes[idx].body = masked[body_start.min(masked.len())..].to_string();
    }
    (functions, classes)
}

fn parse_params(text: &str) -> Vec<PyParam> {
    split_top_level(text)
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.trim_start_matches('*').trim();
            if raw.is_empty() || raw == "/" {
                return None;
            }
            let (head, default) = match split_once_top_level(raw, '=') {
                Some((h, d)) => (h.trim(), Some(d.trim().to_string())),
                None => (raw, None),
            };
            let (name, annotation) = match split_once_top_level(head, ':') {
                Some((n, a)) => (n.trim(), Some(a.trim().to_string())),
                None => (head.trim(), None),
            };
            Some(PyParam {
                name: name.to_string(),
                annotation,
                default,
            })
        })
        .collect()
}

/// Splits on the first `sep` outside brackets and strings. `==` never counts as `=`.
fn split_once_top_level(text: &str, sep: char) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
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
                b'"' | b'\'' => quote = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                _ if depth == 0 && c == sep as u8 => {
                    let doubled = sep == '='
                        && (bytes.get(i + 1) == Some(&b'=') || (i > 0 && matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>')));
                    if !doubled {
                        return Some((&text[..i], &text[i + 1..]));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Value of a Python string literal token, accepting `r`/`b`/`u`/`f` prefixes.
pub fn string_literal(token: &str) -> Option<String> {
    let token = token.trim();
    let body = token.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    if token.len() - body.len() > 2 {
        return None;
    }
    let quote = body.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = body.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(inner.replace(&format!("\\{}", quote), &quote.to_string()))
}

/// Arguments that are not `name=value` keywords.
pub fn positional_args<'a>(args: &[&'a str]) -> Vec<&'a str> {
    args.iter().copied().filter(|a| !KWARG.is_match(a)).collect()
}

/// Raw value of keyword argument `name`.
pub fn keyword_arg<'a>(args: &[&'a str], name: &str) -> Option<&'a str> {
    args.iter().find_map(|a| {
        let caps = KWARG.captures(a)?;
        if &caps[1] == name {
            a.split_once('=').map(|(_, v)| v.trim())
        } else {
            None
        }
    })
}

/// Items of a list/tuple/set literal, e.g. `["GET", "POST"]` or `(IsAuthenticated,)`.
pub fn sequence_items(value: &str) -> Vec<String> {
    let value = value.trim();
    if !value.starts_with(['[', '(', '{']) {
        return if value.is_empty() {
            Vec::new()
        } else {
            vec![value.to_string()]
        };
    }
    bracket_contents(value, 0)
        .map(|inner| split_top_level(inner).into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Every `VAR = [module.]CTOR(...)` assignment: variable name and argument text.
pub fn find_constructor_assignments(masked: &str, ctor: &str) -> Vec<(String, String)> {
    let pattern = format!(
        r"(?m)^[ \t]*([A-Za-z_]\w*)\s*(?::\s*[\w.\[\]]+\s*)?=\s*(?:[\w]+\.)*{}\s*\(",
        regex::escape(ctor)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(masked)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let args = bracket_contents(masked, whole.end() - 1)?;
            Some((caps[1].to_string(), args.to_string()))
        })
        .collect()
}

/// Every `RECEIVER.METHOD(...)` call: receiver name and argument text.
pub fn find_method_calls(masked: &str, method: &str) -> Vec<(String, String)> {
    let pattern = format!(r"\b([A-Za-z_]\w*)\.{}\s*\(", regex::escape(method));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(masked)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let args = bracket_contents(masked, whole.end() - 1)?;
            Some((caps[1].to_string(), args.to_string()))
        })
        .collect()
}
