//! Next.js App Router route extraction.
//!
//! There is nothing to parse for paths: `app/api/posts/[id]/route.ts` serves `/posts/{id}`.
//! Route groups `(name)` and parallel-route slots `@name` do not appear in the URL, and
//! catch-all segments `[...rest]` / `[[...rest]]` become a single `{rest}` parameter.
//! Methods are the `GET`, `POST`, ... handlers the file exports.

use super::{
    parse_files, path_placeholders, relative_display, scan_files, tidy_path, ParseOutcome,
    ParserKind, RouteDraft, RouteParser,
};
use crate::model::{HttpMethod, ParamLocation, Route, RouteParam};
use crate::parser::mask_c_comments;
use log::debug;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// Roots searched for route handlers, relative to the project.
pub const API_ROOTS: &[&str] = &["src/app/api", "app/api"];

const ROUTE_FILES: &[&str] = &["route.ts", "route.js"];

const NEXTJS_SKIP_DIRS: &[&str] = &["coverage"];

static EXPORTED_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+(?:async\s+)?function\s+(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s*[(<]").unwrap()
});
static EXPORTED_CONST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+(?:const|let|var)\s+(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s*[=:]").unwrap()
});
static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"export\s*\{([^}]*)\}").unwrap());
static EXPORT_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\bas\s+|^\s*)(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s*$").unwrap()
});
static AUTH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"getServerSession",
        r"\bauth\(\)",
        r#"headers\(\)\.get\(\s*['"]authorization['"]"#,
        r#"cookies\(\)\.get\(\s*['"]token['"]"#,
        r#"\.headers\.get\(\s*['"]authorization['"]"#,
        r"@auth",
        r"requireAuth",
        r"isAuthenticated",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

pub struct NextJsParser;

impl RouteParser for NextJsParser {
    fn kind(&self) -> ParserKind {
        ParserKind::NextJs
    }

    fn find_route_files(&self, source_dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = API_ROOTS
            .iter()
            .map(|root| source_dir.join(root))
            .filter(|root| root.is_dir())
            .flat_map(|root| scan_files(&root, &["ts", "js"], NEXTJS_SKIP_DIRS))
            .filter(|file| {
                file.file_name()
                    .is_some_and(|name| ROUTE_FILES.iter().any(|r| name == *r))
            })
            .collect();
        files.sort();
        files
    }

    fn parse(&self, source_dir: &Path) -> ParseOutcome {
        let files = self.find_route_files(source_dir);
        debug!("Next.js: {} route handlers", files.len());

        parse_files(ParserKind::NextJs, &files, |file, content| {
            ParseOutcome::from_routes(extract_file(source_dir, file, content))
        })
    }
}

/// URL path served by a route handler file, relative to the `api` directory.
pub fn infer_path(file: &Path) -> String {
    let parts: Vec<String> = file
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let Some(api_index) = parts.iter().position(|p| p == "api") else {
        return "/".to_string();
    };

    let mut segments: Vec<String> = Vec::new();
    for part in &parts[api_index + 1..] {
        if ROUTE_FILES.contains(&part.as_str()) {
            continue;
        }
        if (part.starts_with('(') && part.ends_with(')')) || part.starts_with('@') {
            continue;
        }
        let dynamic = part
            .strip_prefix("[[")
            .and_then(|p| p.strip_suffix("]]"))
            .or_else(|| part.strip_prefix('[').and_then(|p| p.strip_suffix(']')));
        match dynamic {
            Some(name) => segments.push(format!("{{{}}}", name.trim_start_matches("..."))),
            None => segments.push(part.clone()),
        }
    }
    tidy_path(&segments.join("/"))
}

/// Handler names exported by the module, in `GET, POST, ...` order.
pub fn exported_methods(content: &str) -> Vec<HttpMethod> {
    let mut names: Vec<String> = EXPORTED_FUNCTION
        .captures_iter(content)
        .chain(EXPORTED_CONST.captures_iter(content))
        .map(|c| c[1].to_string())
        .collect();
    // export { handler as GET, handler as POST }
    for list in EXPORT_LIST.captures_iter(content) {
        for item in list[1].split(',') {
            if let Some(caps) = EXPORT_ALIAS.captures(item) {
                names.push(caps[1].to_string());
            }
        }
    }
    HttpMethod::ALL
        .into_iter()
        .filter(|m| names.iter().any(|n| n == m.as_str()))
        .collect()
}

pub fn detect_auth(content: &str) -> bool {
    AUTH_PATTERNS.iter().any(|p| p.is_match(content))
}

fn extract_file(root: &Path, file: &Path, content: &str) -> Vec<Route> {
    let masked = mask_c_comments(content);
    let path = infer_path(file.strip_prefix(root).unwrap_or(file));
    let params: Vec<RouteParam> = path_placeholders(&path)
        .into_iter()
        .map(RouteParam::path)
        .collect();
    let auth = detect_auth(&masked);
    let rel = relative_display(root, file);

    exported_methods(&masked)
        .into_iter()
        .map(|method| {
            RouteDraft::new(path.clone(), method)
                .params(ParamLocation::Path, params.clone())
                .auth(auth)
                .meta("source", "nextjs")
                .meta("framework", "nextjs")
                .meta("file", rel.clone())
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_infer_path() {
        assert_eq!(infer_path(Path::new("src/app/api/users/route.ts")), "/users");
        assert_eq!(infer_path(Path::new("app/api/posts/[id]/route.ts")), "/posts/{id}");
        assert_eq!(infer_path(Path::new("app/api/(admin)/@modal/stats/route.js")), "/stats");
        assert_eq!(infer_path(Path::new("app/api/docs/[...slug]/route.ts")), "/docs/{slug}");
        assert_eq!(infer_path(Path::new("app/api/files/[[...path]]/route.ts")), "/files/{path}");
        assert_eq!(infer_path(Path::new("app/api/route.ts")), "/");
        assert_eq!(infer_path(Path::new("app/health/route.ts")), "/");
    }

    #[test]
    fn test_exported_methods() {
        let content = r#"
export async function GET(request: Request) {}
export const POST = async (req: Request) => {};
export function DELETE<T>(req: T) {}
function PUT() {}
"#;
        assert_eq!(
            exported_methods(content),
            vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete]
        );

        let aliased = "const handler = NextAuth(options);\nexport { handler as GET, handler as POST };\n";
        assert_eq!(exported_methods(aliased), vec![HttpMethod::Get, HttpMethod::Post]);
    }

    #[test]
    fn test_detect_auth() {
        assert!(detect_auth("const session = await getServerSession(authOptions);"));
        assert!(detect_auth("const token = headers().get('authorization');"));
        assert!(detect_auth("const session = await auth();"));
        assert!(!detect_auth("return Response.json({ ok: true });"));
    }

    #[test]
    fn test_single_quoted_urls_do_not_hide_exports() {
        let content = "const upstream = 'https://api.example.com'; export async function GET() {\n  const token = fetch('http://x'); const h = headers().get('authorization');\n}\n";
        let root = Path::new("/project");
        let routes = extract_file(root, &root.join("app/api/users/route.ts"), content);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].method, HttpMethod::Get);
        assert_eq!(routes[0].path, "/users");
        assert!(routes[0].auth_required);
    }

    #[test]
    fn test_parse_project() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "src/app/api/posts/[id]/route.ts",
            r#"
import { getServerSession } from "next-auth";

export async function GET(req: Request, { params }: { params: { id: string } }) {
  return Response.json({});
}

export async function DELETE(req: Request) {
  const session = await getServerSession();
}
"#,
        );
        write(&dir, "src/app/api/health/route.js", "export function GET() { return new Response('ok'); }\n");
        write(&dir, "src/app/api/health/helpers.ts", "export function GET() {}\n");
        write(&dir, "src/app/page.tsx", "export default function Page() {}\n");

        let outcome = NextJsParser.parse(dir.path());
        let keys: Vec<String> = outcome
            .routes
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect();
        assert_eq!(keys, vec!["GET /health", "GET /posts/{id}", "DELETE /posts/{id}"]);

        let post = &outcome.routes[1];
        assert!(post.auth_required);
        assert_eq!(post.params["path"], vec![RouteParam::path("id")]);
        assert_eq!(post.metadata["file"], "src/app/api/posts/[id]/route.ts");
        assert_eq!(post.confidence, 0.9);
        assert!(!outcome.routes[0].auth_required);
    }

    #[test]
    fn test_route_files_under_excluded_directories_are_ignored() {
        let dir = TempDir::new().unwrap();
        let handler = "export async function GET() {}\n";
        write(&dir, "app/api/users/route.ts", handler);
        for excluded in ["tests", "test", "vendor", "build", "dist", "venv", ".venv", "env"] {
            write(&dir, &format!("app/api/{}/route.ts", excluded), handler);
        }

        assert_eq!(
            NextJsParser.find_route_files(dir.path()),
            vec![dir.path().join("app/api/users/route.ts")]
        );
    }
}
