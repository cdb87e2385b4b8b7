//! Utility functions shared across the pipeline.
//!
//! - Virtual module ID construction
//! - JS string escaping (injection-safe)
//! - Change-gated writes and output directory housekeeping
//! - Path comparison for the watcher self-loop guard

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::BundleError;

// ---------------------------------------------------------------------------
// Virtual Module IDs
// ---------------------------------------------------------------------------

/// Prefix for resolved virtual modules.
/// The `\0` prefix prevents filesystem resolution collisions.
pub const VIRTUAL_PREFIX: char = '\0';

/// Resolved id of a virtual module specifier (`virtual:cms-js` → `\0virtual:cms-js`).
pub fn virtual_id(specifier: &str) -> String {
    format!("{VIRTUAL_PREFIX}{specifier}")
}

/// Check if a module ID is a resolved virtual module.
pub fn is_virtual(id: &str) -> bool {
    id.starts_with(VIRTUAL_PREFIX)
}

/// Split `./a.html?raw` into (`./a.html`, `Some("raw")`).
pub fn split_query(specifier: &str) -> (&str, Option<&str>) {
    match specifier.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (specifier, None),
    }
}

// ---------------------------------------------------------------------------
// JS String Escaping
// ---------------------------------------------------------------------------

/// Escape a string for safe embedding inside a JS double-quoted string literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// A complete double-quoted JS string literal.
///
/// `</` is split so the literal can sit inside an inline `<script>` element.
pub fn js_string_literal(s: &str) -> String {
    format!("\"{}\"", escape_js_string(s).replace("</", "<\\/"))
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

/// Unify line endings and trim surrounding whitespace.
pub fn normalize_html(html: &str) -> String {
    html.replace("\r\n", "\n").trim().to_string()
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Result of a change-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

/// Write `next` to `path` only if the current content differs byte-for-byte.
/// A missing file counts as empty content.
pub fn write_if_changed(path: &Path, next: &str) -> Result<WriteOutcome, BundleError> {
    let prev = match std::fs::read_to_string(path) {
        Ok(prev) => prev,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if prev == next {
        return Ok(WriteOutcome::Unchanged);
    }
    std::fs::write(path, next)?;
    Ok(WriteOutcome::Written)
}

/// Remove every entry inside `dir` (files and subdirectories), keeping `dir`.
pub async fn clean_dir(dir: &Path) -> Result<(), BundleError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let result = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// `path` relative to `root` for log lines, falling back to the full path.
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute-path equality, as used by the watcher self-loop guard.
///
/// Paths are compared after making them absolute; when that disagrees (for
/// example a symlinked temp dir reported through its real path) both sides
/// are canonicalized and compared again.
pub fn abs_eq(a: &Path, b: &Path) -> bool {
    let absolute = |p: &Path| std::path::absolute(p).map(|p| normalize_path(&p)).ok();
    if let (Some(a_abs), Some(b_abs)) = (absolute(a), absolute(b)) {
        if a_abs == b_abs {
            return true;
        }
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_id() {
        assert_eq!(virtual_id("virtual:cms-js"), "\0virtual:cms-js");
        assert!(is_virtual(&virtual_id("virtual:cms-css")));
        assert!(!is_virtual("/src/scripts/hero.js"));
    }

    #[test]
    fn test_split_query() {
        assert_eq!(split_query("./a.html?raw"), ("./a.html", Some("raw")));
        assert_eq!(split_query("./a.js"), ("./a.js", None));
    }

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string(r#"he said "hi""#), r#"he said \"hi\""#);
        assert_eq!(escape_js_string("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_js_string_literal_breaks_script_close() {
        assert_eq!(js_string_literal("a</script>"), r#""a<\/script>""#);
    }

    #[test]
    fn test_normalize_html() {
        assert_eq!(normalize_html("\r\n  <p>x</p>\r\n<p>y</p>\n\n"), "<p>x</p>\n<p>y</p>");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d.js")),
            PathBuf::from("/a/b/d.js")
        );
    }

    #[test]
    fn test_write_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.js");
        assert_eq!(write_if_changed(&path, "x").unwrap(), WriteOutcome::Written);
        assert_eq!(write_if_changed(&path, "x").unwrap(), WriteOutcome::Unchanged);
        assert_eq!(write_if_changed(&path, "y").unwrap(), WriteOutcome::Written);
    }

    #[test]
    fn test_write_if_changed_empty_content_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.js");
        assert_eq!(write_if_changed(&path, "").unwrap(), WriteOutcome::Unchanged);
        assert!(!path.exists());
    }

    #[test]
    fn test_abs_eq() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("src/../index.js");
        let b = dir.path().join("index.js");
        assert!(abs_eq(&a, &b));
        assert!(!abs_eq(&b, &dir.path().join("other.js")));
    }

    #[tokio::test]
    async fn test_clean_dir_removes_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "a").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/deeper/b.html"), "b").unwrap();

        clean_dir(dir.path()).await.unwrap();

        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
