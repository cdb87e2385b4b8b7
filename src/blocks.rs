//! Per-block source file resolution.
//!
//! A block key is the file stem across the three asset roots:
//! `markup/<key>.html`, `styles/<key>.scss|css`, `scripts/<key>.js`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ProjectLayout;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").expect("valid line comment regex"));
static DEFAULT_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default\b").expect("valid default export regex"));

/// Whether `path` is an existing regular file. Stat errors count as "no".
pub fn exists_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Remove `/* */` and `//` comments and surrounding whitespace.
///
/// Purely textual: comment markers inside string literals are stripped too.
pub fn strip_comments(code: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(code, "");
    LINE_COMMENT.replace_all(&without_blocks, "").trim().to_string()
}

/// A script is usable when, after stripping comments, it is non-empty and
/// contains `export default`.
///
/// This is a textual heuristic: an `export default` inside a string literal
/// also counts.
pub fn is_usable_script(path: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return false;
    };
    let cleaned = strip_comments(&raw);
    !cleaned.is_empty() && DEFAULT_EXPORT.is_match(&cleaned)
}

/// The resolved sources of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAssets {
    pub key: String,
    pub markup: Option<PathBuf>,
    pub style: Option<PathBuf>,
    pub script: Option<PathBuf>,
}

/// Resolves which per-block source files exist.
#[derive(Debug, Clone)]
pub struct BlockFileSet {
    layout: ProjectLayout,
}

impl BlockFileSet {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn markup(&self, key: &str) -> Option<PathBuf> {
        existing(self.layout.markup_dir.join(format!("{key}.html")))
    }

    /// `.scss` wins over `.css` when both exist.
    pub fn style(&self, key: &str) -> Option<PathBuf> {
        existing(self.layout.styles_dir.join(format!("{key}.scss")))
            .or_else(|| existing(self.layout.styles_dir.join(format!("{key}.css"))))
    }

    pub fn script(&self, key: &str) -> Option<PathBuf> {
        existing(self.layout.scripts_dir.join(format!("{key}.js")))
    }

    /// The script only if it passes [`is_usable_script`].
    pub fn usable_script(&self, key: &str) -> Option<PathBuf> {
        self.script(key).filter(|path| is_usable_script(path))
    }

    pub fn resolve(&self, key: &str) -> BlockAssets {
        BlockAssets {
            key: key.to_string(),
            markup: self.markup(key),
            style: self.style(key),
            script: self.script(key),
        }
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    exists_file(&path).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn exists_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!exists_file(dir.path()));
        assert!(!exists_file(&dir.path().join("missing.html")));
    }

    #[test]
    fn strip_comments_removes_both_styles() {
        let code = "/* header */\n// line\nexport default 1; // trailing\n";
        assert_eq!(strip_comments(code), "export default 1;");
    }

    #[test]
    fn usable_script_detection() {
        let dir = tempfile::tempdir().unwrap();
        let only_comments = dir.path().join("a.js");
        let no_default = dir.path().join("b.js");
        let usable = dir.path().join("c.js");
        let commented_out = dir.path().join("d.js");
        write(&only_comments, "/* nothing */\n// here\n");
        write(&no_default, "export function init() {}\n");
        write(&usable, "/** docs */\nexport default function f(){}\n");
        write(&commented_out, "// export default function f(){}\nconst x = 1;\n");

        assert!(!is_usable_script(&only_comments));
        assert!(!is_usable_script(&no_default));
        assert!(is_usable_script(&usable));
        assert!(!is_usable_script(&commented_out));
        assert!(!is_usable_script(&dir.path().join("missing.js")));
    }

    #[test]
    fn scss_preferred_over_css() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        write(&layout.styles_dir.join("x.scss"), ".x{}");
        write(&layout.styles_dir.join("x.css"), ".x{}");
        write(&layout.styles_dir.join("y.css"), ".y{}");

        let files = BlockFileSet::new(layout.clone());
        assert_eq!(files.style("x"), Some(layout.styles_dir.join("x.scss")));
        assert_eq!(files.style("y"), Some(layout.styles_dir.join("y.css")));
        assert_eq!(files.style("z"), None);
    }

    #[test]
    fn resolve_reports_each_asset_independently() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        write(&layout.markup_dir.join("hero.html"), "<section></section>");
        write(&layout.scripts_dir.join("hero.js"), "console.log(1)");

        let assets = BlockFileSet::new(layout.clone()).resolve("hero");
        assert!(assets.markup.is_some());
        assert!(assets.style.is_none());
        assert_eq!(assets.script, Some(layout.scripts_dir.join("hero.js")));
    }
}
