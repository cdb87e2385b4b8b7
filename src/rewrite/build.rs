//! Build-time URL rewriting over the fragments in the output directory.
//!
//! Targets, independently:
//! - `src=` and `poster=` attributes: any root-relative value
//! - `srcset=` attributes: each candidate URL
//! - inline `style="..."` and `<style>` blocks: `url(...)` references to
//!   `.jpg`, `.jpeg`, `.png` or `.webp` only
//!
//! Rewriting is textual. Already-prefixed URLs are left alone, so running the
//! rewrite twice with the same prefix changes nothing the second time.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::rewrite::{is_root_relative, is_skippable, normalize_prefix, rewrite_srcset};
use crate::utils::{self, WriteOutcome};
use crate::BundleError;

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc=(?:"([^'"]+)"|'([^'"]+)')"#).expect("valid src regex")
});
static POSTER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bposter=(?:"([^'"]+)"|'([^'"]+)')"#).expect("valid poster regex")
});
static SRCSET_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bsrcset=(?:"(.*?)"|'(.*?)')"#).expect("valid srcset regex")
});
static STYLE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bstyle=(?:"(.*?)"|'(.*?)')"#).expect("valid style attribute regex")
});
static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style>)").expect("valid style block regex")
});
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^'")]+)"|'([^'")]+)'|([^'")]+?))\s*\)"#).expect("valid url regex")
});
static IMG_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\.(?:jpe?g|png|webp)(?:[?#][^'")]+)?$"#).expect("valid image extension regex")
});

/// The first participating alternative of a quote-alternation regex, with the
/// quote character that surrounded it.
fn quoted<'t>(caps: &Captures<'t>, double: usize, single: usize) -> (&'t str, &'static str) {
    match (caps.get(double), caps.get(single)) {
        (Some(m), _) => (m.as_str(), "\""),
        (None, Some(m)) => (m.as_str(), "'"),
        (None, None) => ("", "\""),
    }
}

/// Prefixes root-relative asset URLs with a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixRewriter {
    prefix: String,
}

impl PathPrefixRewriter {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn already_prefixed(&self, url: &str) -> bool {
        self.prefix != "/"
            && (url == self.prefix
                || url
                    .strip_prefix(self.prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/')))
    }

    /// `url` with the prefix applied, when it qualifies.
    pub fn join(&self, url: &str) -> String {
        if !is_root_relative(url) || is_skippable(url) || self.prefix == "/" || self.already_prefixed(url) {
            return url.to_string();
        }
        format!("{}{url}", self.prefix)
    }

    /// Rewrite image `url(...)` references in CSS text.
    pub fn rewrite_css_urls(&self, css: &str) -> String {
        CSS_URL
            .replace_all(css, |caps: &Captures| {
                let whole = &caps[0];
                let (url, quote) = match (caps.get(1), caps.get(2), caps.get(3)) {
                    (Some(m), _, _) => (m.as_str(), "\""),
                    (_, Some(m), _) => (m.as_str(), "'"),
                    (_, _, Some(m)) => (m.as_str(), ""),
                    _ => return whole.to_string(),
                };
                if is_skippable(url) || !is_root_relative(url) || !IMG_EXT.is_match(url) {
                    return whole.to_string();
                }
                format!("url({quote}{}{quote})", self.join(url))
            })
            .into_owned()
    }

    /// Rewrite every targeted URL in an HTML document.
    pub fn rewrite_html(&self, html: &str) -> String {
        let out = SRC_ATTR.replace_all(html, |caps: &Captures| {
            let (value, q) = quoted(caps, 1, 2);
            format!("src={q}{}{q}", self.join(value))
        });

        let out = SRCSET_ATTR.replace_all(&out, |caps: &Captures| {
            let (value, q) = quoted(caps, 1, 2);
            let next = rewrite_srcset(value, |url| {
                if is_skippable(url) {
                    url.to_string()
                } else {
                    self.join(url)
                }
            });
            format!("srcset={q}{next}{q}")
        });

        let out = POSTER_ATTR.replace_all(&out, |caps: &Captures| {
            let (value, q) = quoted(caps, 1, 2);
            format!("poster={q}{}{q}", self.join(value))
        });

        let out = STYLE_ATTR.replace_all(&out, |caps: &Captures| {
            let (value, q) = quoted(caps, 1, 2);
            format!("style={q}{}{q}", self.rewrite_css_urls(value))
        });

        STYLE_BLOCK
            .replace_all(&out, |caps: &Captures| {
                format!("{}{}{}", &caps[1], self.rewrite_css_urls(&caps[2]), &caps[3])
            })
            .into_owned()
    }
}

// ---------------------------------------------------------------------------
// Output directory pass
// ---------------------------------------------------------------------------

/// Result of rewriting an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub prefix: String,
    pub changed: usize,
    pub total: usize,
}

/// `.html` files directly inside `dir`, sorted by name. A missing directory
/// has none.
pub fn list_html_files(dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "html") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rewrite every fragment in `dir` in place, writing only changed files.
pub fn rewrite_output_dir(
    root: &Path,
    dir: &Path,
    rewriter: &PathPrefixRewriter,
) -> Result<RewriteSummary, BundleError> {
    let files = list_html_files(dir)?;
    if files.is_empty() {
        tracing::info!(dir = %dir.display(), "no html files");
    }

    let mut changed = 0;
    for file in &files {
        let prev = std::fs::read_to_string(file)?;
        let next = rewriter.rewrite_html(&prev);
        let path = utils::display_relative(root, file);
        match utils::write_if_changed(file, &next)? {
            WriteOutcome::Written => {
                changed += 1;
                tracing::info!(path = %path, "updated");
            }
            WriteOutcome::Unchanged => tracing::info!(path = %path, "unchanged"),
        }
    }

    let summary = RewriteSummary {
        prefix: rewriter.prefix().to_string(),
        changed,
        total: files.len(),
    };
    tracing::info!(
        prefix = %summary.prefix,
        changed = summary.changed,
        total = summary.total,
        "done"
    );
    Ok(summary)
}
