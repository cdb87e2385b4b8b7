//! Asset URL rewriting.
//!
//! Two variants share the URL classification rules here:
//! - [`build`] prefixes root-relative image URLs in the built fragments with
//!   a deployment path prefix
//! - [`dev`] points root-relative URLs inside a live element subtree at the
//!   local asset server

pub mod build;
pub mod dev;

pub use build::{rewrite_output_dir, PathPrefixRewriter, RewriteSummary};
pub use dev::{mount_asset_rewrite, CdnRewriter};

/// URLs that are never rewritten: absolute `http(s)://`, protocol-relative,
/// `data:`, `blob:`, `mailto:`, `tel:` and fragment-only.
pub fn is_skippable(url: &str) -> bool {
    let lower_scheme = url.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
    lower_scheme.starts_with("http://")
        || lower_scheme.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("data:")
        || url.starts_with("blob:")
        || url.starts_with("mailto:")
        || url.starts_with("tel:")
        || url.starts_with('#')
}

/// A URL starting with a single `/`.
pub fn is_root_relative(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}

/// Leading slash enforced, trailing slashes stripped; an empty result is `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    let stripped = with_slash.trim_end_matches('/');
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Map the URL of every `srcset` candidate, keeping its descriptor.
///
/// Candidates are re-joined with `, `, so the attribute comes back in a
/// normalized layout even when no URL changed.
pub fn rewrite_srcset(srcset: &str, map_url: impl Fn(&str) -> String) -> String {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| match candidate.split_once(char::is_whitespace) {
            Some((url, descriptor)) => format!("{} {}", map_url(url), descriptor.trim_start()),
            None => map_url(candidate),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skippable_schemes() {
        for url in [
            "https://x.com/a.png",
            "HTTP://x.com/a.png",
            "//cdn/a.png",
            "data:image/png;base64,AAAA",
            "blob:abc",
            "mailto:a@b.c",
            "tel:123",
            "#frag",
        ] {
            assert!(is_skippable(url), "{url}");
        }
        assert!(!is_skippable("/img/a.png"));
        assert!(!is_skippable("img/a.png"));
    }

    #[test]
    fn root_relative() {
        assert!(is_root_relative("/a.png"));
        assert!(!is_root_relative("//a.png"));
        assert!(!is_root_relative("a.png"));
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix("cdn/"), "/cdn");
        assert_eq!(normalize_prefix(" /some-folder// "), "/some-folder");
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
    }

    #[test]
    fn srcset_keeps_descriptors() {
        let out = rewrite_srcset(" /a.png 1x,/b.png   2x , ,c.png", |u| format!("[{u}]"));
        assert_eq!(out, "[/a.png] 1x, [/b.png] 2x, [c.png]");
    }
}
