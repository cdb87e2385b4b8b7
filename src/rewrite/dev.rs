//! Dev-time URL rewriting over a live element subtree.
//!
//! Root-relative `src`, `srcset` and inline `style` `url(...)` values are
//! pointed at the local asset server. The rewrite is applied once to the
//! whole subtree and then kept up to date by an observer on that subtree.
//! Nodes outside the root are never read or written.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::dom::{DomTree, Mutation, ObserveOptions, Subscription, TreeObserver};
use crate::rewrite::{is_root_relative, rewrite_srcset};

/// Attributes the observer reports.
pub const WATCHED_ATTRIBUTES: [&str; 3] = ["src", "srcset", "style"];

static STYLE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\((?:"(/[^'")]+)"|'(/[^'")]+)'|(/[^'")]+))\)"#).expect("valid style url regex")
});

fn is_absolute(url: &str) -> bool {
    let head = url.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
    head.starts_with("http://") || head.starts_with("https://") || url.starts_with("data:") || url.starts_with("blob:")
}

/// Maps root-relative URLs onto a CDN base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnRewriter {
    base: String,
}

impl CdnRewriter {
    pub fn new(cdn_base: &str) -> Self {
        Self {
            base: cdn_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `url` on the CDN when it is root-relative, otherwise unchanged.
    pub fn to_cdn(&self, url: &str) -> String {
        if is_root_relative(url) && !is_absolute(url) {
            format!("{}{url}", self.base)
        } else {
            url.to_string()
        }
    }

    pub fn rewrite_style(&self, style: &str) -> String {
        STYLE_URL
            .replace_all(style, |caps: &Captures| {
                let (url, quote) = match (caps.get(1), caps.get(2), caps.get(3)) {
                    (Some(m), _, _) => (m.as_str(), "\""),
                    (_, Some(m), _) => (m.as_str(), "'"),
                    (_, _, Some(m)) => (m.as_str(), ""),
                    _ => return caps[0].to_string(),
                };
                format!("url({quote}{}{quote})", self.to_cdn(url))
            })
            .into_owned()
    }

    /// Rewrite one element's attributes. Attributes are written only when
    /// their value changes.
    pub fn rewrite_element<D: DomTree>(&self, dom: &mut D, node: D::Node) {
        if !dom.is_element(node) {
            return;
        }

        if let Some(src) = dom.get_attribute(node, "src") {
            let next = self.to_cdn(&src);
            if next != src {
                dom.set_attribute(node, "src", &next);
            }
        }

        if let Some(srcset) = dom.get_attribute(node, "srcset") {
            let next = rewrite_srcset(&srcset, |url| self.to_cdn(url));
            if next != srcset {
                dom.set_attribute(node, "srcset", &next);
            }
        }

        if let Some(style) = dom.get_attribute(node, "style") {
            let next = self.rewrite_style(&style);
            if next != style {
                dom.set_attribute(node, "style", &next);
            }
        }
    }

    /// Rewrite `node` and every element below it.
    pub fn rewrite_tree<D: DomTree>(&self, dom: &mut D, node: D::Node) {
        self.rewrite_element(dom, node);
        for child in dom.descendants(node) {
            self.rewrite_element(dom, child);
        }
    }
}

/// Rewrite the subtree under `root` now and on every later mutation inside
/// it. Returns `None` when disabled; otherwise the subscription to cancel.
pub fn mount_asset_rewrite<D: TreeObserver + 'static>(
    dom: &mut D,
    root: D::Node,
    cdn_base: &str,
    enabled: bool,
) -> Option<Subscription> {
    if !enabled {
        return None;
    }

    let rewriter = CdnRewriter::new(cdn_base);
    rewriter.rewrite_tree(dom, root);

    let options = ObserveOptions {
        child_list: true,
        subtree: true,
        attributes: true,
        attribute_filter: Some(WATCHED_ATTRIBUTES.iter().map(|a| a.to_string()).collect()),
    };
    let subscription = dom.observe(
        root,
        options,
        Box::new(move |dom: &mut D, records: &[Mutation<D::Node>]| {
            for record in records {
                match record {
                    Mutation::Attributes { target, .. } => rewriter.rewrite_element(dom, *target),
                    Mutation::ChildList { added, .. } => {
                        for node in added {
                            rewriter.rewrite_tree(dom, *node);
                        }
                    }
                }
            }
        }),
    );
    tracing::debug!(cdn = %cdn_base, "asset rewrite attached");
    Some(subscription)
}
