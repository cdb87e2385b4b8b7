//! Dev entry mount: put every block's markup into one container, run the
//! block initializers against it, then attach the dev-time asset rewriter.

use std::collections::{HashMap, HashSet};

use crate::blocks::BlockFileSet;
use crate::config::{ProjectLayout, DEFAULT_CDN_BASE};
use crate::dom::{DomTree, Subscription, TreeObserver};
use crate::manifest;
use crate::rewrite::mount_asset_rewrite;
use crate::BundleError;

/// One markup index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupPart {
    pub key: String,
    pub html: String,
}

/// A block initializer, called with the container it was mounted into.
pub type Initializer<D> = Box<dyn Fn(&mut D, <D as DomTree>::Node) -> anyhow::Result<()>>;

/// Markup of every manifest key that has a markup file, in manifest order.
pub fn markup_parts(layout: &ProjectLayout) -> Result<Vec<MarkupPart>, BundleError> {
    let files = BlockFileSet::new(layout.clone());
    let mut parts = Vec::new();
    for key in manifest::read_blocks(&layout.order_file) {
        if let Some(path) = files.markup(&key) {
            let html = std::fs::read_to_string(&path)?;
            parts.push(MarkupPart { key, html });
        }
    }
    Ok(parts)
}

/// What a mount did.
#[derive(Debug, Default)]
pub struct MountOutcome {
    /// Keys whose markup was appended.
    pub appended: Vec<String>,
    /// Keys whose initializer ran without error.
    pub initialized: Vec<String>,
    /// Keys whose initializer returned an error.
    pub failed: Vec<String>,
    /// The asset rewriter attached to the container, when enabled.
    pub rewrite: Option<Subscription>,
}

/// Idempotent mounting keyed by container identity.
pub struct DevMount<D: DomTree> {
    mounted: HashSet<D::Node>,
    cdn_base: String,
    rewrite_assets: bool,
}

impl<D: DomTree> std::fmt::Debug for DevMount<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevMount")
            .field("mounted", &self.mounted)
            .field("cdn_base", &self.cdn_base)
            .field("rewrite_assets", &self.rewrite_assets)
            .finish()
    }
}

impl<D: DomTree> Default for DevMount<D> {
    fn default() -> Self {
        Self::new(DEFAULT_CDN_BASE)
    }
}

impl<D: DomTree> DevMount<D> {
    pub fn new(cdn_base: impl Into<String>) -> Self {
        Self {
            mounted: HashSet::new(),
            cdn_base: cdn_base.into(),
            rewrite_assets: true,
        }
    }

    /// Disable the asset rewriter for later mounts.
    pub fn without_asset_rewrite(mut self) -> Self {
        self.rewrite_assets = false;
        self
    }

    pub fn is_mounted(&self, container: D::Node) -> bool {
        self.mounted.contains(&container)
    }
}

impl<D: TreeObserver + 'static> DevMount<D> {
    /// Mount `parts` into `container`. Returns `None` when the container was
    /// already mounted; nothing is touched in that case.
    ///
    /// Initializer errors are logged and do not stop the remaining blocks.
    pub fn mount(
        &mut self,
        dom: &mut D,
        container: D::Node,
        parts: &[MarkupPart],
        initializers: &HashMap<String, Initializer<D>>,
    ) -> Option<MountOutcome> {
        if self.mounted.contains(&container) {
            tracing::debug!(?container, "already mounted");
            return None;
        }

        let mut outcome = MountOutcome::default();
        for part in parts {
            if part.html.trim().is_empty() {
                continue;
            }
            dom.append_html(container, &part.html);
            outcome.appended.push(part.key.clone());
        }

        self.mounted.insert(container);

        for part in parts {
            let Some(init) = initializers.get(&part.key) else {
                continue;
            };
            match init(dom, container) {
                Ok(()) => outcome.initialized.push(part.key.clone()),
                Err(e) => {
                    tracing::warn!(key = %part.key, "initializer failed: {e:#}");
                    outcome.failed.push(part.key.clone());
                }
            }
        }

        outcome.rewrite = mount_asset_rewrite(dom, container, &self.cdn_base, self.rewrite_assets);
        Some(outcome)
    }
}
