//! Project layout and runtime configuration.
//!
//! Every path the pipeline touches is derived from a single project root, so
//! the same layout can be pointed at a temp directory in tests.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::AssetKind;

pub const ORDER_FILE: &str = "src/order.json";
pub const MARKUP_DIR: &str = "src/markup";
pub const STYLES_DIR: &str = "src/styles";
pub const SCRIPTS_DIR: &str = "src/scripts";
pub const OUT_DIR: &str = "@CMS";
pub const PUBLIC_DIR: &str = "public";

/// File name of the generated index module inside each asset directory.
pub const INDEX_FILE: &str = "index.js";

/// Watch-mode debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 80;

pub const DEFAULT_CDN_PORT: u16 = 3001;
pub const DEFAULT_CDN_BASE: &str = "http://localhost:3001";

// ---------------------------------------------------------------------------
// ProjectLayout
// ---------------------------------------------------------------------------

/// Where the manifest, the three asset roots and the output directory live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub order_file: PathBuf,
    pub markup_dir: PathBuf,
    pub styles_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub out_dir: PathBuf,
    pub public_dir: PathBuf,
}

impl ProjectLayout {
    /// Standard layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            order_file: root.join(ORDER_FILE),
            markup_dir: root.join(MARKUP_DIR),
            styles_dir: root.join(STYLES_DIR),
            scripts_dir: root.join(SCRIPTS_DIR),
            out_dir: root.join(OUT_DIR),
            public_dir: root.join(PUBLIC_DIR),
            root,
        }
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    pub fn with_public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = dir.into();
        self
    }

    /// Source directory for an asset kind.
    pub fn dir_for(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Markup => &self.markup_dir,
            AssetKind::Styles => &self.styles_dir,
            AssetKind::Scripts => &self.scripts_dir,
        }
    }

    /// Generated index module for an asset kind.
    pub fn index_file(&self, kind: AssetKind) -> PathBuf {
        self.dir_for(kind).join(INDEX_FILE)
    }

    /// Root-relative module id for a file under the project root,
    /// e.g. `/src/scripts/hero.js`. Files outside the root keep their path.
    pub fn module_id(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => {
                let segments: Vec<String> = rel
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect();
                format!("/{}", segments.join("/"))
            }
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Effective runtime configuration, built from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: ProjectLayout,
    /// Quiet period that coalesces bursts of watch events.
    pub debounce: Duration,
    /// Port of the dev asset server.
    pub cdn_port: u16,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: ProjectLayout::new(root),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            cdn_port: DEFAULT_CDN_PORT,
        }
    }
}
