//! # CMS Bundler
//!
//! Build pipeline for "CMS blocks": independently authored fragments of
//! markup, styles and scripts that are assembled into self-contained HTML
//! snippets ready to paste into a CMS.
//!
//! The pipeline runs in three stages:
//! 1. Index generation: derived aggregation modules (`src/{markup,styles,scripts}/index.js`)
//!    kept consistent with the ordering manifest `src/order.json`
//! 2. Block bundling: one `@CMS/<key>.html` per manifest key with CSS and JS inlined
//! 3. Asset URL rewriting: root-relative image URLs prefixed for their final location
//!
//! The manifest is the single source of truth for block existence and order.
//! Nothing in the pipeline ever writes to it; only the scaffolding commands do.

pub mod blocks;
pub mod build;
pub mod bundle;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod dev;
pub mod dom;
pub mod index;
pub mod manifest;
pub mod plugin;
pub mod rewrite;
pub mod scaffold;
pub mod server;
pub mod utils;
pub mod watch;

use thiserror::Error;

pub use build::{build_cms, BuildReport};
pub use bundle::BlockBundler;
pub use bundler::{BundleOptions, BundleOutput, BundleRequest, BundleService, InlineBundler};
pub use config::{Config, ProjectLayout};

// ---------------------------------------------------------------------------
// Asset Kind
// ---------------------------------------------------------------------------

/// The three per-block asset kinds. Each has its own source directory and
/// its own generated index module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// `<key>.html` fragments.
    Markup,
    /// `<key>.scss` or `<key>.css` stylesheets.
    Styles,
    /// `<key>.js` initializer modules.
    Scripts,
}

impl AssetKind {
    /// Every kind, in the order generators run.
    pub const ALL: [AssetKind; 3] = [AssetKind::Markup, AssetKind::Styles, AssetKind::Scripts];

    /// Short label used in log lines (`gen-markup`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Markup => "gen-markup",
            AssetKind::Styles => "gen-styles",
            AssetKind::Scripts => "gen-scripts",
        }
    }
}

// ---------------------------------------------------------------------------
// BundleError
// ---------------------------------------------------------------------------

/// Errors that abort the current operation.
///
/// Missing inputs (no manifest, no markup for a key, unreadable script while
/// probing) are not errors; they are reported as empty results instead.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Build failed: {0}")]
    BuildError(String),

    #[error("Cannot resolve import '{specifier}' from {importer}")]
    UnresolvedImport { specifier: String, importer: String },

    #[error("Unsupported module syntax in {module}: {detail}")]
    UnsupportedSyntax { module: String, detail: String },

    #[error("CSS error in {path}: {message}")]
    CssError { path: String, message: String },

    #[error("Invalid block key '{0}'. Use letters/numbers/dash/underscore.")]
    InvalidKey(String),

    #[error("Watcher error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
