//! Bundler plugins.
//!
//! A plugin hooks into the [`InlineBundler`](crate::bundler::InlineBundler)
//! module pipeline:
//! 1. `resolve_id`: claim a specifier (virtual entries, special files)
//! 2. `load`: serve source for a resolved id
//! 3. `transform`: rewrite loaded source before the bundler parses it
//! 4. `generate_bundle`: emit extra assets once the graph is complete
//!
//! Hooks run in plugin order; the first `Some` wins for `resolve_id` and
//! `load`, while `transform` results chain.

pub mod component_loader;
pub mod css_cache;
pub mod virtual_entry;

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;

use crate::bundler::OutputAsset;

pub use component_loader::ComponentLoader;
pub use css_cache::CssCache;
pub use virtual_entry::VirtualEntryPlugin;

/// A bundler plugin. Every hook defaults to a no-op.
#[async_trait]
pub trait Plugin: fmt::Debug + Send + Sync {
    fn name(&self) -> Cow<'static, str>;

    /// Resolve `specifier` imported from `importer` (`None` for the entry).
    async fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn load(&self, _id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn transform(&self, _id: &str, _code: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn generate_bundle(&self, _ctx: &mut BundleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BundleContext
// ---------------------------------------------------------------------------

/// State handed to `generate_bundle`.
#[derive(Debug, Default)]
pub struct BundleContext {
    emitted: Vec<OutputAsset>,
}

impl BundleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an asset into the bundle output.
    pub fn emit_asset(&mut self, file_name: impl Into<String>, source: impl Into<String>) {
        self.emitted.push(OutputAsset {
            file_name: file_name.into(),
            source: source.into(),
        });
    }

    pub fn emitted(&self) -> &[OutputAsset] {
        &self.emitted
    }

    pub fn into_assets(self) -> Vec<OutputAsset> {
        self.emitted
    }
}
