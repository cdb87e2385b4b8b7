//! Per-block bundling.
//!
//! A block fragment is assembled from up to three parts:
//! 1. `<style>`: the block stylesheet bundled in isolation, followed by any
//!    CSS the script bundle emitted (component styles)
//! 2. the normalized markup
//! 3. `<script>`: the block script bundled into one IIFE whose default export
//!    is invoked, with a throwing initializer caught and warned about
//!
//! Each part is present only if non-empty; parts are separated by blank lines
//! and the fragment ends with a newline.

use std::path::Path;
use std::sync::Arc;

use crate::blocks::BlockFileSet;
use crate::bundler::{BundleOptions, BundleRequest, BundleService};
use crate::config::ProjectLayout;
use crate::plugin::{ComponentLoader, VirtualEntryPlugin};
use crate::plugin::virtual_entry::{CSS_ENTRY, JS_ENTRY};
use crate::utils;
use crate::BundleError;

/// Bundled script of one block and the CSS it emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBundle {
    pub js: String,
    pub css: String,
}

/// Builds one HTML fragment per block key.
#[derive(Clone)]
pub struct BlockBundler {
    files: BlockFileSet,
    service: Arc<dyn BundleService>,
}

impl std::fmt::Debug for BlockBundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBundler")
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl BlockBundler {
    pub fn new(layout: ProjectLayout, service: Arc<dyn BundleService>) -> Self {
        Self {
            files: BlockFileSet::new(layout),
            service,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.files.layout()
    }

    /// The assembled fragment for `key`, or `None` when it has no markup.
    pub async fn build_block(&self, key: &str) -> Result<Option<String>, BundleError> {
        let Some(markup_path) = self.files.markup(key) else {
            return Ok(None);
        };
        let html = utils::normalize_html(&tokio::fs::read_to_string(&markup_path).await?);

        let block_css = match self.files.style(key) {
            Some(path) => self.bundle_css(&path).await?,
            None => String::new(),
        };

        let script = match self.files.script(key) {
            Some(path) => self.bundle_js(&path).await?,
            None => ScriptBundle::default(),
        };

        let css = [block_css.as_str(), script.css.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!(
            key,
            css_bytes = css.len(),
            js_bytes = script.js.len(),
            "block bundled"
        );
        Ok(Some(assemble_fragment(&css, &html, &script.js)))
    }

    /// Minified CSS of one stylesheet bundled through a virtual entry.
    pub async fn bundle_css(&self, path: &Path) -> Result<String, BundleError> {
        let module_id = self.layout().module_id(path);
        let request = BundleRequest::new(CSS_ENTRY)
            .with_plugin(VirtualEntryPlugin::style_entry(&module_id))
            .with_options(BundleOptions::production());

        let output = self.service.bundle(request).await?;
        Ok(output.css_text())
    }

    /// One block script as an IIFE, plus the CSS its imports emitted.
    pub async fn bundle_js(&self, path: &Path) -> Result<ScriptBundle, BundleError> {
        let module_id = self.layout().module_id(path);
        let request = BundleRequest::new(JS_ENTRY)
            .with_plugin(ComponentLoader::new())
            .with_plugin(VirtualEntryPlugin::script_entry(&module_id))
            .with_options(BundleOptions::production());

        let output = self.service.bundle(request).await?;
        Ok(ScriptBundle {
            js: output.entry_code().to_string(),
            css: output.css_text(),
        })
    }
}

/// Join the non-empty parts of a fragment.
pub fn assemble_fragment(css: &str, html: &str, js: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    if !css.is_empty() {
        parts.push(format!("<style>\n{css}\n</style>"));
    }
    if !html.is_empty() {
        parts.push(html.to_string());
    }
    if !js.is_empty() {
        parts.push(format!("<script>\n{js}\n</script>"));
    }
    format!("{}\n", parts.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fragment_with_all_parts() {
        assert_eq!(
            assemble_fragment("a{color:red}", "<section>x</section>", "console.log(1)"),
            "<style>\na{color:red}\n</style>\n\n<section>x</section>\n\n<script>\nconsole.log(1)\n</script>\n"
        );
    }

    #[test]
    fn fragment_omits_empty_parts() {
        assert_eq!(assemble_fragment("", "<p>x</p>", ""), "<p>x</p>\n");
        assert_eq!(
            assemble_fragment("", "<p>x</p>", "f()"),
            "<p>x</p>\n\n<script>\nf()\n</script>\n"
        );
    }
}
