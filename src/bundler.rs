//! The bundling service.
//!
//! Block bundling depends only on the [`BundleService`] boundary: a request
//! names one entry module (usually virtual), the plugins to run and a couple
//! of output knobs, and the service answers with tagged chunk/asset outputs.
//!
//! [`InlineBundler`] is the in-crate implementation. It covers exactly what
//! block bundles need: one self-executing chunk with dynamic imports inlined,
//! plus extracted stylesheets.

pub mod css;
pub mod esm;
pub mod graph;
pub mod minify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::bundler::esm::RegistryModule;
use crate::bundler::graph::{ModuleGraph, ModuleKind};
use crate::plugin::{BundleContext, Plugin};
use crate::utils::{js_string_literal, normalize_path};
use crate::BundleError;

/// File name of the entry chunk.
pub const ENTRY_CHUNK: &str = "index.js";

/// File name of the extracted stylesheet.
pub const STYLE_ASSET: &str = "style.css";

// ---------------------------------------------------------------------------
// Request / Output
// ---------------------------------------------------------------------------

/// Output knobs. The chunk format is fixed: one IIFE, dynamic imports inlined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleOptions {
    pub minify: bool,
    /// Emit CSS as `.css` assets instead of injecting it from the chunk.
    pub css_code_split: bool,
}

impl BundleOptions {
    /// Minified output with extracted CSS, as used for CMS fragments.
    pub fn production() -> Self {
        Self {
            minify: true,
            css_code_split: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Entry module specifier.
    pub input: String,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub options: BundleOptions,
}

impl BundleRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            plugins: Vec::new(),
            options: BundleOptions::default(),
        }
    }

    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn with_options(mut self, options: BundleOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    pub file_name: String,
    pub code: String,
    pub is_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputAsset {
    pub file_name: String,
    pub source: String,
}

impl OutputAsset {
    pub fn is_css(&self) -> bool {
        self.file_name.ends_with(".css")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Output {
    Chunk(OutputChunk),
    Asset(OutputAsset),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleOutput {
    pub outputs: Vec<Output>,
}

impl BundleOutput {
    /// Trimmed code of the entry chunk, empty if there is none.
    pub fn entry_code(&self) -> &str {
        self.outputs
            .iter()
            .find_map(|output| match output {
                Output::Chunk(chunk) if chunk.is_entry => Some(chunk.code.trim()),
                _ => None,
            })
            .unwrap_or("")
    }

    /// Every `.css` asset, in emission order.
    pub fn css_assets(&self) -> impl Iterator<Item = &OutputAsset> {
        self.outputs.iter().filter_map(|output| match output {
            Output::Asset(asset) if asset.is_css() => Some(asset),
            _ => None,
        })
    }

    /// Non-blank CSS asset sources, trimmed and joined by newlines.
    pub fn css_text(&self) -> String {
        self.css_assets()
            .map(|asset| asset.source.trim())
            .filter(|css| !css.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The opaque bundler boundary.
#[async_trait]
pub trait BundleService: Send + Sync {
    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput, BundleError>;
}

// ---------------------------------------------------------------------------
// InlineBundler
// ---------------------------------------------------------------------------

/// In-crate [`BundleService`]. Root-relative imports (`/src/...`) resolve
/// against `root`.
#[derive(Debug, Clone)]
pub struct InlineBundler {
    root: PathBuf,
}

impl InlineBundler {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: normalize_path(&root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn render_chunk(&self, graph: &ModuleGraph, minify: bool) -> Result<String, BundleError> {
        let mut registry = Vec::with_capacity(graph.modules().len());
        for module in graph.modules() {
            let name = ModuleGraph::display_id(&self.root, &module.id);
            let body = match module.kind {
                ModuleKind::Script => module.syntax.render(
                    &name,
                    &module.code,
                    |specifier| module.resolved(specifier).and_then(|id| graph.index_of(id)),
                    minify,
                )?,
                ModuleKind::Style(_) => String::new(),
                ModuleKind::Raw => format!("__exports.default = {};", js_string_literal(&module.code)),
            };
            registry.push(RegistryModule { name, body });
        }
        Ok(esm::render_registry(&registry, !minify))
    }
}

#[async_trait]
impl BundleService for InlineBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput, BundleError> {
        let BundleRequest {
            input,
            plugins,
            options,
        } = request;

        let graph = ModuleGraph::build(&self.root, &input, &plugins, options).await?;
        let mut code = self.render_chunk(&graph, options.minify)?;

        let mut ctx = BundleContext::new();
        for plugin in &plugins {
            plugin.generate_bundle(&mut ctx).await.map_err(|e| {
                BundleError::BuildError(format!("[{}] generate_bundle failed: {e:#}", plugin.name()))
            })?;
        }

        let mut assets = Vec::new();
        let module_css = graph.css().join("\n");
        if !module_css.is_empty() {
            assets.push(OutputAsset {
                file_name: STYLE_ASSET.to_string(),
                source: module_css,
            });
        }
        for mut asset in ctx.into_assets() {
            if options.minify && asset.is_css() {
                asset.source = css::compile_css(&asset.file_name, &asset.source, true)?;
            }
            assets.push(asset);
        }

        if !options.css_code_split {
            let (styles, rest): (Vec<_>, Vec<_>) = assets.into_iter().partition(OutputAsset::is_css);
            let injected: String = styles
                .iter()
                .map(|asset| esm::style_injection(asset.source.trim()))
                .collect();
            code = format!("{injected}{code}");
            assets = rest;
        }

        tracing::debug!(
            entry = %input,
            modules = graph.modules().len(),
            bytes = code.len(),
            assets = assets.len(),
            "bundle generated"
        );

        let mut outputs = vec![Output::Chunk(OutputChunk {
            file_name: ENTRY_CHUNK.to_string(),
            code,
            is_entry: true,
        })];
        outputs.extend(assets.into_iter().map(Output::Asset));
        Ok(BundleOutput { outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_code_and_css_text() {
        let output = BundleOutput {
            outputs: vec![
                Output::Asset(OutputAsset {
                    file_name: "style.css".into(),
                    source: " a{color:red}\n".into(),
                }),
                Output::Chunk(OutputChunk {
                    file_name: "index.js".into(),
                    code: "\nconsole.log(1)\n".into(),
                    is_entry: true,
                }),
                Output::Asset(OutputAsset {
                    file_name: "logo.svg".into(),
                    source: "<svg/>".into(),
                }),
                Output::Asset(OutputAsset {
                    file_name: "components.css".into(),
                    source: "  ".into(),
                }),
            ],
        };
        assert_eq!(output.entry_code(), "console.log(1)");
        assert_eq!(output.css_assets().count(), 2);
        assert_eq!(output.css_text(), "a{color:red}");
    }

    #[test]
    fn missing_entry_chunk_is_empty_code() {
        assert_eq!(BundleOutput::default().entry_code(), "");
    }

    #[test]
    fn request_builder() {
        let request = BundleRequest::new("virtual:cms-js")
            .with_plugin(crate::plugin::ComponentLoader::new())
            .with_options(BundleOptions::production());
        assert_eq!(request.plugins.len(), 1);
        assert!(request.options.minify && request.options.css_code_split);
    }
}
