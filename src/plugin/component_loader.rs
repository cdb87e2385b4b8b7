//! Component Loader: transforms single-file components (`.vue`).
//!
//! A component file carries up to three sections:
//!
//! ```text
//! <template>...</template>   → `template` string on the default export
//! <script>...</script>       → kept as the module body
//! <style>...</style>         → buffered, emitted as `components.css`
//! ```
//!
//! The default-exported options object is rebound to `__sfc__` so the
//! template can be attached before it is re-exported. `lang="scss"` styles
//! are compiled with `grass` before buffering.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;

use crate::bundler::esm;
use crate::plugin::css_cache::CssCache;
use crate::plugin::{BundleContext, Plugin};
use crate::utils::js_string_literal;
use crate::BundleError;

/// File name of the emitted component stylesheet.
pub const COMPONENT_CSS: &str = "components.css";

// Greedy so nested `<template v-if>` blocks stay inside the outer one.
static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<template(?:\s[^>]*)?>(.*)</template>").expect("valid template regex")
});
static SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script(?:\s[^>]*)?>(.*?)</script>").expect("valid script regex")
});
static STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<style(\s[^>]*)?>(.*?)</style>").expect("valid style regex")
});
static SCSS_LANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\blang\s*=\s*["']s[ac]ss["']"#).expect("valid lang regex")
});

/// The parsed sections of one component file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub template: Option<String>,
    pub script: Option<String>,
    pub styles: Vec<String>,
}

impl ComponentDescriptor {
    pub fn parse(source: &str) -> Self {
        let template = TEMPLATE
            .captures(source)
            .map(|c| c[1].trim().to_string());
        let script = SCRIPT.captures(source).map(|c| c[1].trim().to_string());
        let styles = STYLE
            .captures_iter(source)
            .map(|c| c[2].to_string())
            .collect();
        Self {
            template,
            script,
            styles,
        }
    }
}

/// The component-file plugin.
pub struct ComponentLoader {
    /// Shared so the collected CSS can be read after a build.
    css_cache: Arc<CssCache>,
    /// Parsed components keyed by module id.
    descriptors: DashMap<String, ComponentDescriptor>,
}

impl fmt::Debug for ComponentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLoader")
            .field("css_cache", &self.css_cache)
            .field("components", &self.descriptors.len())
            .finish()
    }
}

impl Default for ComponentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentLoader {
    pub fn new() -> Self {
        Self {
            css_cache: Arc::new(CssCache::new()),
            descriptors: DashMap::new(),
        }
    }

    /// Get the CSS cache (for reading collected CSS after build).
    pub fn css_cache(&self) -> Arc<CssCache> {
        Arc::clone(&self.css_cache)
    }

    pub fn descriptor(&self, id: &str) -> Option<ComponentDescriptor> {
        self.descriptors.get(id).map(|entry| entry.value().clone())
    }

    fn is_component(id: &str) -> bool {
        id.split('?').next().is_some_and(|path| path.ends_with(".vue"))
    }

    /// Compile one `<style>` block. Only `lang="scss"`/`lang="sass"` blocks
    /// go through the SCSS compiler.
    fn compile_style(id: &str, attrs: &str, css: &str) -> anyhow::Result<String> {
        if SCSS_LANG.is_match(attrs) {
            grass::from_string(css.to_string(), &grass::Options::default())
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("failed to compile component style in {id}"))
        } else {
            Ok(css.to_string())
        }
    }

    /// Module body for a parsed component. `id` names the component in
    /// syntax errors.
    pub fn render_module(
        id: &str,
        descriptor: &ComponentDescriptor,
    ) -> Result<String, BundleError> {
        let mut code = String::new();

        if let Some(script) = &descriptor.script {
            match esm::rebind_default_export(id, script, "__sfc__")? {
                Some(rebound) => code.push_str(&rebound),
                None => {
                    code.push_str(script);
                    code.push_str("\nconst __sfc__ = {};");
                }
            }
            code.push('\n');
        } else {
            code.push_str("const __sfc__ = {};\n");
        }

        if let Some(template) = &descriptor.template {
            code.push_str(&format!("__sfc__.template = {};\n", js_string_literal(template)));
        }

        code.push_str("export default __sfc__;\n");
        Ok(code)
    }
}

#[async_trait]
impl Plugin for ComponentLoader {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("cms-component-loader")
    }

    async fn transform(&self, id: &str, code: &str) -> anyhow::Result<Option<String>> {
        if !Self::is_component(id) {
            return Ok(None);
        }

        let descriptor = ComponentDescriptor::parse(code);

        let mut css = Vec::new();
        for caps in STYLE.captures_iter(code) {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            css.push(Self::compile_style(id, attrs, &caps[2])?);
        }
        if !css.is_empty() {
            self.css_cache.insert(id, css.join("\n"));
        }

        let module = Self::render_module(id, &descriptor)?;
        self.descriptors.insert(id.to_string(), descriptor);
        Ok(Some(module))
    }

    /// Emit the buffered component CSS.
    async fn generate_bundle(&self, ctx: &mut BundleContext) -> anyhow::Result<()> {
        let css = self.css_cache.stitch();
        if !css.is_empty() {
            ctx.emit_asset(COMPONENT_CSS, css);
        }
        self.css_cache.clear();
        Ok(())
    }
}
