//! Virtual entry modules.
//!
//! Each block bundle starts from a generated module that imports exactly one
//! real file. The specifier is fixed per bundle kind and resolves to a
//! `\0`-prefixed id so it can never collide with a file on disk.

use std::borrow::Cow;

use async_trait::async_trait;

use crate::plugin::Plugin;
use crate::utils::{self, js_string_literal};

pub const CSS_ENTRY: &str = "virtual:cms-css";
pub const JS_ENTRY: &str = "virtual:cms-js";

/// Serves one virtual module.
#[derive(Debug, Clone)]
pub struct VirtualEntryPlugin {
    specifier: String,
    resolved: String,
    code: String,
}

impl VirtualEntryPlugin {
    pub fn new(specifier: impl Into<String>, code: impl Into<String>) -> Self {
        let specifier = specifier.into();
        Self {
            resolved: utils::virtual_id(&specifier),
            specifier,
            code: code.into(),
        }
    }

    /// Entry that pulls in one stylesheet for its side effects.
    pub fn style_entry(module_id: &str) -> Self {
        Self::new(CSS_ENTRY, format!("import {};", js_string_literal(module_id)))
    }

    /// Entry that imports a block script and runs its default export.
    ///
    /// A throwing initializer is reported with `console.warn` and does not
    /// stop the page.
    pub fn script_entry(module_id: &str) -> Self {
        Self::new(
            JS_ENTRY,
            format!(
                "import init from {};\n\
                 try {{ if (typeof init === \"function\") init(); }} catch (e) {{ console.warn(e); }}",
                js_string_literal(module_id)
            ),
        )
    }

    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

#[async_trait]
impl Plugin for VirtualEntryPlugin {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("cms-virtual-entry")
    }

    async fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        if specifier == self.specifier || specifier == self.resolved {
            return Ok(Some(self.resolved.clone()));
        }
        Ok(None)
    }

    async fn load(&self, id: &str) -> anyhow::Result<Option<String>> {
        Ok((id == self.resolved).then(|| self.code.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_and_loads_only_its_own_id() {
        let plugin = VirtualEntryPlugin::style_entry("/src/styles/hero.scss");

        let resolved = plugin.resolve_id(CSS_ENTRY, None).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("\0virtual:cms-css"));
        assert_eq!(plugin.resolve_id(JS_ENTRY, None).await.unwrap(), None);

        let code = plugin.load("\0virtual:cms-css").await.unwrap();
        assert_eq!(code.as_deref(), Some("import \"/src/styles/hero.scss\";"));
        assert_eq!(plugin.load("virtual:cms-css").await.unwrap(), None);
    }

    #[test]
    fn script_entry_guards_initializer() {
        let plugin = VirtualEntryPlugin::script_entry("/src/scripts/hero.js");
        assert_eq!(
            plugin.code(),
            "import init from \"/src/scripts/hero.js\";\n\
             try { if (typeof init === \"function\") init(); } catch (e) { console.warn(e); }"
        );
    }
}
