//! Module graph construction.
//!
//! Starting from the entry, each module is resolved, loaded and transformed
//! (plugins first, then the filesystem), and its dependencies are followed
//! depth-first. Registry indices are assigned in visit (pre-)order, so the
//! entry is always module 0 and stylesheets are collected in the order they
//! are first imported.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::blocks::exists_file;
use crate::bundler::css::{self, StyleLang};
use crate::bundler::esm::{self, ModuleSyntax};
use crate::bundler::BundleOptions;
use crate::plugin::Plugin;
use crate::utils::{self, normalize_path, split_query};
use crate::BundleError;

/// Extensions tried, in order, for an import without a matching file.
pub const RESOLVE_EXTENSIONS: &[&str] = &[".js", ".mjs", ".vue", ".css", ".scss"];

/// File tried when an import names a directory.
pub const DIRECTORY_INDEX: &str = "index.js";

/// Directory searched for bare (package) specifiers.
pub const PACKAGE_DIR: &str = "node_modules";

/// What a module contributes to the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// ES module code.
    Script,
    /// Stylesheet; contributes CSS, exports nothing.
    Style(StyleLang),
    /// `?raw` import; exports the file text as `default`.
    Raw,
}

impl ModuleKind {
    pub fn detect(id: &str) -> Self {
        if utils::is_virtual(id) {
            return ModuleKind::Script;
        }
        let (path, query) = split_query(id);
        if query == Some("raw") {
            return ModuleKind::Raw;
        }
        StyleLang::from_path(path).map_or(ModuleKind::Script, ModuleKind::Style)
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: String,
    pub kind: ModuleKind,
    /// Script: transformed source. Style: compiled CSS. Raw: file text.
    pub code: String,
    /// Module syntax of a script; empty for other kinds.
    pub syntax: ModuleSyntax,
    /// `(specifier, resolved id)` in source order.
    pub deps: Vec<(String, String)>,
}

impl Module {
    pub fn resolved(&self, specifier: &str) -> Option<&str> {
        self.deps
            .iter()
            .find(|(spec, _)| spec == specifier)
            .map(|(_, id)| id.as_str())
    }
}

// ---------------------------------------------------------------------------
// ModuleGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
}

impl ModuleGraph {
    /// Build the graph reachable from `input`.
    pub async fn build(
        root: &Path,
        input: &str,
        plugins: &[Arc<dyn Plugin>],
        options: BundleOptions,
    ) -> Result<Self, BundleError> {
        let loader = Loader {
            root,
            plugins,
            options,
        };
        let entry = loader.resolve(input, None).await?;

        let mut graph = ModuleGraph::default();
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if graph.index.contains_key(&id) {
                continue;
            }
            let module = loader.load(&id).await?;
            for (_, dep) in module.deps.iter().rev() {
                if !graph.index.contains_key(dep) {
                    stack.push(dep.clone());
                }
            }
            graph.index.insert(id, graph.modules.len());
            graph.modules.push(module);
        }

        tracing::debug!(modules = graph.modules.len(), entry = input, "module graph built");
        Ok(graph)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Compiled CSS of every non-empty style module, in first-import order.
    pub fn css(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| matches!(m.kind, ModuleKind::Style(_)))
            .map(|m| m.code.trim())
            .filter(|css| !css.is_empty())
            .collect()
    }

    /// `id` as shown in errors and bundle annotations: root-relative for files,
    /// without the `\0` marker for virtual modules.
    pub fn display_id(root: &Path, id: &str) -> String {
        if utils::is_virtual(id) {
            return id.trim_start_matches(utils::VIRTUAL_PREFIX).to_string();
        }
        match Path::new(id).strip_prefix(root) {
            Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
            Err(_) => id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

struct Loader<'a> {
    root: &'a Path,
    plugins: &'a [Arc<dyn Plugin>],
    options: BundleOptions,
}

fn hook_error(plugin: &dyn Plugin, hook: &str, subject: &str, error: anyhow::Error) -> BundleError {
    BundleError::BuildError(format!("[{}] {hook} failed for {subject}: {error:#}", plugin.name()))
}

impl Loader<'_> {
    fn module_name(&self, id: &str) -> String {
        ModuleGraph::display_id(self.root, id)
    }

    async fn resolve(&self, specifier: &str, importer: Option<&str>) -> Result<String, BundleError> {
        for plugin in self.plugins {
            let resolved = plugin
                .resolve_id(specifier, importer)
                .await
                .map_err(|e| hook_error(plugin.as_ref(), "resolve_id", specifier, e))?;
            if let Some(id) = resolved {
                return Ok(id);
            }
        }

        let unresolved = || BundleError::UnresolvedImport {
            specifier: specifier.to_string(),
            importer: importer.map_or_else(|| "<entry>".to_string(), |i| self.module_name(i)),
        };

        let (path, query) = split_query(specifier);
        let base = importer
            .filter(|i| !utils::is_virtual(i))
            .and_then(|i| Path::new(split_query(i).0).parent())
            .unwrap_or(self.root);
        let found = if path.starts_with('/') {
            [self.root.join(path.trim_start_matches('/')), PathBuf::from(path)]
                .iter()
                .find_map(|candidate| find_file(&normalize_path(candidate)))
        } else if path.starts_with("./") || path.starts_with("../") {
            find_file(&normalize_path(&base.join(path)))
        } else {
            self.resolve_package(path, base).await?
        };
        let found = found.ok_or_else(unresolved)?;

        let mut id = found.to_string_lossy().into_owned();
        if let Some(query) = query {
            id.push('?');
            id.push_str(query);
        }
        Ok(id)
    }

    /// Resolve `name[/subpath]` against the `node_modules` directories from
    /// `base` up to the project root. A package entry is its `module` field,
    /// then `main`, then its directory index.
    async fn resolve_package(
        &self,
        specifier: &str,
        base: &Path,
    ) -> Result<Option<PathBuf>, BundleError> {
        let Some((name, subpath)) = split_package(specifier) else {
            return Ok(None);
        };
        let mut dirs: Vec<&Path> = base
            .ancestors()
            .take_while(|dir| dir.starts_with(self.root))
            .collect();
        if dirs.is_empty() {
            dirs.push(self.root);
        }

        for dir in dirs {
            let package = dir.join(PACKAGE_DIR).join(name);
            if !package.is_dir() {
                continue;
            }
            if let Some(subpath) = subpath {
                return Ok(find_file(&normalize_path(&package.join(subpath))));
            }

            let manifest = package.join("package.json");
            let entry = match tokio::fs::read_to_string(&manifest).await {
                Ok(text) => {
                    let manifest: PackageManifest = serde_json::from_str(&text).map_err(|e| {
                        BundleError::BuildError(format!("invalid package.json for {name}: {e}"))
                    })?;
                    manifest.module.or(manifest.main)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            let found = match entry {
                Some(entry) => find_file(&normalize_path(&package.join(entry))),
                None => find_file(&package),
            };
            tracing::trace!(package = name, found = ?found, "bare specifier resolved");
            return Ok(found);
        }
        Ok(None)
    }

    async fn load(&self, id: &str) -> Result<Module, BundleError> {
        let display_id = self.module_name(id);

        let mut loaded = None;
        for plugin in self.plugins {
            let code = plugin
                .load(id)
                .await
                .map_err(|e| hook_error(plugin.as_ref(), "load", &display_id, e))?;
            if code.is_some() {
                loaded = code;
                break;
            }
        }

        let from_disk = loaded.is_none();
        let mut code = match loaded {
            Some(code) => code,
            None if utils::is_virtual(id) => {
                return Err(BundleError::BuildError(format!(
                    "no plugin loaded virtual module {display_id}"
                )));
            }
            None => tokio::fs::read_to_string(split_query(id).0)
                .await
                .map_err(|e| BundleError::BuildError(format!("failed to read {display_id}: {e}")))?,
        };

        let mut transformed = false;
        for plugin in self.plugins {
            let next = plugin
                .transform(id, &code)
                .await
                .map_err(|e| hook_error(plugin.as_ref(), "transform", &display_id, e))?;
            if let Some(next) = next {
                code = next;
                transformed = true;
            }
        }

        let kind = ModuleKind::detect(id);
        let (code, syntax) = match kind {
            ModuleKind::Raw => (code, ModuleSyntax::default()),
            ModuleKind::Style(lang) => {
                let css = if from_disk && !transformed {
                    css::compile_file(Path::new(split_query(id).0), lang, self.options.minify)?
                } else {
                    css::compile_source(&display_id, &code, lang, self.options.minify)?
                };
                (css, ModuleSyntax::default())
            }
            ModuleKind::Script => {
                let syntax = esm::analyze(&display_id, &code)?;
                (code, syntax)
            }
        };

        let mut deps = Vec::with_capacity(syntax.specifiers().len());
        for specifier in syntax.specifiers() {
            let resolved = self.resolve(specifier, Some(id)).await?;
            deps.push((specifier.clone(), resolved));
        }

        tracing::trace!(module = %display_id, ?kind, deps = deps.len(), "module loaded");
        Ok(Module {
            id: id.to_string(),
            kind,
            code,
            syntax,
            deps,
        })
    }
}

/// The fields of a package manifest used to find its entry.
#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    module: Option<String>,
    main: Option<String>,
}

/// `@scope/pkg/sub/path` → `("@scope/pkg", Some("sub/path"))`.
fn split_package(specifier: &str) -> Option<(&str, Option<&str>)> {
    let name_end = if specifier.starts_with('@') {
        let slash = specifier.find('/')?;
        specifier[slash + 1..]
            .find('/')
            .map_or(specifier.len(), |i| slash + 1 + i)
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };
    let name = &specifier[..name_end];
    let bare_scope = name.starts_with('@') && name.ends_with('/');
    if name.is_empty() || bare_scope || name.contains(':') {
        return None;
    }
    let subpath = specifier[name_end..].trim_start_matches('/');
    Some((name, (!subpath.is_empty()).then_some(subpath)))
}

/// The file an import path refers to: the path itself, the path with one of
/// [`RESOLVE_EXTENSIONS`] appended, or its directory index.
pub fn find_file(path: &Path) -> Option<PathBuf> {
    if exists_file(path) {
        return Some(path.to_path_buf());
    }
    for ext in RESOLVE_EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if exists_file(&candidate) {
            return Some(candidate);
        }
    }
    let index = path.join(DIRECTORY_INDEX);
    exists_file(&index).then_some(index)
}
