//! Block scaffolding: `block add` and `block rename`.
//!
//! These are the only operations that write the manifest. Existing source
//! files are never overwritten.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::blocks::exists_file;
use crate::config::ProjectLayout;
use crate::manifest::{self, read_order, write_order};
use crate::utils::display_relative;
use crate::BundleError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub created: Vec<PathBuf>,
    /// Files left alone because they already existed.
    pub existing: Vec<PathBuf>,
    pub manifest_updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub skipped: Vec<PathBuf>,
    pub manifest_updated: bool,
}

fn markup_template(key: &str) -> String {
    format!("<!-- {key} -->\n<section class=\"{key}\">\n</section>\n")
}

fn style_template(key: &str) -> String {
    format!("/* {key} */\n.{key} {{\n}}\n")
}

/// Runs of `-` become a single `_` so the key is a valid identifier tail.
fn init_fn_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    let mut in_dash = false;
    for c in key.chars() {
        if c == '-' {
            if !in_dash {
                name.push('_');
            }
            in_dash = true;
        } else {
            name.push(c);
            in_dash = false;
        }
    }
    name
}

fn script_template(key: &str) -> String {
    format!(
        "export default function {}() {{\n  // init logic here\n}}\n",
        init_fn_name(key)
    )
}

fn write_if_missing(root: &Path, path: &Path, content: &str, report: &mut AddReport) -> Result<(), BundleError> {
    let label = display_relative(root, path);
    if path.exists() {
        tracing::info!(path = %label, "exists");
        report.existing.push(path.to_path_buf());
        return Ok(());
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %label, "created");
    report.created.push(path.to_path_buf());
    Ok(())
}

/// Create the three source files for `key` and append it to the manifest.
pub fn add_block(layout: &ProjectLayout, key: &str) -> Result<AddReport, BundleError> {
    manifest::validate_key(key)?;

    for dir in [&layout.markup_dir, &layout.styles_dir, &layout.scripts_dir] {
        std::fs::create_dir_all(dir)?;
    }

    let mut report = AddReport::default();
    let root = &layout.root;
    write_if_missing(root, &layout.markup_dir.join(format!("{key}.html")), &markup_template(key), &mut report)?;
    write_if_missing(root, &layout.styles_dir.join(format!("{key}.scss")), &style_template(key), &mut report)?;
    write_if_missing(root, &layout.scripts_dir.join(format!("{key}.js")), &script_template(key), &mut report)?;

    let mut order = read_order(&layout.order_file);
    let mut blocks = match order.get("blocks") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    if blocks.iter().any(|b| b.as_str() == Some(key)) {
        tracing::info!(key, "order.json already has key");
    } else {
        blocks.push(Value::String(key.to_string()));
        order.insert("blocks".into(), Value::Array(blocks));
        write_order(&layout.order_file, &order)?;
        report.manifest_updated = true;
        tracing::info!(key, "order.json updated");
    }

    Ok(report)
}

/// Move `from`'s source files to `to` and rename it in the manifest.
pub fn rename_block(layout: &ProjectLayout, from: &str, to: &str) -> Result<RenameReport, BundleError> {
    manifest::validate_key(to)?;

    let moves = [
        (&layout.markup_dir, "html"),
        (&layout.styles_dir, "scss"),
        (&layout.styles_dir, "css"),
        (&layout.scripts_dir, "js"),
    ];

    let root = &layout.root;
    let mut report = RenameReport::default();
    for (dir, ext) in moves {
        let src = dir.join(format!("{from}.{ext}"));
        let dst = dir.join(format!("{to}.{ext}"));
        if !exists_file(&src) {
            tracing::info!(path = %display_relative(root, &src), "skip (missing)");
            report.skipped.push(src);
            continue;
        }
        if dst.exists() {
            tracing::info!(path = %display_relative(root, &dst), "skip (target exists)");
            report.skipped.push(src);
            continue;
        }
        std::fs::rename(&src, &dst)?;
        tracing::info!(
            from = %display_relative(root, &src),
            to = %display_relative(root, &dst),
            "renamed"
        );
        report.moved.push((src, dst));
    }

    let mut order = read_order(&layout.order_file);
    let blocks = match order.get("blocks") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let mut changed = false;
    let renamed: Vec<Value> = blocks
        .into_iter()
        .map(|b| {
            if b.as_str() == Some(from) {
                changed = true;
                Value::String(to.to_string())
            } else {
                b
            }
        })
        .collect();

    if changed {
        order.insert("blocks".into(), Value::Array(renamed));
        write_order(&layout.order_file, &order)?;
        report.manifest_updated = true;
        tracing::info!(from, to, "order.json updated");
    } else {
        tracing::info!(from, "order.json had no key");
    }

    Ok(report)
}
