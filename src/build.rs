//! CMS build: one fragment per manifest key into the output directory.
//!
//! The output directory is cleared first so keys removed from the manifest
//! leave no stale fragments behind. Blocks are built strictly one after the
//! other, in manifest order. The first bundling failure aborts the run and
//! leaves whatever was already written.

use serde::Serialize;

use crate::bundle::BlockBundler;
use crate::{manifest, utils, BundleError};

/// What a build run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Keys written, in build order.
    pub written: Vec<String>,
    /// Keys skipped for lack of markup.
    pub skipped: Vec<String>,
}

/// Run a full build with `bundler`.
pub async fn build_cms(bundler: &BlockBundler) -> Result<BuildReport, BundleError> {
    let layout = bundler.layout();
    let out_dir = &layout.out_dir;
    let out_label = utils::display_relative(&layout.root, out_dir);

    tokio::fs::create_dir_all(out_dir).await?;
    utils::clean_dir(out_dir).await?;

    let mut report = BuildReport::default();

    let blocks = manifest::read_blocks(&layout.order_file);
    if blocks.is_empty() {
        tracing::info!("order.json is empty");
        return Ok(report);
    }

    for key in blocks {
        let Some(fragment) = bundler.build_block(&key).await? else {
            tracing::info!(key = %key, "skip (no markup)");
            report.skipped.push(key);
            continue;
        };

        let out_file = out_dir.join(format!("{key}.html"));
        tokio::fs::write(&out_file, fragment).await?;
        tracing::info!(key = %key, path = %format!("{out_label}/{key}.html"), "wrote");
        report.written.push(key);
    }

    tracing::info!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        "done"
    );
    Ok(report)
}
