//! Generated index modules.
//!
//! Each asset kind has one generator that derives an aggregation module from
//! the manifest and the files that actually exist:
//!
//! - markup  → `export default [{ key, html }, ...]`
//! - styles  → `import './<key>.scss';` per block
//! - scripts → `export default new Map([[key, init], ...])`
//!
//! Writes are change-gated: regenerating with unchanged inputs never touches
//! the file, which keeps the generators idempotent and stops spurious watch
//! events.

pub mod markup;
pub mod scripts;
pub mod styles;

use std::path::{Path, PathBuf};

use crate::blocks::BlockFileSet;
use crate::config::ProjectLayout;
use crate::utils::{self, WriteOutcome};
use crate::{manifest, AssetKind, BundleError};

pub use markup::MarkupIndex;
pub use scripts::ScriptsIndex;
pub use styles::StylesIndex;

/// One index generator. Implementors only decide which keys are present and
/// how to render them; reading the manifest and writing are shared.
pub trait IndexGenerator: Send + Sync {
    fn kind(&self) -> AssetKind;

    fn layout(&self) -> &ProjectLayout;

    /// Keys (in manifest order) that contribute to the index.
    fn select(&self, blocks: &[String]) -> Vec<String>;

    /// Module source for the selected keys. An empty selection still renders
    /// a well-formed artifact.
    fn render(&self, present: &[String]) -> String;

    /// Directory watched alongside the manifest.
    fn asset_dir(&self) -> &Path {
        self.layout().dir_for(self.kind())
    }

    fn output_file(&self) -> PathBuf {
        self.layout().index_file(self.kind())
    }

    /// Recompute the index and write it if it changed.
    fn generate(&self) -> Result<WriteOutcome, BundleError> {
        std::fs::create_dir_all(self.asset_dir())?;

        let blocks = manifest::read_blocks(&self.layout().order_file);
        let present = self.select(&blocks);
        let content = self.render(&present);
        let output = self.output_file();

        let outcome = utils::write_if_changed(&output, &content)?;
        if outcome.is_written() {
            tracing::info!(
                generator = self.kind().label(),
                entries = present.len(),
                empty = present.is_empty(),
                path = %utils::display_relative(&self.layout().root, &output),
                "index updated"
            );
        } else {
            tracing::debug!(generator = self.kind().label(), "index unchanged");
        }
        Ok(outcome)
    }
}

/// Generator for one asset kind.
pub fn generator_for(kind: AssetKind, layout: &ProjectLayout) -> Box<dyn IndexGenerator> {
    let files = BlockFileSet::new(layout.clone());
    match kind {
        AssetKind::Markup => Box::new(MarkupIndex::new(files)),
        AssetKind::Styles => Box::new(StylesIndex::new(files)),
        AssetKind::Scripts => Box::new(ScriptsIndex::new(files)),
    }
}

/// Run all three generators once. Returns how many files were written.
pub fn generate_all(layout: &ProjectLayout) -> Result<usize, BundleError> {
    let mut written = 0;
    for kind in AssetKind::ALL {
        if generator_for(kind, layout).generate()?.is_written() {
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        std::fs::create_dir_all(&layout.markup_dir).unwrap();
        std::fs::write(&layout.order_file, r#"{"blocks":["hero"]}"#).unwrap();
        std::fs::write(layout.markup_dir.join("hero.html"), "<section></section>").unwrap();

        assert_eq!(generate_all(&layout).unwrap(), 3);
        assert_eq!(generate_all(&layout).unwrap(), 0);
    }

    #[test]
    fn generate_creates_missing_asset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        generator_for(AssetKind::Scripts, &layout).generate().unwrap();
        assert_eq!(
            std::fs::read_to_string(layout.index_file(AssetKind::Scripts)).unwrap(),
            "export default new Map();\n"
        );
    }
}
