//! Styles index: one side-effect import per block stylesheet.

use crate::blocks::BlockFileSet;
use crate::config::ProjectLayout;
use crate::index::IndexGenerator;
use crate::AssetKind;

#[derive(Debug, Clone)]
pub struct StylesIndex {
    files: BlockFileSet,
}

impl StylesIndex {
    pub fn new(files: BlockFileSet) -> Self {
        Self { files }
    }

    /// Import line for a key, or `None` when it has no stylesheet.
    fn import_for(&self, key: &str) -> Option<String> {
        let path = self.files.style(key)?;
        let ext = path.extension()?.to_string_lossy();
        Some(format!("import './{key}.{ext}';"))
    }
}

impl IndexGenerator for StylesIndex {
    fn kind(&self) -> AssetKind {
        AssetKind::Styles
    }

    fn layout(&self) -> &ProjectLayout {
        self.files.layout()
    }

    fn select(&self, blocks: &[String]) -> Vec<String> {
        blocks
            .iter()
            .filter(|key| self.files.style(key).is_some())
            .cloned()
            .collect()
    }

    fn render(&self, present: &[String]) -> String {
        let imports: Vec<String> = present.iter().filter_map(|key| self.import_for(key)).collect();
        if imports.is_empty() {
            return "\n".to_string();
        }
        format!("{}\n", imports.join("\n"))
    }
}
