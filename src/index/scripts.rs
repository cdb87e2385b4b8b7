//! Scripts index: key → default-exported initializer, usable scripts only.

use crate::blocks::BlockFileSet;
use crate::config::ProjectLayout;
use crate::index::IndexGenerator;
use crate::utils::js_string_literal;
use crate::AssetKind;

#[derive(Debug, Clone)]
pub struct ScriptsIndex {
    files: BlockFileSet,
}

impl ScriptsIndex {
    pub fn new(files: BlockFileSet) -> Self {
        Self { files }
    }
}

impl IndexGenerator for ScriptsIndex {
    fn kind(&self) -> AssetKind {
        AssetKind::Scripts
    }

    fn layout(&self) -> &ProjectLayout {
        self.files.layout()
    }

    fn select(&self, blocks: &[String]) -> Vec<String> {
        blocks
            .iter()
            .filter(|key| self.files.usable_script(key).is_some())
            .cloned()
            .collect()
    }

    fn render(&self, present: &[String]) -> String {
        if present.is_empty() {
            return "export default new Map();\n".to_string();
        }

        let imports = present
            .iter()
            .enumerate()
            .map(|(i, key)| format!("import init{i} from './{key}.js';"))
            .collect::<Vec<_>>()
            .join("\n");

        let entries = present
            .iter()
            .enumerate()
            .map(|(i, key)| format!("[{}, init{i}]", js_string_literal(key)))
            .collect::<Vec<_>>()
            .join(", ");

        format!("{imports}\n\nexport default new Map([{entries}]);\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_map_entries() {
        let index = ScriptsIndex::new(BlockFileSet::new(ProjectLayout::new("/p")));
        assert_eq!(
            index.render(&["hero".to_string()]),
            "import init0 from './hero.js';\n\nexport default new Map([[\"hero\", init0]]);\n"
        );
    }
}
