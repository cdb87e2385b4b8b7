//! Markup index: ordered `{ key, html }` records imported as raw strings.

use crate::blocks::BlockFileSet;
use crate::config::ProjectLayout;
use crate::index::IndexGenerator;
use crate::utils::js_string_literal;
use crate::AssetKind;

#[derive(Debug, Clone)]
pub struct MarkupIndex {
    files: BlockFileSet,
}

impl MarkupIndex {
    pub fn new(files: BlockFileSet) -> Self {
        Self { files }
    }
}

impl IndexGenerator for MarkupIndex {
    fn kind(&self) -> AssetKind {
        AssetKind::Markup
    }

    fn layout(&self) -> &ProjectLayout {
        self.files.layout()
    }

    fn select(&self, blocks: &[String]) -> Vec<String> {
        blocks
            .iter()
            .filter(|key| self.files.markup(key).is_some())
            .cloned()
            .collect()
    }

    fn render(&self, present: &[String]) -> String {
        if present.is_empty() {
            return "export default [];\n".to_string();
        }

        let imports = present
            .iter()
            .enumerate()
            .map(|(i, key)| format!("import h{i} from './{key}.html?raw';"))
            .collect::<Vec<_>>()
            .join("\n");

        let entries = present
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{{ key: {}, html: h{i} }}", js_string_literal(key)))
            .collect::<Vec<_>>()
            .join(", ");

        format!("{imports}\n\nexport default [{entries}];\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_records_in_given_order() {
        let index = MarkupIndex::new(BlockFileSet::new(ProjectLayout::new("/p")));
        let out = index.render(&["b".to_string(), "a".to_string()]);
        assert_eq!(
            out,
            "import h0 from './b.html?raw';\nimport h1 from './a.html?raw';\n\n\
             export default [{ key: \"b\", html: h0 }, { key: \"a\", html: h1 }];\n"
        );
    }

    #[test]
    fn renders_empty_list() {
        let index = MarkupIndex::new(BlockFileSet::new(ProjectLayout::new("/p")));
        assert_eq!(index.render(&[]), "export default [];\n");
    }
}
