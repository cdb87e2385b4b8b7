use std::path::Path;

use cms_bundler::index::{generator_for, IndexGenerator};
use cms_bundler::utils::WriteOutcome;
use cms_bundler::{AssetKind, ProjectLayout};
use pretty_assertions::assert_eq;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup(blocks: &str) -> (tempfile::TempDir, ProjectLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    write(&layout.order_file, blocks);
    (dir, layout)
}

fn generated(layout: &ProjectLayout, kind: AssetKind) -> String {
    std::fs::read_to_string(layout.index_file(kind)).unwrap()
}

#[test]
fn markup_index_follows_manifest_order() {
    let (_dir, layout) = setup(r#"{"blocks":["b","a"]}"#);
    write(&layout.markup_dir.join("a.html"), "<p>a</p>");
    write(&layout.markup_dir.join("b.html"), "<p>b</p>");

    generator_for(AssetKind::Markup, &layout).generate().unwrap();
    assert_eq!(
        generated(&layout, AssetKind::Markup),
        "import h0 from './b.html?raw';\nimport h1 from './a.html?raw';\n\n\
         export default [{ key: \"b\", html: h0 }, { key: \"a\", html: h1 }];\n"
    );
}

#[test]
fn styles_index_prefers_scss() {
    let (_dir, layout) = setup(r#"{"blocks":["x","y","z"]}"#);
    write(&layout.styles_dir.join("x.scss"), ".x {}");
    write(&layout.styles_dir.join("x.css"), ".x {}");
    write(&layout.styles_dir.join("y.css"), ".y {}");

    generator_for(AssetKind::Styles, &layout).generate().unwrap();
    assert_eq!(
        generated(&layout, AssetKind::Styles),
        "import './x.scss';\nimport './y.css';\n"
    );
}

#[test]
fn scripts_index_keeps_only_usable_scripts() {
    let (_dir, layout) = setup(r#"{"blocks":["only-comments","no-default","ok","missing"]}"#);
    write(
        &layout.scripts_dir.join("only-comments.js"),
        "// export default function x() {}\n/* export default 1 */\n",
    );
    write(&layout.scripts_dir.join("no-default.js"), "export function f() {}\n");
    write(
        &layout.scripts_dir.join("ok.js"),
        "/* banner */\nexport default function f(){}\n",
    );

    generator_for(AssetKind::Scripts, &layout).generate().unwrap();
    assert_eq!(
        generated(&layout, AssetKind::Scripts),
        "import init0 from './ok.js';\n\nexport default new Map([[\"ok\", init0]]);\n"
    );
}

#[test]
fn empty_inputs_still_produce_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());

    for kind in AssetKind::ALL {
        assert_eq!(generator_for(kind, &layout).generate().unwrap(), WriteOutcome::Written);
    }
    assert_eq!(generated(&layout, AssetKind::Markup), "export default [];\n");
    assert_eq!(generated(&layout, AssetKind::Styles), "\n");
    assert_eq!(generated(&layout, AssetKind::Scripts), "export default new Map();\n");
}

#[test]
fn second_run_writes_nothing() {
    let (_dir, layout) = setup(r#"{"blocks":["hero"]}"#);
    write(&layout.markup_dir.join("hero.html"), "<section></section>");
    write(&layout.styles_dir.join("hero.scss"), ".hero {}");
    write(&layout.scripts_dir.join("hero.js"), "export default () => {}");

    for kind in AssetKind::ALL {
        let generator = generator_for(kind, &layout);
        assert_eq!(generator.generate().unwrap(), WriteOutcome::Written);
        assert_eq!(generator.generate().unwrap(), WriteOutcome::Unchanged);
    }
}

#[test]
fn outputs_live_in_their_asset_dirs() {
    let layout = ProjectLayout::new("/proj");
    let generator: Box<dyn IndexGenerator> = generator_for(AssetKind::Scripts, &layout);
    assert_eq!(generator.asset_dir(), Path::new("/proj/src/scripts"));
    assert_eq!(generator.output_file(), Path::new("/proj/src/scripts/index.js"));
}
