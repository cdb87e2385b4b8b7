//! Dev mount and live asset rewriting over the in-memory tree.

use std::collections::HashMap;
use std::path::Path;

use cms_bundler::dev::{markup_parts, DevMount, Initializer};
use cms_bundler::dom::{DomTree, MemoryDom, NodeId};
use cms_bundler::rewrite::mount_asset_rewrite;
use cms_bundler::ProjectLayout;
use pretty_assertions::assert_eq;

const CDN: &str = "http://localhost:3001";

fn page() -> (MemoryDom, NodeId, NodeId) {
    let mut dom = MemoryDom::new();
    let body = dom.create_element("body");
    let root = dom.create_element("main");
    let aside = dom.create_element("aside");
    dom.append_child(body, root);
    dom.append_child(body, aside);
    dom.append_html(aside, r#"<img src="/outside.png">"#);
    dom.flush();
    (dom, root, aside)
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn existing_and_added_nodes_are_rewritten() {
    let (mut dom, root, _aside) = page();
    dom.append_html(root, r#"<img src="/a.png">"#);

    let sub = mount_asset_rewrite(&mut dom, root, CDN, true).unwrap();
    assert!(sub.is_active());
    assert_eq!(dom.inner_html(root), r#"<img src="http://localhost:3001/a.png">"#);

    dom.append_html(
        root,
        r#"<div style="background: url('/bg.jpg')"><picture><source srcset="/s.webp 1x, /l.webp 2x"></picture></div>"#,
    );
    dom.flush();

    assert_eq!(
        dom.inner_html(root),
        "<img src=\"http://localhost:3001/a.png\">\
         <div style=\"background: url('http://localhost:3001/bg.jpg')\">\
         <picture><source srcset=\"http://localhost:3001/s.webp 1x, http://localhost:3001/l.webp 2x\"></picture>\
         </div>"
    );
}

#[test]
fn attribute_changes_are_rewritten() {
    let (mut dom, root, _aside) = page();
    dom.append_html(root, r#"<img src="https://x.test/a.png" alt="/not-a-url">"#);
    mount_asset_rewrite(&mut dom, root, CDN, true).unwrap();

    let img = dom.elements_by_tag(root, "img")[0];
    dom.set_attribute(img, "src", "/swapped.png");
    dom.set_attribute(img, "alt", "/still-not-a-url");
    dom.flush();

    assert_eq!(
        dom.get_attribute(img, "src").as_deref(),
        Some("http://localhost:3001/swapped.png")
    );
    assert_eq!(dom.get_attribute(img, "alt").as_deref(), Some("/still-not-a-url"));
    assert_eq!(dom.pending(), 0);
}

#[test]
fn nodes_outside_the_root_are_untouched() {
    let (mut dom, root, aside) = page();
    mount_asset_rewrite(&mut dom, root, CDN, true).unwrap();

    dom.append_html(aside, r#"<img src="/later.png">"#);
    let outside = dom.elements_by_tag(aside, "img")[0];
    dom.set_attribute(outside, "src", "/changed.png");
    dom.flush();

    assert_eq!(
        dom.inner_html(aside),
        r#"<img src="/changed.png"><img src="/later.png">"#
    );
}

#[test]
fn unsubscribe_stops_rewriting() {
    let (mut dom, root, _aside) = page();
    let sub = mount_asset_rewrite(&mut dom, root, CDN, true).unwrap();
    sub.unsubscribe();
    assert!(!sub.is_active());

    dom.append_html(root, r#"<img src="/a.png">"#);
    dom.flush();
    assert_eq!(dom.inner_html(root), r#"<img src="/a.png">"#);
}

#[test]
fn dev_mount_from_project_markup() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    write(&layout.order_file, r#"{"blocks":["hero","ghost","cta"]}"#);
    write(
        &layout.markup_dir.join("hero.html"),
        "<section class=\"hero\"><img src=\"/img/hero.png\"></section>\n",
    );
    write(&layout.markup_dir.join("cta.html"), "<a class=\"cta\" href=\"/go\">Go</a>\n");

    let parts = markup_parts(&layout).unwrap();
    let mut inits: HashMap<String, Initializer<MemoryDom>> = HashMap::new();
    inits.insert(
        "cta".into(),
        Box::new(|dom: &mut MemoryDom, container: NodeId| {
            let link = dom.elements_by_tag(container, "a")[0];
            dom.set_attribute(link, "data-bound", "true");
            Ok::<_, anyhow::Error>(())
        }),
    );

    let mut dom = MemoryDom::new();
    let container = dom.create_element("div");
    let mut mount = DevMount::new(CDN);
    let outcome = mount.mount(&mut dom, container, &parts, &inits).unwrap();
    dom.flush();

    assert_eq!(outcome.appended, ["hero", "cta"]);
    assert_eq!(outcome.initialized, ["cta"]);
    assert!(outcome.failed.is_empty());
    assert!(outcome.rewrite.is_some());

    let html = dom.inner_html(container);
    assert!(html.contains(r#"<img src="http://localhost:3001/img/hero.png">"#));
    assert!(html.contains(r#"<a class="cta" href="/go" data-bound="true">Go</a>"#));

    assert!(mount.mount(&mut dom, container, &parts, &inits).is_none());
}
