//! Watch loop behavior driven by a channel-backed watcher.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use cms_bundler::index::{generator_for, IndexGenerator};
use cms_bundler::utils::WriteOutcome;
use cms_bundler::watch::{watch_generator, ChangeEvent, ChangeKind, Watcher};
use cms_bundler::{AssetKind, BundleError, ProjectLayout};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hands out a pre-built receiver and records what it was asked to watch.
struct ChannelWatcher {
    rx: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
    watched: Vec<PathBuf>,
}

impl ChannelWatcher {
    fn new() -> (mpsc::UnboundedSender<ChangeEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx: Some(rx),
                watched: Vec::new(),
            },
        )
    }
}

impl Watcher for ChannelWatcher {
    fn watch(&mut self, paths: &[PathBuf]) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, BundleError> {
        self.watched = paths.to_vec();
        self.rx
            .take()
            .ok_or_else(|| BundleError::WatchError("already watching".into()))
    }
}

/// Counts how often the wrapped generator regenerates, and where.
struct Counting {
    inner: Box<dyn IndexGenerator>,
    runs: Arc<AtomicUsize>,
    thread: Mutex<Option<ThreadId>>,
}

impl IndexGenerator for Counting {
    fn kind(&self) -> AssetKind {
        self.inner.kind()
    }

    fn layout(&self) -> &ProjectLayout {
        self.inner.layout()
    }

    fn select(&self, blocks: &[String]) -> Vec<String> {
        self.inner.select(blocks)
    }

    fn render(&self, present: &[String]) -> String {
        self.inner.render(present)
    }

    fn generate(&self) -> Result<WriteOutcome, BundleError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.thread.lock().unwrap() = Some(std::thread::current().id());
        self.inner.generate()
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup() -> (tempfile::TempDir, ProjectLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    write(&layout.order_file, r#"{"blocks":["hero"]}"#);
    write(&layout.markup_dir.join("hero.html"), "<section></section>");
    (dir, layout)
}

fn counting(layout: &ProjectLayout) -> (Arc<Counting>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let generator = Counting {
        inner: generator_for(AssetKind::Markup, layout),
        runs: runs.clone(),
        thread: Mutex::new(None),
    };
    (Arc::new(generator), runs)
}

const WINDOW: Duration = Duration::from_millis(20);

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn watches_manifest_and_asset_dir() {
    let (_dir, layout) = setup();
    let (generator, _runs) = counting(&layout);
    let (tx, mut watcher) = ChannelWatcher::new();
    drop(tx);

    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();
    assert_eq!(
        watcher.watched,
        vec![layout.order_file.clone(), layout.markup_dir.clone()]
    );
}

#[tokio::test]
async fn own_output_changes_do_not_regenerate() {
    let (_dir, layout) = setup();
    let (generator, runs) = counting(&layout);
    let output = generator.output_file();
    let (tx, mut watcher) = ChannelWatcher::new();

    tx.send(ChangeEvent::new(ChangeKind::Change, &output)).unwrap();
    tx.send(ChangeEvent::new(ChangeKind::Change, &output)).unwrap();
    drop(tx);

    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn removing_own_output_regenerates_it() {
    let (_dir, layout) = setup();
    let (generator, runs) = counting(&layout);
    let output = generator.output_file();
    let (tx, mut watcher) = ChannelWatcher::new();

    tx.send(ChangeEvent::new(ChangeKind::Unlink, &output)).unwrap();
    drop(tx);

    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(output.is_file());
}

#[tokio::test]
async fn burst_of_events_coalesces() {
    let (_dir, layout) = setup();
    let (generator, runs) = counting(&layout);
    let hero = layout.markup_dir.join("hero.html");
    let (tx, mut watcher) = ChannelWatcher::new();

    tx.send(ChangeEvent::new(ChangeKind::Change, &hero)).unwrap();
    tx.send(ChangeEvent::new(ChangeKind::Add, layout.markup_dir.join("new.html")))
        .unwrap();
    tx.send(ChangeEvent::new(ChangeKind::Change, &layout.order_file))
        .unwrap();
    drop(tx);

    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(std::fs::read_to_string(generator.output_file())
        .unwrap()
        .contains("'./hero.html?raw'"));
}

#[tokio::test]
async fn separated_bursts_regenerate_separately() {
    let (_dir, layout) = setup();
    let (generator, runs) = counting(&layout);
    let hero = layout.markup_dir.join("hero.html");
    let (tx, mut watcher) = ChannelWatcher::new();

    let task = tokio::spawn(async move {
        watch_generator(generator.clone(), &mut watcher, WINDOW).await
    });

    tx.send(ChangeEvent::new(ChangeKind::Change, &hero)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tx.send(ChangeEvent::new(ChangeKind::Change, &hero)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    drop(tx);
    task.await.unwrap().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manifest_edit_is_picked_up() {
    let (_dir, layout) = setup();
    let (generator, _runs) = counting(&layout);
    generator.generate().unwrap();

    write(&layout.markup_dir.join("intro.html"), "<p>intro</p>");
    write(&layout.order_file, r#"{"blocks":["intro","hero"]}"#);

    let (tx, mut watcher) = ChannelWatcher::new();
    tx.send(ChangeEvent::new(ChangeKind::Change, &layout.order_file))
        .unwrap();
    drop(tx);
    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();

    let index = std::fs::read_to_string(generator.output_file()).unwrap();
    assert!(index.find("intro").unwrap() < index.find("hero").unwrap());
}

#[tokio::test]
async fn regeneration_runs_on_the_blocking_pool() {
    let (_dir, layout) = setup();
    let (generator, runs) = counting(&layout);
    let (tx, mut watcher) = ChannelWatcher::new();

    tx.send(ChangeEvent::new(ChangeKind::Change, &layout.order_file))
        .unwrap();
    drop(tx);
    watch_generator(generator.clone(), &mut watcher, WINDOW).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let worker = generator.thread.lock().unwrap().unwrap();
    assert_ne!(worker, std::thread::current().id());
}
