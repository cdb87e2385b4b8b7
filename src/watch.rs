//! Watch mode for the index generators.
//!
//! The file-watch primitive sits behind the [`Watcher`] trait and produces a
//! stream of [`ChangeEvent`]s. Between that stream and the generator sit two
//! explicit stages:
//!
//! 1. [`SelfWriteFilter`] drops `Change` events whose path is the generator's
//!    own output file. Without it every write of `index.js` would re-trigger
//!    the same generator forever. Add/unlink/directory events are never
//!    filtered, only content changes of that exact path.
//! 2. A debounce window coalesces bursts of events into one regeneration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::index::IndexGenerator;
use crate::utils::{self, abs_eq};
use crate::BundleError;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A file-watch capability: watch some paths, receive change events.
pub trait Watcher: Send {
    fn watch(&mut self, paths: &[PathBuf]) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, BundleError>;
}

// ---------------------------------------------------------------------------
// Self-loop guard
// ---------------------------------------------------------------------------

/// Drops content-change events for the generator's own output file.
#[derive(Debug, Clone)]
pub struct SelfWriteFilter {
    output: PathBuf,
}

impl SelfWriteFilter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    /// `false` only for a `Change` of exactly the output path.
    pub fn should_regenerate(&self, event: &ChangeEvent) -> bool {
        !(event.kind == ChangeKind::Change && abs_eq(&event.path, &self.output))
    }
}

// ---------------------------------------------------------------------------
// Watch loop
// ---------------------------------------------------------------------------

/// Watch the manifest and the generator's asset directory, regenerating after
/// each debounced burst of relevant events. Returns when the event stream ends.
///
/// The initial ("once") generation is the caller's job. Regeneration does
/// blocking file IO and runs on the blocking pool.
pub async fn watch_generator<W: Watcher + ?Sized>(
    generator: Arc<dyn IndexGenerator>,
    watcher: &mut W,
    window: Duration,
) -> Result<(), BundleError> {
    let layout = generator.layout();
    let paths = vec![layout.order_file.clone(), generator.asset_dir().to_path_buf()];
    let mut rx = watcher.watch(&paths)?;
    let filter = SelfWriteFilter::new(generator.output_file());

    tracing::info!(
        generator = generator.kind().label(),
        manifest = %utils::display_relative(&layout.root, &layout.order_file),
        dir = %utils::display_relative(&layout.root, generator.asset_dir()),
        "watching"
    );

    while let Some(event) = rx.recv().await {
        if !filter.should_regenerate(&event) {
            tracing::trace!(path = %event.path.display(), "ignoring own output change");
            continue;
        }
        let open = debounce(&mut rx, &filter, window).await;

        let job = Arc::clone(&generator);
        match tokio::task::spawn_blocking(move || job.generate()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::warn!(generator = generator.kind().label(), error = %err, "regeneration failed");
            }
            Err(err) => {
                return Err(BundleError::WatchError(format!("regeneration task failed: {err}")));
            }
        }
        if !open {
            break;
        }
    }
    Ok(())
}

/// Wait until `window` passes without a relevant event. Filtered events do not
/// extend the window. Returns `false` if the stream closed meanwhile.
async fn debounce(
    rx: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    filter: &SelfWriteFilter,
    window: Duration,
) -> bool {
    let sleep = tokio::time::sleep_until(Instant::now() + window);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            maybe = rx.recv() => match maybe {
                None => return false,
                Some(event) if filter.should_regenerate(&event) => {
                    sleep.as_mut().reset(Instant::now() + window);
                }
                Some(_) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// notify-backed watcher
// ---------------------------------------------------------------------------

/// [`Watcher`] backed by the platform's recommended `notify` watcher.
///
/// Directories are watched recursively. Anything else (typically the
/// manifest) is covered by watching its parent directory non-recursively,
/// whether or not the file exists yet: editors that save by renaming a temp
/// file over the target replace the inode, which would end a watch on the
/// file itself. Events outside the requested paths are dropped.
#[derive(Default)]
pub struct NotifyWatcher {
    inner: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Watcher for NotifyWatcher {
    fn watch(&mut self, paths: &[PathBuf]) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, BundleError> {
        use notify::Watcher as _;

        let (tx, rx) = mpsc::unbounded_channel();
        let requested: Vec<PathBuf> = paths.to_vec();
        let scope = requested.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate(&event) {
                    if within(&scope, &change.path) {
                        let _ = tx.send(change);
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "filesystem watcher error"),
        })
        .map_err(|e| BundleError::WatchError(format!("failed to initialize watcher: {e}")))?;

        for path in &requested {
            let (target, mode) = if path.is_dir() {
                (path.as_path(), RecursiveMode::Recursive)
            } else {
                match path.parent().filter(|p| p.is_dir()) {
                    Some(parent) => (parent, RecursiveMode::NonRecursive),
                    None => {
                        tracing::warn!(path = %path.display(), "not watched: parent directory missing");
                        continue;
                    }
                }
            };
            watcher
                .watch(target, mode)
                .map_err(|e| BundleError::WatchError(format!("failed to watch {}: {e}", target.display())))?;
        }

        self.inner = Some(watcher);
        Ok(rx)
    }
}

fn within(scope: &[PathBuf], path: &Path) -> bool {
    scope.iter().any(|p| path == p || path.starts_with(p) || abs_eq(path, p))
}

/// Map a raw notify event onto add/change/unlink events. Access events are dropped.
fn translate(event: &Event) -> Vec<ChangeEvent> {
    let kind = |path: &Path| -> Option<ChangeKind> {
        match &event.kind {
            EventKind::Create(CreateKind::Folder) => Some(ChangeKind::AddDir),
            EventKind::Create(_) => Some(ChangeKind::Add),
            EventKind::Remove(RemoveKind::Folder) => Some(ChangeKind::UnlinkDir),
            EventKind::Remove(_) => Some(ChangeKind::Unlink),
            EventKind::Modify(ModifyKind::Name(_)) => Some(match (path.exists(), path.is_dir()) {
                (true, true) => ChangeKind::AddDir,
                (true, false) => ChangeKind::Add,
                (false, _) => ChangeKind::Unlink,
            }),
            EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Change),
            EventKind::Access(_) | EventKind::Other => None,
        }
    };

    event
        .paths
        .iter()
        .filter_map(|path| kind(path).map(|k| ChangeEvent::new(k, path.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange};

    #[test]
    fn filter_drops_only_own_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("index.js");
        let filter = SelfWriteFilter::new(&output);

        assert!(!filter.should_regenerate(&ChangeEvent::new(ChangeKind::Change, &output)));
        assert!(filter.should_regenerate(&ChangeEvent::new(ChangeKind::Add, &output)));
        assert!(filter.should_regenerate(&ChangeEvent::new(ChangeKind::Unlink, &output)));
        assert!(filter.should_regenerate(&ChangeEvent::new(
            ChangeKind::Change,
            dir.path().join("hero.html")
        )));
    }

    #[test]
    fn filter_compares_resolved_paths() {
        let dir = tempfile::tempdir().unwrap();
        let filter = SelfWriteFilter::new(dir.path().join("index.js"));
        let dotted = dir.path().join("nested/../index.js");
        assert!(!filter.should_regenerate(&ChangeEvent::new(ChangeKind::Change, dotted)));
    }

    #[test]
    fn translate_maps_event_kinds() {
        let path = PathBuf::from("/p/src/markup/hero.html");
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.clone());
        let access = Event::new(EventKind::Access(AccessKind::Read)).add_path(path.clone());
        let dir_created =
            Event::new(EventKind::Create(CreateKind::Folder)).add_path(PathBuf::from("/p/src/markup/x"));

        assert_eq!(translate(&modify), vec![ChangeEvent::new(ChangeKind::Change, path)]);
        assert!(translate(&access).is_empty());
        assert_eq!(translate(&dir_created)[0].kind, ChangeKind::AddDir);
    }

    async fn next_for(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>, path: &Path) -> ChangeEvent {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = rx.recv().await.expect("watcher closed");
                if abs_eq(&event.path, path) {
                    return event;
                }
            }
        })
        .await
        .expect("no event for the manifest")
    }

    #[tokio::test]
    async fn manifest_survives_rename_over_saves() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("order.json");
        std::fs::write(&manifest, r#"{"blocks":[]}"#).unwrap();

        let mut watcher = NotifyWatcher::new();
        let mut rx = watcher.watch(&[manifest.clone()]).unwrap();

        for blocks in [r#"{"blocks":["hero"]}"#, r#"{"blocks":["hero","cta"]}"#] {
            tokio::time::sleep(Duration::from_millis(100)).await;
            while rx.try_recv().is_ok() {}

            let temp = dir.path().join("order.json.tmp");
            std::fs::write(&temp, blocks).unwrap();
            std::fs::rename(&temp, &manifest).unwrap();

            let event = next_for(&mut rx, &manifest).await;
            assert_ne!(event.kind, ChangeKind::Unlink);
        }
    }

    #[tokio::test]
    async fn siblings_of_the_manifest_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("order.json");
        std::fs::write(&manifest, "{}").unwrap();

        let mut watcher = NotifyWatcher::new();
        let mut rx = watcher.watch(&[manifest.clone()]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(&manifest, r#"{"blocks":[]}"#).unwrap();

        let event = next_for(&mut rx, &manifest).await;
        assert!(abs_eq(&event.path, &manifest));
        while let Ok(event) = rx.try_recv() {
            assert!(abs_eq(&event.path, &manifest), "unexpected {event:?}");
        }
    }

    #[test]
    fn within_scope() {
        let scope = vec![PathBuf::from("/p/src/order.json"), PathBuf::from("/p/src/markup")];
        assert!(within(&scope, Path::new("/p/src/markup/a.html")));
        assert!(within(&scope, Path::new("/p/src/order.json")));
        assert!(!within(&scope, Path::new("/p/src/other.json")));
    }
}
