//! Filesystem observer: debounced change events over the managed root.
//!
//! Two layers. The bridge ([`FileWatcher`]) owns a `notify-debouncer-full`
//! instance with a 500 ms window and converts its batches into [`RawEvent`]s
//! on a std thread. The coalescer ([`coalesce`]) is a pure function from a
//! raw batch to the final [`ChangeEvent`]s: ignore filtering, same-path
//! collapse, directory-delete subsumption, and delete/create → move
//! correlation. Replaying a batch through the coalescer twice yields
//! identical output.

use notify_debouncer_full::notify::{self, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

use lorebase_core::{ChangeEvent, ChangeKind, LogicalPath};

/// Default debounce window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Directory names suppressed anywhere in a path, besides dot-prefixed
/// components.
const IGNORED_COMPONENTS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "target",
    "Thumbs.db",
    "desktop.ini",
];

/// Raw event out of the debouncer, before coalescing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: RawKind,
    pub path: PathBuf,
    /// Rename destination when the platform reports both ends.
    pub dest: Option<PathBuf>,
    pub is_dir: bool,
    /// Signature of the path, when it still exists.
    pub meta: Option<FileSig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Create,
    Modify,
    Remove,
    Rename,
}

/// File identity signature for move correlation: size and mtime always,
/// inode when the platform provides one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSig {
    pub size: u64,
    /// mtime, epoch seconds
    pub mtime: i64,
    pub inode: Option<u64>,
}

impl FileSig {
    pub fn new(size: u64, mtime: i64) -> Self {
        Self {
            size,
            mtime,
            inode: None,
        }
    }

    pub fn with_inode(size: u64, mtime: i64, inode: Option<u64>) -> Self {
        Self { size, mtime, inode }
    }

    /// Same file? Size and mtime must agree; inodes decide when both
    /// sides carry one.
    pub fn matches(&self, other: &FileSig) -> bool {
        if let (Some(a), Some(b)) = (self.inode, other.inode) {
            if a != b {
                return false;
            }
        }
        self.size == other.size && self.mtime == other.mtime
    }
}

/// Last-known signature per logical path; feeds move correlation.
pub type MetaMap = HashMap<String, FileSig>;

/// Whether a path is hidden from the pipeline.
pub fn is_ignored(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('.')
            || name.ends_with(".tmp")
            || IGNORED_COMPONENTS.contains(&name.as_ref())
    })
}

/// Collapse one debounce batch into final change events.
///
/// `prior` holds the last-known metadata of tracked paths; it is updated in
/// place so successive batches correlate against fresh state.
pub fn coalesce(root: &Path, events: &[RawEvent], prior: &mut MetaMap) -> Vec<ChangeEvent> {
    // 1. Drop ignored paths, resolve logical paths.
    let mut creates: BTreeMap<String, RawEvent> = BTreeMap::new();
    let mut modifies: BTreeMap<String, RawEvent> = BTreeMap::new();
    let mut removes: BTreeMap<String, RawEvent> = BTreeMap::new();
    let mut renames: Vec<(String, String, RawEvent)> = Vec::new();

    let logical = |p: &Path| -> Option<String> {
        if is_ignored(root, p) {
            return None;
        }
        LogicalPath::from_abs(root, p).ok().map(|l| l.as_str().to_string())
    };

    for event in events {
        let Some(key) = logical(&event.path) else { continue };
        if key.is_empty() {
            continue;
        }
        match event.kind {
            RawKind::Create => {
                creates.insert(key, event.clone());
            }
            RawKind::Modify => {
                modifies.insert(key, event.clone());
            }
            RawKind::Remove => {
                removes.insert(key, event.clone());
            }
            RawKind::Rename => {
                if let Some(dest) = &event.dest {
                    if let Some(dest_key) = logical(dest) {
                        renames.push((key, dest_key, event.clone()));
                    } else {
                        // Renamed into an ignored location: a delete.
                        removes.insert(key, event.clone());
                    }
                } else {
                    // Unpaired rename end; treat as modify of whichever side exists.
                    if event.path.exists() {
                        creates.insert(key, event.clone());
                    } else {
                        removes.insert(key, event.clone());
                    }
                }
            }
        }
    }

    // 2. created followed by modified collapses into created.
    for key in creates.keys() {
        modifies.remove(key);
    }

    // 3. create + remove in one window nets out against prior knowledge.
    let both: Vec<String> = creates
        .keys()
        .filter(|k| removes.contains_key(*k))
        .cloned()
        .collect();
    for key in both {
        creates.remove(&key);
        if !prior.contains_key(&key) {
            // Never existed as far as downstream knows.
            removes.remove(&key);
        }
    }

    // 4. Directory deletes subsume everything beneath them.
    let dir_removes: Vec<String> = removes
        .iter()
        .filter(|(_, e)| e.is_dir)
        .map(|(k, _)| k.clone())
        .collect();
    let under_removed_dir = |key: &str| {
        dir_removes
            .iter()
            .any(|d| key != d && key.starts_with(&format!("{d}/")))
    };
    removes.retain(|k, _| !under_removed_dir(k));
    modifies.retain(|k, _| !under_removed_dir(k));
    creates.retain(|k, _| !under_removed_dir(k));

    // 5. Correlate remove + create of identical files into a move.
    let mut moved: Vec<(String, String, bool)> = Vec::new();
    let mut claimed_creates: Vec<String> = Vec::new();
    for (src_key, _) in removes.clone() {
        let Some(known) = prior.get(&src_key).copied() else { continue };
        let candidate = creates
            .iter()
            .find(|(dest_key, e)| {
                !claimed_creates.contains(dest_key)
                    && e.meta.map_or(false, |sig| sig.matches(&known))
            })
            .map(|(k, e)| (k.clone(), e.is_dir));
        if let Some((dest_key, is_dir)) = candidate {
            claimed_creates.push(dest_key.clone());
            moved.push((src_key, dest_key, is_dir));
        }
    }
    for (src, dest, _) in &moved {
        removes.remove(src);
        creates.remove(dest);
        let meta = prior.remove(src);
        if let Some(m) = meta {
            prior.insert(dest.clone(), m);
        }
    }

    // 6. Assemble, deterministically ordered.
    let mut out = Vec::new();
    for (key, event) in &removes {
        prior.remove(key);
        out.push(change(root, ChangeKind::Deleted, key, None, event.is_dir));
    }
    for (src, dest, event) in &renames {
        if let Some(m) = prior.remove(src) {
            prior.insert(dest.clone(), m);
        }
        out.push(change(root, ChangeKind::Moved, src, Some(dest.clone()), event.is_dir));
    }
    for (src, dest, is_dir) in &moved {
        out.push(change(root, ChangeKind::Moved, src, Some(dest.clone()), *is_dir));
    }
    for (key, event) in &creates {
        if let Some(m) = event.meta {
            prior.insert(key.clone(), m);
        }
        out.push(change(root, ChangeKind::Created, key, None, event.is_dir));
    }
    for (key, event) in &modifies {
        if let Some(m) = event.meta {
            prior.insert(key.clone(), m);
        }
        out.push(change(root, ChangeKind::Modified, key, None, event.is_dir));
    }

    out.sort_by(|a, b| (order(a.kind), a.path.as_str()).cmp(&(order(b.kind), b.path.as_str())));
    out
}

fn order(kind: ChangeKind) -> u8 {
    match kind {
        ChangeKind::Deleted => 0,
        ChangeKind::Moved => 1,
        ChangeKind::Created => 2,
        ChangeKind::Modified => 3,
    }
}

fn change(
    root: &Path,
    kind: ChangeKind,
    key: &str,
    dest: Option<String>,
    is_dir: bool,
) -> ChangeEvent {
    let path = LogicalPath::parse(key).unwrap_or_else(|_| LogicalPath::root());
    ChangeEvent {
        kind,
        abs_path: path.to_abs(root),
        path,
        is_dir,
        dest_path: dest.and_then(|d| LogicalPath::parse(&d).ok()),
    }
}

/// Stat helper for the bridge thread.
fn stat_meta(path: &Path) -> Option<FileSig> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if meta.file_type().is_symlink() {
        return None;
    }
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)?;
    Some(FileSig::with_inode(meta.len(), mtime, inode_of(&meta)))
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Debouncer bridge: watches the managed root and emits coalesced events.
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    prior: Arc<Mutex<MetaMap>>,
}

impl FileWatcher {
    /// Start watching `root`, delivering events into `event_tx`.
    pub fn new(
        root: PathBuf,
        event_tx: tokio_mpsc::Sender<ChangeEvent>,
        window: Duration,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let prior = Arc::new(Mutex::new(MetaMap::new()));

        let thread_root = root.clone();
        let thread_prior = Arc::clone(&prior);
        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                handle_batch(&thread_root, result, &event_tx, &thread_prior);
            }
        });

        let debouncer = new_debouncer(window, None, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })?;

        Ok(Self { debouncer, prior })
    }

    /// Begin recursive watching.
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        debug!("watching {:?}", path);
        self.debouncer.watch(path, RecursiveMode::Recursive)
    }

    pub fn unwatch(&mut self, path: &Path) -> Result<(), notify::Error> {
        self.debouncer.unwatch(path)
    }

    /// Seed the move-correlation table, typically from the state store's
    /// file metadata after the initial scan. The state store keeps no
    /// inodes, so seeded signatures match on size and mtime alone until a
    /// live event refreshes them.
    pub fn prime(&self, entries: impl IntoIterator<Item = (String, FileSig)>) {
        let mut prior = self.prior.lock().expect("meta map poisoned");
        prior.extend(entries);
    }
}

fn handle_batch(
    root: &Path,
    result: DebounceEventResult,
    event_tx: &tokio_mpsc::Sender<ChangeEvent>,
    prior: &Arc<Mutex<MetaMap>>,
) {
    let events = match result {
        Ok(events) => events,
        Err(errors) => {
            for e in errors {
                error!("watch error: {e}");
            }
            return;
        }
    };

    let raw: Vec<RawEvent> = events.iter().filter_map(convert_debounced).collect();
    if raw.is_empty() {
        return;
    }

    let changes = {
        let mut prior = prior.lock().expect("meta map poisoned");
        coalesce(root, &raw, &mut prior)
    };

    for change in changes {
        if event_tx.blocking_send(change).is_err() {
            warn!("change event channel closed");
            return;
        }
    }
}

fn convert_debounced(event: &notify_debouncer_full::DebouncedEvent) -> Option<RawEvent> {
    use notify_debouncer_full::notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
    use notify_debouncer_full::notify::EventKind;

    let path = event.paths.first()?.clone();
    let meta = stat_meta(&path);
    let stat_dir = || path.is_dir();

    match &event.kind {
        EventKind::Create(kind) => Some(RawEvent {
            kind: RawKind::Create,
            is_dir: matches!(kind, CreateKind::Folder) || stat_dir(),
            dest: None,
            meta,
            path,
        }),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let dest = if matches!(mode, RenameMode::Both) {
                event.paths.get(1).cloned()
            } else {
                None
            };
            Some(RawEvent {
                kind: RawKind::Rename,
                is_dir: dest.as_deref().map(Path::is_dir).unwrap_or_else(stat_dir),
                dest,
                meta,
                path,
            })
        }
        EventKind::Modify(_) => Some(RawEvent {
            kind: RawKind::Modify,
            is_dir: stat_dir(),
            dest: None,
            meta,
            path,
        }),
        EventKind::Remove(kind) => Some(RawEvent {
            kind: RawKind::Remove,
            is_dir: matches!(kind, RemoveKind::Folder),
            dest: None,
            meta: None,
            path,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/root")
    }

    fn raw(kind: RawKind, rel: &str, is_dir: bool, meta: Option<FileSig>) -> RawEvent {
        RawEvent {
            kind,
            path: root().join(rel),
            dest: None,
            is_dir,
            meta,
        }
    }

    fn sig(size: u64, mtime: i64) -> FileSig {
        FileSig::new(size, mtime)
    }

    #[test]
    fn create_then_modify_collapses_to_create() {
        let events = vec![
            raw(RawKind::Create, "docs/a.txt", false, Some(sig(5, 100))),
            raw(RawKind::Modify, "docs/a.txt", false, Some(sig(7, 101))),
        ];
        let mut prior = MetaMap::new();
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Created);
        assert_eq!(out[0].path.as_str(), "docs/a.txt");
    }

    #[test]
    fn modify_burst_collapses() {
        let events = vec![
            raw(RawKind::Modify, "docs/a.txt", false, Some(sig(5, 100))),
            raw(RawKind::Modify, "docs/a.txt", false, Some(sig(6, 101))),
            raw(RawKind::Modify, "docs/a.txt", false, Some(sig(7, 102))),
        ];
        let mut prior = MetaMap::new();
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn hidden_and_ignored_paths_suppressed() {
        let events = vec![
            raw(RawKind::Create, ".git/config", false, None),
            raw(RawKind::Create, "docs/.hidden", false, None),
            raw(RawKind::Modify, "node_modules/x/y.js", false, None),
            raw(RawKind::Create, "docs/visible.txt", false, Some(sig(1, 1))),
        ];
        let mut prior = MetaMap::new();
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path.as_str(), "docs/visible.txt");
    }

    #[test]
    fn directory_delete_subsumes_children() {
        let mut prior = MetaMap::new();
        prior.insert("docs/a.txt".into(), sig(5, 100));
        let events = vec![
            raw(RawKind::Remove, "docs/a.txt", false, None),
            raw(RawKind::Remove, "docs/sub/b.txt", false, None),
            raw(RawKind::Remove, "docs", true, None),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Deleted);
        assert_eq!(out[0].path.as_str(), "docs");
        assert!(out[0].is_dir);
    }

    #[test]
    fn delete_create_identical_meta_becomes_move() {
        let mut prior = MetaMap::new();
        prior.insert("docs/old.txt".into(), sig(42, 900));
        let events = vec![
            raw(RawKind::Remove, "docs/old.txt", false, None),
            raw(RawKind::Create, "docs/new.txt", false, Some(sig(42, 900))),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Moved);
        assert_eq!(out[0].path.as_str(), "docs/old.txt");
        assert_eq!(out[0].dest_path.as_ref().unwrap().as_str(), "docs/new.txt");
        // The table follows the file.
        assert!(prior.contains_key("docs/new.txt"));
        assert!(!prior.contains_key("docs/old.txt"));
    }

    #[test]
    fn delete_create_different_bytes_stays_separate() {
        let mut prior = MetaMap::new();
        prior.insert("docs/old.txt".into(), sig(42, 900));
        let events = vec![
            raw(RawKind::Remove, "docs/old.txt", false, None),
            raw(RawKind::Create, "docs/new.txt", false, Some(sig(43, 901))),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, ChangeKind::Deleted);
        assert_eq!(out[1].kind, ChangeKind::Created);
    }

    #[test]
    fn inode_mismatch_blocks_move_correlation() {
        // Same size and mtime, but the platform says these are different
        // files: a coincidence, not a rename.
        let mut prior = MetaMap::new();
        prior.insert("docs/old.txt".into(), FileSig::with_inode(42, 900, Some(7)));
        let events = vec![
            raw(RawKind::Remove, "docs/old.txt", false, None),
            raw(
                RawKind::Create,
                "docs/new.txt",
                false,
                Some(FileSig::with_inode(42, 900, Some(8))),
            ),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, ChangeKind::Deleted);
        assert_eq!(out[1].kind, ChangeKind::Created);
    }

    #[test]
    fn matching_inodes_confirm_move() {
        let mut prior = MetaMap::new();
        prior.insert("docs/old.txt".into(), FileSig::with_inode(42, 900, Some(7)));
        let events = vec![
            raw(RawKind::Remove, "docs/old.txt", false, None),
            raw(
                RawKind::Create,
                "docs/new.txt",
                false,
                Some(FileSig::with_inode(42, 900, Some(7))),
            ),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Moved);
    }

    #[test]
    fn missing_inode_falls_back_to_size_and_mtime() {
        // Seeded signatures (from the state store) carry no inode; the
        // created side does. Size+mtime still correlate.
        let mut prior = MetaMap::new();
        prior.insert("docs/old.txt".into(), sig(42, 900));
        let events = vec![
            raw(RawKind::Remove, "docs/old.txt", false, None),
            raw(
                RawKind::Create,
                "docs/new.txt",
                false,
                Some(FileSig::with_inode(42, 900, Some(9))),
            ),
        ];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Moved);
    }

    #[test]
    fn create_then_remove_of_unknown_path_nets_to_nothing() {
        let events = vec![
            raw(RawKind::Create, "docs/tmp.txt", false, Some(sig(1, 1))),
            raw(RawKind::Remove, "docs/tmp.txt", false, None),
        ];
        let mut prior = MetaMap::new();
        let out = coalesce(&root(), &events, &mut prior);
        assert!(out.is_empty());
    }

    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            raw(RawKind::Create, "docs/b.txt", false, Some(sig(2, 2))),
            raw(RawKind::Modify, "docs/a.txt", false, Some(sig(1, 1))),
            raw(RawKind::Remove, "docs/c.txt", false, None),
            raw(RawKind::Create, "docs/b.txt", false, Some(sig(2, 2))),
        ];
        let mut prior1 = MetaMap::new();
        prior1.insert("docs/c.txt".into(), sig(9, 9));
        let mut prior2 = prior1.clone();

        let out1 = coalesce(&root(), &events, &mut prior1);
        let out2 = coalesce(&root(), &events, &mut prior2);
        assert_eq!(out1, out2);
        assert_eq!(prior1, prior2);
    }

    #[test]
    fn explicit_rename_reported_as_move() {
        let mut prior = MetaMap::new();
        prior.insert("a/b.txt".into(), sig(10, 10));
        let events = vec![RawEvent {
            kind: RawKind::Rename,
            path: root().join("a/b.txt"),
            dest: Some(root().join("a/c.txt")),
            is_dir: false,
            meta: None,
        }];
        let out = coalesce(&root(), &events, &mut prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Moved);
        assert_eq!(out[0].dest_path.as_ref().unwrap().as_str(), "a/c.txt");
        assert!(prior.contains_key("a/c.txt"));
    }
}
