//! Asset preloading with progress tracking
//!
//! Every asset in a manifest loads on its own worker thread. Results come
//! back over a channel tagged with the token of the batch that requested
//! them; results carrying an older token are dropped, so starting a new
//! batch silently supersedes the previous one.
//!
//! A failed load still counts toward progress. The gate opens once every
//! item has resolved, whether it loaded or not.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crate::{MediaError, Result};

/// What kind of asset an id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Audio,
    Texture,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Audio => write!(f, "audio"),
            AssetKind::Texture => write!(f, "texture"),
        }
    }
}

/// Loads the bytes behind an asset id. Called from worker threads.
pub trait AssetLoader: Send + Sync + 'static {
    fn load(&self, kind: AssetKind, id: &str) -> Result<Arc<[u8]>>;
}

/// Audio and texture ids required by the upcoming scene, each listed once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetManifest {
    pub audio: Vec<String>,
    pub textures: Vec<String>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an audio id unless it is empty or already listed
    pub fn push_audio(&mut self, id: &str) {
        if !id.is_empty() && !self.audio.iter().any(|a| a == id) {
            self.audio.push(id.to_string());
        }
    }

    /// Add a texture id unless it is empty or already listed
    pub fn push_texture(&mut self, id: &str) {
        if !id.is_empty() && !self.textures.iter().any(|t| t == id) {
            self.textures.push(id.to_string());
        }
    }

    pub fn total(&self) -> usize {
        self.audio.len() + self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn items(&self) -> impl Iterator<Item = (AssetKind, &str)> {
        self.audio
            .iter()
            .map(|a| (AssetKind::Audio, a.as_str()))
            .chain(self.textures.iter().map(|t| (AssetKind::Texture, t.as_str())))
    }
}

/// A single asset that could not be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub kind: AssetKind,
    pub id: String,
    pub reason: String,
}

/// Snapshot of a batch's progress
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadProgress {
    pub loaded: usize,
    pub total: usize,
    pub errors: Vec<LoadFailure>,
}

impl PreloadProgress {
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }

    /// 0.0 – 100.0; an empty batch is 100%
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.loaded as f32 / self.total as f32 * 100.0
        }
    }
}

/// Everything a finished batch loaded successfully
#[derive(Debug, Clone, Default)]
pub struct LoadedAssets {
    pub audio: HashMap<String, Arc<[u8]>>,
    pub textures: HashMap<String, Arc<[u8]>>,
}

/// Identifies one `begin` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreloadToken(u64);

struct LoadMessage {
    token: PreloadToken,
    kind: AssetKind,
    id: String,
    result: Result<Arc<[u8]>>,
}

struct Batch {
    token: PreloadToken,
    pending: HashSet<(AssetKind, String)>,
    progress: PreloadProgress,
    assets: LoadedAssets,
    elapsed_ms: u64,
    /// Set once the assets were handed out
    taken: bool,
}

pub struct AssetPreloader {
    loader: Arc<dyn AssetLoader>,
    tx: Sender<LoadMessage>,
    rx: Receiver<LoadMessage>,
    generation: u64,
    batch: Option<Batch>,
    timeout_ms: Option<u64>,
}

impl AssetPreloader {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            loader,
            tx,
            rx,
            generation: 0,
            batch: None,
            timeout_ms: None,
        }
    }

    /// Count items still outstanding after `timeout_ms` as failed
    pub fn with_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Start loading a manifest, superseding any batch in flight.
    /// Returns the initial progress (already complete for an empty manifest).
    pub fn begin(&mut self, manifest: &AssetManifest) -> PreloadProgress {
        self.generation += 1;
        let token = PreloadToken(self.generation);
        let total = manifest.total();

        let mut batch = Batch {
            token,
            pending: HashSet::new(),
            progress: PreloadProgress {
                loaded: 0,
                total,
                errors: Vec::new(),
            },
            assets: LoadedAssets::default(),
            elapsed_ms: 0,
            taken: false,
        };

        tracing::info!(
            "Preloading {} audio + {} texture assets",
            manifest.audio.len(),
            manifest.textures.len()
        );

        for (kind, id) in manifest.items() {
            batch.pending.insert((kind, id.to_string()));
            let loader = Arc::clone(&self.loader);
            let tx = self.tx.clone();
            let owned_id = id.to_string();
            let spawned = std::thread::Builder::new()
                .name(format!("preload-{}", kind))
                .spawn(move || {
                    let result = loader.load(kind, &owned_id);
                    // The preloader may be gone; nothing to report to then
                    let _ = tx.send(LoadMessage {
                        token,
                        kind,
                        id: owned_id,
                        result,
                    });
                });
            if let Err(e) = spawned {
                Self::resolve(&mut batch, kind, id, Err(MediaError::Io(e)));
            }
        }

        if batch.progress.is_complete() {
            tracing::info!("Preload complete ({} items)", total);
        }
        let progress = batch.progress.clone();
        self.batch = Some(batch);
        progress
    }

    /// Drop the current batch; its in-flight results will be ignored
    pub fn cancel(&mut self) {
        if self.batch.take().is_some() {
            self.generation += 1;
            tracing::debug!("Preload batch cancelled");
        }
    }

    /// Collect finished loads. Returns one snapshot per item resolved.
    pub fn update(&mut self, dt_ms: u32) -> Vec<PreloadProgress> {
        let mut updates = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if let Some(p) = self.accept(msg) {
                        updates.push(p);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if let (Some(batch), Some(timeout)) = (self.batch.as_mut(), self.timeout_ms) {
            batch.elapsed_ms += dt_ms as u64;
            if !batch.progress.is_complete() && batch.elapsed_ms >= timeout {
                let stuck: Vec<(AssetKind, String)> = batch.pending.iter().cloned().collect();
                for (kind, id) in stuck {
                    Self::resolve(batch, kind, &id, Err(MediaError::TimedOut(id.clone())));
                    updates.push(batch.progress.clone());
                }
            }
        }
        updates
    }

    /// Block until the current batch completes. Without a timeout this
    /// waits forever on a load that never resolves.
    pub fn wait(&mut self) -> Option<PreloadProgress> {
        loop {
            let batch = self.batch.as_ref()?;
            if batch.progress.is_complete() {
                return Some(batch.progress.clone());
            }
            let msg = match self.timeout_ms {
                Some(timeout) => {
                    let left = timeout.saturating_sub(batch.elapsed_ms);
                    let started = std::time::Instant::now();
                    let received = self.rx.recv_timeout(Duration::from_millis(left));
                    let waited = started.elapsed().as_millis() as u32;
                    match received {
                        Ok(msg) => {
                            if let Some(batch) = self.batch.as_mut() {
                                batch.elapsed_ms += waited as u64;
                            }
                            msg
                        }
                        Err(_) => {
                            self.update(waited.max(1));
                            continue;
                        }
                    }
                }
                None => self.rx.recv().ok()?,
            };
            self.accept(msg);
        }
    }

    pub fn token(&self) -> Option<PreloadToken> {
        self.batch.as_ref().map(|b| b.token)
    }

    pub fn progress(&self) -> Option<&PreloadProgress> {
        self.batch.as_ref().map(|b| &b.progress)
    }

    pub fn is_complete(&self) -> bool {
        self.batch
            .as_ref()
            .is_some_and(|b| b.progress.is_complete())
    }

    /// Hand out the loaded assets of a completed batch (once)
    pub fn take_assets(&mut self) -> Option<LoadedAssets> {
        let batch = self.batch.as_mut()?;
        if !batch.progress.is_complete() || batch.taken {
            return None;
        }
        batch.taken = true;
        Some(std::mem::take(&mut batch.assets))
    }

    fn accept(&mut self, msg: LoadMessage) -> Option<PreloadProgress> {
        let batch = match self.batch.as_mut() {
            Some(batch) if batch.token == msg.token => batch,
            _ => {
                tracing::debug!("Dropping stale load result for {} '{}'", msg.kind, msg.id);
                return None;
            }
        };
        if Self::resolve(batch, msg.kind, &msg.id, msg.result) {
            Some(batch.progress.clone())
        } else {
            None
        }
    }

    /// Count one item as resolved. Returns false if it was not pending.
    fn resolve(
        batch: &mut Batch,
        kind: AssetKind,
        id: &str,
        result: Result<Arc<[u8]>>,
    ) -> bool {
        if !batch.pending.remove(&(kind, id.to_string())) {
            return false;
        }
        match result {
            Ok(bytes) => {
                tracing::debug!("Loaded {} '{}' ({} bytes)", kind, id, bytes.len());
                let map = match kind {
                    AssetKind::Audio => &mut batch.assets.audio,
                    AssetKind::Texture => &mut batch.assets.textures,
                };
                map.insert(id.to_string(), bytes);
            }
            Err(e) => {
                tracing::warn!("Failed to load {} '{}': {}", kind, id, e);
                batch.progress.errors.push(LoadFailure {
                    kind,
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        batch.progress.loaded += 1;
        if batch.progress.is_complete() {
            tracing::info!(
                "Preload complete: {}/{} ({} failed)",
                batch.progress.loaded,
                batch.progress.total,
                batch.progress.errors.len()
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Behavior {
        Bytes(Vec<u8>),
        Fail,
        Slow(u64),
        Hang,
    }

    struct MemoryLoader {
        items: HashMap<String, Behavior>,
    }

    impl MemoryLoader {
        fn new(items: Vec<(&str, Behavior)>) -> Arc<Self> {
            Arc::new(Self {
                items: items
                    .into_iter()
                    .map(|(id, b)| (id.to_string(), b))
                    .collect(),
            })
        }
    }

    impl AssetLoader for MemoryLoader {
        fn load(&self, _kind: AssetKind, id: &str) -> Result<Arc<[u8]>> {
            match self.items.get(id) {
                Some(Behavior::Bytes(b)) => Ok(Arc::from(b.clone())),
                Some(Behavior::Fail) => Err(MediaError::Decode {
                    id: id.to_string(),
                    reason: "corrupt".to_string(),
                }),
                Some(Behavior::Slow(ms)) => {
                    std::thread::sleep(Duration::from_millis(*ms));
                    Ok(Arc::from(vec![0u8]))
                }
                Some(Behavior::Hang) => loop {
                    std::thread::park();
                },
                None => Err(MediaError::NotFound(id.to_string())),
            }
        }
    }

    fn manifest(audio: &[&str], textures: &[&str]) -> AssetManifest {
        let mut m = AssetManifest::new();
        for a in audio {
            m.push_audio(a);
        }
        for t in textures {
            m.push_texture(t);
        }
        m
    }

    #[test]
    fn empty_manifest_completes_immediately() {
        let mut pre = AssetPreloader::new(MemoryLoader::new(vec![]));
        let progress = pre.begin(&AssetManifest::new());
        assert!(progress.is_complete());
        assert_eq!(progress.loaded, 0);
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percent(), 100.0);
        assert!(pre.is_complete());
        assert!(pre.take_assets().is_some());
    }

    #[test]
    fn manifest_deduplicates() {
        let m = manifest(&["a.mp3", "a.mp3", ""], &["t.png", "t.png"]);
        assert_eq!(m.total(), 2);
    }

    #[test]
    fn failures_still_count_toward_completion() {
        let loader = MemoryLoader::new(vec![
            ("a.mp3", Behavior::Bytes(vec![1, 2])),
            ("b.mp3", Behavior::Fail),
            ("t.png", Behavior::Bytes(vec![3])),
        ]);
        let mut pre = AssetPreloader::new(loader);
        pre.begin(&manifest(&["a.mp3", "b.mp3", "missing.mp3"], &["t.png"]));
        let progress = pre.wait().unwrap();

        assert_eq!(progress.loaded, 4);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.errors.len(), 2);
        assert!(progress.errors.iter().any(|e| e.id == "b.mp3"));
        assert!(progress.errors.iter().any(|e| e.id == "missing.mp3"));

        let assets = pre.take_assets().unwrap();
        assert!(assets.audio.contains_key("a.mp3"));
        assert!(!assets.audio.contains_key("b.mp3"));
        assert!(assets.textures.contains_key("t.png"));
        // handed out only once
        assert!(pre.take_assets().is_none());
    }

    #[test]
    fn update_reports_each_item_once() {
        let loader = MemoryLoader::new(vec![
            ("a", Behavior::Bytes(vec![1])),
            ("b", Behavior::Bytes(vec![2])),
        ]);
        let mut pre = AssetPreloader::new(loader);
        pre.begin(&manifest(&["a", "b"], &[]));

        let mut snapshots = Vec::new();
        for _ in 0..500 {
            snapshots.extend(pre.update(1));
            if pre.is_complete() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].loaded, 1);
        assert_eq!(snapshots[1].loaded, 2);
    }

    #[test]
    fn new_batch_suppresses_stale_results() {
        let loader = MemoryLoader::new(vec![
            ("old1", Behavior::Slow(30)),
            ("old2", Behavior::Slow(30)),
            ("new", Behavior::Bytes(vec![9])),
        ]);
        let mut pre = AssetPreloader::new(loader);
        let first = {
            pre.begin(&manifest(&["old1", "old2"], &[]));
            pre.token()
        };
        pre.begin(&manifest(&["new"], &[]));
        assert_ne!(first, pre.token());

        let progress = pre.wait().unwrap();
        assert_eq!(progress.total, 1);

        // let the old loads land, then make sure they changed nothing
        std::thread::sleep(Duration::from_millis(80));
        assert!(pre.update(16).is_empty());
        let progress = pre.progress().unwrap();
        assert_eq!(progress.loaded, 1);
        assert!(progress.errors.is_empty());
        let assets = pre.take_assets().unwrap();
        assert_eq!(assets.audio.len(), 1);
        assert!(assets.audio.contains_key("new"));
    }

    #[test]
    fn cancel_drops_batch() {
        let loader = MemoryLoader::new(vec![("a", Behavior::Slow(10))]);
        let mut pre = AssetPreloader::new(loader);
        pre.begin(&manifest(&["a"], &[]));
        pre.cancel();
        assert!(pre.progress().is_none());
        std::thread::sleep(Duration::from_millis(40));
        assert!(pre.update(16).is_empty());
        assert!(!pre.is_complete());
    }

    #[test]
    fn timeout_resolves_hung_loads() {
        let loader = MemoryLoader::new(vec![
            ("ok", Behavior::Bytes(vec![1])),
            ("stuck", Behavior::Hang),
        ]);
        let mut pre = AssetPreloader::new(loader).with_timeout(Some(100));
        pre.begin(&manifest(&["ok", "stuck"], &[]));
        std::thread::sleep(Duration::from_millis(20));

        for _ in 0..20 {
            pre.update(16);
            if pre.is_complete() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let progress = pre.progress().unwrap();
        assert!(progress.is_complete());
        assert_eq!(progress.loaded, 2);
        assert_eq!(progress.errors.len(), 1);
        assert_eq!(progress.errors[0].id, "stuck");
    }
}
