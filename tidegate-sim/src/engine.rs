//! In-process torrent engine backed by a [`SeedCatalog`].
//!
//! Torrents added by magnet link behave like real swarm downloads: metadata
//! shows up after a delay, content arrives piece by piece in order, and reads
//! of missing bytes block until the covering piece lands. Hashes nobody
//! seeded never obtain metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tidegate_core::torrent::{
    EngineBuilder, EngineError, EngineSettings, FileReader, InfoHash, MagnetLink, TorrentEngine,
    TorrentFile, TorrentHandle, TorrentMetadata,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::catalog::{SeedCatalog, SeedTorrent};
use crate::config::SimulationConfig;

/// Simulated swarm engine.
pub struct SimulatedEngine {
    catalog: SeedCatalog,
    config: SimulationConfig,
    settings: EngineSettings,
    torrents: Mutex<HashMap<InfoHash, Arc<SimulatedTorrent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    rng: Mutex<ChaCha8Rng>,
    shutdown: watch::Sender<bool>,
}

impl SimulatedEngine {
    /// Creates an engine serving content from `catalog`.
    pub fn new(catalog: SeedCatalog, config: SimulationConfig, settings: EngineSettings) -> Self {
        let rng = match config.deterministic_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            catalog,
            config,
            settings,
            torrents: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            rng: Mutex::new(rng),
            shutdown,
        }
    }

    /// Seeds content into the engine's catalog.
    pub fn seed(&self, torrent: SeedTorrent) -> MagnetLink {
        self.catalog.seed(torrent)
    }

    /// Seeds every entry of `dir`, see [`SeedCatalog::seed_directory`].
    ///
    /// # Errors
    /// - `std::io::Error` - Failed to read the directory
    pub async fn seed_directory(&self, dir: &Path) -> Result<Vec<MagnetLink>, std::io::Error> {
        self.catalog.seed_directory(dir).await
    }

    pub fn catalog(&self) -> &SeedCatalog {
        &self.catalog
    }

    /// Torrent added for `info_hash`, if any.
    pub fn torrent(&self, info_hash: &InfoHash) -> Option<Arc<SimulatedTorrent>> {
        self.torrents.lock().get(info_hash).cloned()
    }

    /// Halts downloading of a torrent. Returns false for unknown torrents.
    pub fn pause_downloads(&self, info_hash: &InfoHash) -> bool {
        self.torrent(info_hash)
            .map(|t| t.paused.send_replace(true))
            .is_some()
    }

    /// Resumes a paused torrent. Returns false for unknown torrents.
    pub fn resume_downloads(&self, info_hash: &InfoHash) -> bool {
        self.torrent(info_hash)
            .map(|t| t.paused.send_replace(false))
            .is_some()
    }

    /// Makes the stored metadata of a torrent undecodable.
    pub fn corrupt_metadata(&self, info_hash: &InfoHash) -> bool {
        self.torrent(info_hash)
            .map(|t| t.corrupt.store(true, Ordering::SeqCst))
            .is_some()
    }

    fn pick_peer_count(&self) -> usize {
        let (low, high) = self.config.peers;
        self.rng.lock().random_range(low.min(high)..=high.max(low))
    }
}

#[async_trait]
impl TorrentEngine for SimulatedEngine {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        if *self.shutdown.borrow() {
            return Err(EngineError::EngineShutdown);
        }

        let torrent = {
            let mut torrents = self.torrents.lock();
            if let Some(existing) = torrents.get(&magnet.info_hash) {
                return Ok(Arc::clone(existing) as Arc<dyn TorrentHandle>);
            }

            let torrent = Arc::new(SimulatedTorrent::new(
                magnet.info_hash,
                self.config.start_paused,
                self.shutdown.subscribe(),
            ));
            torrents.insert(magnet.info_hash, Arc::clone(&torrent));
            torrent
        };

        match self.catalog.get(&magnet.info_hash) {
            Some(seed) => {
                debug!(info_hash = %magnet.info_hash, "Added seeded torrent");
                let task = tokio::spawn(simulate(
                    Arc::clone(&torrent),
                    seed,
                    self.config.clone(),
                    self.settings.clone(),
                    self.pick_peer_count(),
                ));
                self.tasks.lock().push(task);
            }
            None => {
                debug!(info_hash = %magnet.info_hash, "Added torrent without seeders");
            }
        }

        Ok(torrent as Arc<dyn TorrentHandle>)
    }

    async fn torrents(&self) -> Vec<Arc<dyn TorrentHandle>> {
        self.torrents
            .lock()
            .values()
            .map(|t| Arc::clone(t) as Arc<dyn TorrentHandle>)
            .collect()
    }

    async fn close(&self) -> Vec<EngineError> {
        self.shutdown.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let dropped = {
            let mut torrents = self.torrents.lock();
            let count = torrents.len();
            torrents.clear();
            count
        };
        info!(torrents = dropped, "Simulated engine closed");
        Vec::new()
    }
}

/// Drives one torrent from "added" to "complete".
async fn simulate(
    torrent: Arc<SimulatedTorrent>,
    seed: Arc<SeedTorrent>,
    config: SimulationConfig,
    settings: EngineSettings,
    peers: usize,
) {
    if !config.metadata_delay.is_zero() {
        tokio::time::sleep(config.metadata_delay).await;
    }
    torrent.metadata_arrived(Arc::clone(&seed), peers);

    let total = seed.total_length();
    let storage = settings.storage_dir.join(torrent.info_hash.to_string());
    let mut paused = torrent.paused.subscribe();

    loop {
        let done = *torrent.downloaded.borrow();
        torrent.persist_completed(&storage, done).await;
        if done >= total {
            break;
        }

        if paused.wait_for(|p| !*p).await.is_err() {
            return;
        }

        let step = match config.download_rate {
            Some(_) => (config.piece_size.max(1) as u64).min(total - done),
            None => total - done,
        };
        let delay = config.transfer_time(step as usize);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // A pause requested mid-piece still lets the piece in flight land.
        torrent.downloaded.send_modify(|d| *d = (*d + step).min(total));
        if settings.debug {
            debug!(info_hash = %torrent.info_hash, downloaded = done + step, total, "Piece complete");
        } else {
            trace!(info_hash = %torrent.info_hash, downloaded = done + step, total, "Piece complete");
        }
    }

    torrent.finished.send_replace(true);
    info!(info_hash = %torrent.info_hash, name = %seed.name, "Download complete");
}

/// A torrent tracked by [`SimulatedEngine`].
pub struct SimulatedTorrent {
    info_hash: InfoHash,
    content: watch::Sender<Option<Arc<SeedTorrent>>>,
    files: RwLock<Vec<Arc<SimulatedFile>>>,
    downloaded: watch::Sender<u64>,
    paused: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    peers: AtomicUsize,
    corrupt: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl SimulatedTorrent {
    fn new(info_hash: InfoHash, paused: bool, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            info_hash,
            content: watch::channel(None).0,
            files: RwLock::new(Vec::new()),
            downloaded: watch::channel(0).0,
            paused: watch::channel(paused).0,
            finished: watch::channel(false).0,
            peers: AtomicUsize::new(0),
            corrupt: AtomicBool::new(false),
            shutdown,
        }
    }

    fn metadata_arrived(&self, seed: Arc<SeedTorrent>, peers: usize) {
        let mut offset = 0u64;
        let files = seed
            .files
            .iter()
            .map(|f| {
                let file = Arc::new(SimulatedFile {
                    path: f.path.clone(),
                    offset,
                    data: f.data.clone(),
                    downloaded: self.downloaded.subscribe(),
                    shutdown: self.shutdown.clone(),
                    persisted: AtomicBool::new(false),
                });
                offset += f.data.len() as u64;
                file
            })
            .collect();

        *self.files.write() = files;
        self.peers.store(peers, Ordering::SeqCst);
        self.content.send_replace(Some(seed));
        debug!(info_hash = %self.info_hash, peers, "Metadata arrived");
    }

    async fn persist_completed(&self, storage: &Path, downloaded: u64) {
        let files: Vec<_> = self.files.read().iter().cloned().collect();
        for file in files {
            if file.offset + file.data.len() as u64 > downloaded
                || file.persisted.swap(true, Ordering::SeqCst)
            {
                continue;
            }

            let target = storage.join(&file.path);
            if let Err(e) = write_file(&target, &file.data).await {
                warn!(path = %target.display(), error = %e, "Could not persist completed file");
            }
        }
    }

    /// Suspends until every file has been downloaded and persisted.
    ///
    /// # Errors
    /// - `EngineError::EngineShutdown` - Engine closed first
    pub async fn wait_for_completion(&self) -> Result<(), EngineError> {
        let mut finished = self.finished.subscribe();
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            res = async { finished.wait_for(|f| *f).await.map(|_| ()) } => {
                res.map_err(|_| EngineError::EngineShutdown)
            }
            _ = async { shutdown.wait_for(|s| *s).await.map(|_| ()) } => Err(EngineError::EngineShutdown),
        }
    }

    /// Bytes downloaded across the whole torrent.
    pub fn downloaded(&self) -> u64 {
        *self.downloaded.borrow()
    }
}

async fn write_file(target: &Path, data: &Bytes) -> Result<(), std::io::Error> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, data).await
}

#[async_trait]
impl TorrentHandle for SimulatedTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn wait_for_metadata(&self) -> Result<(), EngineError> {
        let mut content = self.content.subscribe();
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            res = async { content.wait_for(Option::is_some).await.map(|_| ()) } => {
                res.map_err(|_| EngineError::EngineShutdown)
            }
            _ = async { shutdown.wait_for(|s| *s).await.map(|_| ()) } => Err(EngineError::EngineShutdown),
        }
    }

    fn metadata(&self) -> Result<TorrentMetadata, EngineError> {
        let Some(seed) = self.content.borrow().clone() else {
            return Err(EngineError::MetadataUnavailable {
                info_hash: self.info_hash,
            });
        };
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(EngineError::MetadataDecode {
                info_hash: self.info_hash,
                reason: "info dictionary does not match info hash".to_string(),
            });
        }
        Ok(seed.metadata())
    }

    fn files(&self) -> Vec<Arc<dyn TorrentFile>> {
        self.files
            .read()
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn TorrentFile>)
            .collect()
    }

    fn peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }
}

struct SimulatedFile {
    path: String,
    /// Offset of the file within the torrent's concatenated content
    offset: u64,
    data: Bytes,
    downloaded: watch::Receiver<u64>,
    shutdown: watch::Receiver<bool>,
    persisted: AtomicBool,
}

impl TorrentFile for SimulatedFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn bytes_completed(&self) -> u64 {
        self.downloaded
            .borrow()
            .saturating_sub(self.offset)
            .min(self.length())
    }

    fn reader(&self) -> Arc<dyn FileReader> {
        Arc::new(SimulatedReader {
            offset: self.offset,
            data: self.data.clone(),
            downloaded: self.downloaded.clone(),
            shutdown: self.shutdown.clone(),
        })
    }
}

struct SimulatedReader {
    offset: u64,
    data: Bytes,
    downloaded: watch::Receiver<u64>,
    shutdown: watch::Receiver<bool>,
}

#[async_trait]
impl FileReader for SimulatedReader {
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, EngineError> {
        let file_size = self.size();
        let end = offset
            .checked_add(length as u64)
            .filter(|end| *end <= file_size)
            .ok_or(EngineError::InvalidRange {
                offset,
                length,
                file_size,
            })?;

        let needed = self.offset + end;
        let mut downloaded = self.downloaded.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            res = async { downloaded.wait_for(|d| *d >= needed).await.map(|_| ()) } => {
                res.map_err(|_| EngineError::EngineShutdown)?;
            }
            _ = async { shutdown.wait_for(|s| *s).await.map(|_| ()) } => {
                return Err(EngineError::EngineShutdown);
            }
        }

        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Builds [`SimulatedEngine`]s for a gateway.
///
/// Keeps the most recently built engine reachable so callers can seed
/// content or use the test hooks after the gateway opened.
pub struct SimulatedEngineBuilder {
    catalog: SeedCatalog,
    config: SimulationConfig,
    built: Mutex<Option<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineBuilder {
    pub fn new(catalog: SeedCatalog, config: SimulationConfig) -> Self {
        Self {
            catalog,
            config,
            built: Mutex::new(None),
        }
    }

    /// Engine produced by the last successful `build`.
    pub fn engine(&self) -> Option<Arc<SimulatedEngine>> {
        self.built.lock().clone()
    }
}

#[async_trait]
impl EngineBuilder for SimulatedEngineBuilder {
    async fn build(&self, settings: EngineSettings) -> Result<Arc<dyn TorrentEngine>, EngineError> {
        tokio::fs::create_dir_all(&settings.storage_dir).await?;
        info!(
            storage = %settings.storage_dir.display(),
            port = settings.listen_port,
            seeded = self.catalog.len(),
            "Starting simulated engine"
        );

        let engine = Arc::new(SimulatedEngine::new(
            self.catalog.clone(),
            self.config.clone(),
            settings,
        ));
        *self.built.lock() = Some(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Settings for engines used outside a gateway.
pub fn settings_for(storage_dir: PathBuf) -> EngineSettings {
    EngineSettings {
        storage_dir,
        debug: false,
        listen_port: 0,
    }
}
