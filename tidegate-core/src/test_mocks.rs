//! Mock engine implementations for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::torrent::{
    EngineError, FileLayout, FileReader, InfoHash, MagnetLink, TorrentEngine, TorrentFile,
    TorrentHandle, TorrentMetadata,
};

/// File whose full content is always readable; completion is set by tests.
pub struct MockFile {
    path: String,
    data: Bytes,
    completed: AtomicU64,
}

impl MockFile {
    pub fn new(path: &str, data: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            data: Bytes::from(data),
            completed: AtomicU64::new(0),
        }
    }

    pub fn set_completed(&self, completed: u64) {
        self.completed.store(completed, Ordering::SeqCst);
    }
}

impl TorrentFile for MockFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn bytes_completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn reader(&self) -> Arc<dyn FileReader> {
        Arc::new(MockReader {
            data: self.data.clone(),
        })
    }
}

struct MockReader {
    data: Bytes,
}

#[async_trait]
impl FileReader for MockReader {
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, EngineError> {
        let file_size = self.data.len() as u64;
        if offset + length as u64 > file_size {
            return Err(EngineError::InvalidRange {
                offset,
                length,
                file_size,
            });
        }
        let start = offset as usize;
        Ok(self.data.slice(start..start + length))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Torrent with fixed files; metadata readiness is controlled by tests.
pub struct MockTorrent {
    info_hash: InfoHash,
    name: String,
    files: Vec<Arc<MockFile>>,
    ready: watch::Sender<bool>,
    corrupt: AtomicBool,
    peers: AtomicUsize,
}

impl MockTorrent {
    pub fn pending(info_hash: InfoHash, name: &str, files: Vec<Arc<MockFile>>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            info_hash,
            name: name.to_string(),
            files,
            ready,
            corrupt: AtomicBool::new(false),
            peers: AtomicUsize::new(4),
        }
    }

    pub fn ready(name: &str, files: Vec<Arc<MockFile>>) -> Self {
        let torrent = Self::pending(InfoHash::new([1u8; 20]), name, files);
        torrent.mark_ready();
        torrent
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn corrupt(&self) {
        self.corrupt.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TorrentHandle for MockTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn wait_for_metadata(&self) -> Result<(), EngineError> {
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map_err(|_| EngineError::EngineShutdown)?;
        Ok(())
    }

    fn metadata(&self) -> Result<TorrentMetadata, EngineError> {
        if !*self.ready.borrow() {
            return Err(EngineError::MetadataUnavailable {
                info_hash: self.info_hash,
            });
        }
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(EngineError::MetadataDecode {
                info_hash: self.info_hash,
                reason: "truncated info dictionary".to_string(),
            });
        }
        Ok(TorrentMetadata {
            info_hash: self.info_hash,
            name: self.name.clone(),
            creation_date: 1_600_000_000,
            trackers: Vec::new(),
            files: self
                .files
                .iter()
                .map(|f| FileLayout {
                    path: f.path().to_string(),
                    length: f.length(),
                })
                .collect(),
        })
    }

    fn files(&self) -> Vec<Arc<dyn TorrentFile>> {
        if !*self.ready.borrow() {
            return Vec::new();
        }
        self.files
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn TorrentFile>)
            .collect()
    }

    fn peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }
}

/// Engine holding pre-registered mock torrents.
#[derive(Default)]
pub struct MockEngine {
    torrents: Mutex<HashMap<InfoHash, Arc<MockTorrent>>>,
    pub add_calls: AtomicUsize,
    pub fail_adds: AtomicBool,
}

impl MockEngine {
    pub fn register(&self, torrent: Arc<MockTorrent>) {
        self.torrents
            .lock()
            .unwrap()
            .insert(torrent.info_hash(), torrent);
    }
}

#[async_trait]
impl TorrentEngine for MockEngine {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(EngineError::AddFailed {
                info_hash: magnet.info_hash,
                reason: "mock refused".to_string(),
            });
        }
        let mut torrents = self.torrents.lock().unwrap();
        let torrent = torrents
            .entry(magnet.info_hash)
            .or_insert_with(|| Arc::new(MockTorrent::pending(magnet.info_hash, "", Vec::new())));
        Ok(Arc::clone(torrent) as Arc<dyn TorrentHandle>)
    }

    async fn torrents(&self) -> Vec<Arc<dyn TorrentHandle>> {
        self.torrents
            .lock()
            .unwrap()
            .values()
            .map(|t| Arc::clone(t) as Arc<dyn TorrentHandle>)
            .collect()
    }

    async fn close(&self) -> Vec<EngineError> {
        self.torrents.lock().unwrap().clear();
        Vec::new()
    }
}
