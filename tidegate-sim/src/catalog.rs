//! Content the simulated swarm can serve.
//!
//! A torrent only "exists" in the simulation once its content has been
//! seeded here. The info hash is derived from the content layout so seeding
//! the same content twice yields the same magnet link.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use tidegate_core::torrent::{FileLayout, InfoHash, MagnetLink, TorrentMetadata};
use tracing::{debug, warn};

/// A single file of seeded content.
#[derive(Debug, Clone)]
pub struct SeedFile {
    /// Relative, slash-separated path inside the torrent
    pub path: String,
    pub data: Bytes,
}

impl SeedFile {
    pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Complete content of one simulated torrent.
#[derive(Debug, Clone)]
pub struct SeedTorrent {
    pub name: String,
    /// Unix timestamp in seconds
    pub creation_date: i64,
    pub trackers: Vec<String>,
    pub files: Vec<SeedFile>,
}

impl SeedTorrent {
    /// Creates a torrent dated now with no trackers.
    pub fn new(name: impl Into<String>, files: Vec<SeedFile>) -> Self {
        Self {
            name: name.into(),
            creation_date: chrono::Utc::now().timestamp(),
            trackers: Vec::new(),
            files,
        }
    }

    /// SHA-1 over name, creation date and every file's path, length and bytes.
    pub fn info_hash(&self) -> InfoHash {
        let mut hasher = Sha1::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.creation_date.to_be_bytes());
        for file in &self.files {
            hasher.update(file.path.as_bytes());
            hasher.update((file.data.len() as u64).to_be_bytes());
            hasher.update(&file.data);
        }
        InfoHash::new(hasher.finalize().into())
    }

    /// Magnet link pointing at this content.
    pub fn magnet(&self) -> MagnetLink {
        MagnetLink {
            info_hash: self.info_hash(),
            display_name: Some(self.name.clone()),
            trackers: self.trackers.clone(),
        }
    }

    /// Metadata as the engine reports it once the info dictionary arrived.
    pub fn metadata(&self) -> TorrentMetadata {
        TorrentMetadata {
            info_hash: self.info_hash(),
            name: self.name.clone(),
            creation_date: self.creation_date,
            trackers: self.trackers.clone(),
            files: self
                .files
                .iter()
                .map(|f| FileLayout {
                    path: f.path.clone(),
                    length: f.data.len() as u64,
                })
                .collect(),
        }
    }

    /// Sum of all file lengths.
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }
}

/// Shared registry of seeded torrents, keyed by info hash.
#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    torrents: Arc<RwLock<HashMap<InfoHash, Arc<SeedTorrent>>>>,
}

impl SeedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `torrent` available to the swarm and returns its magnet link.
    pub fn seed(&self, torrent: SeedTorrent) -> MagnetLink {
        let magnet = torrent.magnet();
        debug!(info_hash = %magnet.info_hash, name = %torrent.name, "Seeded torrent");
        self.torrents
            .write()
            .insert(magnet.info_hash, Arc::new(torrent));
        magnet
    }

    /// Seeds every entry of `dir`.
    ///
    /// A regular file becomes a single-file torrent named after the file; a
    /// directory becomes a multi-file torrent holding everything below it.
    /// Hidden entries are skipped.
    ///
    /// # Errors
    /// - `std::io::Error` - Failed to read the directory or a file in it
    pub async fn seed_directory(&self, dir: &Path) -> Result<Vec<MagnetLink>, std::io::Error> {
        let mut magnets = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata().await?;
            let creation_date = metadata
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp())
                .unwrap_or_else(|| chrono::Utc::now().timestamp());

            let files = if metadata.is_dir() {
                let mut files = Vec::new();
                collect_files(path.clone(), String::new(), &mut files).await?;
                files.sort_by(|a, b| a.path.cmp(&b.path));
                files
            } else if metadata.is_file() {
                vec![SeedFile::new(name.clone(), tokio::fs::read(&path).await?)]
            } else {
                continue;
            };

            if files.is_empty() {
                warn!(path = %path.display(), "Skipping empty directory");
                continue;
            }

            magnets.push(self.seed(SeedTorrent {
                name,
                creation_date,
                trackers: Vec::new(),
                files,
            }));
        }

        magnets.sort_by_key(|m| m.display_name.clone());
        Ok(magnets)
    }

    /// Seeded content for `info_hash`, if any.
    pub fn get(&self, info_hash: &InfoHash) -> Option<Arc<SeedTorrent>> {
        self.torrents.read().get(info_hash).cloned()
    }

    /// Number of seeded torrents.
    pub fn len(&self) -> usize {
        self.torrents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.read().is_empty()
    }
}

fn collect_files<'a>(
    dir: PathBuf,
    prefix: String,
    files: &'a mut Vec<SeedFile>,
) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let relative = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_files(path, relative, files).await?;
            } else if file_type.is_file() {
                files.push(SeedFile::new(relative, tokio::fs::read(&path).await?));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SeedTorrent {
        SeedTorrent {
            name: "Sample".to_string(),
            creation_date: 1_700_000_000,
            trackers: vec!["udp://tracker.example:1337".to_string()],
            files: vec![
                SeedFile::new("a.mkv", vec![7u8; 1000]),
                SeedFile::new("readme.txt", b"hello".to_vec()),
            ],
        }
    }

    #[test]
    fn test_info_hash_is_stable_and_content_sensitive() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.info_hash(), b.info_hash());

        b.files[1] = SeedFile::new("readme.txt", b"hellO".to_vec());
        assert_ne!(a.info_hash(), b.info_hash());
    }

    #[test]
    fn test_seed_returns_matching_magnet() {
        let catalog = SeedCatalog::new();
        let torrent = sample();
        let expected = torrent.info_hash();

        let magnet = catalog.seed(torrent);
        assert_eq!(magnet.info_hash, expected);
        assert_eq!(magnet.display_name.as_deref(), Some("Sample"));
        assert_eq!(catalog.get(&expected).unwrap().total_length(), 1005);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_metadata_lists_files_in_order() {
        let metadata = sample().metadata();
        let paths: Vec<_> = metadata.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.mkv", "readme.txt"]);
        assert_eq!(metadata.creation_date, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_seed_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("single.mkv"), vec![1u8; 64]).unwrap();
        std::fs::create_dir_all(dir.path().join("Show/extras")).unwrap();
        std::fs::write(dir.path().join("Show/episode.mkv"), vec![2u8; 32]).unwrap();
        std::fs::write(dir.path().join("Show/extras/notes.txt"), b"notes").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();

        let catalog = SeedCatalog::new();
        let magnets = catalog.seed_directory(dir.path()).await.unwrap();
        assert_eq!(magnets.len(), 2);
        assert_eq!(magnets[0].display_name.as_deref(), Some("Show"));

        let show = catalog.get(&magnets[0].info_hash).unwrap();
        let paths: Vec<_> = show.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["episode.mkv", "extras/notes.txt"]);

        let single = catalog.get(&magnets[1].info_hash).unwrap();
        assert_eq!(single.files[0].path, "single.mkv");
        assert_eq!(single.total_length(), 64);
    }
}
