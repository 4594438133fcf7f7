//! Builds the `Info` description of a resolved torrent.

use std::path::Path;

use tracing::debug;

use crate::models::{FileInfo, Info};
use crate::torrent::{EngineError, TorrentFile, TorrentHandle};

/// Size of reads issued while loading a description file.
const DESCRIPTION_CHUNK_SIZE: usize = 256 * 1024;

/// Describes a torrent whose metadata is available.
///
/// The description is the full text of the first file with a `.txt`
/// extension in enumeration order; reading it waits for the file to download.
///
/// # Errors
/// - `EngineError::MetadataUnavailable` / `MetadataDecode` - Metadata missing or malformed
/// - Any reader error while loading the description file
pub async fn torrent_info(torrent: &dyn TorrentHandle) -> Result<Info, EngineError> {
    let metadata = torrent.metadata()?;
    let files = torrent.files();

    let mut description = None;
    for file in &files {
        debug!(info_hash = %metadata.info_hash, path = file.path(), "Got info");

        if description.is_none() && is_description_file(file.path()) {
            description = Some(read_to_string(file.as_ref()).await?);
        }
    }

    Ok(Info {
        name: metadata.name,
        info_hash: metadata.info_hash.to_string(),
        description: description.unwrap_or_default(),
        creation_date: metadata.creation_date,
        files: files
            .iter()
            .map(|f| FileInfo {
                path: f.path().to_string(),
                length: f.length(),
            })
            .collect(),
    })
}

fn is_description_file(path: &str) -> bool {
    Path::new(path).extension().is_some_and(|ext| ext == "txt")
}

async fn read_to_string(file: &dyn TorrentFile) -> Result<String, EngineError> {
    let reader = file.reader();
    let size = reader.size();
    let mut content = Vec::with_capacity(usize::try_from(size).unwrap_or(0));

    let mut offset = 0u64;
    while offset < size {
        let length = (size - offset).min(DESCRIPTION_CHUNK_SIZE as u64) as usize;
        let chunk = reader.read_at(offset, length).await?;
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        content.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&content).into_owned())
}
