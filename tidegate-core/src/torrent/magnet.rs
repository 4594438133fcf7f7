//! Magnet link parsing and reconstruction.

use std::fmt;

use super::{EngineError, InfoHash};

const BTIH: &str = "btih";

/// Magnet link components.
///
/// Parsed magnet URI containing the info hash plus the optional display name
/// and tracker URLs. Percent-encoding is removed from all values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Creates a magnet link for a known info hash.
    pub fn new(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            display_name: None,
            trackers: Vec::new(),
        }
    }

    /// Parses magnet link to extract torrent information.
    ///
    /// # Errors
    /// - `EngineError::InvalidMagnetLink` - Empty or malformed magnet URI, or
    ///   missing/invalid `xt=urn:btih:` topic
    pub fn parse(uri: &str) -> Result<Self, EngineError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(EngineError::InvalidMagnetLink {
                reason: "could not work with empty magnet link".to_string(),
            });
        }

        let magnet = magnet_url::Magnet::new(uri).map_err(|e| EngineError::InvalidMagnetLink {
            reason: e.to_string(),
        })?;

        let info_hash = match (magnet.hash_type(), magnet.hash()) {
            (Some(BTIH), Some(hash)) => InfoHash::from_hex(&hash.to_ascii_lowercase()).map_err(
                |e| EngineError::InvalidMagnetLink {
                    reason: e.to_string(),
                },
            )?,
            _ => {
                return Err(EngineError::InvalidMagnetLink {
                    reason: format!("Missing or invalid info hash in magnet link: {uri}"),
                });
            }
        };

        let display_name = magnet.display_name().map(|name| decode(&name.replace('+', " ")));
        let trackers = magnet.trackers().iter().map(|tr| decode(tr)).collect();

        Ok(Self {
            info_hash,
            display_name,
            trackers,
        })
    }

    /// Renders the canonical `magnet:?` URI for this link.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("magnet:?xt=urn:{BTIH}:{}", self.info_hash);
        if let Some(name) = &self.display_name {
            uri.push_str("&dn=");
            uri.push_str(&urlencoding::encode(name));
        }
        for tracker in &self.trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}
