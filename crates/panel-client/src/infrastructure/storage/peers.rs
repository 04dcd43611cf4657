//! Known peer devices.
//!
//! A flat list of device addresses kept under the single key `peers` in a
//! small TOML file next to the main config:
//!
//! ```toml
//! peers = ["192.168.1.31", "cam-garage.local"]
//! ```
//!
//! Order is insertion order and duplicates are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PeerStoreError {
    #[error("I/O error accessing peer list at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse peer list: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize peer list: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("peer address must not be empty")]
    EmptyAddress,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PeerFile {
    #[serde(default)]
    peers: Vec<String>,
}

/// File-backed peer list.
#[derive(Debug)]
pub struct PeerStore {
    path: PathBuf,
    peers: Vec<String>,
}

impl PeerStore {
    /// Opens the store at `path`; a missing file is an empty list.
    ///
    /// # Errors
    ///
    /// [`PeerStoreError::Io`] for read failures other than "not found",
    /// [`PeerStoreError::Parse`] for malformed TOML.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PeerStoreError> {
        let path = path.into();
        let peers = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<PeerFile>(&content)?.peers,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(PeerStoreError::Io { path, source }),
        };
        debug!("loaded {} peer(s) from {}", peers.len(), path.display());
        Ok(Self { path, peers })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Adds `address` and persists.  Returns `false` if it was already known.
    ///
    /// # Errors
    ///
    /// [`PeerStoreError::EmptyAddress`], or a write failure.
    pub fn add(&mut self, address: &str) -> Result<bool, PeerStoreError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(PeerStoreError::EmptyAddress);
        }
        if self.peers.iter().any(|p| p == address) {
            return Ok(false);
        }
        self.peers.push(address.to_string());
        self.save()?;
        Ok(true)
    }

    /// Removes `address` and persists.  Returns `false` if it was not known.
    ///
    /// # Errors
    ///
    /// A write failure.
    pub fn remove(&mut self, address: &str) -> Result<bool, PeerStoreError> {
        let before = self.peers.len();
        self.peers.retain(|p| p != address.trim());
        if self.peers.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<(), PeerStoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| PeerStoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(&PeerFile {
            peers: self.peers.clone(),
        })?;
        std::fs::write(&self.path, content).map_err(|source| PeerStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
