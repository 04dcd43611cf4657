//! File-system storage: the TOML client config and the peer list.

pub mod config;
pub mod peers;

pub use config::{load_config, save_config, ConfigError, PanelConfig};
pub use peers::{PeerStore, PeerStoreError};
