//! Configuration handling for the transfer simulator.
//!
//! Values come from a YAML file when present, then `XFER_*` environment
//! variables, then command-line flags (applied in `main`).

use anyhow::{bail, Result};
use mesh_storage::StorageMode;
use mesh_wire::{max_part_data_len, NodeId, TransferId, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XferConfig {
    /// Node sending the file, e.g. `!a1b2c3d4` or a decimal number
    pub local_node: String,
    /// Node receiving the file
    pub peer_node: String,
    /// Part size the receiver accepts with
    pub part_size: u32,
    /// Probability in [0, 1] that a packet is lost on the link
    pub loss_rate: f64,
    /// Probability in [0, 1] that a delivered packet arrives twice
    pub duplicate_rate: f64,
    /// Idle time before the receiver re-requests missing parts, milliseconds
    pub retry_interval_ms: u64,
    /// Give up after this many idle retries
    pub max_retries: u32,
    /// Largest encoded control message the radio accepts
    pub max_payload_len: usize,
    /// Message store settings for the sending node
    pub storage: StorageConfig,
}

/// Message store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `file`
    pub mode: String,
    /// Directory for the file journal
    pub data_dir: PathBuf,
    /// Fsync the journal every N writes
    pub fsync_every: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: "memory".to_string(),
            data_dir: PathBuf::from("./xferdata"),
            fsync_every: 1,
        }
    }
}

impl Default for XferConfig {
    fn default() -> Self {
        Self {
            local_node: "!a1".to_string(),
            peer_node: "!b2".to_string(),
            part_size: 120,
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            retry_interval_ms: 2000,
            max_retries: 20,
            max_payload_len: MAX_PAYLOAD_LEN,
            storage: StorageConfig::default(),
        }
    }
}

impl XferConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<XferConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}, using defaults: {}", config_path.as_ref(), e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path.as_ref());
                Self::default()
            }
        };

        config.apply_environment_overrides();
        config.validate()?;

        info!(
            "Final transfer configuration: {} -> {}, part_size={}, loss={}, duplicates={}, storage={}",
            config.local_node, config.peer_node, config.part_size, config.loss_rate, config.duplicate_rate, config.storage.mode
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(node) = std::env::var("XFER_LOCAL_NODE") {
            self.local_node = node;
            info!("Local node overridden by environment: {}", self.local_node);
        }

        if let Ok(node) = std::env::var("XFER_PEER_NODE") {
            self.peer_node = node;
            info!("Peer node overridden by environment: {}", self.peer_node);
        }

        if let Ok(value) = std::env::var("XFER_PART_SIZE") {
            if let Ok(size) = value.parse::<u32>() {
                self.part_size = size;
                info!("Part size overridden by environment: {}", size);
            }
        }

        if let Ok(value) = std::env::var("XFER_LOSS_RATE") {
            if let Ok(rate) = value.parse::<f64>() {
                self.loss_rate = rate;
                info!("Loss rate overridden by environment: {}", rate);
            }
        }

        if let Ok(value) = std::env::var("XFER_DUPLICATE_RATE") {
            if let Ok(rate) = value.parse::<f64>() {
                self.duplicate_rate = rate;
                info!("Duplicate rate overridden by environment: {}", rate);
            }
        }

        if let Ok(value) = std::env::var("XFER_RETRY_INTERVAL_MS") {
            if let Ok(ms) = value.parse::<u64>() {
                self.retry_interval_ms = ms;
                info!("Retry interval overridden by environment: {}ms", ms);
            }
        }

        if let Ok(mode) = std::env::var("XFER_STORAGE_MODE") {
            self.storage.mode = mode;
            info!("Storage mode overridden by environment: {}", self.storage.mode);
        }

        if let Ok(dir) = std::env::var("XFER_STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
            info!("Storage directory overridden by environment: {:?}", self.storage.data_dir);
        }
    }

    /// Reject values the simulator cannot run with
    pub fn validate(&self) -> Result<()> {
        self.local_node()?;
        self.peer_node()?;
        if self.part_size == 0 {
            bail!("part_size must be positive");
        }
        let largest = self.largest_part_size();
        if self.part_size as usize > largest {
            bail!(
                "part_size {} does not fit a {} byte radio payload, at most {} bytes per part",
                self.part_size,
                self.max_payload_len,
                largest
            );
        }
        for (name, rate) in [("loss_rate", self.loss_rate), ("duplicate_rate", self.duplicate_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                bail!("{} must be within [0, 1], got {}", name, rate);
            }
        }
        if self.loss_rate >= 1.0 {
            bail!("loss_rate of 1 drops every packet");
        }
        self.storage_mode()?;
        Ok(())
    }

    /// Largest part size whose FilePart fits in `max_payload_len`
    pub fn largest_part_size(&self) -> usize {
        max_part_data_len(&TransferId::generate(), self.max_payload_len)
    }

    /// Parsed sending node id
    pub fn local_node(&self) -> Result<NodeId> {
        Ok(self.local_node.parse()?)
    }

    /// Parsed receiving node id
    pub fn peer_node(&self) -> Result<NodeId> {
        Ok(self.peer_node.parse()?)
    }

    /// Idle retry interval
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }

    /// Message store mode
    pub fn storage_mode(&self) -> Result<StorageMode> {
        match self.storage.mode.as_str() {
            "memory" => Ok(StorageMode::InMemory),
            "file" => Ok(StorageMode::File {
                data_dir: self.storage.data_dir.clone(),
                fsync_every: self.storage.fsync_every,
            }),
            other => bail!("Invalid storage mode '{}', expected memory or file", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mesh_wire::{encode_with_limit, ControlMessage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = XferConfig::default();
        assert_eq!(config.local_node().unwrap(), NodeId(0xa1));
        assert_eq!(config.peer_node().unwrap(), NodeId(0xb2));
        assert_eq!(config.max_payload_len, 233);
        assert!(matches!(config.storage_mode().unwrap(), StorageMode::InMemory));
        config.validate().unwrap();
    }

    #[test]
    fn test_default_part_size_fits_radio() {
        let config = XferConfig::default();
        let part = ControlMessage::FilePart {
            file_transfer_id: TransferId::generate(),
            part_index: u32::MAX,
            total_parts: u32::MAX,
            data: Bytes::from(vec![0xAB; config.part_size as usize]),
        };
        assert!(encode_with_limit(&part, config.max_payload_len).is_ok());
        assert!(config.part_size as usize <= config.largest_part_size());
    }

    #[test]
    fn test_validate_rejects_part_size_over_radio_limit() {
        let mut config = XferConfig::default();
        config.part_size = 180;
        assert!(config.validate().is_err());

        config.max_payload_len = 512;
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
local_node: "!10"
peer_node: "32"
part_size: 64
loss_rate: 0.25
storage:
  mode: file
  data_dir: /tmp/xfer-test
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = XferConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.local_node().unwrap(), NodeId(16));
        assert_eq!(config.peer_node().unwrap(), NodeId(32));
        assert_eq!(config.part_size, 64);
        assert_eq!(config.loss_rate, 0.25);
        assert_eq!(config.duplicate_rate, 0.0);
        assert_eq!(config.storage.fsync_every, 1);
        match config.storage_mode().unwrap() {
            StorageMode::File { data_dir, .. } => assert_eq!(data_dir, PathBuf::from("/tmp/xfer-test")),
            other => panic!("expected file storage, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"part_size: [not, a, number]").unwrap();

        let config = XferConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.part_size, XferConfig::default().part_size);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = XferConfig::default();
        config.loss_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = XferConfig::default();
        config.part_size = 0;
        assert!(config.validate().is_err());

        let mut config = XferConfig::default();
        config.peer_node = "!zz".to_string();
        assert!(config.validate().is_err());

        let mut config = XferConfig::default();
        config.storage.mode = "redis".to_string();
        assert!(config.validate().is_err());
    }
}
