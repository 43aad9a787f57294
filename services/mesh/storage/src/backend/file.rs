//! File-based storage backend: append-only journal with recovery

use crate::{MessageStore, StorageError, StoredMessage};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher;
use dashmap::DashMap;
use mesh_wire::NodeId;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const JOURNAL_FILE: &str = "messages.journal";

/// Configuration for the file store
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    /// Base data directory
    pub data_dir: PathBuf,
    /// Fsync frequency (1 = every write, N = every N writes)
    pub fsync_every: u32,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./xferdata"),
            fsync_every: 1,
        }
    }
}

/// One journal entry
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Insert { message: StoredMessage },
    Acked { id: u32, node: NodeId },
}

/// Journal record header
#[derive(Debug)]
struct RecordHeader {
    len: u32,   // Body length (not including header)
    crc32: u32, // CRC32 over the body
}

impl RecordHeader {
    const SIZE: usize = 4 + 4;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len);
        buf.put_u32_le(self.crc32);
    }

    fn decode(buf: &mut Bytes) -> Self {
        Self {
            len: buf.get_u32_le(),
            crc32: buf.get_u32_le(),
        }
    }

    fn compute_crc(body: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(body);
        hasher.finalize()
    }
}

/// Open journal file and fsync bookkeeping
struct JournalWriter {
    file: File,
    writes_since_sync: u32,
}

/// File-based message store
pub struct FileStore {
    config: FileStoreConfig,
    /// Current state rebuilt from the journal
    messages: DashMap<u32, StoredMessage>,
    writer: Mutex<JournalWriter>,
}

impl FileStore {
    /// Open (or create) the journal in `config.data_dir` and replay it
    pub async fn open(config: FileStoreConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.data_dir.join(JOURNAL_FILE);

        let messages = DashMap::new();
        if path.exists() {
            let (replayed, valid_len) = replay(&path, &messages)?;
            info!(
                "Replayed {} journal records from {:?} ({} messages)",
                replayed,
                path,
                messages.len()
            );

            // Drop the damaged tail so new records are not appended after it
            let file = OpenOptions::new().write(true).open(&path)?;
            if file.metadata()?.len() > valid_len {
                warn!("Truncating journal {:?} to {} bytes", path, valid_len);
                file.set_len(valid_len)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            config,
            messages,
            writer: Mutex::new(JournalWriter {
                file,
                writes_since_sync: 0,
            }),
        })
    }

    /// Journal path
    pub fn path(&self) -> PathBuf {
        self.config.data_dir.join(JOURNAL_FILE)
    }

    fn append(&self, record: &JournalRecord) -> Result<(), StorageError> {
        let body = serde_json::to_vec(record)?;
        let header = RecordHeader {
            len: body.len() as u32,
            crc32: RecordHeader::compute_crc(&body),
        };

        let mut buf = BytesMut::with_capacity(RecordHeader::SIZE + body.len());
        header.encode(&mut buf);
        buf.extend_from_slice(&body);

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Corruption("journal writer poisoned".to_string()))?;
        writer.file.write_all(&buf)?;

        writer.writes_since_sync += 1;
        if writer.writes_since_sync >= self.config.fsync_every.max(1) {
            writer.file.sync_all()?;
            writer.writes_since_sync = 0;
        }

        Ok(())
    }
}

/// Apply every intact record in `path` to `messages`. A torn or corrupt tail
/// ends the replay; records before it are kept. Returns the number of records
/// applied and the byte length of the intact prefix.
fn replay(
    path: &Path,
    messages: &DashMap<u32, StoredMessage>,
) -> Result<(usize, u64), StorageError> {
    let mut bytes = Bytes::from(std::fs::read(path)?);
    let mut applied = 0;
    let mut valid_len = 0u64;

    while bytes.remaining() >= RecordHeader::SIZE {
        let header = RecordHeader::decode(&mut bytes);

        if bytes.remaining() < header.len as usize {
            warn!("Incomplete record at end of journal {:?}", path);
            break;
        }

        let body = bytes.split_to(header.len as usize);
        if RecordHeader::compute_crc(&body) != header.crc32 {
            warn!(
                "CRC mismatch in journal {:?} after {} records, ignoring the rest",
                path, applied
            );
            break;
        }

        let record: JournalRecord = match serde_json::from_slice(&body) {
            Ok(record) => record,
            Err(e) => {
                warn!("Unreadable journal record in {:?}: {}", path, e);
                break;
            }
        };

        match record {
            JournalRecord::Insert { message } => {
                messages.insert(message.id, message);
            }
            JournalRecord::Acked { id, node } => {
                if let Some(mut message) = messages.get_mut(&id) {
                    message.acked_by = Some(node);
                }
            }
        }
        applied += 1;
        valid_len += (RecordHeader::SIZE + header.len as usize) as u64;
    }

    Ok((applied, valid_len))
}

#[async_trait]
impl MessageStore for FileStore {
    async fn insert(&self, message: StoredMessage) -> Result<(), StorageError> {
        debug!(
            "FileStore insert id={} from={} to={}",
            message.id, message.from, message.to
        );

        self.append(&JournalRecord::Insert {
            message: message.clone(),
        })?;
        self.messages.insert(message.id, message);
        Ok(())
    }

    async fn set_acked_by(&self, request_id: u32, node: NodeId) -> Result<bool, StorageError> {
        if !self.messages.contains_key(&request_id) {
            return Ok(false);
        }

        debug!("FileStore ack id={} acked_by={}", request_id, node);
        self.append(&JournalRecord::Acked {
            id: request_id,
            node,
        })?;

        if let Some(mut message) = self.messages.get_mut(&request_id) {
            message.acked_by = Some(node);
        }
        Ok(true)
    }

    async fn get(&self, id: u32) -> Result<Option<StoredMessage>, StorageError> {
        Ok(self.messages.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let mut messages: Vec<StoredMessage> = self
            .messages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}
