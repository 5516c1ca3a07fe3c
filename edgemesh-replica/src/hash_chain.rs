//! SHA-256 hash-chained append-only log.
//!
//! Every replica mutation is appended as a record that embeds the hash of
//! the previous record. Tampering with any past record breaks every hash
//! after it, which `verify` detects. The log is each node's private audit
//! trail — it is not a CRDT and is never merged.
//!
//! Persistence is one canonical JSON record per line; each append is
//! flushed to disk before the mutating call returns, and on startup the
//! file is replayed and the whole chain re-verified.

use crate::{ReplicaError, Result};
use edgemesh_types::{now_ms, EventId, NodeId, TelemetryEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// `prev_hash` of the first record: 64 hex zeros.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// What a chain record describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogEntry {
    /// A telemetry event was ingested locally.
    EventIngested { event: TelemetryEvent },
    /// A remote event was first observed through a merge.
    MergeApplied { event_id: EventId, source: NodeId },
}

/// One record of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Position in the chain; strictly increases by 1 from 0.
    pub seq: u64,
    /// Wall-clock milliseconds at append time.
    pub timestamp_ms: u64,
    /// Hash of the previous record (hex), or all zeros for seq 0.
    pub prev_hash: String,
    /// The logged operation.
    pub entry: LogEntry,
    /// SHA-256 over `seq || timestamp || prev_hash || canonical(entry)`.
    pub hash: String,
}

impl ChainRecord {
    fn compute_hash(seq: u64, timestamp_ms: u64, prev_hash: &str, entry: &LogEntry) -> String {
        let entry_json = serde_json::to_string(entry).expect("log entry serializes");
        let mut hasher = Sha256::new();
        hasher.update(seq.to_be_bytes());
        hasher.update(timestamp_ms.to_be_bytes());
        hasher.update(prev_hash.as_bytes());
        hasher.update(entry_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recomputes this record's hash from its own fields.
    #[must_use]
    pub fn expected_hash(&self) -> String {
        Self::compute_hash(self.seq, self.timestamp_ms, &self.prev_hash, &self.entry)
    }
}

/// Result of a full chain verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogAudit {
    /// True when every record checks out.
    pub valid: bool,
    /// Sequence number of the first bad record, if any.
    pub first_bad_seq: Option<u64>,
}

/// The append-only chain with its optional backing file.
#[derive(Debug)]
pub struct HashChainLog {
    records: Vec<ChainRecord>,
    file: Option<File>,
}

impl HashChainLog {
    /// Creates an empty in-memory log (tests, gateway-side folds).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            file: None,
        }
    }

    /// Opens a log file, replaying and verifying any existing records.
    ///
    /// Fails with [`ReplicaError::LogCorruption`] if the stored chain does
    /// not verify — a corrupted log refuses to start rather than silently
    /// forking history.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut records = Vec::new();

        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: ChainRecord = serde_json::from_str(line).map_err(|err| {
                    tracing::error!(seq = records.len(), %err, "unparseable log record");
                    ReplicaError::LogCorruption {
                        seq: records.len() as u64,
                    }
                })?;
                records.push(record);
            }
            let audit = verify_records(&records);
            if let Some(seq) = audit.first_bad_seq {
                return Err(ReplicaError::LogCorruption { seq });
            }
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            records,
            file: Some(file),
        })
    }

    /// Appends an entry, returning the new record.
    ///
    /// When backed by a file the record is written and flushed before this
    /// returns.
    pub async fn append(&mut self, entry: LogEntry) -> Result<ChainRecord> {
        let seq = self.records.len() as u64;
        let timestamp_ms = now_ms();
        let prev_hash = self
            .records
            .last()
            .map(|record| record.hash.clone())
            .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
        let hash = ChainRecord::compute_hash(seq, timestamp_ms, &prev_hash, &entry);
        let record = ChainRecord {
            seq,
            timestamp_ms,
            prev_hash,
            entry,
            hash,
        };

        if let Some(file) = self.file.as_mut() {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await?;
        }

        self.records.push(record.clone());
        Ok(record)
    }

    /// Recomputes every hash and checks the chain links.
    #[must_use]
    pub fn verify(&self) -> LogAudit {
        verify_records(&self.records)
    }

    /// The most recent `n` records, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<ChainRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records[start..].to_vec()
    }

    /// Number of records in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the chain has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ChainRecord] {
        &self.records
    }
}

fn verify_records(records: &[ChainRecord]) -> LogAudit {
    let mut prev_hash = GENESIS_PREV_HASH;
    for (index, record) in records.iter().enumerate() {
        let bad = record.seq != index as u64
            || record.prev_hash != prev_hash
            || record.hash != record.expected_hash();
        if bad {
            return LogAudit {
                valid: false,
                first_bad_seq: Some(record.seq.min(index as u64)),
            };
        }
        prev_hash = &record.hash;
    }
    LogAudit {
        valid: true,
        first_bad_seq: None,
    }
}
