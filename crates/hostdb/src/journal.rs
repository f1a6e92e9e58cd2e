//! Append-only persistence for host records.
//!
//! Two files per database directory:
//!
//! - `hosts.snap` - a snapshot of every entry, rewritten atomically
//!   (tmp file + rename) every few thousand records and on clean shutdown
//! - `hosts.log` - length-prefixed journal records appended since the last
//!   snapshot
//!
//! On restart the snapshot is loaded and the journal replayed on top. Any
//! record that fails to decode aborts startup with
//! [`HostDbError::Corrupt`]; records are never silently dropped.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ballast_api::HostSettings;
use ballast_primitives::{BlockHeight, HostPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::HostEntry;
use crate::error::HostDbError;

const SNAPSHOT_FILE: &str = "hosts.snap";
const JOURNAL_FILE: &str = "hosts.log";

/// One host mutation, as written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    /// A host was announced (or re-announced at a new address).
    HostSeen {
        public_key: HostPublicKey,
        net_address: String,
        first_seen_height: BlockHeight,
        /// Unix time of the announcement, seeds the bootstrap scans.
        seen_at: u64,
    },
    /// Outcome of one probe.
    ScanResult {
        public_key: HostPublicKey,
        timestamp: u64,
        success: bool,
        /// Fresh settings when the probe succeeded.
        settings: Option<HostSettings>,
        /// IP the address resolved to, when resolution succeeded.
        resolved_ip: Option<IpAddr>,
    },
    /// Outcome of a contract-level interaction.
    InteractionOutcome {
        public_key: HostPublicKey,
        success: bool,
    },
    /// Operator removed the host.
    HostRemoved { public_key: HostPublicKey },
}

impl JournalRecord {
    /// The host this record concerns.
    pub fn public_key(&self) -> HostPublicKey {
        match self {
            Self::HostSeen { public_key, .. }
            | Self::ScanResult { public_key, .. }
            | Self::InteractionOutcome { public_key, .. }
            | Self::HostRemoved { public_key } => *public_key,
        }
    }
}

/// Append-side handle to the journal file.
#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    writer: BufWriter<File>,
    records_since_snapshot: u64,
}

impl Journal {
    /// Open (creating if needed) the journal in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, HostDbError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(JOURNAL_FILE))?;
        Ok(Self {
            dir,
            writer: BufWriter::new(file),
            records_since_snapshot: 0,
        })
    }

    /// Append one record and flush it to the OS.
    pub fn append(&mut self, record: &JournalRecord) -> Result<(), HostDbError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| HostDbError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| HostDbError::Serialization("record exceeds u32 length".into()))?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        self.records_since_snapshot += 1;
        Ok(())
    }

    /// Records appended since the last snapshot rewrite.
    pub fn records_since_snapshot(&self) -> u64 {
        self.records_since_snapshot
    }

    /// Rewrite the snapshot from `entries` and truncate the journal.
    ///
    /// The snapshot lands via tmp file + rename so a crash mid-write leaves
    /// the previous snapshot intact; only then is the journal truncated.
    pub fn snapshot(
        &mut self,
        entries: &HashMap<HostPublicKey, HostEntry>,
    ) -> Result<(), HostDbError> {
        write_snapshot(&self.dir, entries)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.dir.join(JOURNAL_FILE))?;
        self.writer = BufWriter::new(file);
        self.records_since_snapshot = 0;
        debug!(hosts = entries.len(), "host snapshot written");
        Ok(())
    }
}

/// Write a snapshot of `entries` into `dir` atomically.
pub fn write_snapshot(
    dir: &Path,
    entries: &HashMap<HostPublicKey, HostEntry>,
) -> Result<(), HostDbError> {
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    {
        let file = File::create(&tmp)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &entries.values().collect::<Vec<_>>())
            .map_err(|e| HostDbError::Serialization(e.to_string()))?;
    }
    fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}

/// Load the snapshot and replay the journal suffix from `dir`.
///
/// `bootstrap_interval_secs` must match the live database's minimum scan
/// interval so replayed announcements reconstruct the same bootstrap scans.
/// Returns the reconstructed entry map. Undecodable data anywhere is a
/// startup failure; an operator has to intervene rather than lose history.
pub fn load(
    dir: &Path,
    bootstrap_interval_secs: u64,
) -> Result<HashMap<HostPublicKey, HostEntry>, HostDbError> {
    let mut entries: HashMap<HostPublicKey, HostEntry> = HashMap::new();

    let snap_path = dir.join(SNAPSHOT_FILE);
    if snap_path.exists() {
        let reader = BufReader::new(File::open(&snap_path)?);
        let loaded: Vec<HostEntry> = serde_json::from_reader(reader)
            .map_err(|e| HostDbError::Corrupt(format!("snapshot: {e}")))?;
        for entry in loaded {
            entries.insert(entry.public_key, entry);
        }
    }

    let log_path = dir.join(JOURNAL_FILE);
    if log_path.exists() {
        let mut reader = BufReader::new(File::open(&log_path)?);
        let mut replayed = 0u64;
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).map_err(|e| {
                HostDbError::Corrupt(format!("journal record {replayed} truncated: {e}"))
            })?;
            let record: JournalRecord = serde_json::from_slice(&payload)
                .map_err(|e| HostDbError::Corrupt(format!("journal record {replayed}: {e}")))?;
            apply(&mut entries, record, bootstrap_interval_secs);
            replayed += 1;
        }
        if replayed > 0 {
            debug!(replayed, "journal replayed");
        }
    }

    Ok(entries)
}

/// Apply one journal record to the entry map. Mirrors the live mutation
/// paths in the database so replay reconstructs the same state.
fn apply(
    entries: &mut HashMap<HostPublicKey, HostEntry>,
    record: JournalRecord,
    bootstrap_interval_secs: u64,
) {
    match record {
        JournalRecord::HostSeen {
            public_key,
            net_address,
            first_seen_height,
            seen_at,
        } => {
            entries
                .entry(public_key)
                .and_modify(|e| e.net_address.clone_from(&net_address))
                .or_insert_with(|| {
                    HostEntry::new(
                        public_key,
                        net_address,
                        HostSettings::default(),
                        first_seen_height,
                        seen_at,
                        bootstrap_interval_secs,
                    )
                });
        }
        JournalRecord::ScanResult {
            public_key,
            timestamp,
            success,
            settings,
            resolved_ip,
        } => {
            if let Some(entry) = entries.get_mut(&public_key) {
                if !entry.record_scan(timestamp, success) {
                    warn!(host = %public_key, "out-of-order scan in journal, discarded");
                }
                if let Some(settings) = settings {
                    entry.settings = settings;
                }
                if let Some(ip) = resolved_ip {
                    entry.known_ip = Some(ip);
                }
            } else {
                warn!(host = %public_key, "scan record for unknown host, discarded");
            }
        }
        JournalRecord::InteractionOutcome {
            public_key,
            success,
        } => {
            if let Some(entry) = entries.get_mut(&public_key) {
                entry.record_interaction(success);
            }
        }
        JournalRecord::HostRemoved { public_key } => {
            entries.remove(&public_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn key(n: u8) -> HostPublicKey {
        HostPublicKey::repeat_byte(n)
    }

    fn seen(n: u8) -> JournalRecord {
        JournalRecord::HostSeen {
            public_key: key(n),
            net_address: format!("host{n}.example:9982"),
            first_seen_height: 100,
            seen_at: 50_000,
        }
    }

    #[test]
    fn test_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path()).unwrap();

        journal.append(&seen(1)).unwrap();
        journal
            .append(&JournalRecord::ScanResult {
                public_key: key(1),
                timestamp: 60_000,
                success: true,
                settings: Some(HostSettings {
                    version: Version::new(0, 3, 9),
                    accepting_contracts: true,
                    ..Default::default()
                }),
                resolved_ip: Some("203.0.113.7".parse().unwrap()),
            })
            .unwrap();
        journal
            .append(&JournalRecord::InteractionOutcome {
                public_key: key(1),
                success: false,
            })
            .unwrap();
        drop(journal);

        let entries = load(dir.path(), 1_800).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[&key(1)];
        assert_eq!(entry.net_address, "host1.example:9982");
        assert_eq!(entry.scan_history.len(), 3);
        assert_eq!(entry.settings.version, Version::new(0, 3, 9));
        assert_eq!(entry.known_ip, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(entry.historic_failed_interactions, 1);
    }

    #[test]
    fn test_snapshot_truncates_journal() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path()).unwrap();

        journal.append(&seen(1)).unwrap();
        journal.append(&seen(2)).unwrap();
        assert_eq!(journal.records_since_snapshot(), 2);

        let entries = load(dir.path(), 1_800).unwrap();
        journal.snapshot(&entries).unwrap();
        assert_eq!(journal.records_since_snapshot(), 0);

        // The journal is empty; everything lives in the snapshot now.
        journal.append(&seen(3)).unwrap();
        drop(journal);

        let reloaded = load(dir.path(), 1_800).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains_key(&key(1)));
        assert!(reloaded.contains_key(&key(3)));
    }

    #[test]
    fn test_host_removed_survives_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path()).unwrap();
        journal.append(&seen(1)).unwrap();
        journal
            .append(&JournalRecord::HostRemoved { public_key: key(1) })
            .unwrap();
        drop(journal);

        let entries = load(dir.path(), 1_800).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_corrupt_journal_refuses_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path()).unwrap();
        journal.append(&seen(1)).unwrap();
        drop(journal);

        // Truncate mid-record.
        let log = dir.path().join(JOURNAL_FILE);
        let bytes = fs::read(&log).unwrap();
        fs::write(&log, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(
            load(dir.path(), 1_800),
            Err(HostDbError::Corrupt(_))
        ));
    }

    #[test]
    fn test_corrupt_snapshot_refuses_to_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"{not json").unwrap();
        assert!(matches!(load(dir.path(), 1_800), Err(HostDbError::Corrupt(_))));
    }

    #[test]
    fn test_empty_dir_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), 1_800).unwrap().is_empty());
    }
}
