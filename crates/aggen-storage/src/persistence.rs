//! Append-only checkpoint log.
//!
//! Each search checkpoint is written as one length-prefixed bincode record
//! and synced before the search continues. After a crash the log is replayed
//! on top of the last snapshot; after a successful snapshot it is truncated.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{EdgeAssetBindingRow, EdgeRow, FactbaseItemRow, FactbaseRow, KeyValueRow};

/// Rows produced by one checkpoint flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub factbases: Vec<FactbaseRow>,
    pub items: Vec<FactbaseItemRow>,
    pub edges: Vec<EdgeRow>,
    pub bindings: Vec<EdgeAssetBindingRow>,
    /// Full interning table; replaces the stored one when non-empty.
    pub keyvalue: Vec<KeyValueRow>,
}

impl CheckpointRecord {
    pub fn is_empty(&self) -> bool {
        self.factbases.is_empty() && self.edges.is_empty() && self.keyvalue.is_empty()
    }
}

pub struct CheckpointLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl CheckpointLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; returns bytes written.
    pub fn append(&self, record: &CheckpointRecord) -> std::io::Result<u64> {
        let mut file = self.file.lock();

        let data = bincode::serialize(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let len = data.len() as u32;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&data)?;
        file.sync_data()?;

        Ok(len as u64 + 4)
    }

    /// Feed every complete record to `handler`, oldest first. A record cut
    /// short by a crash ends the replay.
    pub fn replay<F: FnMut(CheckpointRecord) -> std::io::Result<()>>(&self, mut handler: F) -> std::io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;

        let mut replayed = 0;
        loop {
            let mut len_bytes = [0u8; 4];
            match file.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match file.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(path = %self.path.display(), "checkpoint log ends in a partial record");
                    break;
                }
                Err(e) => return Err(e),
            }

            let record: CheckpointRecord = bincode::deserialize(&data)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            handler(record)?;
            replayed += 1;
        }

        Ok(replayed)
    }

    pub fn truncate(&self) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggen_core::{EdgeId, ExploitId, StateHash, StateId};
    use tempfile::tempdir;

    fn record(id: u32) -> CheckpointRecord {
        CheckpointRecord {
            factbases: vec![FactbaseRow {
                id: StateId::new(id),
                hash: StateHash::new(id as u64 * 31),
            }],
            items: vec![],
            edges: vec![EdgeRow {
                id: EdgeId::new(id),
                from: StateId::new(0),
                to: StateId::new(id),
                exploit: ExploitId::new(0),
            }],
            bindings: vec![],
            keyvalue: vec![],
        }
    }

    #[test]
    fn records_replay_in_order() {
        let dir = tempdir().unwrap();
        let log = CheckpointLog::open(&dir.path().join("graph.log")).unwrap();
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();

        let mut seen = vec![];
        let count = log
            .replay(|r| {
                seen.push(r.factbases[0].id);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec![StateId::new(1), StateId::new(2)]);

        log.truncate().unwrap();
        assert_eq!(log.replay(|_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.log");
        {
            let log = CheckpointLog::open(&path).unwrap();
            log.append(&record(1)).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&64u32.to_le_bytes()).unwrap();
            file.write_all(&[1, 2, 3]).unwrap();
        }

        let log = CheckpointLog::open(&path).unwrap();
        assert_eq!(log.replay(|_| Ok(())).unwrap(), 1);
    }
}
