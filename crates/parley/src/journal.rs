//! The append-only snapshot journal.
//!
//! One JSON object per line, each a full copy of the room table:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00Z","rooms":{"r1":[["127.0.0.1",5000]]}}
//! ```
//!
//! The journal is written on every registry mutation and read exactly once,
//! at startup, to seed liveness recovery. It is never compacted.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use parley_room::{RoomTable, SnapshotSink};
use serde::{Deserialize, Serialize};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub rooms: RoomTable,
}

/// Borrowed form of [`Snapshot`] so recording doesn't clone the table.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    timestamp: DateTime<Utc>,
    rooms: &'a RoomTable,
}

/// Appends snapshots to a file.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// A final line left without its newline is terminated first, so the
    /// next snapshot starts a line of its own.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if ends_mid_line(&mut file)? {
            tracing::warn!(path = %path.display(), "terminating torn final snapshot");
            file.write_all(b"\n")?;
            file.flush()?;
        }
        tracing::info!(path = %path.display(), "snapshot journal opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last snapshot in the journal at `path`.
    ///
    /// A missing file is an empty journal. Lines that don't parse (a write
    /// torn by a crash, say) are skipped, so the last *complete* snapshot
    /// wins.
    pub fn load_last(path: impl AsRef<Path>) -> io::Result<Option<Snapshot>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut last = None;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Snapshot>(&line) {
                Ok(snapshot) => last = Some(snapshot),
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(last)
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl SnapshotSink for Journal {
    fn record(&self, rooms: &RoomTable) -> io::Result<()> {
        let entry = SnapshotRef {
            timestamp: Utc::now(),
            rooms,
        };
        let mut line = serde_json::to_vec(&entry).map_err(io::Error::other)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("journal lock poisoned"))?;
        file.write_all(&line)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::Member;
    use std::net::{IpAddr, Ipv4Addr};

    fn table(entries: &[(&str, &[u16])]) -> RoomTable {
        entries
            .iter()
            .map(|(name, ports)| {
                let members = ports
                    .iter()
                    .map(|&p| Member::new(IpAddr::V4(Ipv4Addr::LOCALHOST), p))
                    .collect();
                (name.to_string(), members)
            })
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Journal::load_last(dir.path().join("nope.log")).unwrap(), None);
    }

    #[test]
    fn test_last_recorded_snapshot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.log");
        let journal = Journal::open(&path).unwrap();
        journal.record(&table(&[("r1", &[1])])).unwrap();
        journal.record(&table(&[("r1", &[1, 2]), ("r2", &[3])])).unwrap();

        let last = Journal::load_last(&path).unwrap().unwrap();
        assert_eq!(last.rooms, table(&[("r1", &[1, 2]), ("r2", &[3])]));
    }

    #[test]
    fn test_torn_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.log");
        let journal = Journal::open(&path).unwrap();
        journal.record(&table(&[("r1", &[1])])).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"timestamp":"2024-05-01T12:00:00Z","rooms":{"r1""#)
            .unwrap();

        let last = Journal::load_last(&path).unwrap().unwrap();
        assert_eq!(last.rooms, table(&[("r1", &[1])]));
    }

    #[test]
    fn test_reopen_after_torn_line_keeps_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.log");
        Journal::open(&path).unwrap().record(&table(&[("old", &[1])])).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"timestamp":"2024-05-01T12:00:00Z","rooms":{"r1""#)
            .unwrap();
        drop(file);

        Journal::open(&path).unwrap().record(&table(&[("new", &[2])])).unwrap();

        let last = Journal::load_last(&path).unwrap().unwrap();
        assert_eq!(last.rooms, table(&[("new", &[2])]));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.log");
        let journal = Journal::open(&path).unwrap();
        journal.record(&table(&[("r1", &[5000])])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(json["rooms"], serde_json::json!({"r1": [["127.0.0.1", 5000]]}));
        assert!(json["timestamp"].as_str().unwrap().parse::<DateTime<Utc>>().is_ok());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.log");
        Journal::open(&path).unwrap().record(&table(&[("a", &[1])])).unwrap();
        Journal::open(&path).unwrap().record(&table(&[("b", &[2])])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
