use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// A single mutation recorded in the journal.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    Put {
        key: String,
        value: Vec<u8>,
        index: u64,
        expires_at_ms: Option<u64>,
    },
    Delete {
        key: String,
    },
    DeleteTree {
        prefix: String,
    },
    /// High-water mark of the store index. Written at the head of a
    /// compacted journal, where the writes that reached it may be gone.
    Index {
        index: u64,
    },
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only mutation log backing the file store.
///
/// Records are framed with a length prefix and a CRC32 checksum. Replay reads
/// front to back; a record with a bad checksum is skipped, and a torn tail
/// (short header or payload) ends replay and is cut off before new writes
/// are appended.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
}

impl Journal {
    /// Open (or create) the journal at `path` and return every intact record.
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<JournalRecord>)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (records, valid_len) = if path.exists() {
            replay(path)?
        } else {
            (Vec::new(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(path = %path.display(), file_len, valid_len, "truncating torn journal tail");
            file.set_len(valid_len)?;
        }
        drop(file);

        let writer = open_append(path)?;
        debug!(path = %path.display(), records = records.len(), "journal opened");

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(JournalWriter {
                    writer,
                    offset: valid_len,
                }),
            },
            records,
        ))
    }

    /// Append one record. Returns its byte offset.
    pub fn append(&self, record: &JournalRecord) -> StoreResult<u64> {
        let frame = encode(record)?;

        let mut w = self.writer.lock();
        let offset = w.offset;
        w.writer.write_all(&frame)?;
        w.writer.flush()?;
        w.offset += frame.len() as u64;

        Ok(offset)
    }

    /// Replace the whole journal with `records`.
    ///
    /// The new content is written to a temporary file in the same directory
    /// and renamed over the old journal, so a crash leaves one or the other.
    pub fn rewrite(&self, records: &[JournalRecord]) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut w = self.writer.lock();
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for record in records {
                let frame = encode(record)?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        w.writer = open_append(&self.path)?;
        w.offset = written;

        debug!(path = %self.path.display(), records = records.len(), bytes = written, "journal rewritten");
        Ok(())
    }

    /// Flush buffered data and fsync the file.
    pub fn sync(&self) -> StoreResult<()> {
        let mut w = self.writer.lock();
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Current end offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_append(path: &Path) -> StoreResult<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn encode(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Serialization(format!("journal record too large: {} bytes", payload.len()))
    })?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read every intact record and the length of the intact prefix.
fn replay(path: &Path) -> StoreResult<(Vec<JournalRecord>, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut records = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE <= file_len {
        let mut header = [0u8; HEADER_SIZE as usize];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE + length as u64 > file_len {
            warn!(offset, length, file_len, "invalid journal record length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated journal record; stopping replay");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        offset += HEADER_SIZE + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping journal record");
            continue;
        }

        match bincode::deserialize::<JournalRecord>(&payload) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(StoreError::CorruptJournal {
                    path: path.to_path_buf(),
                    reason: format!("undecodable record at offset {offset}: {e}"),
                })
            }
        }
    }

    debug!(path = %path.display(), recovered = records.len(), "journal replay complete");
    Ok((records, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, index: u64) -> JournalRecord {
        JournalRecord::Put {
            key: key.to_string(),
            value: format!("value-{index}").into_bytes(),
            index,
            expires_at_ms: None,
        }
    }

    #[test]
    fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        {
            let (journal, records) = Journal::open(&path).unwrap();
            assert!(records.is_empty());
            journal.append(&put("a/", 1)).unwrap();
            journal.append(&JournalRecord::Delete { key: "a/".into() }).unwrap();
            journal.append(&put("b/", 2)).unwrap();
        }

        let (_journal, records) = Journal::open(&path).unwrap();
        assert_eq!(
            records,
            vec![put("a/", 1), JournalRecord::Delete { key: "a/".into() }, put("b/", 2)]
        );
    }

    #[test]
    fn rewrite_keeps_index_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");
        {
            let (journal, _) = Journal::open(&path).unwrap();
            journal
                .rewrite(&[JournalRecord::Index { index: 7 }, put("a/", 3)])
                .unwrap();
        }

        let (_journal, records) = Journal::open(&path).unwrap();
        assert_eq!(records, vec![JournalRecord::Index { index: 7 }, put("a/", 3)]);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/kv.journal");
        let (journal, _) = Journal::open(&path).unwrap();
        journal.append(&put("k/", 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn torn_tail_is_cut_before_new_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        {
            let (journal, _) = Journal::open(&path).unwrap();
            journal.append(&put("a/", 1)).unwrap();
        }
        // Simulate a crash in the middle of writing a header.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0x20, 0x00, 0x00]).unwrap();
        }

        {
            let (journal, records) = Journal::open(&path).unwrap();
            assert_eq!(records, vec![put("a/", 1)]);
            journal.append(&put("b/", 2)).unwrap();
        }

        let (_journal, records) = Journal::open(&path).unwrap();
        assert_eq!(records, vec![put("a/", 1), put("b/", 2)]);
    }

    #[test]
    fn crc_mismatch_skips_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        let first_len = {
            let (journal, _) = Journal::open(&path).unwrap();
            journal.append(&put("a/", 1)).unwrap();
            let len = journal.offset();
            journal.append(&put("b/", 2)).unwrap();
            len
        };

        // Flip a payload byte of the first record.
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE as usize + 2] ^= 0xff;
        assert!(first_len > HEADER_SIZE);
        fs::write(&path, bytes).unwrap();

        let (_journal, records) = Journal::open(&path).unwrap();
        assert_eq!(records, vec![put("b/", 2)]);
    }

    #[test]
    fn rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.journal");

        {
            let (journal, _) = Journal::open(&path).unwrap();
            for i in 1..=10 {
                journal.append(&put("a/", i)).unwrap();
            }
            journal.rewrite(&[put("a/", 10)]).unwrap();
            journal.append(&put("b/", 11)).unwrap();
        }

        let (_journal, records) = Journal::open(&path).unwrap();
        assert_eq!(records, vec![put("a/", 10), put("b/", 11)]);
    }
}
