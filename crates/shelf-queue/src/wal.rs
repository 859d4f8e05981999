use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::WalRecord;

/// Flush strategy for topic WAL files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every record.
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

struct WalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only log of [`WalRecord`]s for one topic.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: bincode-serialized WalRecord]
/// ```
///
/// Recovery reads front to back. A record whose CRC does not match is
/// skipped; a length that runs past the end of the file marks a torn tail
/// and ends recovery.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_mode: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_mode,
        })
    }

    /// Append one record. Returns the byte offset it was written at.
    pub fn append(&self, record: &WalRecord) -> QueueResult<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut w = self.lock()?;
        let entry_offset = w.offset;
        write_frame(&mut w.writer, &payload)?;
        w.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += HEADER_SIZE + payload.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "wal append");
        Ok(entry_offset)
    }

    /// Read every intact record in file order.
    pub fn recover(&self) -> QueueResult<Vec<WalRecord>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE as usize];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE + length as u64 > file_len {
                warn!(offset, length, file_len, "torn wal tail; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;
            offset += HEADER_SIZE + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "wal crc mismatch; skipping record"
                );
                continue;
            }

            match bincode::deserialize::<WalRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable wal record; skipping"),
            }
        }

        debug!(recovered = records.len(), path = %self.path.display(), "wal recovery complete");
        Ok(records)
    }

    /// Replace the file contents with exactly `records`.
    pub fn rewrite(&self, records: &[WalRecord]) -> QueueResult<()> {
        let mut w = self.lock()?;

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut offset = 0;
        for record in records {
            let payload = bincode::serialize(record)
                .map_err(|e| QueueError::Serialization(e.to_string()))?;
            write_frame(&mut writer, &payload)?;
            offset += HEADER_SIZE + payload.len() as u64;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;

        // Reopen in append mode so later appends land after the rewrite.
        drop(writer);
        let file = OpenOptions::new().append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = offset;

        debug!(records = records.len(), "wal rewritten");
        Ok(())
    }

    /// Drop all data.
    pub fn truncate(&self) -> QueueResult<()> {
        self.rewrite(&[])
    }

    /// Current write offset (file length).
    pub fn offset(&self) -> u64 {
        self.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, WalWriter>> {
        self.writer.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(payload)
}
