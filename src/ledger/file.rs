//! File-backed ledger.
//!
//! Every batch is appended to a single log as one checksummed frame and
//! the live key set is rebuilt in memory on open. A frame is either
//! replayed whole or not at all, which makes `put_batch` atomic.

use super::{Ledger, LedgerWrite};
use crate::error::{Result, StoreError};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes for the ledger log.
const LEDGER_MAGIC: &[u8; 4] = b"LDG\0";

/// Current ledger format version.
const LEDGER_VERSION: u8 = 1;

/// Magic + version.
const HEADER_LEN: u64 = 5;

/// Upper bound on the encoded body of a single frame.
#[cfg(not(test))]
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;
#[cfg(test)]
const MAX_FRAME_LEN: usize = 64 * 1024;

/// Length prefix + checksum.
const FRAME_OVERHEAD: usize = 8;

const LOG_FILE: &str = "ledger.log";
const COMPACT_FILE: &str = "ledger.log.compact";
const LOCK_FILE: &str = "LOCK";

/// File ledger configuration.
#[derive(Clone, Debug)]
pub struct FileLedgerConfig {
    /// Directory holding the ledger.
    pub path: PathBuf,

    /// fsync after every frame.
    pub sync_writes: bool,

    /// Whether to create the ledger if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for FileLedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ledger"),
            sync_writes: true,
            create_if_missing: true,
        }
    }
}

/// One committed batch.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    writes: Vec<(String, Vec<u8>)>,
}

impl Frame {
    /// Length-prefixed, checksummed bytes of the frame.
    ///
    /// Frames whose body would exceed `MAX_FRAME_LEN` are rejected here so
    /// that nothing replay would refuse ever reaches the log.
    fn encode(&self) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec(self)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(StoreError::InvalidOperation(format!(
                "ledger frame of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_FRAME_LEN
            )));
        }

        let mut bytes = Vec::with_capacity(body.len() + FRAME_OVERHEAD);
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        Ok(bytes)
    }
}

/// Upper bound on the encoded size of one write inside a frame.
fn write_size_bound(key: &str, value: &[u8]) -> usize {
    // msgpack spends at most two bytes per value byte plus small headers
    key.len() + 2 * value.len() + 16
}

/// Split a key set into frames that each stay under `MAX_FRAME_LEN`.
fn chunk_frames(entries: &BTreeMap<String, Vec<u8>>) -> Vec<Frame> {
    let budget = MAX_FRAME_LEN - 16;
    let mut frames = Vec::new();
    let mut current = Vec::new();
    let mut size = 0;

    for (key, value) in entries {
        let bound = write_size_bound(key, value);
        if !current.is_empty() && size + bound > budget {
            frames.push(Frame {
                writes: mem::take(&mut current),
            });
            size = 0;
        }
        size += bound;
        current.push((key.clone(), value.clone()));
    }
    if !current.is_empty() {
        frames.push(Frame { writes: current });
    }

    frames
}

enum FrameRead {
    Frame { frame: Frame, len: u64 },
    End,
    Torn,
}

/// Append handle to the log and the length of its committed prefix.
struct LogWriter {
    /// `None` once a rollback could not restore the committed prefix.
    writer: Option<BufWriter<File>>,
    committed_len: u64,
}

impl LogWriter {
    fn open(log_path: &Path) -> Result<Self> {
        let file = OpenOptions::new().append(true).open(log_path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            committed_len,
        })
    }

    fn append(&mut self, frame: &Frame, sync: bool) -> Result<()> {
        let bytes = frame.encode()?;
        self.commit_with(|w| {
            w.write_all(&bytes)?;
            w.flush()?;
            if sync {
                w.get_ref().sync_all()?;
            }
            Ok(bytes.len() as u64)
        })
    }

    /// Run `write` against the log. On failure the log is cut back to the
    /// last committed frame and any buffered bytes are discarded.
    fn commit_with<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<u64>,
    {
        let writer = self.writer.as_mut().ok_or_else(|| {
            StoreError::Ledger("ledger log could not be rolled back; reopen the ledger".into())
        })?;

        match write(writer) {
            Ok(written) => {
                self.committed_len += written;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, offset = self.committed_len, "ledger write failed, rolling back");
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "ledger rollback failed");
                }
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let (file, _unflushed) = writer.into_parts();
        file.set_len(self.committed_len)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

/// Durable ledger stored in a directory on disk.
pub struct FileLedger {
    config: FileLedgerConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Live key set, rebuilt from the log on open.
    entries: RwLock<BTreeMap<String, Vec<u8>>>,

    /// Append handle to the log.
    log: Mutex<LogWriter>,
}

impl FileLedger {
    /// Open an existing ledger or create a new one.
    pub fn open(config: FileLedgerConfig) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let log_path = config.path.join(LOG_FILE);
        let entries = if log_path.exists() {
            Self::replay(&log_path)?
        } else {
            Self::write_header(&log_path)?;
            BTreeMap::new()
        };

        let log = LogWriter::open(&log_path)?;

        debug!(path = %config.path.display(), keys = entries.len(), "opened file ledger");

        Ok(Self {
            config,
            _lock_file: lock_file,
            entries: RwLock::new(entries),
            log: Mutex::new(log),
        })
    }

    /// Open the ledger at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(FileLedgerConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Flush buffered frames and fsync the log.
    pub fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    /// Rewrite the log as the live key set, split into as few frames as
    /// the frame size limit allows.
    ///
    /// Returns the number of keys written.
    pub fn compact(&self) -> Result<usize> {
        let mut log = self.log.lock();
        let entries = self.entries.read();
        let frames = chunk_frames(&entries);

        let compact_path = self.config.path.join(COMPACT_FILE);
        let log_path = self.config.path.join(LOG_FILE);
        if let Err(e) = Self::write_compacted(&compact_path, &frames) {
            let _ = fs::remove_file(&compact_path);
            return Err(e);
        }
        fs::rename(&compact_path, &log_path)?;

        *log = LogWriter::open(&log_path)?;

        info!(keys = entries.len(), frames = frames.len(), "compacted file ledger");
        Ok(entries.len())
    }

    // --- Private Helpers ---

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }

    fn write_header(log_path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(log_path)?;

        file.write_all(LEDGER_MAGIC)?;
        file.write_all(&[LEDGER_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn write_compacted(path: &Path, frames: &[Frame]) -> Result<()> {
        let mut file = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        );
        file.write_all(LEDGER_MAGIC)?;
        file.write_all(&[LEDGER_VERSION])?;
        for frame in frames {
            file.write_all(&frame.encode()?)?;
        }
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    /// Rebuild the key set from the log, truncating a torn trailing frame.
    fn replay(log_path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
        // A crash between creating the log and writing its header
        if fs::metadata(log_path)?.len() < HEADER_LEN {
            warn!("ledger log has no complete header, starting fresh");
            Self::write_header(log_path)?;
            return Ok(BTreeMap::new());
        }

        let file = File::open(log_path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LEDGER_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid ledger magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != LEDGER_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported ledger version: {}",
                version[0]
            )));
        }

        let mut entries = BTreeMap::new();
        let mut valid_len = HEADER_LEN;
        loop {
            match Self::read_frame(&mut reader)? {
                FrameRead::Frame { frame, len } => {
                    for (key, value) in frame.writes {
                        entries.insert(key, value);
                    }
                    valid_len += len;
                }
                FrameRead::End => break,
                FrameRead::Torn => {
                    warn!(offset = valid_len, "discarding torn frame at end of ledger");
                    OpenOptions::new()
                        .write(true)
                        .open(log_path)?
                        .set_len(valid_len)?;
                    break;
                }
            }
        }

        Ok(entries)
    }

    fn read_frame<R: Read>(reader: &mut R) -> Result<FrameRead> {
        let mut len_bytes = [0u8; 4];
        match read_fully(reader, &mut len_bytes)? {
            0 => return Ok(FrameRead::End),
            4 => {}
            _ => return Ok(FrameRead::Torn),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_LEN {
            return Err(StoreError::Corruption("Ledger frame too large".into()));
        }

        let mut encoded = vec![0u8; len];
        if read_fully(reader, &mut encoded)? < len {
            return Ok(FrameRead::Torn);
        }

        let mut checksum_bytes = [0u8; 4];
        if read_fully(reader, &mut checksum_bytes)? < 4 {
            return Ok(FrameRead::Torn);
        }
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let computed_checksum = crc32fast::hash(&encoded);
        if stored_checksum != computed_checksum {
            return Err(StoreError::Corruption("Ledger checksum mismatch".into()));
        }

        let frame = rmp_serde::from_slice(&encoded)?;
        Ok(FrameRead::Frame {
            frame,
            len: (len + FRAME_OVERHEAD) as u64,
        })
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl Ledger for FileLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.put_batch(&[LedgerWrite::new(key, value)])
    }

    fn put_batch(&self, writes: &[LedgerWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let frame = Frame {
            writes: writes
                .iter()
                .map(|w| (w.key.clone(), w.value.clone()))
                .collect(),
        };

        let mut log = self.log.lock();
        log.append(&frame, self.config.sync_writes)?;

        let mut entries = self.entries.write();
        for (key, value) in frame.writes {
            entries.insert(key, value);
        }

        debug!(keys = writes.len(), "committed ledger frame");
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}

impl Drop for FileLedger {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.log.get_mut().sync();
    }
}
