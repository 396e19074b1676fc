use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chainlog_types::{EntryId, LedgerEntry};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AdministrativeAccess, EntryIter, LedgerStore};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Largest payload a frame may declare. A header claiming more is corrupt.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// When appended records are forced to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPolicy {
    /// `fsync` before an append is acknowledged.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache write-back.
    OsDefault,
}

/// Configuration for [`FileLedgerStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    pub sync: SyncPolicy,
}

/// Where a record lives in the segment file.
#[derive(Clone, Copy, Debug)]
struct RecordLocation {
    offset: u64,
    len: u32,
    sequence_id: u64,
    entry_id: EntryId,
}

struct SegmentState {
    file: File,
    /// Byte offset one past the last acknowledged record.
    end: u64,
    records: Vec<RecordLocation>,
    by_id: HashMap<EntryId, usize>,
    tail: Option<LedgerEntry>,
}

impl SegmentState {
    fn empty(file: File) -> Self {
        Self {
            file,
            end: 0,
            records: Vec::new(),
            by_id: HashMap::new(),
            tail: None,
        }
    }

    fn push(&mut self, location: RecordLocation, entry: &LedgerEntry) {
        self.by_id.insert(location.entry_id, self.records.len());
        self.records.push(location);
        self.end = location.offset + HEADER_SIZE + u64::from(location.len);
        self.tail = Some(entry.clone());
    }
}

/// Durable ledger store backed by a single append-only segment file.
///
/// Entries are serialized with bincode and framed as
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LedgerEntry)]
/// ```
///
/// A frame is written with a single `write_all` and, under
/// [`SyncPolicy::EveryWrite`], synced before the append is acknowledged.
/// Only then is it added to the in-memory index that reads go through.
///
/// On open the file is read front to back. A truncated final frame is a torn
/// write that was never acknowledged: it is cut off with a warning. Any frame
/// that is complete but fails its checksum or does not decode is reported as
/// [`StoreError::Corrupt`], as is a length header that exceeds
/// [`MAX_RECORD_LEN`] or runs past the end of the file while complete records
/// still follow it.
///
/// A store holds an exclusive lock on `<segment>.lock` for its whole lifetime,
/// so only one instance (in this process or any other) appends to a segment.
pub struct FileLedgerStore {
    path: PathBuf,
    config: FileStoreConfig,
    state: RwLock<SegmentState>,
    _writer_lock: File,
}

impl FileLedgerStore {
    /// Open (or create) the segment file at `path` and recover its index.
    pub fn open(path: impl AsRef<Path>, config: FileStoreConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer_lock = acquire_writer_lock(&path)?;
        let file = open_segment(&path)?;
        let file_len = file.metadata()?.len();
        let mut state = SegmentState::empty(file);
        recover(&mut state, file_len)?;

        if state.end < file_len {
            warn!(
                path = %path.display(),
                valid = state.end,
                file_len,
                "truncating torn record at end of ledger segment"
            );
            state.file.set_len(state.end)?;
            state.file.sync_all()?;
        }

        info!(
            path = %path.display(),
            entries = state.records.len(),
            "ledger segment opened"
        );
        Ok(Self {
            path,
            config,
            state: RwLock::new(state),
            _writer_lock: writer_lock,
        })
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, SegmentState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, SegmentState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_frame(&self, file: &mut File, frame: &[u8]) -> io::Result<()> {
        file.write_all(frame)?;
        if self.config.sync == SyncPolicy::EveryWrite {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Replace the whole segment with `edit` applied to its entries.
    ///
    /// The new segment is written to a sibling temp file and renamed over the
    /// old one, so readers observe either the old or the new contents.
    fn rewrite<F>(&self, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<LedgerEntry>) -> StoreResult<()>,
    {
        let mut state = self.write()?;

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut entries = state
            .records
            .iter()
            .map(|location| read_record(&mut reader, location))
            .collect::<StoreResult<Vec<_>>>()?;
        drop(reader);

        edit(&mut entries)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        let mut locations = Vec::with_capacity(entries.len());
        let mut end = 0u64;
        for entry in &entries {
            let frame = encode_record(entry)?;
            staged.write_all(&frame)?;
            locations.push(locate(end, &frame, entry));
            end += frame.len() as u64;
        }
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|err| StoreError::Io(err.error))?;

        let mut fresh = SegmentState::empty(open_segment(&self.path)?);
        for (location, entry) in locations.into_iter().zip(&entries) {
            fresh.push(location, entry);
        }
        *state = fresh;
        Ok(())
    }
}

impl LedgerStore for FileLedgerStore {
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
        let mut state = self.write()?;

        let expected = state.tail.as_ref().map_or(1, |tail| tail.sequence_id + 1);
        if entry.sequence_id != expected {
            return Err(StoreError::SequenceConflict {
                expected,
                found: entry.sequence_id,
            });
        }
        if state.by_id.contains_key(&entry.entry_id) {
            return Err(StoreError::DuplicateEntry(entry.entry_id));
        }

        let frame = encode_record(entry)?;
        let offset = state.end;
        if let Err(err) = self.write_frame(&mut state.file, &frame) {
            // Drop any partial frame so the next append starts on a boundary.
            if let Err(truncate_err) = state.file.set_len(offset) {
                warn!(offset, error = %truncate_err, "failed to roll back partial record");
            }
            return Err(err.into());
        }

        state.push(locate(offset, &frame, entry), entry);
        debug!(
            seq = entry.sequence_id,
            offset,
            len = frame.len(),
            "ledger record appended"
        );
        Ok(entry.entry_id)
    }

    fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
        let state = self.read()?;
        let records = state.records.clone();
        // Opened under the lock so a concurrent rewrite cannot swap the file
        // out from under the cloned offsets.
        let mut reader = BufReader::new(File::open(&self.path)?);
        drop(state);

        Ok(Box::new(
            records
                .into_iter()
                .map(move |location| read_record(&mut reader, &location)),
        ))
    }

    fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.read()?.tail.clone())
    }

    fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
        let state = self.read()?;
        if let Some(tail) = state.tail.as_ref().filter(|tail| tail.entry_id == *entry_id) {
            return Ok(Some(tail.clone()));
        }
        let Some(location) = state
            .by_id
            .get(entry_id)
            .and_then(|index| state.records.get(*index))
        else {
            return Ok(None);
        };
        let mut file = File::open(&self.path)?;
        read_record(&mut file, location).map(Some)
    }

    fn len(&self) -> StoreResult<u64> {
        Ok(self.read()?.records.len() as u64)
    }
}

impl AdministrativeAccess for FileLedgerStore {
    fn update_entry(&self, actor_id: &str, entry: &LedgerEntry) -> StoreResult<()> {
        debug!(actor = actor_id, seq = entry.sequence_id, "administrative update");
        self.rewrite(|entries| {
            let slot = entries
                .iter_mut()
                .find(|stored| stored.sequence_id == entry.sequence_id)
                .ok_or(StoreError::MissingSequence(entry.sequence_id))?;
            *slot = entry.clone();
            Ok(())
        })
    }

    fn remove_entry(&self, actor_id: &str, sequence_id: u64) -> StoreResult<()> {
        debug!(actor = actor_id, seq = sequence_id, "administrative remove");
        self.rewrite(|entries| {
            let index = entries
                .iter()
                .position(|stored| stored.sequence_id == sequence_id)
                .ok_or(StoreError::MissingSequence(sequence_id))?;
            entries.remove(index);
            Ok(())
        })
    }
}

impl std::fmt::Debug for FileLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedgerStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("entry_count", &self.len().unwrap_or_default())
            .finish()
    }
}

/// Take the exclusive writer lock that sits next to the segment. The lock file
/// outlives administrative rewrites, which replace the segment itself.
fn acquire_writer_lock(path: &Path) -> StoreResult<File> {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    let lock_path = PathBuf::from(name);

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            warn!(path = %path.display(), "ledger segment already locked");
            Err(StoreError::Locked(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}

fn open_segment(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

fn encode_record(entry: &LedgerEntry) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|length| *length <= MAX_RECORD_LEN)
        .ok_or_else(|| {
            StoreError::Serialization(format!(
                "record of {} bytes exceeds the {MAX_RECORD_LEN} byte limit",
                payload.len()
            ))
        })?;

    let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn locate(offset: u64, frame: &[u8], entry: &LedgerEntry) -> RecordLocation {
    RecordLocation {
        offset,
        len: (frame.len() as u64 - HEADER_SIZE) as u32,
        sequence_id: entry.sequence_id,
        entry_id: entry.entry_id,
    }
}

fn parse_header(header: &[u8; HEADER_SIZE as usize]) -> (u32, u32) {
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (length, crc)
}

fn decode_payload(offset: u64, payload: &[u8], expected_crc: u32) -> StoreResult<LedgerEntry> {
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(StoreError::Corrupt {
            offset,
            reason: format!("checksum mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"),
        });
    }
    bincode::deserialize(payload).map_err(|e| StoreError::Corrupt {
        offset,
        reason: format!("undecodable record: {e}"),
    })
}

/// Read and verify the record at `location`.
fn read_record<R: Read + Seek>(
    reader: &mut R,
    location: &RecordLocation,
) -> StoreResult<LedgerEntry> {
    reader.seek(SeekFrom::Start(location.offset))?;
    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;
    let (length, crc) = parse_header(&header);
    if length != location.len {
        return Err(StoreError::Corrupt {
            offset: location.offset,
            reason: format!("length changed from {} to {length}", location.len),
        });
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;
    let entry = decode_payload(location.offset, &payload, crc)?;
    if entry.sequence_id != location.sequence_id || entry.entry_id != location.entry_id {
        return Err(StoreError::Corrupt {
            offset: location.offset,
            reason: "record identity changed since it was indexed".into(),
        });
    }
    Ok(entry)
}

/// Offset within `bytes` of the first complete, checksummed record, if any.
fn first_complete_frame(bytes: &[u8]) -> Option<usize> {
    let header_len = HEADER_SIZE as usize;
    (0..bytes.len()).find(|&start| {
        let Some(header) = bytes
            .get(start..start + header_len)
            .and_then(|raw| <[u8; HEADER_SIZE as usize]>::try_from(raw).ok())
        else {
            return false;
        };
        let (length, crc) = parse_header(&header);
        if length == 0 || length > MAX_RECORD_LEN {
            return false;
        }
        let payload_start = start + header_len;
        bytes
            .get(payload_start..payload_start + length as usize)
            .is_some_and(|payload| {
                crc32fast::hash(payload) == crc
                    && bincode::deserialize::<LedgerEntry>(payload).is_ok()
            })
    })
}

/// Rebuild the index from the segment. Stops at the first torn frame, leaving
/// `state.end` at the last complete one.
///
/// A frame only counts as torn when it is the last thing in the file. A length
/// header past [`MAX_RECORD_LEN`], or one that overruns the file while a
/// complete record follows it, is corruption.
fn recover(state: &mut SegmentState, file_len: u64) -> StoreResult<()> {
    let mut reader = BufReader::new(&state.file);
    reader.seek(SeekFrom::Start(0))?;
    let mut recovered = Vec::new();
    let mut offset = 0u64;

    while offset < file_len {
        if offset + HEADER_SIZE > file_len {
            warn!(offset, file_len, "torn record header");
            break;
        }
        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;
        let (length, crc) = parse_header(&header);
        if length > MAX_RECORD_LEN {
            return Err(StoreError::Corrupt {
                offset,
                reason: format!("record length {length} exceeds {MAX_RECORD_LEN}"),
            });
        }

        let end = offset + HEADER_SIZE + u64::from(length);
        if end > file_len {
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest)?;
            if let Some(found) = first_complete_frame(&rest) {
                return Err(StoreError::Corrupt {
                    offset,
                    reason: format!(
                        "record length {length} overruns the segment but a complete record \
                         follows at offset {}",
                        offset + HEADER_SIZE + found as u64
                    ),
                });
            }
            warn!(offset, length, file_len, "torn record payload");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        let entry = decode_payload(offset, &payload, crc)?;
        recovered.push((
            RecordLocation {
                offset,
                len: length,
                sequence_id: entry.sequence_id,
                entry_id: entry.entry_id,
            },
            entry,
        ));
        offset = end;
    }
    drop(reader);

    for (location, entry) in &recovered {
        state.push(*location, entry);
    }
    debug!(recovered = recovered.len(), "ledger segment recovery complete");
    Ok(())
}
