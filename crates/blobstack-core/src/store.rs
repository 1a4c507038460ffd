//! The metadata store: an in-memory index replayed from an append-only log.
//!
//! [`MetadataStore`] owns three things behind one readers-writer lock:
//!
//! - the in-memory index (`id -> ObjectRecord`),
//! - the append-mode handle to the durable log,
//! - the lifecycle phase (`Uninitialized -> Ready -> Closed`).
//!
//! Mutating operations take the lock exclusively for their entire body,
//! including the log append and fsync, so no two mutations interleave their
//! log writes and the log's order always matches the index's history. Reads
//! take the shared side and never touch the log.
//!
//! Durability contract: the index is mutated before the log is appended, so
//! a crash inside a mutation can lose an in-memory-only record -- but the
//! operation only returns to its caller after the fsync, so no acknowledged
//! mutation is ever lost. Content updates are deliberately not logged: the
//! log is an existence ledger, not a content journal.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::log::{self, ACTION_ADD, ACTION_DEL};
use crate::record::ObjectRecord;

// ---------------------------------------------------------------------------
// ObjectData
// ---------------------------------------------------------------------------

/// A blob read result: the full bytes plus a content type inferred from the
/// record's path extension.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// The blob bytes.
    pub bytes: Bytes,
    /// Inferred content type, `None` when the extension is unknown.
    pub content_type: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// MetadataStore
// ---------------------------------------------------------------------------

/// The append-mode log handle, doubling as the store's lifecycle phase.
#[derive(Debug)]
enum LogHandle {
    /// No replay has completed yet; every operation fails `NotInitialized`.
    Uninitialized,
    /// Replay done, log open for appends.
    Open(File),
    /// Shutdown dropped the handle; mutations fail `Exiting`, reads continue.
    Closed,
}

#[derive(Debug)]
struct Inner {
    index: HashMap<String, ObjectRecord>,
    log: LogHandle,
}

/// The log-backed object metadata store.
///
/// Construct with [`MetadataStore::new`], then call
/// [`initialize`](Self::initialize) to replay the log before serving. All
/// operations are synchronous and blocking; the store is `Send + Sync` and
/// is shared by reference across request handlers.
///
/// # Examples
///
/// ```
/// use blobstack_core::MetadataStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = MetadataStore::new();
/// store.initialize(dir.path().join("metadata.log")).unwrap();
///
/// let record = store
///     .create(dir.path().join("hello.txt"), b"hello")
///     .unwrap();
/// assert_eq!(store.read(&record.id).unwrap().bytes.as_ref(), b"hello");
/// ```
#[derive(Debug)]
pub struct MetadataStore {
    inner: RwLock<Inner>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// Create an uninitialized store. Every operation except
    /// [`initialize`](Self::initialize) fails with
    /// [`StoreError::NotInitialized`] until a replay completes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                index: HashMap::new(),
                log: LogHandle::Uninitialized,
            }),
        }
    }

    /// Replay the log at `log_path` and open it for appends.
    ///
    /// An absent file means an empty store; it is created. Otherwise the file
    /// is folded line by line: blank lines are ignored, lines missing the
    /// `<ACTION> <ID> <PAYLOAD>` shape are skipped, `ADD` inserts the decoded
    /// record, `DEL` removes the id (absent ids are fine).
    ///
    /// Idempotent: re-initializing from the same log contents reproduces the
    /// same index, including after [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - [`StoreError::Corrupt`] when an `ADD` payload fails to decode or an
    ///   unknown action token appears. Skipping either would hide data loss,
    ///   unlike the malformed lines above.
    /// - [`StoreError::Io`] when the file cannot be read or reopened.
    pub fn initialize(&self, log_path: impl AsRef<Path>) -> StoreResult<()> {
        let log_path = log_path.as_ref();
        let mut inner = self.inner.write();

        let index = match File::open(log_path) {
            Ok(file) => replay(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        info!(
            path = %log_path.display(),
            records = index.len(),
            "replayed metadata log"
        );

        inner.index = index;
        inner.log = LogHandle::Open(log);
        Ok(())
    }

    /// Drop the log handle, refusing all further mutations with
    /// [`StoreError::Exiting`]. Reads remain permitted: the index stays
    /// valid and read-only access during shutdown drain is harmless.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if matches!(inner.log, LogHandle::Open(_)) {
            info!("closing metadata log");
            inner.log = LogHandle::Closed;
        }
    }

    // -----------------------------------------------------------------------
    // Mutations (exclusive lock)
    // -----------------------------------------------------------------------

    /// Store `data` as a new object at `path`.
    ///
    /// The blob bytes are written first (a partial file is removed on write
    /// failure, leaving the index untouched), then the record enters the
    /// index, then an `ADD` entry is appended and fsynced. The record is
    /// returned only after the fsync, so an acknowledged create survives
    /// replay.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] when a live record holds `path`.
    /// - [`StoreError::Exiting`] after [`close`](Self::close).
    pub fn create(&self, path: impl Into<PathBuf>, data: &[u8]) -> StoreResult<ObjectRecord> {
        self.inner.write().create(path.into(), data)
    }

    /// Replace (`overwrite = true`) or append to (`overwrite = false`) the
    /// content of the object `id`. Metadata is unchanged and no log entry is
    /// written -- the log tracks existence, not content.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] for an unknown id or a vanished backing
    /// file; [`StoreError::Exiting`] after close.
    pub fn update(&self, id: &str, data: &[u8], overwrite: bool) -> StoreResult<()> {
        self.inner.write().update(id, data, overwrite)
    }

    /// Duplicate the object `id` under a synthesized path in the source's
    /// directory, producing a brand-new record with its own id and `ADD`
    /// entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] when the source is unknown;
    /// [`StoreError::Exiting`] after close.
    pub fn copy(&self, id: &str) -> StoreResult<ObjectRecord> {
        let mut inner = self.inner.write();
        let src = inner.record(id)?.clone();
        let data = read_blob(&src.path)?;

        let base = src
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = src.path.parent().unwrap_or_else(|| Path::new(""));
        let dst = dir.join(format!("copy_{}_{base}", Uuid::new_v4()));

        inner.create(dst, &data)
    }

    /// Create-or-replace by path: overwrite the content of the live record
    /// at `path` if one exists (same id, no log entry, `created` flag
    /// `false`), otherwise run the full create algorithm (`true`).
    ///
    /// This is the operation behind capability-token writes; calling it
    /// twice with the same path yields the same id both times.
    ///
    /// # Errors
    ///
    /// [`StoreError::Exiting`] after close.
    pub fn upsert(
        &self,
        path: impl Into<PathBuf>,
        data: &[u8],
    ) -> StoreResult<(ObjectRecord, bool)> {
        let mut inner = self.inner.write();
        let path = path.into();

        if let Some(existing) = inner.find_live(&path).cloned() {
            inner.update(&existing.id, data, true)?;
            return Ok((existing, false));
        }
        let record = inner.create(path, data)?;
        Ok((record, true))
    }

    /// Delete the object `id`: remove the backing file, drop the record from
    /// the index on successful removal, and append a `DEL` entry regardless
    /// of the removal outcome.
    ///
    /// The unconditional append means a failed unlink still tombstones the
    /// id in the log while the index keeps the record until restart; callers
    /// see the unlink failure either way.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] for an unknown id or an already-missing
    /// backing file; [`StoreError::Exiting`] after close.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.write().delete(id)
    }

    // -----------------------------------------------------------------------
    // Reads (shared lock)
    // -----------------------------------------------------------------------

    /// Read the blob bytes for `id`, with a content type inferred from the
    /// path extension. Consults the index only, never the log.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] for an unknown id or a vanished backing file.
    pub fn read(&self, id: &str) -> StoreResult<ObjectData> {
        let inner = self.inner.read();
        let record = inner.record(id)?;
        let bytes = read_blob(&record.path)?;
        Ok(ObjectData {
            bytes: Bytes::from(bytes),
            content_type: record.content_type(),
        })
    }

    /// Fetch the metadata record for `id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] when the id is unknown.
    pub fn get(&self, id: &str) -> StoreResult<ObjectRecord> {
        Ok(self.inner.read().record(id)?.clone())
    }

    /// Resolve a live record by its storage path.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotExist`] when no live record holds `path`.
    pub fn find_by_path(&self, path: impl AsRef<Path>) -> StoreResult<ObjectRecord> {
        let inner = self.inner.read();
        inner.ensure_initialized()?;
        inner
            .find_live(path.as_ref())
            .cloned()
            .ok_or(StoreError::NotExist)
    }

    /// All live records, in unspecified (index iteration) order.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotInitialized`] before the first replay.
    pub fn list(&self) -> StoreResult<Vec<ObjectRecord>> {
        let inner = self.inner.read();
        inner.ensure_initialized()?;
        Ok(inner.index.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Inner: operations running under an already-held exclusive lock
// ---------------------------------------------------------------------------

impl Inner {
    fn ensure_initialized(&self) -> StoreResult<()> {
        if matches!(self.log, LogHandle::Uninitialized) {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        match self.log {
            LogHandle::Open(_) => Ok(()),
            LogHandle::Uninitialized => Err(StoreError::NotInitialized),
            LogHandle::Closed => Err(StoreError::Exiting),
        }
    }

    fn record(&self, id: &str) -> StoreResult<&ObjectRecord> {
        self.ensure_initialized()?;
        self.index.get(id).ok_or(StoreError::NotExist)
    }

    fn find_live(&self, path: &Path) -> Option<&ObjectRecord> {
        self.index.values().find(|r| r.path == path)
    }

    /// Append a rendered entry and force it to stable storage.
    fn append_entry(&mut self, entry: &str) -> StoreResult<()> {
        match &mut self.log {
            LogHandle::Open(file) => {
                file.write_all(entry.as_bytes())?;
                file.sync_all()?;
                Ok(())
            }
            LogHandle::Uninitialized => Err(StoreError::NotInitialized),
            LogHandle::Closed => Err(StoreError::Exiting),
        }
    }

    fn create(&mut self, path: PathBuf, data: &[u8]) -> StoreResult<ObjectRecord> {
        self.ensure_writable()?;
        if self.find_live(&path).is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if let Err(e) = file.write_all(data) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial file");
            }
            return Err(e.into());
        }
        drop(file);

        let record = ObjectRecord::new(path);
        // Index first, then log: a crash here loses only an unacknowledged
        // create.
        self.index.insert(record.id.clone(), record.clone());
        self.append_entry(&log::encode_add(&record)?)?;

        debug!(id = %record.id, path = %record.path.display(), "created object");
        Ok(record)
    }

    fn update(&mut self, id: &str, data: &[u8], overwrite: bool) -> StoreResult<()> {
        self.ensure_writable()?;
        let path = self.record(id)?.path.clone();

        let mut opts = OpenOptions::new();
        opts.write(true);
        if overwrite {
            opts.truncate(true);
        } else {
            opts.append(true);
        }
        let mut file = match opts.open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotExist),
            Err(e) => return Err(e.into()),
        };
        file.write_all(data)?;

        debug!(id, overwrite, bytes = data.len(), "updated object content");
        Ok(())
    }

    fn delete(&mut self, id: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let path = self.record(id)?.path.clone();

        let removal = fs::remove_file(&path);
        if removal.is_ok() {
            self.index.remove(id);
        }
        // Tombstone the id whether or not the unlink worked.
        self.append_entry(&log::encode_del(id))?;

        match removal {
            Ok(()) => {
                debug!(id, path = %path.display(), "deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotExist),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a blob's bytes, folding a missing file into `NotExist`.
fn read_blob(path: &Path) -> StoreResult<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotExist),
        Err(e) => Err(e.into()),
    }
}

/// Fold the log into a fresh index.
fn replay(reader: impl BufRead) -> StoreResult<HashMap<String, ObjectRecord>> {
    let mut index = HashMap::new();

    for (n, line) in reader.lines().enumerate() {
        let lineno = n + 1;
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Some((action, id, payload)) = log::split_entry(&line) else {
            // Stray data is tolerated; losing a decodable entry is not.
            debug!(line = lineno, "skipping unparseable log line");
            continue;
        };

        match action {
            ACTION_ADD => match serde_json::from_str::<ObjectRecord>(payload) {
                Ok(record) => {
                    index.insert(id.to_owned(), record);
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        line: lineno,
                        reason: format!("undecodable ADD payload: {e}"),
                    });
                }
            },
            ACTION_DEL => {
                index.remove(id);
            }
            other => {
                return Err(StoreError::Corrupt {
                    line: lineno,
                    reason: format!("unknown action '{other}'"),
                });
            }
        }
    }

    Ok(index)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
