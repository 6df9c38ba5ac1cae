//! Database implementation.
//!
//! The Database struct is the main entry point for all operations. It
//! owns the segment set (one active datafile plus the sealed ones), the
//! in-memory key index and the advisory process lock, and drives
//! recovery and merge.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;

use crate::data::{Datafile, Entry};
use crate::error::{Error, Result};
use crate::index::{codec as index_codec, Item, KeyIndex};
use crate::options::{Config, OptionFn};
use crate::util::coding::{
    decode_varint64, encode_varint64, zigzag_decode, zigzag_encode, MAX_VARINT64_LEN,
};
use crate::util::crc::crc32;
use crate::util::filename::{
    config_file_path, create_dir_if_missing, datafile_bytes, datafile_ids, delete_file,
    index_file_path, lock_file_path,
};

/// State guarded by the database-wide reader-writer lock: the key index
/// and the segment set.
struct Inner {
    /// Sealed segments by id. The active segment is not in this map.
    datafiles: HashMap<u32, Datafile>,
    /// The single writable tail segment.
    curr: Datafile,
    /// Key → record location.
    index: KeyIndex,
}

/// An embedded log-structured key-value store.
///
/// All operations are thread-safe for a single handle. A second open of
/// the same directory, from any process, fails with
/// [`Error::DatabaseLocked`] until the first handle is closed.
pub struct Database {
    path: PathBuf,
    config: Config,
    /// Lock file handle (kept open to hold the flock).
    lock_file: File,
    closed: AtomicBool,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Statistics about an open database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of segments, the active one included.
    pub datafiles: usize,
    /// Number of live keys.
    pub keys: usize,
    /// Total bytes of datafiles in the database directory.
    pub size: u64,
}

impl Database {
    /// Open a database with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, Vec::new())
    }

    /// Open a database, applying the given option functions in order on
    /// top of any configuration persisted in the directory.
    pub fn open_with_options(path: impl AsRef<Path>, options: Vec<OptionFn>) -> Result<Self> {
        let path = path.as_ref();
        create_dir_if_missing(path)?;

        let mut config = Self::load_config(path).unwrap_or_default();
        for opt in &options {
            opt(&mut config)?;
        }

        Self::open_with_config(path, config)
    }

    fn open_with_config(path: &Path, config: Config) -> Result<Self> {
        create_dir_if_missing(path)?;

        let lock_file = Self::acquire_lock(path)?;
        Self::store_config(path, &config)?;
        let inner = Self::reopen(path, &config)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            lock_file,
            closed: AtomicBool::new(false),
            inner: RwLock::new(inner),
        })
    }

    /// Acquire the advisory lock file.
    fn acquire_lock(db_path: &Path) -> Result<File> {
        let lock_path = lock_file_path(db_path);

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let rc = unsafe { libc::flock(lock_file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                return Err(Error::DatabaseLocked);
            }
        }

        // Note who holds the lock
        let mut lock_file = lock_file;
        writeln!(lock_file, "caskdb").ok();

        Ok(lock_file)
    }

    fn load_config(path: &Path) -> Option<Config> {
        let data = std::fs::read_to_string(config_file_path(path)).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn store_config(path: &Path, config: &Config) -> Result<()> {
        let data = serde_json::to_string(config).map_err(|e| Error::Io(e.to_string()))?;
        std::fs::write(config_file_path(path), data)?;
        Ok(())
    }

    /// Build the in-memory state from the files in the directory.
    ///
    /// Opens every segment sealed, loads the persisted index when a valid
    /// one exists, and replays the log otherwise. The segment with the
    /// maximum id (0 for an empty directory) becomes the active one.
    fn reopen(path: &Path, config: &Config) -> Result<Inner> {
        let ids = datafile_ids(path)?;

        let mut datafiles = HashMap::with_capacity(ids.len());
        for &id in &ids {
            datafiles.insert(id, Datafile::open(path, id, true)?);
        }

        let index = match Self::load_index(path, config) {
            Ok(Some(index)) => index,
            Ok(None) => Self::replay(&ids, &datafiles)?,
            Err(e) if e.is_corruption() => Self::replay(&ids, &datafiles)?,
            Err(e) => return Err(e),
        };

        let active_id = ids.last().copied().unwrap_or(0);
        let curr = Datafile::open(path, active_id, false)?;
        datafiles.remove(&active_id);

        Ok(Inner {
            datafiles,
            curr,
            index,
        })
    }

    /// Load the persisted index, if present, validated against the
    /// configured size limits.
    fn load_index(path: &Path, config: &Config) -> Result<Option<KeyIndex>> {
        let index_path = index_file_path(path);
        if !index_path.exists() {
            return Ok(None);
        }

        let mut reader = BufReader::new(File::open(index_path)?);
        index_codec::read_index(&mut reader, config.max_key_size, config.max_value_size).map(Some)
    }

    /// Rebuild the index by replaying every segment in id order.
    fn replay(ids: &[u32], datafiles: &HashMap<u32, Datafile>) -> Result<KeyIndex> {
        let mut index = KeyIndex::new();

        for &id in ids {
            let df = match datafiles.get(&id) {
                Some(df) => df,
                None => continue,
            };

            let mut offset = 0i64;
            loop {
                match df.read() {
                    Ok(Some((entry, n))) => {
                        if entry.is_tombstone() {
                            index.delete(&entry.key);
                        } else {
                            index.insert(
                                &entry.key,
                                Item {
                                    file_id: id,
                                    offset,
                                    size: n,
                                },
                            );
                        }
                        offset += n;
                    }
                    Ok(None) => break,
                    // Bytes past a torn write are garbage; recovery
                    // truncates here
                    Err(Error::UnexpectedEof) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(index)
    }

    /// Retrieve the value of the given key.
    ///
    /// The value bytes are re-checksummed on every read; a mismatch with
    /// the stored CRC is [`Error::ChecksumFailed`].
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        let inner = self.inner.read();

        let item = inner.index.search(key).ok_or(Error::KeyNotFound)?;

        let df = if item.file_id == inner.curr.id() {
            &inner.curr
        } else {
            inner.datafiles.get(&item.file_id).ok_or(Error::ReadError)?
        };

        let entry = df.read_at(item.offset, item.size)?;

        let checksum = crc32(&entry.value);
        if checksum != entry.checksum {
            return Err(Error::ChecksumFailed {
                expected: entry.checksum,
                actual: checksum,
            });
        }

        Ok(entry.value)
    }

    /// Whether the key exists. Index lookup only; no I/O.
    pub fn has(&self, key: &[u8]) -> bool {
        self.inner.read().index.search(key).is_some()
    }

    /// Store the key and value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > self.config.max_key_size {
            return Err(Error::KeyTooLarge {
                size: key.len(),
                max: self.config.max_key_size,
            });
        }
        if value.len() > self.config.max_value_size {
            return Err(Error::ValueTooLarge {
                size: value.len(),
                max: self.config.max_value_size,
            });
        }

        let mut inner = self.inner.write();

        let (offset, size) = Self::append(&self.path, &self.config, &mut inner, key, value)?;

        if self.config.sync {
            inner.curr.sync()?;
        }

        let item = Item {
            file_id: inner.curr.id(),
            offset,
            size,
        };
        inner.index.insert(key, item);

        Ok(())
    }

    /// Delete the key by writing a tombstone and erasing its index
    /// binding.
    ///
    /// No error if the key was absent; the tombstone is still recorded
    /// and reclaimed at the next merge.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();

        Self::append(&self.path, &self.config, &mut inner, key, &[])?;
        inner.index.delete(key);

        Ok(())
    }

    /// Append one entry to the active segment, rotating first if it is
    /// at or past the size threshold.
    fn append(
        path: &Path,
        config: &Config,
        inner: &mut Inner,
        key: &[u8],
        value: &[u8],
    ) -> Result<(i64, i64)> {
        if inner.curr.size() >= config.max_datafile_size as i64 {
            inner.curr.close()?;

            let id = inner.curr.id();
            let sealed = Datafile::open(path, id, true)?;
            inner.datafiles.insert(id, sealed);

            inner.curr = Datafile::open(path, id + 1, false)?;
        }

        let mut entry = Entry::new(key, value);
        inner.curr.write(&mut entry)
    }

    /// Enumerate the keys matching the given prefix, in key order,
    /// stopping at the first error from `f`.
    ///
    /// The matching key set is snapshotted under the shared lock before
    /// `f` runs, so the visitor is free to call back into the database.
    pub fn scan<F>(&self, prefix: &[u8], mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let keys: Vec<Bytes> = {
            let inner = self.inner.read();
            let mut keys = Vec::new();
            inner.index.for_each_prefix(prefix, |key, _| {
                keys.push(Bytes::copy_from_slice(key));
                true
            });
            keys
        };

        for key in keys {
            f(&key)?;
        }

        Ok(())
    }

    /// Enumerate every key, stopping at the first error from `f`.
    ///
    /// Same snapshot semantics as [`Database::scan`].
    pub fn fold<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.scan(&[], f)
    }

    /// Number of keys in the database.
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Whether the database holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// All keys, in key order.
    ///
    /// The key set is snapshotted at call time; keys written or deleted
    /// afterwards do not show up in the returned iterator.
    pub fn keys(&self) -> impl Iterator<Item = Bytes> {
        let inner = self.inner.read();
        let keys: Vec<Bytes> = inner
            .index
            .iter()
            .map(|(key, _)| Bytes::copy_from_slice(key))
            .collect();
        keys.into_iter()
    }

    /// Statistics: segment count, key count and total datafile bytes.
    pub fn stats(&self) -> Result<Stats> {
        let inner = self.inner.read();
        let size = datafile_bytes(&self.path)?;

        Ok(Stats {
            datafiles: inner.datafiles.len() + 1,
            keys: inner.index.len(),
            size,
        })
    }

    /// Fsync the active segment.
    pub fn sync(&self) -> Result<()> {
        self.inner.read().curr.sync()
    }

    /// The effective configuration of this database.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the database: persist the index, close every segment and
    /// release the lock.
    ///
    /// This is the only exit that preserves the on-disk index; after a
    /// crash the next open rebuilds it from the segments.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = self.inner.write();

        Self::write_index(&self.path, &inner.index)?;

        for df in inner.datafiles.values() {
            df.close()?;
        }
        inner.curr.close()?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe { libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN) };
        }
        delete_file(&lock_file_path(&self.path))?;

        Ok(())
    }

    /// Truncate and rewrite the index file, then fsync it.
    fn write_index(path: &Path, index: &KeyIndex) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(index_file_path(path))?;

        let mut writer = BufWriter::new(file);
        index_codec::write_index(index, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        Ok(())
    }

    /// Rewrite the live keys into a fresh database and replace this one
    /// with it, reclaiming the space held by shadowed records and
    /// tombstones.
    ///
    /// The database stays open; the handle observes the same keys and
    /// values afterwards. Concurrent writers should be quiesced by the
    /// caller for the duration.
    pub fn merge(&self) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix("merge")
            .tempdir_in(&self.path)?;

        // Rewriting through the public put strips shadowed records and
        // deleted keys.
        {
            let mdb = Self::open_with_config(staging.path(), self.config.clone())?;

            self.fold(|key| {
                let value = self.get(key)?;
                mdb.put(key, &value)
            })?;

            mdb.close()?;
        }

        let mut inner = self.inner.write();

        for df in inner.datafiles.values() {
            df.close()?;
        }
        inner.curr.close()?;

        // Swap the merged files in, keeping the lock file (and with it
        // the flock) in place. The staging directory itself is skipped
        // by the is_dir check and removed on drop.
        let lock_path = lock_file_path(&self.path);
        for dir_entry in std::fs::read_dir(&self.path)? {
            let dir_entry = dir_entry?;
            let entry_path = dir_entry.path();
            if entry_path.is_dir() || entry_path == lock_path {
                continue;
            }
            std::fs::remove_file(&entry_path)?;
        }

        for dir_entry in std::fs::read_dir(staging.path())? {
            let dir_entry = dir_entry?;
            std::fs::rename(dir_entry.path(), self.path.join(dir_entry.file_name()))?;
        }

        *inner = Self::reopen(&self.path, &self.config)?;

        Ok(())
    }

    /// Store a signed integer as a zigzag varint value.
    pub fn put_i64(&self, key: &[u8], value: i64) -> Result<()> {
        let mut buf = BytesMut::with_capacity(MAX_VARINT64_LEN);
        encode_varint64(&mut buf, zigzag_encode(value));
        self.put(key, &buf)
    }

    /// Retrieve a signed integer stored by [`Database::put_i64`].
    pub fn get_i64(&self, key: &[u8]) -> Result<i64> {
        Ok(zigzag_decode(self.get_varint(key)?))
    }

    /// Store an unsigned integer as a varint value.
    pub fn put_u64(&self, key: &[u8], value: u64) -> Result<()> {
        let mut buf = BytesMut::with_capacity(MAX_VARINT64_LEN);
        encode_varint64(&mut buf, value);
        self.put(key, &buf)
    }

    /// Retrieve an unsigned integer stored by [`Database::put_u64`].
    pub fn get_u64(&self, key: &[u8]) -> Result<u64> {
        self.get_varint(key)
    }

    fn get_varint(&self, key: &[u8]) -> Result<u64> {
        let value = self.get(key)?;

        let mut slice = &value[..];
        let raw = decode_varint64(&mut slice)
            .ok_or_else(|| Error::InvalidValue("malformed varint".into()))?;
        if !slice.is_empty() {
            return Err(Error::InvalidValue("trailing bytes after varint".into()));
        }

        Ok(raw)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Try to close gracefully, ignore errors
        let _ = self.close();
    }
}
