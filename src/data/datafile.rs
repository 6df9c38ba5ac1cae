//! Datafile: one append-only log segment.
//!
//! A datafile is opened in one of two roles. The active role carries a
//! write handle in append mode plus a random-access read handle; the
//! sealed role is immutable and served through a memory map. Exactly one
//! datafile per database is active at any time.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::Mmap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::util::filename::datafile_path;

use super::codec::{decode_frame, Decoder, Encoder};
use super::Entry;

struct Inner {
    /// Current tail offset; monotonically non-decreasing while active,
    /// frozen once sealed.
    offset: i64,
    /// Write side; `None` once sealed.
    enc: Option<Encoder<File>>,
    /// Sequential decoder, used only by recovery.
    dec: Decoder<BufReader<File>>,
}

/// One append-only log segment.
pub struct Datafile {
    id: u32,
    path: PathBuf,
    readonly: bool,
    /// Random-access handle for reads on the active segment.
    read_handle: File,
    /// Immutable mapping; present on sealed, non-empty segments.
    mmap: Option<Mmap>,
    inner: RwLock<Inner>,
}

impl Datafile {
    /// Open the segment with the given id under `dir`.
    ///
    /// `readonly` selects the sealed role. The active role creates the
    /// file if missing; the tail offset is taken from file stat at open
    /// time.
    pub fn open(dir: &Path, id: u32, readonly: bool) -> Result<Self> {
        let path = datafile_path(dir, id);

        let enc = if readonly {
            None
        } else {
            let w = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(Encoder::new(w))
        };

        let read_handle = File::open(&path)?;
        let offset = read_handle.metadata()?.len() as i64;

        let mmap = if readonly && offset > 0 {
            Some(unsafe { Mmap::map(&read_handle)? })
        } else {
            None
        };

        let dec = Decoder::new(BufReader::new(File::open(&path)?));

        Ok(Self {
            id,
            path,
            readonly,
            read_handle,
            mmap,
            inner: RwLock::new(Inner { offset, enc, dec }),
        })
    }

    /// Segment id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this segment is sealed.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Current size of the segment in bytes.
    pub fn size(&self) -> i64 {
        self.inner.read().offset
    }

    /// Append one entry, returning its (offset, frame length).
    ///
    /// The offset recorded on the entry is the pre-write tail; the tail
    /// advances only after a successful encode.
    pub fn write(&self, entry: &mut Entry) -> Result<(i64, i64)> {
        let mut inner = self.inner.write();

        let offset = inner.offset;
        let enc = inner.enc.as_mut().ok_or(Error::ReadonlyDatafile)?;

        entry.offset = offset;
        let n = enc.encode(entry)?;
        inner.offset += n;

        Ok((offset, n))
    }

    /// Decode the next entry sequentially.
    ///
    /// Exclusive: the decoder position is shared state. Returns `Ok(None)`
    /// at end of segment.
    pub fn read(&self) -> Result<Option<(Entry, i64)>> {
        let mut inner = self.inner.write();
        inner.dec.decode()
    }

    /// Read exactly `size` bytes starting at `offset` and decode them as
    /// one record.
    ///
    /// Sealed segments are served from the memory map without locking;
    /// the active segment reads through its file handle. Any short read
    /// is [`Error::ReadError`].
    pub fn read_at(&self, offset: i64, size: i64) -> Result<Entry> {
        if offset < 0 || size <= 0 {
            return Err(Error::ReadError);
        }

        let frame = if let Some(mmap) = &self.mmap {
            let start = offset as usize;
            let end = start.checked_add(size as usize).ok_or(Error::ReadError)?;
            if end > mmap.len() {
                return Err(Error::ReadError);
            }
            Bytes::copy_from_slice(&mmap[start..end])
        } else if self.readonly {
            // Sealed and empty: nothing to read
            return Err(Error::ReadError);
        } else {
            let mut buf = vec![0u8; size as usize];
            self.read_handle
                .read_exact_at(&mut buf, offset as u64)
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        Error::ReadError
                    } else {
                        e.into()
                    }
                })?;
            Bytes::from(buf)
        };

        decode_frame(frame)
    }

    /// Flush and fsync the write side. No-op on sealed segments.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(enc) = inner.enc.as_mut() {
            enc.flush()?;
            enc.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Close the write side, flushing and syncing it first.
    ///
    /// Further writes fail with [`Error::ReadonlyDatafile`]. Read handles
    /// are released when the datafile is dropped.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(mut enc) = inner.enc.take() {
            enc.flush()?;
            enc.get_ref().sync_all()?;
        }
        Ok(())
    }
}
