//! Streaming record encoder and decoder.

use std::io::{self, BufWriter, Read, Write};

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

use super::{Entry, CHECKSUM_SIZE, KEY_SIZE, PREFIX_SIZE};

/// Streaming entry encoder over a writer.
///
/// Frames are staged through a buffered writer and flushed before the
/// frame length is returned, so a successful encode is fully handed to
/// the operating system.
pub struct Encoder<W: Write> {
    w: BufWriter<W>,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder wrapping the given writer.
    pub fn new(w: W) -> Self {
        Self {
            w: BufWriter::new(w),
        }
    }

    /// Encode one entry, returning the number of bytes written.
    pub fn encode(&mut self, entry: &Entry) -> Result<i64> {
        let mut prefix = [0u8; PREFIX_SIZE];
        prefix[..KEY_SIZE].copy_from_slice(&(entry.key.len() as u32).to_be_bytes());
        prefix[KEY_SIZE..].copy_from_slice(&(entry.value.len() as u64).to_be_bytes());

        self.w.write_all(&prefix)?;
        self.w.write_all(&entry.key)?;
        self.w.write_all(&entry.value)?;
        self.w.write_all(&entry.checksum.to_be_bytes())?;
        self.w.flush()?;

        Ok(entry.frame_len())
    }

    /// Flush any buffered bytes to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    /// Access the underlying writer (for fsync).
    pub fn get_ref(&self) -> &W {
        self.w.get_ref()
    }
}

/// Streaming entry decoder over a reader.
///
/// The decoder advances implicitly; it is used for sequential segment
/// replay during recovery.
pub struct Decoder<R: Read> {
    r: R,
}

impl<R: Read> Decoder<R> {
    /// Create a decoder wrapping the given reader.
    pub fn new(r: R) -> Self {
        Self { r }
    }

    /// Decode the next entry.
    ///
    /// Returns `Ok(None)` at a clean end of segment (EOF at a frame
    /// boundary). EOF anywhere inside a frame is [`Error::UnexpectedEof`].
    pub fn decode(&mut self) -> Result<Option<(Entry, i64)>> {
        let mut prefix = [0u8; PREFIX_SIZE];
        if !read_full_or_eof(&mut self.r, &mut prefix)? {
            return Ok(None);
        }

        let (key_len, value_len) = parse_prefix(&prefix);

        let mut payload = vec![0u8; key_len + value_len + CHECKSUM_SIZE];
        self.r.read_exact(&mut payload).map_err(eof_to_unexpected)?;

        let entry = decode_without_prefix(Bytes::from(payload), key_len);
        let n = (PREFIX_SIZE + key_len + value_len + CHECKSUM_SIZE) as i64;
        Ok(Some((entry, n)))
    }
}

/// Split a 12-byte frame prefix into (key length, value length).
pub(crate) fn parse_prefix(mut prefix: &[u8]) -> (usize, usize) {
    let key_len = prefix.get_u32() as usize;
    let value_len = prefix.get_u64() as usize;
    (key_len, value_len)
}

/// Build an entry from a frame payload with the 12-byte prefix stripped.
///
/// The key, value and checksum are zero-copy slices of the payload
/// buffer; no allocation beyond the frame itself.
pub(crate) fn decode_without_prefix(payload: Bytes, key_len: usize) -> Entry {
    let value_end = payload.len() - CHECKSUM_SIZE;
    let checksum = (&payload[value_end..]).get_u32();

    Entry {
        key: payload.slice(..key_len),
        value: payload.slice(key_len..value_end),
        checksum,
        offset: 0,
    }
}

/// Decode a complete frame (prefix included), as read back by `read_at`.
pub(crate) fn decode_frame(frame: Bytes) -> Result<Entry> {
    if frame.len() < PREFIX_SIZE + CHECKSUM_SIZE {
        return Err(Error::ReadError);
    }

    let (key_len, value_len) = parse_prefix(&frame);
    if frame.len() != PREFIX_SIZE + key_len + value_len + CHECKSUM_SIZE {
        return Err(Error::ReadError);
    }

    Ok(decode_without_prefix(frame.slice(PREFIX_SIZE..), key_len))
}

/// Fill `buf` from the reader.
///
/// Returns `Ok(false)` on EOF before the first byte, `Ok(true)` when the
/// buffer was filled. EOF after a partial fill is [`Error::UnexpectedEof`].
pub(crate) fn read_full_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;

    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(Error::UnexpectedEof);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}

fn eof_to_unexpected(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        e.into()
    }
}
