//! Index file serialization.
//!
//! Each binding is framed as a 4-byte big-endian key length, the key
//! bytes, then the item fields: 4-byte file id, 8-byte offset, 8-byte
//! size. A full index is a concatenation of bindings terminated by EOF.
//! EOF is clean only at a key-length boundary; anything else, and any
//! size exceeding the configured bounds, is index corruption that the
//! caller distinguishes from plain I/O errors.

use std::io::{self, Read, Write};

use bytes::Buf;

use crate::data::{CHECKSUM_SIZE, PREFIX_SIZE};
use crate::error::{Error, Result};

use super::{Item, KeyIndex};

const KEY_LEN_SIZE: usize = 4;
const ITEM_SIZE: usize = 4 + 8 + 8;

/// Largest legal record frame for the given limits: prefix + key +
/// value + checksum.
fn max_entry_size(max_key_size: usize, max_value_size: usize) -> i64 {
    (PREFIX_SIZE + CHECKSUM_SIZE + max_key_size + max_value_size) as i64
}

/// Serialize the index to a writer.
pub fn write_index<W: Write>(index: &KeyIndex, w: &mut W) -> Result<()> {
    let mut item_buf = [0u8; ITEM_SIZE];

    for (key, item) in index.iter() {
        w.write_all(&(key.len() as u32).to_be_bytes())?;
        w.write_all(key)?;

        item_buf[..4].copy_from_slice(&item.file_id.to_be_bytes());
        item_buf[4..12].copy_from_slice(&item.offset.to_be_bytes());
        item_buf[12..].copy_from_slice(&item.size.to_be_bytes());
        w.write_all(&item_buf)?;
    }

    Ok(())
}

/// Deserialize an index from a reader, validating every binding against
/// the configured size limits.
pub fn read_index<R: Read>(
    r: &mut R,
    max_key_size: usize,
    max_value_size: usize,
) -> Result<KeyIndex> {
    let max_size = max_entry_size(max_key_size, max_value_size);
    let mut index = KeyIndex::new();

    loop {
        let mut len_buf = [0u8; KEY_LEN_SIZE];
        if !read_binding_field(r, &mut len_buf)? {
            break; // clean EOF at a binding boundary
        }

        let key_len = u32::from_be_bytes(len_buf) as usize;
        if key_len > max_key_size {
            return Err(Error::index_corruption(format!(
                "key size {} exceeds maximum {}",
                key_len, max_key_size
            )));
        }

        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key).map_err(truncated)?;

        let mut item_buf = [0u8; ITEM_SIZE];
        r.read_exact(&mut item_buf).map_err(truncated)?;

        let mut fields = &item_buf[..];
        let item = Item {
            file_id: fields.get_u32(),
            offset: fields.get_i64(),
            size: fields.get_i64(),
        };

        if item.size <= 0 || item.size > max_size {
            return Err(Error::index_corruption(format!(
                "record size {} outside bounds (max {})",
                item.size, max_size
            )));
        }

        index.insert(&key, item);
    }

    Ok(index)
}

/// Read a key-length field; `Ok(false)` on EOF before the first byte.
fn read_binding_field<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;

    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(Error::index_corruption(
                    "index truncated inside a key length",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}

fn truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::index_corruption("index truncated inside a binding")
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_index() -> KeyIndex {
        let mut index = KeyIndex::new();
        index.insert(
            b"alpha",
            Item {
                file_id: 0,
                offset: 0,
                size: 24,
            },
        );
        index.insert(
            b"beta",
            Item {
                file_id: 2,
                offset: 512,
                size: 48,
            },
        );
        index
    }

    fn to_bytes(index: &KeyIndex) -> Vec<u8> {
        let mut buf = Vec::new();
        write_index(index, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_write_read_roundtrip() {
        let index = sample_index();
        let buf = to_bytes(&index);

        let read = read_index(&mut Cursor::new(buf), 64, 65536).unwrap();
        assert_eq!(read.len(), index.len());
        assert_eq!(read.search(b"alpha"), index.search(b"alpha"));
        assert_eq!(read.search(b"beta"), index.search(b"beta"));
    }

    #[test]
    fn test_read_empty() {
        let read = read_index(&mut Cursor::new(Vec::new()), 64, 65536).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_read_rejects_oversized_key() {
        let buf = to_bytes(&sample_index());

        // "alpha" is 5 bytes; a 4-byte limit must reject it
        let err = read_index(&mut Cursor::new(buf), 4, 65536).unwrap_err();
        assert!(matches!(err, Error::IndexCorruption(_)));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_read_rejects_oversized_record() {
        let mut index = KeyIndex::new();
        index.insert(
            b"key",
            Item {
                file_id: 0,
                offset: 0,
                // larger than 16 + 64 + 8 can ever frame
                size: 1024,
            },
        );
        let buf = to_bytes(&index);

        let err = read_index(&mut Cursor::new(buf), 64, 8).unwrap_err();
        assert!(matches!(err, Error::IndexCorruption(_)));
    }

    #[test]
    fn test_read_rejects_non_positive_size() {
        let mut index = KeyIndex::new();
        index.insert(
            b"key",
            Item {
                file_id: 0,
                offset: 0,
                size: 0,
            },
        );
        let buf = to_bytes(&index);

        let err = read_index(&mut Cursor::new(buf), 64, 65536).unwrap_err();
        assert!(matches!(err, Error::IndexCorruption(_)));
    }

    #[test]
    fn test_read_rejects_truncation_mid_binding() {
        let buf = to_bytes(&sample_index());

        for cut in [2, KEY_LEN_SIZE + 2, buf.len() - 3] {
            let err = read_index(&mut Cursor::new(buf[..cut].to_vec()), 64, 65536).unwrap_err();
            assert!(matches!(err, Error::IndexCorruption(_)), "cut at {}", cut);
        }
    }
}
