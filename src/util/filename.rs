//! Database file naming conventions.

use std::io;
use std::path::{Path, PathBuf};

/// Extension carried by every log segment.
pub const DATAFILE_EXT: &str = "data";

/// Generate a datafile path from its segment id.
///
/// Ids are formatted as zero-padded 9-digit decimals, e.g. `000000007.data`.
pub fn datafile_path(db_path: &Path, id: u32) -> PathBuf {
    db_path.join(format!("{:09}.{}", id, DATAFILE_EXT))
}

/// Generate the index file path.
pub fn index_file_path(db_path: &Path) -> PathBuf {
    db_path.join("index")
}

/// Generate the lock file path.
pub fn lock_file_path(db_path: &Path) -> PathBuf {
    db_path.join("lock")
}

/// Generate the config file path.
pub fn config_file_path(db_path: &Path) -> PathBuf {
    db_path.join("config.json")
}

/// Parse a file name and return its segment id.
///
/// Returns `None` if the file name is not a datafile name.
pub fn parse_datafile_id(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".data")?;
    stem.parse::<u32>().ok()
}

/// List the segment ids present in the database directory, ascending.
pub fn datafile_ids(db_path: &Path) -> io::Result<Vec<u32>> {
    let mut ids = Vec::new();

    for entry in std::fs::read_dir(db_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if let Some(id) = parse_datafile_id(&name) {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Total bytes of datafiles in the database directory.
pub fn datafile_bytes(db_path: &Path) -> io::Result<u64> {
    let mut total = 0u64;

    for entry in std::fs::read_dir(db_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if parse_datafile_id(&name).is_some() {
            total += entry.metadata()?.len();
        }
    }

    Ok(total)
}

/// Delete a file, ignoring "not found" errors.
pub fn delete_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create directory if it doesn't exist.
pub fn create_dir_if_missing(path: &Path) -> io::Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_paths() {
        let db_path = Path::new("/data/db");

        assert_eq!(lock_file_path(db_path), Path::new("/data/db/lock"));
        assert_eq!(index_file_path(db_path), Path::new("/data/db/index"));
        assert_eq!(
            config_file_path(db_path),
            Path::new("/data/db/config.json")
        );
        assert_eq!(
            datafile_path(db_path, 7),
            Path::new("/data/db/000000007.data")
        );
        assert_eq!(
            datafile_path(db_path, 123_456_789),
            Path::new("/data/db/123456789.data")
        );
    }

    #[test]
    fn test_parse_datafile_id() {
        assert_eq!(parse_datafile_id("000000000.data"), Some(0));
        assert_eq!(parse_datafile_id("000000042.data"), Some(42));
        assert_eq!(parse_datafile_id("123456789.data"), Some(123_456_789));

        assert_eq!(parse_datafile_id("index"), None);
        assert_eq!(parse_datafile_id("lock"), None);
        assert_eq!(parse_datafile_id("config.json"), None);
        assert_eq!(parse_datafile_id("abc.data"), None);
        assert_eq!(parse_datafile_id("000000001.tmp"), None);
    }

    #[test]
    fn test_datafile_ids_sorted() {
        let dir = tempdir().unwrap();
        let db_path = dir.path();

        std::fs::write(datafile_path(db_path, 3), "").unwrap();
        std::fs::write(datafile_path(db_path, 0), "").unwrap();
        std::fs::write(datafile_path(db_path, 7), "").unwrap();
        std::fs::write(db_path.join("config.json"), "{}").unwrap();

        assert_eq!(datafile_ids(db_path).unwrap(), vec![0, 3, 7]);
    }

    #[test]
    fn test_datafile_bytes() {
        let dir = tempdir().unwrap();
        let db_path = dir.path();

        assert_eq!(datafile_bytes(db_path).unwrap(), 0);

        std::fs::write(datafile_path(db_path, 0), b"12345").unwrap();
        std::fs::write(datafile_path(db_path, 1), b"678").unwrap();
        // Non-datafiles do not count
        std::fs::write(db_path.join("index"), b"xxxxxxxx").unwrap();

        assert_eq!(datafile_bytes(db_path).unwrap(), 8);
    }

    #[test]
    fn test_delete_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");

        // Delete non-existent file should succeed
        assert!(delete_file(&path).is_ok());

        std::fs::write(&path, "test").unwrap();
        delete_file(&path).unwrap();
        assert!(!path.exists());
    }
}
