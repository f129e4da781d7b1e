//! The cached backend record for a working directory.
//!
//! One JSON file under the data directory remembers which backend the last
//! `init` configured. Writes replace the whole file atomically, and an
//! advisory lock guards transitions that rewrite it.

mod lock;
mod store;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub use lock::{LockError, StateLock};
pub use store::{CachedBackend, RecordError, RecordStore, WorkingState, RECORD_FILENAME, RECORD_VERSION};

/// Write `bytes` to `path` through a sibling temp file and a rename, so
/// readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = Path::new(&tmp_name);

    let result = (|| {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.json");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
