//! Last committed chunk of a CSV load

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

const SUFFIX: &str = "_last_chunk.txt";

/// Index of the last chunk committed from one CSV, stored next to it
#[derive(Debug, Clone)]
pub struct ChunkCheckpoint {
    path: PathBuf,
}

impl ChunkCheckpoint {
    /// `{csv}_last_chunk.txt`
    pub fn for_csv(csv: &Path) -> Self {
        Self::with_suffix(csv, SUFFIX)
    }

    /// `{csv}_{table}_last_chunk.txt`, for a second table fed by the same CSV
    pub fn for_table(csv: &Path, table: &str) -> Self {
        Self::with_suffix(csv, &format!("_{table}{SUFFIX}"))
    }

    fn with_suffix(csv: &Path, suffix: &str) -> Self {
        let mut name = OsString::from(csv.as_os_str());
        name.push(suffix);
        Self {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last committed chunk, -1 when nothing was committed yet
    pub fn last(&self) -> i64 {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return -1;
        };
        match text.trim().parse::<i64>() {
            Ok(n) if n >= 0 => n,
            Ok(_) => -1,
            Err(_) => {
                if !text.trim().is_empty() {
                    log::warn!("Ignoring unreadable checkpoint {}", self.path.display());
                }
                -1
            }
        }
    }

    pub fn save(&self, chunk: usize) -> anyhow::Result<()> {
        let tmp = self.path.with_extension("txt.tmp");
        fs::write(&tmp, chunk.to_string())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move {} into place", tmp.display()))
    }

    /// Forget progress so the next load starts at chunk 0
    pub fn reset(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_follow_csv_name() {
        let cp = ChunkCheckpoint::for_csv(Path::new("/data/watchers.csv.gz"));
        assert_eq!(cp.path(), Path::new("/data/watchers.csv.gz_last_chunk.txt"));
        let cp = ChunkCheckpoint::for_table(Path::new("/data/w.csv"), "imgs_tags");
        assert_eq!(cp.path(), Path::new("/data/w.csv_imgs_tags_last_chunk.txt"));
    }

    #[test]
    fn missing_empty_or_garbage_is_minus_one() {
        let dir = TempDir::new().unwrap();
        let cp = ChunkCheckpoint::for_csv(&dir.path().join("x.csv"));
        assert_eq!(cp.last(), -1);
        fs::write(cp.path(), "").unwrap();
        assert_eq!(cp.last(), -1);
        fs::write(cp.path(), "three").unwrap();
        assert_eq!(cp.last(), -1);
    }

    #[test]
    fn save_then_reset() {
        let dir = TempDir::new().unwrap();
        let cp = ChunkCheckpoint::for_csv(&dir.path().join("x.csv"));
        cp.save(4).unwrap();
        assert_eq!(cp.last(), 4);
        cp.save(5).unwrap();
        assert_eq!(cp.last(), 5);
        cp.reset().unwrap();
        assert_eq!(cp.last(), -1);
        cp.reset().unwrap();
    }
}
