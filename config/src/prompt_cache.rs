//! JIT prompt file loading with mtime-based cache invalidation (§5: "file
//! I/O for JIT prompt load (cache after first load per file path, invalidate
//! on file change)").
//!
//! Every turn re-checks the file's mtime — a cheap `stat` — and only
//! re-reads the bytes when it has moved forward, so an editor save takes
//! effect on the very next turn without paying a full read on every one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use twm_core::ConfigurationError;

struct CachedPrompt {
    mtime: SystemTime,
    content: String,
}

/// Shared across all conversations; keyed by resolved file path so the
/// external (`twp.txt`) and internal (`twp_bak.txt`) prompt files each get
/// their own independently invalidated entry.
#[derive(Default)]
pub struct PromptCache {
    entries: Mutex<HashMap<PathBuf, CachedPrompt>>,
}

impl PromptCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the prompt text at `path`, serving the cached copy unless the
    /// file's mtime has advanced since it was last read.
    pub fn load(&self, path: &Path) -> Result<String, ConfigurationError> {
        let metadata =
            std::fs::metadata(path).map_err(|source| ConfigurationError::PromptUnreadable {
                path: path.display().to_string(),
                source,
            })?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(cached) = entries.get(path)
            && cached.mtime == mtime
        {
            return Ok(cached.content.clone());
        }

        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::PromptUnreadable {
                path: path.display().to_string(),
                source,
            })?;
        entries.insert(
            path.to_path_buf(),
            CachedPrompt {
                mtime,
                content: content.clone(),
            },
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::PromptCache;

    #[test]
    fn reads_file_once_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twp.txt");
        std::fs::write(&path, "version one").unwrap();

        let cache = PromptCache::new();
        assert_eq!(cache.load(&path).unwrap(), "version one");

        // Overwrite without advancing mtime: still serves cached content if
        // the filesystem mtime resolution doesn't register a change, but a
        // genuine content+mtime change must be observed.
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, "version two").unwrap();
        assert_eq!(cache.load(&path).unwrap(), "version two");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let cache = PromptCache::new();
        assert!(cache.load(&path).is_err());
    }
}
