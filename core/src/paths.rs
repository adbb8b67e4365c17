//! Resolves the on-disk layout rooted at the process's current working
//! directory (§6 External Interfaces): `data/config`, `data/temp`, and
//! `data/logs`.

use std::path::{Path, PathBuf};

/// The three working directories the Manager reads from or writes to,
/// resolved once relative to the process cwd at construction time.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Resolves paths relative to the current process working directory.
    pub fn from_cwd() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Resolves paths relative to an explicit root, primarily for tests.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { root: cwd.into() }
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("data").join("config")
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("data").join("temp")
    }

    /// Resolves a configured `temp_directory` (§6
    /// `oversizedMessageHandling.tempDirectory`) relative to the process
    /// root, or uses it as-is if it is already absolute.
    #[must_use]
    pub fn resolve_temp_directory(&self, temp_directory: &str) -> PathBuf {
        let configured = Path::new(temp_directory);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("data").join("logs")
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("token-window.json")
    }

    #[must_use]
    pub fn prompts_dir(&self) -> PathBuf {
        self.config_dir().join("prompts")
    }

    /// JIT instruction file used for external/API-sourced turns.
    #[must_use]
    pub fn jit_prompt_file(&self) -> PathBuf {
        self.prompts_dir().join("twp.txt")
    }

    /// JIT instruction file used for internal (non-API) turns.
    #[must_use]
    pub fn jit_prompt_bak_file(&self) -> PathBuf {
        self.prompts_dir().join("twp_bak.txt")
    }

    #[must_use]
    pub fn diagnostic_log_file(&self) -> PathBuf {
        self.logs_dir().join("twp.txt")
    }

    /// Offload path for an oversize register, per the fixed naming scheme in
    /// §6: `large_message_<conversation_id>_<register_position>_<iso8601-safe>.txt`,
    /// under the configured `temp_directory`.
    #[must_use]
    pub fn oversize_offload_path(
        &self,
        temp_directory: &str,
        conversation_id: &str,
        register_position: u32,
        iso8601_safe_timestamp: &str,
    ) -> PathBuf {
        self.resolve_temp_directory(temp_directory).join(format!(
            "large_message_{conversation_id}_{register_position}_{iso8601_safe_timestamp}.txt"
        ))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::DataPaths;

    #[test]
    fn resolves_all_paths_under_root() {
        let paths = DataPaths::new("/srv/twm");
        assert_eq!(
            paths.config_file(),
            std::path::PathBuf::from("/srv/twm/data/config/token-window.json")
        );
        assert_eq!(
            paths.jit_prompt_file(),
            std::path::PathBuf::from("/srv/twm/data/config/prompts/twp.txt")
        );
        assert_eq!(
            paths.jit_prompt_bak_file(),
            std::path::PathBuf::from("/srv/twm/data/config/prompts/twp_bak.txt")
        );
        assert_eq!(
            paths.diagnostic_log_file(),
            std::path::PathBuf::from("/srv/twm/data/logs/twp.txt")
        );
    }

    #[test]
    fn oversize_offload_path_matches_naming_scheme() {
        let paths = DataPaths::new("/srv/twm");
        let path = paths.oversize_offload_path("data/temp", "conv-1", 7, "2026-07-30T12-00-00Z");
        assert_eq!(
            path,
            std::path::PathBuf::from(
                "/srv/twm/data/temp/large_message_conv-1_7_2026-07-30T12-00-00Z.txt"
            )
        );
    }

    #[test]
    fn oversize_offload_path_honors_absolute_temp_directory() {
        let paths = DataPaths::new("/srv/twm");
        let path = paths.oversize_offload_path("/var/twm-temp", "conv-1", 7, "2026-07-30T12-00-00Z");
        assert_eq!(
            path,
            std::path::PathBuf::from(
                "/var/twm-temp/large_message_conv-1_7_2026-07-30T12-00-00Z.txt"
            )
        );
    }
}
