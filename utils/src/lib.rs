//! Shared infrastructure utilities for the Token Window Manager.
//!
//! Cross-cutting utilities that multiple workspace crates need but that
//! don't belong in the domain-pure `twm-types` crate:
//!
//! - **`atomic_write`**: crash-safe file persistence (temp + rename), used
//!   for oversize-message offload files and the diagnostic log.

pub mod atomic_write;

#[cfg(windows)]
mod windows_acl;

#[cfg(windows)]
pub use windows_acl::{set_owner_only_dir_acl, set_owner_only_file_acl};

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode, atomic_write,
    atomic_write_new_with_options, atomic_write_with_options, recover_bak_file,
};
