//! Ambient infrastructure shared by `twm-config` and `twm-context`: the
//! command-pipeline error taxonomy, on-disk path resolution, and the
//! diagnostic log.

pub mod diagnostics;
pub mod errors;
pub mod paths;

pub use diagnostics::{DiagnosticKind, DiagnosticLog};
pub use errors::{ConfigurationError, RecacheError, SYNTHETIC_TOOL_RESULT_PREFIX};
pub use paths::DataPaths;
