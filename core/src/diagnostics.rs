//! Diagnostic log: an append-only text trail of notable per-turn events
//! (§6), mirrored through `tracing` so any configured subscriber sees the
//! same events structurally.
//!
//! This is deliberately separate from the `tracing` ambient stack: the
//! diagnostic log file is a user-facing artifact the operator tails
//! directly, and its format is part of the external interface regardless of
//! whatever `tracing_subscriber` layer the host process installs.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use chrono::Utc;

/// The kind of event being recorded, used only to choose the `tracing`
/// level and the one-word marker line in the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A routine per-turn rewrite, JIT inject/clean, or oversize offload.
    Event,
    /// An internal consistency violation (consecutive placeholders,
    /// non-odd length, cache-span inversion) that does not raise but must
    /// be recorded distinctly (§7).
    ConsistencyViolation,
}

impl DiagnosticKind {
    const fn marker(self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::ConsistencyViolation => "CONSISTENCY-VIOLATION",
        }
    }
}

/// Appends structured entries to `data/logs/twp.txt`.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: std::path::PathBuf,
}

impl DiagnosticLog {
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one multi-line entry and mirrors it through `tracing`.
    ///
    /// IO failures are logged via `tracing::error!` and otherwise swallowed —
    /// a diagnostic sink must never become a reason for the pipeline to fail
    /// a turn.
    pub fn record(&self, kind: DiagnosticKind, conversation_id: &str, detail: &str) {
        match kind {
            DiagnosticKind::Event => {
                tracing::info!(conversation_id, detail, "twm diagnostic event");
            }
            DiagnosticKind::ConsistencyViolation => {
                tracing::warn!(conversation_id, detail, "twm consistency violation");
            }
        }

        if let Err(err) = self.append_to_file(kind, conversation_id, detail) {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "failed to append diagnostic log entry"
            );
        }
    }

    fn append_to_file(
        &self,
        kind: DiagnosticKind,
        conversation_id: &str,
        detail: &str,
    ) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(
            file,
            "[{}] {} conversation={conversation_id}\n{detail}\n",
            Utc::now().to_rfc3339(),
            kind.marker(),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
