//! Command-line harness for the Token Window Manager.
//!
//! Reads newline-delimited JSON turn requests from stdin, feeds each one
//! through [`twm_context::ContextManager::process_request`], and writes the
//! rewritten messages and cache stats back to stdout as one JSON object per
//! line. Intended as a scriptable front end for a host that owns its own
//! chat loop and just wants TWM's rewriting behavior, and as a manual
//! exerciser during development.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use twm_context::ContextManager;
use twm_types::{ClientMessage, ConversationId};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    // Diagnostics go to stderr; stdout is reserved for NDJSON turn results.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[derive(Debug, Deserialize)]
struct TurnRequest {
    conversation_id: String,
    #[serde(default)]
    bot_id: Option<String>,
    messages: Vec<ClientMessage>,
}

#[derive(Debug, Serialize)]
struct RenderedMessageOut {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct SystemPromptBlockOut {
    content: String,
    cache_tag: bool,
}

#[derive(Debug, Serialize)]
struct CacheStatsOut {
    creation: u32,
    read: u32,
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    messages: Vec<RenderedMessageOut>,
    system_prompt: Vec<SystemPromptBlockOut>,
    cache_stats: CacheStatsOut,
}

fn main() -> Result<()> {
    init_tracing();

    let manager = ContextManager::from_cwd().context("failed to initialize token window manager")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read line from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: TurnRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(error = %err, "failed to parse turn request; skipping line");
                continue;
            }
        };

        let conversation_id = ConversationId::new(request.conversation_id);
        let result = manager.process_request(conversation_id.clone(), request.messages, request.bot_id.as_deref());
        let cache_stats = manager.get_cache_stats(&conversation_id);

        let response = TurnResponse {
            messages: result
                .messages
                .into_iter()
                .map(|m| RenderedMessageOut {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                })
                .collect(),
            system_prompt: result
                .system_prompt
                .into_iter()
                .map(|b| SystemPromptBlockOut {
                    content: b.content,
                    cache_tag: b.cache_tag,
                })
                .collect(),
            cache_stats: CacheStatsOut {
                creation: cache_stats.creation,
                read: cache_stats.read,
            },
        };

        let serialized = serde_json::to_string(&response).context("failed to serialize turn response")?;
        writeln!(out, "{serialized}").context("failed to write turn response")?;
        out.flush().context("failed to flush stdout")?;
    }

    Ok(())
}
