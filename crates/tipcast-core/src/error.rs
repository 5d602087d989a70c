//! Error types for the allocation and sync pipelines.

use thiserror::Error;

use crate::types::Fid;

/// Errors that can occur while computing allocations or syncing tips.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Provider error from {provider}: {reason}")]
    Provider { provider: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Remainder of {difference} cannot be spread over {rows} allocation rows")]
    RemainderOverflow { difference: i64, rows: usize },

    #[error("Tip sync failed for {} identities: {}", failed.len(), describe_failures(failed))]
    SyncFailed { failed: Vec<(Fid, String)> },
}

impl EngineError {
    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error was raised before any provider call.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

fn describe_failures(failed: &[(Fid, String)]) -> String {
    failed
        .iter()
        .map(|(fid, reason)| format!("fid {fid}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_failed_lists_identities() {
        let err = EngineError::SyncFailed {
            failed: vec![(3, "boom".into()), (9, "timeout".into())],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Tip sync failed for 2 identities"));
        assert!(msg.contains("fid 3: boom"));
        assert!(msg.contains("fid 9: timeout"));
    }
}
