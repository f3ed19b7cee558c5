//! Writes the final message to a temporary file and commits with it.

use crate::error::{WorkflowError, WorkflowResult};
use crate::vcs::Vcs;
use std::io::Write;
use tempfile::Builder;
use tracing::{debug, info};

/// Commits the staged changes with `message`.
///
/// The message file is removed on every path; failures to remove it are
/// ignored.
///
/// # Errors
///
/// Returns [`WorkflowError::CommitFailed`] if the file cannot be written or
/// the commit itself fails.
pub fn commit<V: Vcs + ?Sized>(vcs: &V, message: &str) -> WorkflowResult<()> {
    let mut file = Builder::new()
        .prefix("diffscribe-msg-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| WorkflowError::CommitFailed(format!("could not create message file: {}", e)))?;

    let result = file
        .write_all(message.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| WorkflowError::CommitFailed(format!("could not write message file: {}", e)))
        .and_then(|_| vcs.commit(file.path()));

    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        debug!("Ignoring failure to remove {}: {}", path.display(), e);
    }

    if result.is_ok() {
        info!("Committed ({} chars)", message.len());
    }
    result
}
