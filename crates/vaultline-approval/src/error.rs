//! Approval error types.

use thiserror::Error;
use vaultline_storage::StorageError;
use vaultline_types::RequestId;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("request {0} was rejected")]
    Rejected(RequestId),

    #[error("request {0} timed out")]
    TimedOut(RequestId),

    #[error("no pending approval request")]
    NoPendingRequest,

    #[error("request {0} was already decided")]
    AlreadyDecided(RequestId),

    #[error("prompt unavailable: {0}")]
    PromptUnavailable(String),

    #[error("response channel closed")]
    ChannelClosed,
}
