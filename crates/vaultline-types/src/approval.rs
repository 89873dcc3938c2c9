//! Approval request/response envelopes.
//!
//! A request is written into the single approval slot by the background;
//! the prompt answers with a response carrying the same id. Responses are
//! plain JSON so they can cross any message channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of an approval request.
pub type RequestId = Uuid;

/// Information about the dApp that originated a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappInfo {
    pub domain: String,
    #[serde(rename = "imageURI", default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DappInfo {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            image_uri: None,
            name: None,
        }
    }
}

/// Kind of action awaiting approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalKind {
    Connect,
    SignMessage,
    SignTransaction,
    SignAndSubmitTransaction,
}

/// What the user is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ApprovalPayload {
    Connect,
    SignMessage {
        message: String,
        #[serde(rename = "fullMessage")]
        full_message: String,
    },
    SignTransaction {
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    SignAndSubmitTransaction {
        payload: Value,
    },
}

impl ApprovalPayload {
    pub fn kind(&self) -> ApprovalKind {
        match self {
            Self::Connect => ApprovalKind::Connect,
            Self::SignMessage { .. } => ApprovalKind::SignMessage,
            Self::SignTransaction { .. } => ApprovalKind::SignTransaction,
            Self::SignAndSubmitTransaction { .. } => ApprovalKind::SignAndSubmitTransaction,
        }
    }
}

/// A pending authorization decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub dapp_info: DappInfo,
    pub payload: ApprovalPayload,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl ApprovalRequest {
    /// Build a request with a fresh time-ordered id.
    pub fn new(dapp_info: DappInfo, payload: ApprovalPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            dapp_info,
            payload,
            created_at: now_millis(),
        }
    }

    pub fn kind(&self) -> ApprovalKind {
        self.payload.kind()
    }
}

/// Terminal status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    /// The request was superseded or abandoned; no decision will follow.
    Timeout,
}

/// Answer to an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub id: RequestId,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl ApprovalResponse {
    pub fn approved(id: RequestId, args: Option<Value>) -> Self {
        Self {
            id,
            status: ApprovalStatus::Approved,
            args,
        }
    }

    pub fn rejected(id: RequestId) -> Self {
        Self {
            id,
            status: ApprovalStatus::Rejected,
            args: None,
        }
    }

    pub fn timeout(id: RequestId) -> Self {
        Self {
            id,
            status: ApprovalStatus::Timeout,
            args: None,
        }
    }

    /// Parse an untyped message, returning `None` if it is not a response.
    pub fn from_message(message: &Value) -> Option<Self> {
        serde_json::from_value(message.clone()).ok()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
