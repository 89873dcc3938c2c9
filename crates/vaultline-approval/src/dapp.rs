//! dApp-facing API endpoint.
//!
//! Requests arrive as JSON envelopes from an untrusted page. Each method
//! checks that the active account is connected to the requesting domain
//! (except `connect` and `isConnected`), asks the user through the approval
//! protocol where needed, and answers with a result or a numbered error.

use crate::error::ApprovalError;
use crate::permissions::PermissionService;
use crate::requester::ApprovalRequester;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use vaultline_storage::Storage;
use vaultline_types::constants::storage_keys;
use vaultline_types::{ApprovalPayload, DappInfo, PublicAccount};

/// Prefix of every message signed through `signMessage`.
pub const SIGN_MESSAGE_PREFIX: &str = "APTOS";

/// Chain id reported when no network has been selected.
pub const DEFAULT_CHAIN_ID: u64 = 1;

// ── Envelopes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DappRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DappResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DappErrorBody>,
}

/// Wire form of a [`DappApiError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappErrorBody {
    pub code: i32,
    pub name: String,
    pub message: String,
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DappApiError {
    #[error("No accounts found")]
    NoAccounts,

    #[error("The user rejected the request")]
    UserRejection,

    #[error("The prompt timed out without a response. This could be because the user did not respond or because a new request was opened.")]
    TimeOut,

    #[error("The requested method and/or account has not been authorized by the user.")]
    Unauthorized,

    #[error("The provider does not support the requested method.")]
    Unsupported,

    #[error("Something went wrong within the wallet.")]
    InternalError,
}

impl DappApiError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NoAccounts => 4000,
            Self::UserRejection => 4001,
            Self::TimeOut => 4002,
            Self::Unauthorized => 4100,
            Self::Unsupported => 4200,
            Self::InternalError => -30001,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoAccounts => "NO_ACCOUNTS",
            Self::UserRejection => "USER_REJECTION",
            Self::TimeOut => "TIME_OUT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Unsupported => "UNSUPPORTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl From<DappApiError> for DappErrorBody {
    fn from(error: DappApiError) -> Self {
        Self {
            code: error.code(),
            name: error.name().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<ApprovalError> for DappApiError {
    fn from(error: ApprovalError) -> Self {
        match error {
            ApprovalError::Rejected(_) => Self::UserRejection,
            ApprovalError::TimedOut(_) => Self::TimeOut,
            other => {
                // Details stay on the wallet side.
                log::error!("dapp request failed: {}", other);
                Self::InternalError
            }
        }
    }
}

fn internal<E: std::fmt::Display>(error: E) -> DappApiError {
    log::error!("dapp request failed: {}", error);
    DappApiError::InternalError
}

// ── signMessage ──────────────────────────────────────────────────────────────

/// Arguments of `signMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessagePayload {
    #[serde(default)]
    pub address: bool,
    #[serde(default)]
    pub application: bool,
    #[serde(default)]
    pub chain_id: bool,
    pub message: String,
    pub nonce: String,
}

impl SignMessagePayload {
    /// The exact text the user signs.
    pub fn full_message(&self, address: &str, domain: &str, chain_id: u64) -> String {
        let mut full = SIGN_MESSAGE_PREFIX.to_string();
        if self.address {
            full.push_str(&format!("\naddress: {}", address));
        }
        if self.application {
            full.push_str(&format!("\napplication: {}", domain));
        }
        if self.chain_id {
            full.push_str(&format!("\nchainId: {}", chain_id));
        }
        full.push_str(&format!("\nmessage: {}", self.message));
        full.push_str(&format!("\nnonce: {}", self.nonce));
        full
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

pub struct DappApiServer {
    persistent: Arc<dyn Storage>,
    permissions: PermissionService,
    requester: Arc<ApprovalRequester>,
}

impl DappApiServer {
    pub fn new(persistent: Arc<dyn Storage>, requester: Arc<ApprovalRequester>) -> Self {
        Self {
            permissions: PermissionService::new(Arc::clone(&persistent)),
            persistent,
            requester,
        }
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    /// Handle one request from `dapp`. Never fails: errors are returned in
    /// the response envelope.
    pub async fn handle_request(&self, dapp: &DappInfo, request: DappRequest) -> DappResponse {
        log::debug!("dapp request {} {} from {}", request.id, request.method, dapp.domain);
        match self.dispatch(dapp, &request.method, request.args).await {
            Ok(result) => DappResponse {
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(error) => DappResponse {
                id: request.id,
                result: None,
                error: Some(error.into()),
            },
        }
    }

    async fn dispatch(
        &self,
        dapp: &DappInfo,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, DappApiError> {
        match method {
            "connect" => self.connect(dapp).await,
            "disconnect" => self.disconnect(dapp),
            "isConnected" => self.is_connected(dapp),
            "getAccount" => self.get_account(dapp),
            "signMessage" => self.sign_message(dapp, args).await,
            "signTransaction" => self.sign_transaction(dapp, args).await,
            "signAndSubmitTransaction" => self.sign_and_submit_transaction(dapp, args).await,
            _ => Err(DappApiError::Unsupported),
        }
    }

    // ── Methods ──────────────────────────────────────────────────────────

    async fn connect(&self, dapp: &DappInfo) -> Result<Value, DappApiError> {
        let account = self.active_account()?.ok_or(DappApiError::NoAccounts)?;
        let allowed = self
            .permissions
            .is_domain_allowed(&dapp.domain, &account.address)?;
        if !allowed {
            self.requester
                .request_approval(dapp.clone(), ApprovalPayload::Connect)
                .await?;
            self.permissions.add_domain(&dapp.domain, &account.address)?;
        }
        serde_json::to_value(account).map_err(internal)
    }

    fn disconnect(&self, dapp: &DappInfo) -> Result<Value, DappApiError> {
        let account = self.ensure_connected(dapp)?;
        self.permissions
            .remove_domain(&dapp.domain, &account.address)?;
        Ok(Value::Null)
    }

    fn is_connected(&self, dapp: &DappInfo) -> Result<Value, DappApiError> {
        let connected = match self.active_account()? {
            Some(account) => self
                .permissions
                .is_domain_allowed(&dapp.domain, &account.address)?,
            None => false,
        };
        Ok(Value::Bool(connected))
    }

    fn get_account(&self, dapp: &DappInfo) -> Result<Value, DappApiError> {
        let account = self.ensure_connected(dapp)?;
        serde_json::to_value(account).map_err(internal)
    }

    async fn sign_message(&self, dapp: &DappInfo, args: Vec<Value>) -> Result<Value, DappApiError> {
        let account = self.ensure_connected(dapp)?;
        let payload: SignMessagePayload = arg(&args, 0)?;
        let chain_id = self.chain_id()?;
        let full_message = payload.full_message(&account.address, &dapp.domain, chain_id);

        let approval = self
            .requester
            .request_approval(
                dapp.clone(),
                ApprovalPayload::SignMessage {
                    message: payload.message.clone(),
                    full_message: full_message.clone(),
                },
            )
            .await?;
        let signature = response_field(approval, "signature")?;

        Ok(json!({
            "address": account.address,
            "application": dapp.domain,
            "chainId": chain_id,
            "fullMessage": full_message,
            "message": payload.message,
            "nonce": payload.nonce,
            "prefix": SIGN_MESSAGE_PREFIX,
            "signature": signature,
        }))
    }

    async fn sign_transaction(
        &self,
        dapp: &DappInfo,
        args: Vec<Value>,
    ) -> Result<Value, DappApiError> {
        self.ensure_connected(dapp)?;
        let payload: Value = arg(&args, 0)?;
        let options = args.get(1).cloned().filter(|v| !v.is_null());
        let approval = self
            .requester
            .request_approval(
                dapp.clone(),
                ApprovalPayload::SignTransaction { payload, options },
            )
            .await?;
        response_field(approval, "signedTxnHex")
    }

    async fn sign_and_submit_transaction(
        &self,
        dapp: &DappInfo,
        args: Vec<Value>,
    ) -> Result<Value, DappApiError> {
        self.ensure_connected(dapp)?;
        let payload: Value = arg(&args, 0)?;
        let approval = self
            .requester
            .request_approval(dapp.clone(), ApprovalPayload::SignAndSubmitTransaction { payload })
            .await?;
        response_field(approval, "userTxn")
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn active_account(&self) -> Result<Option<PublicAccount>, DappApiError> {
        let values = self
            .persistent
            .get(&[
                storage_keys::ACTIVE_ACCOUNT_ADDRESS,
                storage_keys::ACTIVE_ACCOUNT_PUBLIC_KEY,
            ])
            .map_err(internal)?;
        match (
            values.get(storage_keys::ACTIVE_ACCOUNT_ADDRESS),
            values.get(storage_keys::ACTIVE_ACCOUNT_PUBLIC_KEY),
        ) {
            (Some(Value::String(address)), Some(Value::String(public_key))) => {
                Ok(Some(PublicAccount {
                    address: address.clone(),
                    public_key: public_key.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// The active account, if it is connected to `dapp`.
    fn ensure_connected(&self, dapp: &DappInfo) -> Result<PublicAccount, DappApiError> {
        let account = self.active_account()?.ok_or(DappApiError::Unauthorized)?;
        if self
            .permissions
            .is_domain_allowed(&dapp.domain, &account.address)?
        {
            Ok(account)
        } else {
            Err(DappApiError::Unauthorized)
        }
    }

    fn chain_id(&self) -> Result<u64, DappApiError> {
        let values = self
            .persistent
            .get(&[storage_keys::ACTIVE_NETWORK])
            .map_err(internal)?;
        Ok(values
            .get(storage_keys::ACTIVE_NETWORK)
            .and_then(|network| network.get("chainId"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_CHAIN_ID))
    }
}

fn arg<T: serde::de::DeserializeOwned>(args: &[Value], index: usize) -> Result<T, DappApiError> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(internal)
}

fn response_field(args: Option<Value>, field: &str) -> Result<Value, DappApiError> {
    args.as_ref()
        .and_then(|args| args.get(field))
        .cloned()
        .ok_or_else(|| internal(format!("approval response missing {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let body = DappErrorBody::from(DappApiError::UserRejection);
        assert_eq!(body.code, 4001);
        assert_eq!(body.name, "USER_REJECTION");
        assert_eq!(DappApiError::NoAccounts.code(), 4000);
        assert_eq!(DappApiError::TimeOut.code(), 4002);
        assert_eq!(DappApiError::Unauthorized.code(), 4100);
        assert_eq!(DappApiError::Unsupported.code(), 4200);
        assert_eq!(DappApiError::InternalError.code(), -30001);
    }

    #[test]
    fn test_approval_errors_map_to_api_errors() {
        let id = vaultline_types::RequestId::now_v7();
        assert_eq!(
            DappApiError::from(ApprovalError::Rejected(id)),
            DappApiError::UserRejection
        );
        assert_eq!(
            DappApiError::from(ApprovalError::TimedOut(id)),
            DappApiError::TimeOut
        );
        assert_eq!(
            DappApiError::from(ApprovalError::ChannelClosed),
            DappApiError::InternalError
        );
    }

    #[test]
    fn test_full_message_minimal() {
        let payload = SignMessagePayload {
            address: false,
            application: false,
            chain_id: false,
            message: "hello".into(),
            nonce: "42".into(),
        };
        assert_eq!(
            payload.full_message("0x1", "a.example", 1),
            "APTOS\nmessage: hello\nnonce: 42"
        );
    }

    #[test]
    fn test_full_message_all_fields() {
        let payload: SignMessagePayload = serde_json::from_value(json!({
            "address": true,
            "application": true,
            "chainId": true,
            "message": "hello",
            "nonce": "42",
        }))
        .unwrap();
        assert_eq!(
            payload.full_message("0x1", "a.example", 2),
            "APTOS\naddress: 0x1\napplication: a.example\nchainId: 2\nmessage: hello\nnonce: 42"
        );
    }

    #[test]
    fn test_response_envelope_shape() {
        let response = DappResponse {
            id: 7,
            result: None,
            error: Some(DappApiError::Unauthorized.into()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["error"]["code"], 4100);
        assert!(json.get("result").is_none());
    }
}
