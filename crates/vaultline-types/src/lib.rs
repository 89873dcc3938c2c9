//! Core types and constants for the vaultline wallet.
//!
//! This crate holds the data model shared by every other vaultline crate:
//! accounts and their encrypted envelope, key-derivation algorithm
//! identifiers, storage key names, and the approval request/response
//! envelopes exchanged between the background and the prompt.

pub mod account;
pub mod approval;
pub mod constants;
pub mod encoding;

pub use account::{Account, AccountKind, Accounts, EncryptedAccounts, PublicAccount, TypesError};
pub use approval::{
    ApprovalKind, ApprovalPayload, ApprovalRequest, ApprovalResponse, ApprovalStatus, DappInfo,
    RequestId,
};
