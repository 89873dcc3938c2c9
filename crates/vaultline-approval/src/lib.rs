//! Approval protocol for vaultline.
//!
//! Whenever a dApp asks the wallet to connect or sign, the background
//! ([`ApprovalRequester`]) writes a request into a single persisted slot
//! ([`ApprovalStore`]) and opens the prompt. The prompt side
//! ([`ApprovalServer`] and [`ApprovalClient`]) observes the slot, collects
//! the user's decision and relays an [`ApprovalResponse`] back over the
//! runtime's [`ResponseRelay`].
//!
//! At most one request is pending at a time. Writing a new request
//! supersedes the previous one, whose caller receives a `Timeout` response.
//!
//! [`DappApiServer`] is the endpoint dApp messages arrive at; it checks
//! per-domain permissions and turns approvals into API results.
//!
//! [`ApprovalResponse`]: vaultline_types::ApprovalResponse

pub mod client;
pub mod config;
pub mod dapp;
pub mod error;
pub mod permissions;
pub mod relay;
pub mod requester;
pub mod server;
pub mod store;
#[cfg(test)]
mod testing;

pub use client::ApprovalClient;
pub use config::ApprovalConfig;
pub use dapp::{DappApiError, DappApiServer, DappRequest, DappResponse, SignMessagePayload};
pub use error::ApprovalError;
pub use permissions::PermissionService;
pub use relay::{MessageBus, OpenerWindow, ResponseRelay};
pub use requester::{ApprovalRequester, PromptCloser, PromptHandle, PromptLauncher, ReusablePrompt};
pub use server::{ApprovalListener, ApprovalServer};
pub use store::{ApprovalStore, SlotChange, SlotSubscription};
