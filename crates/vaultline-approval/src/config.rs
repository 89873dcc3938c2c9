//! Approval configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    /// Resolve a pending request as `Timeout` after this long without a
    /// decision. `None` relies on supersession and prompt closure only.
    pub request_timeout: Option<Duration>,
    /// Buffered responses per message bus before slow subscribers lag.
    pub bus_capacity: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            bus_capacity: 64,
        }
    }
}
