//! Ledger configuration.

use std::time::Duration;

/// Configuration for the ledger and verifier.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Deadline for a single anchor-oracle call.
    pub anchor_timeout: Duration,
    /// Re-check the new leaf's proof against the new root before commit.
    pub verify_on_append: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            anchor_timeout: Duration::from_secs(5),
            verify_on_append: true,
        }
    }
}

impl LedgerConfig {
    /// Set the anchor-oracle deadline.
    pub fn with_anchor_timeout(mut self, timeout: Duration) -> Self {
        self.anchor_timeout = timeout;
        self
    }

    /// Enable or disable the append-time proof re-check.
    pub fn with_verify_on_append(mut self, enabled: bool) -> Self {
        self.verify_on_append = enabled;
        self
    }
}
