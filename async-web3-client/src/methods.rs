//! Method names and subscription feeds

use std::fmt;

/// Open a subscription
pub const ETH_SUBSCRIBE: &str = "eth_subscribe";
/// Cancel a subscription
pub const ETH_UNSUBSCRIBE: &str = "eth_unsubscribe";
/// Node client version, also used as a liveness probe
pub const WEB3_CLIENT_VERSION: &str = "web3_clientVersion";

/// Push feeds a node offers over `eth_subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// A header for every new block
    NewHeads,
    /// Logs matching a filter object passed as the second parameter
    Logs,
    /// Hashes of transactions entering the pending pool
    NewPendingTransactions,
    /// Sync status changes
    Syncing,
}

impl SubscriptionKind {
    /// Name passed as the first `eth_subscribe` parameter
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionKind::NewHeads => "newHeads",
            SubscriptionKind::Logs => "logs",
            SubscriptionKind::NewPendingTransactions => "newPendingTransactions",
            SubscriptionKind::Syncing => "syncing",
        }
    }

    pub fn subscribe_method(&self) -> &'static str {
        ETH_SUBSCRIBE
    }

    pub fn unsubscribe_method(&self) -> &'static str {
        ETH_UNSUBSCRIBE
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
