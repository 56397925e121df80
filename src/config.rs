// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::time::Duration;

use serde_derive::Deserialize;
use serde_derive::Serialize;

/// The configuration for a [`Dispatcher`](crate::Dispatcher).
///
/// Covers the dispatch-level knobs only; connection-level settings (TLS,
/// compression) belong to the region client implementation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// How long to wait for a single region lookup attempt, whether against
    /// the Coordinator or the meta table. Should be greater than or equal to
    /// the Coordinator session timeout.
    pub lookup_timeout: Duration,
    /// Capacity of each region client's send queue.
    pub rpc_queue_size: usize,
    /// How long a region client may hold queued RPCs before flushing a batch.
    pub flush_interval: Duration,
}

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RPC_QUEUE_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

impl Default for Config {
    fn default() -> Self {
        Config {
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            rpc_queue_size: DEFAULT_RPC_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl Config {
    /// Set the per-attempt region lookup timeout.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Set the region client send queue capacity.
    #[must_use]
    pub fn with_rpc_queue_size(mut self, size: usize) -> Self {
        self.rpc_queue_size = size;
        self
    }

    /// Set the region client flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.lookup_timeout, Duration::from_secs(30));
        assert_eq!(config.rpc_queue_size, 100);
        assert_eq!(config.flush_interval, Duration::from_millis(20));
    }

    #[test]
    fn builders() {
        let config = Config::default()
            .with_lookup_timeout(Duration::from_secs(5))
            .with_rpc_queue_size(8)
            .with_flush_interval(Duration::from_millis(1));
        assert_eq!(config.lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.rpc_queue_size, 8);
        assert_eq!(config.flush_interval, Duration::from_millis(1));
    }
}
