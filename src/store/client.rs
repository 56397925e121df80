// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_new::new;

use crate::common::Result;
use crate::rpc::QueuedCall;

/// The network address of a region server or the master.
#[derive(new, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What kind of process a region client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKind {
    /// A region server; serves table data.
    Region,
    /// The cluster master; serves administrative RPCs.
    Master,
}

/// A live connection to one region server (or the master).
///
/// The dispatcher treats the client as a mailbox: [`queue`](Self::queue) is
/// fire-and-forget, and the client's own I/O tasks deliver each RPC's result
/// on the channel the [`QueuedCall`] carries. Implementations classify
/// failures into the crate's retryable / unrecoverable error classes.
pub trait RegionClient: Send + Sync + 'static {
    /// The (host, port) this client is connected to.
    fn address(&self) -> &Address;

    /// Enqueue an RPC. Never blocks; the result channel reports the outcome.
    fn queue(&self, rpc: QueuedCall);

    /// Tear the connection down. Pending RPCs fail with an unrecoverable
    /// error. Safe to call more than once.
    fn close(&self);
}

/// Dials region servers. The wire protocol lives behind this seam.
#[async_trait]
pub trait RegionConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        address: &Address,
        kind: ClientKind,
        queue_size: usize,
        flush_interval: Duration,
    ) -> Result<Arc<dyn RegionClient>>;
}
