// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_new::new;
use tokio::sync::oneshot;

use crate::common::Error;
use crate::common::Result;
use crate::context::Context;
use crate::store::Address;

/// A bootstrap resource whose current location the Coordinator tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    /// The server hosting the meta region.
    Meta,
    /// The cluster master.
    Master,
}

/// The coordination service (a ZooKeeper-style quorum) holding the bootstrap
/// locations of the meta region and the cluster master.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    async fn locate(&self, resource: Resource) -> Result<Address>;
}

/// A [`Coordinator`] wrapped with a per-attempt timeout.
///
/// The lookup runs in a detached task racing the timeout, so a hung quorum
/// never wedges the dispatcher. The result travels over a single-slot channel
/// whose send cannot block: the worker can always deposit its answer even
/// after the waiter has walked away.
#[derive(new)]
pub(crate) struct CoordinatorProbe {
    coordinator: Arc<dyn Coordinator>,
    timeout: Duration,
}

impl CoordinatorProbe {
    pub(crate) async fn locate(&self, ctx: &Context, resource: Resource) -> Result<Address> {
        let (result_tx, result_rx) = oneshot::channel();
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let _ = result_tx.send(coordinator.locate(resource).await);
        });
        tokio::select! {
            res = result_rx => match res {
                Ok(located) => located,
                Err(_) => Err(Error::StringError(
                    "coordinator lookup worker died".to_owned(),
                )),
            },
            _ = tokio::time::sleep(self.timeout) => Err(Error::DeadlineExceeded),
            _ = ctx.done() => Err(Error::DeadlineExceeded),
        }
    }
}
