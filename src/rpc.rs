// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::any::Any;
use std::sync::Arc;

use derive_new::new;
use tokio::sync::oneshot;

use crate::common::Result;
use crate::context::Context;

/// A decoded server response. The dispatcher routes responses without
/// inspecting them; the RPC layer downcasts to the concrete message type.
pub type Message = Box<dyn Any + Send>;

/// The outcome of one queued RPC, as classified by the region client.
pub type CallResult = Result<Message>;

/// A routable RPC: everything the dispatcher needs to pick a region server
/// and await the outcome. Concrete GET/PUT/SCAN types live in the RPC layer.
pub trait Call: Send + Sync + 'static {
    /// The table this RPC targets.
    fn table(&self) -> &[u8];

    /// The row key used to pick the region.
    fn key(&self) -> &[u8];

    /// The caller's context. Every await in the dispatcher races against it.
    fn context(&self) -> &Context;
}

/// An RPC bound to a region, ready to be queued on a region client.
#[derive(new)]
pub struct QueuedCall {
    pub call: Arc<dyn Call>,
    /// Region name stamped into the server-side request header.
    pub region_name: Vec<u8>,
    /// Single-shot result channel. The client's I/O task deposits exactly one
    /// result; dropping the sender signals that the connection died first.
    pub result: oneshot::Sender<CallResult>,
}
