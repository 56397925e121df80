// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::context::CancelHandle;
use crate::context::Context;
use crate::store::RegionClient;

/// One region of one table: a half-open key range `[start_key, stop_key)`
/// (empty `stop_key` means +∞) served by exactly one region server.
///
/// Identity (name, table, keys) is immutable. The mutable part is the
/// availability gate and the bound region client, both behind one mutex so
/// that a task observing *available* always finds the client that was bound
/// before the transition.
pub struct RegionInfo {
    name: Vec<u8>,
    table: Vec<u8>,
    start_key: Vec<u8>,
    stop_key: Vec<u8>,
    ctx: Context,
    cancel: CancelHandle,
    state: Mutex<RegionState>,
}

struct RegionState {
    available: bool,
    /// Present exactly while unavailable; senders-side of the availability
    /// signal. A fresh channel is allocated on every available→unavailable
    /// edge, so each outage cycle has its own signal.
    signal: Option<watch::Sender<bool>>,
    client: Option<Arc<dyn RegionClient>>,
}

impl RegionInfo {
    /// A new region, available, with no client bound yet.
    pub fn new(name: Vec<u8>, table: Vec<u8>, start_key: Vec<u8>, stop_key: Vec<u8>) -> RegionInfo {
        let (ctx, cancel) = Context::with_cancel();
        RegionInfo {
            name,
            table,
            start_key,
            stop_key,
            ctx,
            cancel,
            state: Mutex::new(RegionState {
                available: true,
                signal: None,
                client: None,
            }),
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn table(&self) -> &[u8] {
        &self.table
    }

    pub fn start_key(&self) -> &[u8] {
        &self.start_key
    }

    pub fn stop_key(&self) -> &[u8] {
        &self.stop_key
    }

    /// The region's lifetime context. Cancelled means retired: the mapping
    /// was removed or replaced and reconnection attempts should stop.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Retire the region: cancels its lifetime context.
    pub fn retire(&self) {
        self.cancel.cancel();
    }

    /// Whether `key` falls inside this region's range. The start bound is not
    /// checked; cache lookups only reach here with `start_key <= key`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.stop_key.is_empty() || key < self.stop_key.as_slice()
    }

    pub fn is_unavailable(&self) -> bool {
        !self.state.lock().unwrap().available
    }

    /// Flip available→unavailable. Returns true for exactly one caller per
    /// edge; that caller owns spawning the establisher.
    pub fn mark_unavailable(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.available {
            return false;
        }
        state.available = false;
        let (tx, _rx) = watch::channel(false);
        state.signal = Some(tx);
        true
    }

    /// Flip unavailable→available and release every awaiter of the current
    /// signal. No-op when already available.
    pub fn mark_available(&self) {
        let mut state = self.state.lock().unwrap();
        state.available = true;
        if let Some(signal) = state.signal.take() {
            let _ = signal.send(true);
        }
    }

    /// The current availability signal, or nothing while available. Awaiters
    /// subscribe here and wake when [`mark_available`](Self::mark_available)
    /// runs, even if they only start awaiting afterwards.
    pub fn availability_signal(&self) -> Option<watch::Receiver<bool>> {
        let state = self.state.lock().unwrap();
        state.signal.as_ref().map(watch::Sender::subscribe)
    }

    /// The bound region client. Meaningful only after observing *available*.
    pub fn client(&self) -> Option<Arc<dyn RegionClient>> {
        self.state.lock().unwrap().client.clone()
    }

    /// Bind (or clear) the region client. Establishers bind before marking
    /// available; `client_down` handling clears.
    pub fn set_client(&self, client: Option<Arc<dyn RegionClient>>) {
        self.state.lock().unwrap().client = client;
    }
}

impl fmt::Display for RegionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}[{:?}..{:?}])",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.table),
            self.start_key,
            self.stop_key,
        )
    }
}

impl fmt::Debug for RegionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionInfo")
            .field("name", &String::from_utf8_lossy(&self.name))
            .field("table", &String::from_utf8_lossy(&self.table))
            .field("start_key", &self.start_key)
            .field("stop_key", &self.stop_key)
            .field("unavailable", &self.is_unavailable())
            .finish()
    }
}
