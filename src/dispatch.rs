// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

//! The dispatch state machine: route each RPC to the region server currently
//! owning its (table, key), maintaining the region and client caches and
//! reconnecting around region moves and server failures.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use futures::future::BoxFuture;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::oneshot;
use tokio::sync::watch;

use crate::backoff::sleep_and_grow;
use crate::backoff::BACKOFF_START;
use crate::client_cache::ClientCache;
use crate::common::Error;
use crate::common::Result;
use crate::config::Config;
use crate::context::Context;
use crate::coordinator::Coordinator;
use crate::coordinator::CoordinatorProbe;
use crate::coordinator::Resource;
use crate::meta::region_search_key;
use crate::meta::MetaCodec;
use crate::meta::META_TABLE;
use crate::region::RegionInfo;
use crate::region_cache::RegionCache;
use crate::rpc::Call;
use crate::rpc::Message;
use crate::rpc::QueuedCall;
use crate::store::Address;
use crate::store::ClientKind;
use crate::store::RegionClient;
use crate::store::RegionConnector;

type FlightKey = (Vec<u8>, Vec<u8>);

/// The region-dispatch core.
///
/// `send` routes one RPC: cache hit or meta lookup, queue on the owning
/// server's client, classify the response, retry under the caller's deadline.
/// Cheap to clone; all clones share the caches.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    kind: ClientKind,
    config: Config,
    regions: RegionCache,
    clients: ClientCache,
    /// Coalesces concurrent cache misses for the same (table, key) into one
    /// meta lookup. The winner's completion signal wakes the rest.
    in_flight: Mutex<HashMap<FlightKey, watch::Sender<bool>>>,
    coordinator: CoordinatorProbe,
    codec: Arc<dyn MetaCodec>,
    connector: Arc<dyn RegionConnector>,
    /// Sentinel for the meta table; lives for the dispatcher's lifetime and
    /// is never inserted into the region cache.
    meta_region: Arc<RegionInfo>,
    /// Sentinel for the cluster master; every RPC of a master-mode dispatcher
    /// routes here.
    admin_region: Arc<RegionInfo>,
}

impl Dispatcher {
    pub fn new(
        kind: ClientKind,
        coordinator: Arc<dyn Coordinator>,
        codec: Arc<dyn MetaCodec>,
        connector: Arc<dyn RegionConnector>,
        config: Config,
    ) -> Dispatcher {
        let meta_region = Arc::new(RegionInfo::new(
            b"rangestore:meta,,1".to_vec(),
            META_TABLE.to_vec(),
            Vec::new(),
            Vec::new(),
        ));
        let admin_region = Arc::new(RegionInfo::new(
            b"master".to_vec(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ));
        let coordinator = CoordinatorProbe::new(coordinator, config.lookup_timeout);
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                kind,
                config,
                regions: RegionCache::new(),
                clients: ClientCache::new(),
                in_flight: Mutex::new(HashMap::new()),
                coordinator,
                codec,
                connector,
                meta_region,
                admin_region,
            }),
        }
    }

    /// Route `call` to the region server owning its (table, key) and return
    /// the server's response.
    ///
    /// Transient trouble (region moved, server died, connection lost) is
    /// retried here under the caller's context; the terminal outcomes are
    /// success, [`Error::DeadlineExceeded`], [`Error::TableNotFound`],
    /// [`Error::CorruptMeta`], or an unclassified server error.
    pub async fn send(&self, call: Arc<dyn Call>) -> Result<Message> {
        loop {
            let region = match self.region_from_cache(call.table(), call.key()) {
                Some(region) => region,
                None => {
                    self.find_region(call.context(), call.table(), call.key())
                        .await?
                }
            };
            match self.send_to_region(&call, &region).await {
                Err(Error::RegionUnavailable) => {
                    if let Some(mut signal) = region.availability_signal() {
                        tokio::select! {
                            _ = signal.changed() => {}
                            _ = call.context().done() => return Err(Error::DeadlineExceeded),
                        }
                    }
                    // Re-resolve: the mapping may have been replaced.
                }
                outcome => return outcome,
            }
        }
    }

    /// Shut the dispatcher down: retire both sentinels and close every cached
    /// client. In-flight establishers notice the retirement and stop.
    pub fn close(&self) {
        self.inner.meta_region.retire();
        self.inner.admin_region.retire();
        for client in self.inner.clients.drain() {
            client.close();
        }
    }

    fn region_from_cache(&self, table: &[u8], key: &[u8]) -> Option<Arc<RegionInfo>> {
        if self.inner.kind == ClientKind::Master {
            return Some(self.inner.admin_region.clone());
        }
        if table == META_TABLE {
            return Some(self.inner.meta_region.clone());
        }
        self.inner.regions.get(table, key)
    }

    fn is_sentinel(&self, region: &Arc<RegionInfo>) -> bool {
        Arc::ptr_eq(region, &self.inner.meta_region)
            || Arc::ptr_eq(region, &self.inner.admin_region)
    }

    /// One attempt to hand `call` to `region`'s client and await the reply.
    /// Any failure that invalidates the mapping comes back as
    /// `RegionUnavailable` after the appropriate cache surgery; the send loop
    /// parks on the availability signal and retries.
    async fn send_to_region(
        &self,
        call: &Arc<dyn Call>,
        region: &Arc<RegionInfo>,
    ) -> Result<Message> {
        if region.is_unavailable() {
            return Err(Error::RegionUnavailable);
        }

        let Some(client) = region.client() else {
            if region.mark_unavailable() {
                self.spawn_reestablish(region.clone());
            }
            return Err(Error::RegionUnavailable);
        };

        let (result_tx, result_rx) = oneshot::channel();
        client.queue(QueuedCall::new(
            call.clone(),
            region.name().to_vec(),
            result_tx,
        ));

        let result = tokio::select! {
            res = result_rx => res,
            _ = call.context().done() => return Err(Error::DeadlineExceeded),
        };
        // A dropped sender means the connection died before replying.
        let result = result.unwrap_or_else(|_| {
            Err(Error::Unrecoverable {
                message: "region client dropped the call".to_owned(),
            })
        });

        match result {
            Err(err) if err.is_region_retryable() => {
                // The server is fine, this region is not (moving, opening).
                debug!("retryable error on region {region}: {err}");
                if region.mark_unavailable() {
                    self.spawn_reestablish(region.clone());
                }
                if !Arc::ptr_eq(region, &self.inner.admin_region) {
                    self.inner.clients.del(region);
                }
                Err(Error::RegionUnavailable)
            }
            Err(err) if err.is_client_fatal() => {
                warn!("region client {} is down: {err}", client.address());
                if Arc::ptr_eq(region, &self.inner.admin_region) {
                    if region.mark_unavailable() {
                        self.spawn_reestablish(region.clone());
                    }
                } else if let Some(downed) = self.inner.clients.client_down(&client) {
                    // Whoever removed the entry owns the single close and the
                    // fan-out to every region that shared the connection.
                    client.close();
                    for downed_region in downed {
                        if downed_region.mark_unavailable() {
                            downed_region.set_client(None);
                            self.spawn_reestablish(downed_region);
                        }
                    }
                }
                Err(Error::RegionUnavailable)
            }
            outcome => outcome,
        }
    }

    /// Resolve an uncached (table, key) to a region, install it, and kick off
    /// its establishment. Concurrent callers for the same key coalesce into a
    /// single lookup.
    async fn find_region(
        &self,
        ctx: &Context,
        table: &[u8],
        key: &[u8],
    ) -> Result<Arc<RegionInfo>> {
        let flight_key: FlightKey = (table.to_vec(), key.to_vec());
        loop {
            let waiter = {
                let mut in_flight = self.inner.in_flight.lock().unwrap();
                match in_flight.entry(flight_key.clone()) {
                    Entry::Occupied(entry) => Some(entry.get().subscribe()),
                    Entry::Vacant(entry) => {
                        let (done_tx, _done_rx) = watch::channel(false);
                        entry.insert(done_tx);
                        None
                    }
                }
            };

            let Some(mut done) = waiter else {
                let _guard = FlightGuard {
                    dispatcher: self,
                    key: &flight_key,
                };
                // The previous owner may have installed the region while we
                // raced for the slot.
                if let Some(region) = self.inner.regions.get(table, key) {
                    return Ok(region);
                }
                return self.lookup_and_install(ctx, table, key).await;
            };

            tokio::select! {
                _ = done.changed() => {}
                _ = ctx.done() => return Err(Error::DeadlineExceeded),
            }
            if let Some(region) = self.inner.regions.get(table, key) {
                return Ok(region);
            }
        }
    }

    async fn lookup_and_install(
        &self,
        ctx: &Context,
        table: &[u8],
        key: &[u8],
    ) -> Result<Arc<RegionInfo>> {
        let (region, address) = self.lookup_region(ctx, table, key).await?;
        // Unavailable from the start, so the establisher below is the one to
        // re-enable it and senders park on the signal until it does.
        let first = region.mark_unavailable();
        if !self.is_sentinel(&region) {
            let (installed, removed) = self.inner.regions.put(region.clone());
            if !Arc::ptr_eq(&installed, &region) {
                // A concurrent caller beat us to it; ours is discarded.
                return Ok(installed);
            }
            for stale in removed {
                self.inner.clients.del(&stale);
                stale.retire();
            }
        }
        if first {
            self.spawn_establish(region.clone(), address);
        }
        Ok(region)
    }

    /// Locate the region owning (table, key): the Coordinator for the
    /// sentinels, the meta table otherwise. Transient failures are retried
    /// with backoff under `ctx`; `TableNotFound` and meta sanity violations
    /// come back immediately.
    async fn lookup_region(
        &self,
        ctx: &Context,
        table: &[u8],
        key: &[u8],
    ) -> Result<(Arc<RegionInfo>, Option<Address>)> {
        let mut backoff = BACKOFF_START;
        loop {
            let attempt = if self.inner.kind == ClientKind::Master {
                self.inner
                    .coordinator
                    .locate(ctx, Resource::Master)
                    .await
                    .map(|addr| (self.inner.admin_region.clone(), Some(addr)))
            } else if table == META_TABLE {
                self.inner
                    .coordinator
                    .locate(ctx, Resource::Meta)
                    .await
                    .map(|addr| (self.inner.meta_region.clone(), Some(addr)))
            } else {
                let lookup = self.meta_lookup(table, key);
                tokio::select! {
                    res = lookup => res,
                    _ = ctx.done() => return Err(Error::DeadlineExceeded),
                }
            };
            match attempt {
                Ok(found) => return Ok(found),
                Err(err @ Error::TableNotFound { .. }) => return Err(err),
                Err(err @ Error::CorruptMeta { .. }) => return Err(err),
                Err(err) => {
                    warn!(
                        "error looking up region for table={:?} key={:?}: {err}",
                        String::from_utf8_lossy(table),
                        String::from_utf8_lossy(key),
                    );
                }
            }
            backoff = sleep_and_grow(ctx, backoff).await?;
        }
    }

    /// One meta-table probe for the region owning (table, key). Runs under
    /// its own per-attempt deadline and is itself dispatched through `send`,
    /// so it routes to the meta sentinel region.
    ///
    /// Boxed: this is the knot in the `send → find_region → lookup_region →
    /// meta_lookup → send` recursion.
    fn meta_lookup<'a>(
        &'a self,
        table: &'a [u8],
        key: &'a [u8],
    ) -> BoxFuture<'a, Result<(Arc<RegionInfo>, Option<Address>)>> {
        Box::pin(async move {
            let (meta_ctx, _cancel) = Context::with_timeout(self.inner.config.lookup_timeout);
            let search_key = region_search_key(table, key);
            let get = self.inner.codec.new_get_before(meta_ctx, search_key);
            let response = self.send(get).await?;

            let Some(location) = self.inner.codec.parse_region_info(response)? else {
                return Err(Error::TableNotFound {
                    table: table.to_vec(),
                });
            };
            if location.table != table {
                return Err(Error::CorruptMeta {
                    message: format!(
                        "meta returned an entry for the wrong table: looked up \
                         table={:?} key={:?}, got table={:?}",
                        String::from_utf8_lossy(table),
                        String::from_utf8_lossy(key),
                        String::from_utf8_lossy(&location.table),
                    ),
                });
            }
            if !location.stop_key.is_empty() && key >= location.stop_key.as_slice() {
                return Err(Error::CorruptMeta {
                    message: format!(
                        "meta returned an entry not containing the key: looked up \
                         table={:?} key={:?}, got region [{:?}..{:?})",
                        String::from_utf8_lossy(table),
                        String::from_utf8_lossy(key),
                        location.start_key,
                        location.stop_key,
                    ),
                });
            }

            let address = location.address();
            let region = Arc::new(RegionInfo::new(
                location.name,
                location.table,
                location.start_key,
                location.stop_key,
            ));
            Ok((region, Some(address)))
        })
    }

    fn spawn_establish(&self, region: Arc<RegionInfo>, address: Option<Address>) {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.establish(region, address).await });
    }

    fn spawn_reestablish(&self, region: Arc<RegionInfo>) {
        self.spawn_establish(region, None);
    }

    /// The per-region establisher: resolve the region's current address (if
    /// not handed one), dial, bind the client, mark available. Exactly one of
    /// these runs per unavailable region; every exit path marks the region
    /// available so parked senders always wake.
    async fn establish(&self, mut region: Arc<RegionInfo>, mut address: Option<Address>) {
        let mut backoff = BACKOFF_START;
        loop {
            if address.is_none() {
                let original = region.clone();
                match self
                    .lookup_region(original.context(), original.table(), original.start_key())
                    .await
                {
                    Err(Error::TableNotFound { .. }) => {
                        self.inner.regions.del(&original);
                        self.inner.clients.del(&original);
                        original.mark_available();
                        info!("region {original} does not exist anymore");
                        return;
                    }
                    Err(Error::DeadlineExceeded) => {
                        original.mark_available();
                        info!("region {original} was retired while reconnecting");
                        return;
                    }
                    Err(err) => {
                        // lookup_region retries transient failures itself;
                        // landing here means a bug in the Store or in us.
                        error!("unexpected error looking up region {original}: {err}");
                        self.inner.regions.del(&original);
                        self.inner.clients.del(&original);
                        original.mark_available();
                        return;
                    }
                    Ok((found, found_address)) => {
                        if found.name() != original.name() {
                            // Merge or split: the mapping was replaced.
                            found.mark_unavailable();
                            let (installed, removed) = self.inner.regions.put(found.clone());
                            if !Arc::ptr_eq(&installed, &found) {
                                // Someone installed the replacement first.
                                original.mark_available();
                                return;
                            }
                            for stale in removed {
                                self.inner.clients.del(&stale);
                                if !Arc::ptr_eq(&stale, &original) {
                                    stale.retire();
                                }
                            }
                            info!("region {original} was replaced by {found}");
                            // Wake the original's parked senders so they
                            // retry against the new mapping; this task
                            // adopts the replacement.
                            original.mark_available();
                            region = found;
                        }
                        address = found_address;
                    }
                }
            }

            let Some(target) = address.clone() else {
                region.mark_available();
                return;
            };

            match self.connect_client(&region, &target).await {
                Ok(client) => {
                    let client = if self.inner.kind != ClientKind::Master {
                        let installed = self.inner.clients.put(client.clone(), &region);
                        if !Arc::ptr_eq(&installed, &client) {
                            // Lost a dial race; adopt the cached client.
                            client.close();
                        }
                        installed
                    } else {
                        client
                    };
                    // Bind before flipping available: a reader that observes
                    // available must find the client.
                    region.set_client(Some(client));
                    region.mark_available();
                    debug!("connected region {region} to {target}");
                    return;
                }
                Err(err) => {
                    if region.context().is_done() {
                        region.mark_available();
                        return;
                    }
                    warn!("error connecting region {region} to {target}: {err}");
                    // The address may be stale; force a fresh resolve.
                    address = None;
                    match sleep_and_grow(region.context(), backoff).await {
                        Ok(next) => backoff = next,
                        Err(_) => {
                            region.mark_available();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Get-or-dial the client for `address`, bounded by the lookup timeout
    /// and the region's lifetime.
    async fn connect_client(
        &self,
        region: &Arc<RegionInfo>,
        address: &Address,
    ) -> Result<Arc<dyn RegionClient>> {
        if self.inner.kind != ClientKind::Master {
            if let Some(existing) = self.inner.clients.get(address) {
                return Ok(existing);
            }
        }
        let connect = self.inner.connector.connect(
            address,
            self.inner.kind,
            self.inner.config.rpc_queue_size,
            self.inner.config.flush_interval,
        );
        tokio::select! {
            res = tokio::time::timeout(self.inner.config.lookup_timeout, connect) => {
                res.map_err(|_| Error::DeadlineExceeded)?
            }
            _ = region.context().done() => Err(Error::DeadlineExceeded),
        }
    }
}

/// Clears a single-flight slot and wakes its waiters, even if the owning
/// future is dropped mid-lookup.
struct FlightGuard<'a> {
    dispatcher: &'a Dispatcher,
    key: &'a FlightKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let removed = self
            .dispatcher
            .inner
            .in_flight
            .lock()
            .unwrap()
            .remove(self.key);
        if let Some(done) = removed {
            let _ = done.send(true);
        }
    }
}
