// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

//! In-process collaborators for tests: a scriptable cluster (coordinator,
//! meta table, region servers) behind the crate's dispatch seams.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::common::Error;
use crate::common::Result;
use crate::context::Context;
use crate::coordinator::Coordinator;
use crate::coordinator::Resource;
use crate::meta::MetaCodec;
use crate::meta::RegionLocation;
use crate::meta::META_TABLE;
use crate::rpc::Call;
use crate::rpc::CallResult;
use crate::rpc::Message;
use crate::rpc::QueuedCall;
use crate::store::Address;
use crate::store::ClientKind;
use crate::store::RegionClient;
use crate::store::RegionConnector;

/// A do-nothing client for tests that only need an address-bearing handle.
/// Queued calls are dropped, which reads as a dead connection.
pub(crate) struct NullClient {
    address: Address,
}

impl NullClient {
    pub(crate) fn new(host: &str, port: u16) -> NullClient {
        NullClient {
            address: Address::new(host.to_owned(), port),
        }
    }
}

impl RegionClient for NullClient {
    fn address(&self) -> &Address {
        &self.address
    }

    fn queue(&self, _rpc: QueuedCall) {}

    fn close(&self) {}
}

/// What a mock region server does with a queued data RPC. `None` parks the
/// call forever (the result channel is kept open but never completed).
pub(crate) type Responder = Arc<dyn Fn() -> Option<CallResult> + Send + Sync>;

/// A scriptable in-process cluster shared by every mock collaborator.
pub(crate) struct MockCluster {
    pub(crate) meta_addr: Address,
    pub(crate) master_addr: Address,
    meta: Mutex<BTreeMap<Vec<u8>, RegionLocation>>,
    responders: Mutex<HashMap<Address, Responder>>,
    connect_failures: Mutex<HashMap<Address, usize>>,
    locate_failures: AtomicUsize,
    parked: Mutex<Vec<oneshot::Sender<CallResult>>>,

    pub(crate) locate_calls: AtomicUsize,
    pub(crate) meta_gets: AtomicUsize,
    pub(crate) last_search_key: Mutex<Option<Vec<u8>>>,
    pub(crate) dials: Mutex<Vec<Address>>,
    pub(crate) queued: Mutex<HashMap<Address, usize>>,
    pub(crate) closed: Mutex<Vec<Address>>,
}

impl MockCluster {
    pub(crate) fn new() -> Arc<MockCluster> {
        Arc::new(MockCluster {
            meta_addr: Address::new("meta-rs".to_owned(), 16020),
            master_addr: Address::new("master".to_owned(), 16000),
            meta: Mutex::new(BTreeMap::new()),
            responders: Mutex::new(HashMap::new()),
            connect_failures: Mutex::new(HashMap::new()),
            locate_failures: AtomicUsize::new(0),
            parked: Mutex::new(Vec::new()),
            locate_calls: AtomicUsize::new(0),
            meta_gets: AtomicUsize::new(0),
            last_search_key: Mutex::new(None),
            dials: Mutex::new(Vec::new()),
            queued: Mutex::new(HashMap::new()),
            closed: Mutex::new(Vec::new()),
        })
    }

    /// Record a region in the meta table, replacing any entry with the same
    /// (table, start key) row.
    pub(crate) fn put_meta(&self, location: RegionLocation) {
        let row = meta_row_key(&location.table, &location.start_key);
        self.meta.lock().unwrap().insert(row, location);
    }

    pub(crate) fn remove_meta(&self, table: &[u8], start_key: &[u8]) {
        self.meta
            .lock()
            .unwrap()
            .remove(&meta_row_key(table, start_key));
    }

    pub(crate) fn clear_meta(&self) {
        self.meta.lock().unwrap().clear();
    }

    /// Script the data-RPC behavior of the server at `address`.
    pub(crate) fn set_responder(&self, address: &Address, responder: Responder) {
        self.responders
            .lock()
            .unwrap()
            .insert(address.clone(), responder);
    }

    /// A responder failing the next `n` RPCs with `make_error`, then Ok.
    pub(crate) fn failing_responder(
        n: usize,
        make_error: impl Fn() -> Error + Send + Sync + 'static,
    ) -> Responder {
        let remaining = AtomicUsize::new(n);
        Arc::new(move || {
            if remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                .is_ok()
            {
                Some(Err(make_error()))
            } else {
                Some(Ok(Box::new(()) as Message))
            }
        })
    }

    /// Refuse the next `n` dials of `address`.
    pub(crate) fn fail_connects(&self, address: &Address, n: usize) {
        self.connect_failures
            .lock()
            .unwrap()
            .insert(address.clone(), n);
    }

    /// Fail the next `n` coordinator lookups.
    pub(crate) fn fail_locates(&self, n: usize) {
        self.locate_failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn dial_count(&self, address: &Address) -> usize {
        self.dials
            .lock()
            .unwrap()
            .iter()
            .filter(|dialed| *dialed == address)
            .count()
    }

    pub(crate) fn queued_count(&self, address: &Address) -> usize {
        self.queued
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn parked_count(&self) -> usize {
        self.parked.lock().unwrap().len()
    }

    pub(crate) fn close_count(&self, address: &Address) -> usize {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .filter(|closed| *closed == address)
            .count()
    }

    fn answer_meta_get(&self, search_key: &[u8]) -> Option<RegionLocation> {
        self.meta_gets.fetch_add(1, Ordering::SeqCst);
        *self.last_search_key.lock().unwrap() = Some(search_key.to_vec());
        let meta = self.meta.lock().unwrap();
        meta.range(..=search_key.to_vec())
            .next_back()
            .map(|(_, location)| location.clone())
    }
}

fn meta_row_key(table: &[u8], start_key: &[u8]) -> Vec<u8> {
    let mut row = Vec::with_capacity(table.len() + start_key.len() + 3);
    row.extend_from_slice(table);
    row.push(b',');
    row.extend_from_slice(start_key);
    row.push(b',');
    row.push(b'1');
    row
}

pub(crate) struct MockCoordinator {
    pub(crate) cluster: Arc<MockCluster>,
}

#[async_trait]
impl Coordinator for MockCoordinator {
    async fn locate(&self, resource: Resource) -> Result<Address> {
        self.cluster.locate_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .cluster
            .locate_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok()
        {
            return Err(Error::StringError("coordinator unavailable".to_owned()));
        }
        Ok(match resource {
            Resource::Meta => self.cluster.meta_addr.clone(),
            Resource::Master => self.cluster.master_addr.clone(),
        })
    }
}

/// The payload a mock meta GET resolves to.
pub(crate) struct MetaResponse(pub(crate) Option<RegionLocation>);

struct MetaCall {
    ctx: Context,
    search_key: Vec<u8>,
}

impl Call for MetaCall {
    fn table(&self) -> &[u8] {
        META_TABLE
    }

    fn key(&self) -> &[u8] {
        &self.search_key
    }

    fn context(&self) -> &Context {
        &self.ctx
    }
}

pub(crate) struct MockCodec;

impl MetaCodec for MockCodec {
    fn new_get_before(&self, ctx: Context, search_key: Vec<u8>) -> Arc<dyn Call> {
        Arc::new(MetaCall { ctx, search_key })
    }

    fn parse_region_info(&self, response: Message) -> Result<Option<RegionLocation>> {
        let response = response
            .downcast::<MetaResponse>()
            .map_err(|_| Error::StringError("unexpected meta response payload".to_owned()))?;
        Ok(response.0)
    }
}

pub(crate) struct MockRegionClient {
    address: Address,
    cluster: Arc<MockCluster>,
}

impl RegionClient for MockRegionClient {
    fn address(&self) -> &Address {
        &self.address
    }

    fn queue(&self, rpc: QueuedCall) {
        if rpc.call.table() == META_TABLE {
            let answer = self.cluster.answer_meta_get(rpc.call.key());
            let _ = rpc.result.send(Ok(Box::new(MetaResponse(answer)) as Message));
            return;
        }

        *self
            .cluster
            .queued
            .lock()
            .unwrap()
            .entry(self.address.clone())
            .or_insert(0) += 1;

        let responder = self.cluster.responders.lock().unwrap().get(&self.address).cloned();
        match responder {
            Some(responder) => match responder() {
                Some(result) => {
                    let _ = rpc.result.send(result);
                }
                None => {
                    // Park the call: keep the sender open so the dispatcher
                    // keeps waiting until its deadline.
                    self.cluster.parked.lock().unwrap().push(rpc.result);
                }
            },
            None => {
                let _ = rpc.result.send(Ok(Box::new(()) as Message));
            }
        }
    }

    fn close(&self) {
        self.cluster.closed.lock().unwrap().push(self.address.clone());
    }
}

pub(crate) struct MockConnector {
    pub(crate) cluster: Arc<MockCluster>,
}

#[async_trait]
impl RegionConnector for MockConnector {
    async fn connect(
        &self,
        address: &Address,
        _kind: ClientKind,
        _queue_size: usize,
        _flush_interval: Duration,
    ) -> Result<Arc<dyn RegionClient>> {
        {
            let mut failures = self.cluster.connect_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(address) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    )));
                }
            }
        }
        self.cluster.dials.lock().unwrap().push(address.clone());
        Ok(Arc::new(MockRegionClient {
            address: address.clone(),
            cluster: self.cluster.clone(),
        }))
    }
}

/// A plain data RPC for driving the dispatcher in tests.
pub(crate) struct TestCall {
    table: Vec<u8>,
    key: Vec<u8>,
    ctx: Context,
}

impl TestCall {
    pub(crate) fn new(table: &[u8], key: &[u8]) -> Arc<TestCall> {
        TestCall::with_context(table, key, Context::background())
    }

    pub(crate) fn with_context(table: &[u8], key: &[u8], ctx: Context) -> Arc<TestCall> {
        Arc::new(TestCall {
            table: table.to_vec(),
            key: key.to_vec(),
            ctx,
        })
    }
}

impl Call for TestCall {
    fn table(&self) -> &[u8] {
        &self.table
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn context(&self) -> &Context {
        &self.ctx
    }
}
