// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use crate::region::RegionInfo;
use crate::store::Address;
use crate::store::RegionClient;

/// The live region client per server, with a reverse index from each client
/// to the regions currently routed through it.
///
/// The reverse index holds weak region handles: being listed here never
/// extends a region's lifetime, it only lets a connection failure fan out to
/// every region that shared the connection.
pub(crate) struct ClientCache {
    clients: Mutex<HashMap<Address, ClientEntry>>,
}

struct ClientEntry {
    client: Arc<dyn RegionClient>,
    regions: HashMap<Vec<u8>, Weak<RegionInfo>>,
}

impl ClientCache {
    pub(crate) fn new() -> ClientCache {
        ClientCache {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The live client for `address`, if any.
    pub(crate) fn get(&self, address: &Address) -> Option<Arc<dyn RegionClient>> {
        let clients = self.clients.lock().unwrap();
        clients.get(address).map(|entry| entry.client.clone())
    }

    /// Install `client` for its address unless one is already live, and bind
    /// `region` to whichever client ends up installed. Returns the installed
    /// client; when it is not the one passed in, the caller should close the
    /// redundant connection.
    pub(crate) fn put(
        &self,
        client: Arc<dyn RegionClient>,
        region: &Arc<RegionInfo>,
    ) -> Arc<dyn RegionClient> {
        let mut clients = self.clients.lock().unwrap();
        let entry = clients
            .entry(client.address().clone())
            .or_insert_with(|| ClientEntry {
                client,
                regions: HashMap::new(),
            });
        entry
            .regions
            .insert(region.name().to_vec(), Arc::downgrade(region));
        entry.client.clone()
    }

    /// Declare `client` dead. Atomically removes it from the cache and
    /// returns every region bound to it, so the caller can re-route each.
    /// Only the caller that actually removed the entry gets `Some`; it owns
    /// closing the client. Later (or concurrent) callers get `None`.
    pub(crate) fn client_down(
        &self,
        client: &Arc<dyn RegionClient>,
    ) -> Option<Vec<Arc<RegionInfo>>> {
        let mut clients = self.clients.lock().unwrap();
        let current = clients.get(client.address())?;
        if !Arc::ptr_eq(&current.client, client) {
            // The cache already moved on to a replacement connection.
            return None;
        }
        let entry = clients.remove(client.address())?;
        Some(entry.regions.values().filter_map(Weak::upgrade).collect())
    }

    /// Drop `region` from the reverse index of its bound client. The client
    /// itself stays cached.
    pub(crate) fn del(&self, region: &RegionInfo) {
        let Some(client) = region.client() else {
            return;
        };
        let mut clients = self.clients.lock().unwrap();
        if let Some(entry) = clients.get_mut(client.address()) {
            entry.regions.remove(region.name());
        }
    }

    /// Remove and return every cached client. Used at shutdown.
    pub(crate) fn drain(&self) -> Vec<Arc<dyn RegionClient>> {
        let mut clients = self.clients.lock().unwrap();
        clients
            .drain()
            .map(|(_, entry)| entry.client)
            .collect()
    }
}
