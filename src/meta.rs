// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use derive_new::new;

use crate::common::Result;
use crate::context::Context;
use crate::rpc::Call;
use crate::rpc::Message;
use crate::store::Address;

/// Name of the meta table.
pub const META_TABLE: &[u8] = b"rangestore:meta";

/// The column family of the meta table holding region info and locations.
pub const INFO_FAMILY: &[u8] = b"info";

/// The meta row key probed to locate the region owning (table, key).
///
/// `':'` is the first byte greater than `'9'`, so a "greatest row <= key"
/// query lands right before it, on the entry with the greatest encoded
/// timestamp. The layout is part of the Store's wire contract.
pub fn region_search_key(table: &[u8], key: &[u8]) -> Vec<u8> {
    let mut search = Vec::with_capacity(table.len() + key.len() + 3);
    search.extend_from_slice(table);
    search.push(b',');
    search.extend_from_slice(key);
    search.push(b',');
    search.push(b':');
    search
}

/// One meta row, parsed: a region's identity plus its current server.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct RegionLocation {
    pub name: Vec<u8>,
    pub table: Vec<u8>,
    pub start_key: Vec<u8>,
    pub stop_key: Vec<u8>,
    pub host: String,
    pub port: u16,
}

impl RegionLocation {
    pub fn address(&self) -> Address {
        Address::new(self.host.clone(), self.port)
    }
}

/// Builds and parses meta-table RPCs; the wire codec lives behind this seam.
pub trait MetaCodec: Send + Sync + 'static {
    /// A "greatest row <= search_key" GET against the meta table, restricted
    /// to the [`INFO_FAMILY`] column family.
    fn new_get_before(&self, ctx: Context, search_key: Vec<u8>) -> Arc<dyn Call>;

    /// Parse the response cells into a region location. `None` means the
    /// response carried no cells: nothing at or before the search key.
    fn parse_region_info(&self, response: Message) -> Result<Option<RegionLocation>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_key_layout() {
        assert_eq!(region_search_key(b"users", b"alice"), b"users,alice,:");
        assert_eq!(region_search_key(b"t", b""), b"t,,:");
    }

    #[test]
    fn search_key_is_stable() {
        assert_eq!(
            region_search_key(b"users", b"alice"),
            region_search_key(b"users", b"alice"),
        );
    }

    #[test]
    fn search_key_orders_after_every_version_of_the_row() {
        // Meta rows end in an encoded timestamp digit; the probe key must
        // sort after all of them so "greatest row <= probe" finds the newest.
        let probe = region_search_key(b"users", b"alice");
        for digit in b'0'..=b'9' {
            let mut row = b"users,alice,".to_vec();
            row.push(digit);
            assert!(probe.as_slice() > row.as_slice());
        }
    }
}
