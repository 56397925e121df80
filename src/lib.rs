// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

//! The region-dispatch core of the Rust client for
//! [RangeStore](https://github.com/rangestore/rangestore), a distributed,
//! range-partitioned, wide-column store.
//!
//! RangeStore serves each table as an ordered sequence of disjoint key ranges
//! called *regions*; every region is owned by exactly one region server at a
//! time, and a catalog table (the *meta table*) records the current
//! region-to-server mapping. This crate solves the client half of that
//! arrangement: given an RPC targeting a (table, row key), deliver it to the
//! server currently owning that key, while caching region locations and
//! per-server connections and riding out region moves, server crashes, and
//! concurrent callers — all under the caller's deadline.
//!
//! The entry point is [`Dispatcher`]: construct one per cluster with your
//! [`Coordinator`], [`MetaCodec`], and [`RegionConnector`] implementations,
//! then call [`Dispatcher::send`] with anything implementing [`Call`].
//! `send` loops until it has a terminal outcome: the server's response,
//! [`Error::DeadlineExceeded`], [`Error::TableNotFound`], or an unclassified
//! server error. Everything transient — a region mid-split, a dead
//! connection, a stale location — is handled inside the loop: the affected
//! region flips *unavailable*, exactly one background task reestablishes it,
//! and every sender parked on its availability signal retries once the new
//! mapping is in place.
//!
//! What stays out of scope here, behind the collaborator traits: the on-wire
//! codec, request construction, connection-level framing and auth, and the
//! Coordinator protocol itself. Higher-level typed APIs are built on top of
//! `send`.
//!
//! Since this crate provides an async API, you need an async runtime
//! (Tokio-only).

mod backoff;
mod client_cache;
mod common;
mod config;
mod context;
mod coordinator;
mod dispatch;
mod meta;
#[cfg(test)]
mod mock;
mod region;
mod region_cache;
mod rpc;
mod store;

#[doc(inline)]
pub use common::Error;
#[doc(inline)]
pub use common::Result;
#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use context::CancelHandle;
#[doc(inline)]
pub use context::Context;
#[doc(inline)]
pub use coordinator::Coordinator;
#[doc(inline)]
pub use coordinator::Resource;
#[doc(inline)]
pub use dispatch::Dispatcher;
#[doc(inline)]
pub use meta::region_search_key;
#[doc(inline)]
pub use meta::MetaCodec;
#[doc(inline)]
pub use meta::RegionLocation;
#[doc(inline)]
pub use meta::INFO_FAMILY;
#[doc(inline)]
pub use meta::META_TABLE;
#[doc(inline)]
pub use region::RegionInfo;
#[doc(inline)]
pub use rpc::Call;
#[doc(inline)]
pub use rpc::CallResult;
#[doc(inline)]
pub use rpc::Message;
#[doc(inline)]
pub use rpc::QueuedCall;
#[doc(inline)]
pub use store::Address;
#[doc(inline)]
pub use store::ClientKind;
#[doc(inline)]
pub use store::RegionClient;
#[doc(inline)]
pub use store::RegionConnector;
