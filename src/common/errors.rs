// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::result;

use thiserror::Error;

/// An error originating from the RangeStore client or dependencies.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller's deadline expired, or a lifetime context was cancelled.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The target region is (temporarily) unavailable. This is a retry signal
    /// internal to the dispatcher; `send` never returns it to the caller.
    #[error("region unavailable")]
    RegionUnavailable,
    /// The table does not exist on this cluster.
    #[error("table {} not found", String::from_utf8_lossy(table))]
    TableNotFound { table: Vec<u8> },
    /// A region-level error the server asked us to retry: the region is
    /// opening, splitting, or no longer served by the replying server. The
    /// region client itself is fine.
    #[error("retryable region error: {message}")]
    Retryable { message: String },
    /// The region client is dead: connection broken, codec desync, or any
    /// other failure that invalidates every RPC in flight on that connection.
    #[error("unrecoverable region client error: {message}")]
    Unrecoverable { message: String },
    /// The meta table returned an entry that fails the sanity checks (wrong
    /// table, or a hole in the meta table). Indicates meta corruption or a
    /// bug in the Store; returned to the caller, never retried.
    #[error("corrupt meta entry: {message}")]
    CorruptMeta { message: String },
    /// Wraps a `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    StringError(String),
}

impl Error {
    /// True for server-side errors that invalidate only the region.
    pub fn is_region_retryable(&self) -> bool {
        matches!(self, Error::Retryable { .. })
    }

    /// True for errors that invalidate the whole region client.
    pub fn is_client_fatal(&self) -> bool {
        matches!(self, Error::Unrecoverable { .. })
    }
}

/// A result holding an [`Error`](enum@Error).
pub type Result<T> = result::Result<T, Error>;
