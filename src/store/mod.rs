// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

mod client;

pub use self::client::Address;
pub use self::client::ClientKind;
pub use self::client::RegionClient;
pub use self::client::RegionConnector;
