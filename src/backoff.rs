// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::time::Duration;

use crate::common::Error;
use crate::common::Result;
use crate::context::Context;

/// First sleep of a retry loop.
pub(crate) const BACKOFF_START: Duration = Duration::from_millis(16);

/// Below this the backoff doubles; at or above it, it grows linearly. Fast
/// reconnection on transient blips, linear pressure thereafter so a long
/// outage does not synchronize every retrying task.
const BACKOFF_DOUBLE_BELOW: Duration = Duration::from_secs(5);
const BACKOFF_LINEAR_STEP: Duration = Duration::from_secs(5);

/// Sleeps for `backoff`, racing `ctx`, and returns the next backoff.
pub(crate) async fn sleep_and_grow(ctx: &Context, backoff: Duration) -> Result<Duration> {
    tokio::select! {
        _ = tokio::time::sleep(backoff) => {}
        _ = ctx.done() => return Err(Error::DeadlineExceeded),
    }
    if backoff < BACKOFF_DOUBLE_BELOW {
        Ok(backoff * 2)
    } else {
        Ok(backoff + BACKOFF_LINEAR_STEP)
    }
}
