// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error::Error as StdError;
use thiserror::Error;

/// Convenience type alias for usage within SnowFlake.
pub(crate) type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// The error type for this crate.
///
/// Only construction can fail. Once a [`SnowFlake`] exists, `next_id` always
/// produces an id.
///
/// [`SnowFlake`]: crate::SnowFlake
#[derive(Error, Debug)]
pub enum Error {
    #[error("worker_id {worker_id} is out of range [0, {max}]")]
    WorkerIdOutOfRange { worker_id: u16, max: u16 },
    #[error("worker_id returned an error: {0}")]
    WorkerIdFailed(#[source] BoxDynError),
    #[error("check_worker_id returned false")]
    CheckWorkerIdFailed,
    #[error("time source reports {0}ms, which is before the snowflake epoch")]
    ClockBeforeEpoch(i64),
    #[cfg(feature = "ip-fallback")]
    #[error("could not find any private ip address")]
    NoPrivateIPv4,
}
