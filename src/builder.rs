use crate::Snowflake;
use crate::clock::{SystemClock, TimeSource};
use crate::error::{BoxDynError, Error};
use crate::snowflake::{EPOCH_MILLIS, MAX_WORKER_ID, SharedSnowflake};
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "ip-fallback")]
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A builder for building the ['Snowflake'] generator.
///
/// [`Snowflake`]: struct.Snowflake.html
pub struct Builder<'a, T = SystemClock> {
    worker_id: Option<&'a dyn Fn() -> Result<u16, BoxDynError>>,
    check_worker_id: Option<&'a dyn Fn(u16) -> bool>,
    time_source: T,
}

impl<'a> Default for Builder<'a> {
    fn default() -> Self {
        Builder::new()
    }
}

impl<'a> Builder<'a> {
    /// Construct a new builder for the build of ['Snowflake'].
    ///
    /// [`Snowflake`]: struct.Snowflake.html
    pub fn new() -> Self {
        Self {
            worker_id: None,
            check_worker_id: None,
            time_source: SystemClock,
        }
    }
}

impl<'a, T: TimeSource> Builder<'a, T> {
    /// Set the worker ID.
    /// If the provided closure returns an error, 'finalize' will fail.
    pub fn worker_id(mut self, worker_id: &'a dyn Fn() -> Result<u16, BoxDynError>) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    /// Set up a function to check the worker ID.
    /// If the function returns 'false', 'finalize' will fail.
    pub fn check_worker_id(mut self, check_worker_id: &'a dyn Fn(u16) -> bool) -> Self {
        self.check_worker_id = Some(check_worker_id);
        self
    }

    /// Replace the clock the generator reads.
    pub fn time_source<U: TimeSource>(self, time_source: U) -> Builder<'a, U> {
        Builder {
            worker_id: self.worker_id,
            check_worker_id: self.check_worker_id,
            time_source,
        }
    }

    /// Finish building and create a Snowflake instance.
    ///
    /// The worker ID must be within `[0, MAX_WORKER_ID]`; it is never clamped.
    /// This method will return an error if the worker ID provider fails, if
    /// validation fails, or if the clock reads earlier than the epoch.
    pub fn finalize(self) -> Result<Snowflake<T>, Error> {
        let worker_id = if let Some(worker_id_fn) = self.worker_id {
            worker_id_fn().map_err(Error::WorkerIdFailed)?
        } else {
            #[cfg(feature = "ip-fallback")]
            {
                worker_id_from_ip().ok_or(Error::NoPrivateIPv4)?
            }
            #[cfg(not(feature = "ip-fallback"))]
            {
                return Err(Error::WorkerIdFailed(
                    "Worker ID not provided and `ip-fallback` feature is disabled".into(),
                ));
            }
        };

        if worker_id > MAX_WORKER_ID {
            return Err(Error::WorkerIdOutOfRange {
                worker_id,
                max: MAX_WORKER_ID,
            });
        }

        if let Some(check_worker_id) = self.check_worker_id
            && !check_worker_id(worker_id)
        {
            return Err(Error::CheckWorkerIdFailed);
        }

        let now = self.time_source.current_millis();
        if now < EPOCH_MILLIS {
            return Err(Error::ClockBeforeEpoch(now));
        }

        debug!(worker_id, now, "snowflake generator created");
        let shared = Arc::new(SharedSnowflake::new(worker_id, self.time_source, now));
        Ok(Snowflake::new_inner(shared))
    }
}

/// Derive a worker ID from the private IP address (v4 or v6).
/// IPv4 uses the low 13 bits of the third and fourth octets, IPv6 the last segment.
#[cfg(feature = "ip-fallback")]
fn worker_id_from_ip() -> Option<u16> {
    if let Some(ipv4) = private_ipv4() {
        let octets = ipv4.octets();
        return Some(u16::from_be_bytes([octets[2], octets[3]]) & MAX_WORKER_ID);
    }

    private_ipv6().map(|ipv6| ipv6.segments()[7] & MAX_WORKER_ID)
}

#[cfg(feature = "ip-fallback")]
fn private_ipv4() -> Option<Ipv4Addr> {
    pnet_datalink::interfaces()
        .iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
        .flat_map(|iface| iface.ips.iter())
        .find_map(|network| match network.ip() {
            IpAddr::V4(ipv4) if ipv4.is_private() => Some(ipv4),
            _ => None,
        })
}

#[cfg(feature = "ip-fallback")]
fn private_ipv6() -> Option<Ipv6Addr> {
    pnet_datalink::interfaces()
        .iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
        .flat_map(|iface| iface.ips.iter())
        .find_map(|network| match network.ip() {
            IpAddr::V6(ipv6) if is_private_ipv6(&ipv6) => Some(ipv6),
            _ => None,
        })
}

#[cfg(feature = "ip-fallback")]
fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    // fc00::/7 (Unique Local Address)
    // fe80::/10 (Link-Local Address)
    (ip.segments()[0] & 0xfe00) == 0xfc00 || (ip.segments()[0] & 0xffc0) == 0xfe80
}
