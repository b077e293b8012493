//! Listen port selection.
//!
//! When no port is configured the server probes the ephemeral range from a
//! random starting point and takes the first port that accepts a bind.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::error::{ProxyError, ProxyResult};

/// IANA dynamic/private port range.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Whether `port` can currently be bound on all interfaces.
pub fn is_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// First free port in `range`, scanning from a random offset and wrapping.
pub fn find_free_port(range: RangeInclusive<u16>) -> ProxyResult<u16> {
    let (start, end) = (*range.start(), *range.end());
    if start > end {
        return Err(ProxyError::NoFreePort { start, end });
    }

    let span = u32::from(end - start) + 1;
    let offset = fastrand::u32(0..span);

    (0..span)
        .map(|i| start + ((offset + i) % span) as u16)
        .find(|port| is_free(*port))
        .ok_or(ProxyError::NoFreePort { start, end })
}
