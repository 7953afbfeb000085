//! Traffic statistics tally
//!
//! Counts every recorded packet into protocol, service, port-range and
//! source IP class buckets. Buckets are independent, so one packet may land
//! in several of them.

use serde::Serialize;

use crate::game::classifier::IpClass;
use crate::game::packet::{is_ephemeral, is_well_known, PacketDescriptor, Protocol};

/// Ports that count as web traffic
const HTTP_PORTS: [u16; 4] = [80, 443, 8080, 8443];
const SSH_PORT: u16 = 22;
const DNS_PORT: u16 = 53;

/// Monotonic counters, cleared only by [`StatsTally::reset`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsTally {
    pub total: u64,
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub http: u64,
    pub ssh: u64,
    pub dns: u64,
    pub ephemeral: u64,
    pub wellknown: u64,
    pub private: u64,
    pub loopback: u64,
    pub broadcast: u64,
}

impl StatsTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one packet. Never fails.
    pub fn record(&mut self, packet: &PacketDescriptor) {
        self.total += 1;

        match packet.protocol {
            Protocol::Tcp => self.tcp += 1,
            Protocol::Udp => self.udp += 1,
            Protocol::Icmp => self.icmp += 1,
            Protocol::Other(_) => {}
        }

        let src = packet.src_port;
        let dst = packet.dst_port;

        if either(src, dst, |p| HTTP_PORTS.contains(&p)) {
            self.http += 1;
        }
        if either(src, dst, |p| p == SSH_PORT) {
            self.ssh += 1;
        }
        if either(src, dst, |p| p == DNS_PORT) {
            self.dns += 1;
        }
        if is_client_server_pair(src, dst) || is_client_server_pair(dst, src) {
            self.ephemeral += 1;
        }
        if either(src, dst, is_well_known) {
            self.wellknown += 1;
        }

        match IpClass::of(packet.src_ip.as_deref()) {
            IpClass::Private => self.private += 1,
            IpClass::Loopback => self.loopback += 1,
            IpClass::Broadcast => self.broadcast += 1,
            IpClass::Global => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[inline]
fn either(src: Option<u16>, dst: Option<u16>, pred: impl Fn(u16) -> bool) -> bool {
    src.is_some_and(&pred) || dst.is_some_and(&pred)
}

/// `client` is ephemeral and `server` is a non-ephemeral, non-zero port
fn is_client_server_pair(client: Option<u16>, server: Option<u16>) -> bool {
    match (client, server) {
        (Some(c), Some(s)) => is_ephemeral(c) && s > 0 && !is_ephemeral(s),
        _ => false,
    }
}
