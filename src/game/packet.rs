//! Decoded packet descriptors, the engine's only input
//!
//! Every optional field carries explicit presence. Classification matches on
//! presence instead of treating zero or empty strings as "missing".

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::game::constants::ports;
use crate::util::vec2::Vec2;

/// Transport protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Anything else, keeping the name the feed reported
    Other(Arc<str>),
}

impl Protocol {
    /// Parse a feed protocol name (case-insensitive)
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            "ICMP" => Protocol::Icmp,
            _ => Protocol::Other(Arc::from(name.trim())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other(name) if name.is_empty() => "Unknown",
            Protocol::Other(name) => name,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TCP control flags as a compact bit set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);
    pub const URG: TcpFlags = TcpFlags(0x20);

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: TcpFlags) -> Self {
        TcpFlags(self.0 | other.0)
    }

    /// Parse a single flag token ("SYN", "ack", "F", ...)
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "FIN" | "F" => Some(Self::FIN),
            "SYN" | "S" => Some(Self::SYN),
            "RST" | "R" => Some(Self::RST),
            "PSH" | "P" => Some(Self::PSH),
            "ACK" | "A" => Some(Self::ACK),
            "URG" | "U" => Some(Self::URG),
            _ => None,
        }
    }

    /// Parse a flag list such as "SYN,ACK", "SYN ACK" or "SYN|ACK".
    /// Unknown tokens are ignored.
    pub fn parse(text: &str) -> Self {
        text.split(|c: char| c == ',' || c == '|' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .filter_map(Self::from_token)
            .fold(Self::empty(), Self::union)
    }

    /// Connection opening without acknowledgement (first handshake leg)
    #[inline]
    pub fn is_syn_only(self) -> bool {
        self.contains(Self::SYN) && !self.contains(Self::ACK)
    }
}

/// Identity of the capture source that observed a packet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceIdentity {
    pub id: Option<Arc<str>>,
    pub name: Option<Arc<str>>,
    /// Screen position hint resolved from the source registry
    pub spawn_hint: Option<Vec2>,
}

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const GRAY: Rgb = Rgb(0x808080);

    /// Parse "#RRGGBB" or "RRGGBB"
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Rgb)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

/// One decoded packet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketDescriptor {
    pub protocol: Protocol,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub size: u32,
    pub tcp_flags: Option<TcpFlags>,
    pub source: Option<SourceIdentity>,
    pub color: Option<Rgb>,
}

impl PacketDescriptor {
    /// Minimal descriptor, mostly useful for tests and synthetic traffic
    pub fn new(protocol: Protocol, size: u32) -> Self {
        Self {
            protocol,
            src_ip: None,
            dst_ip: None,
            src_port: None,
            dst_port: None,
            size,
            tcp_flags: None,
            source: None,
            color: None,
        }
    }

    pub fn with_ports(mut self, src_port: Option<u16>, dst_port: Option<u16>) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn with_src_ip(mut self, ip: impl Into<String>) -> Self {
        self.src_ip = Some(ip.into());
        self
    }

    pub fn with_flags(mut self, flags: TcpFlags) -> Self {
        self.tcp_flags = Some(flags);
        self
    }

    /// Destination port if present and non-zero, else source port, else 0
    pub fn effective_port(&self) -> u16 {
        self.dst_port
            .filter(|&p| p != 0)
            .or(self.src_port.filter(|&p| p != 0))
            .unwrap_or(0)
    }

    /// The port on the other side of the connection from `port`
    pub fn other_port(&self, port: u16) -> Option<u16> {
        let other = if self.src_port == Some(port) {
            self.dst_port
        } else {
            self.src_port
        };
        other.filter(|&p| p != 0)
    }

    pub fn source_name(&self) -> Option<&Arc<str>> {
        self.source.as_ref().and_then(|s| s.name.as_ref())
    }
}

/// True for ports clients pick for their side of a connection
#[inline]
pub fn is_ephemeral(port: u16) -> bool {
    port >= ports::EPHEMERAL_START
}

/// True for assigned service ports (1-1023)
#[inline]
pub fn is_well_known(port: u16) -> bool {
    port > 0 && port < ports::WELL_KNOWN_END
}
