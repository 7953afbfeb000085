//! Port to service-name resolution
//!
//! Static tables keyed by port, built once into Fx hash maps. Ports in the
//! ephemeral range are named after the port on the other side of the
//! connection, since that is where the service lives.

use std::borrow::Cow;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::game::classifier::{IpClass, MotionPattern};
use crate::game::constants::ports;
use crate::game::packet::{PacketDescriptor, Protocol};

/// Named services without a dedicated motion pattern
const SERVICE_PORTS: &[(u16, &str)] = &[
    // Web
    (8080, "HTTP-ALT"),
    (8443, "HTTPS-ALT"),
    (3000, "DEV-SRV"),
    (4000, "DEV-APP"),
    (5000, "FLASK"),
    (8000, "HTTP-DEV"),
    (9000, "PHP-FPM"),
    // Databases
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (27017, "MongoDB"),
    (6379, "Redis"),
    (11211, "Memcached"),
    // Messaging
    (5672, "RabbitMQ"),
    (9092, "Kafka"),
    (1883, "MQTT"),
    (5222, "XMPP"),
    (6667, "IRC"),
    // Remote access and file sharing
    (23, "Telnet"),
    (3389, "RDP"),
    (5900, "VNC"),
    (445, "SMB"),
    (139, "NetBIOS"),
    (2049, "NFS"),
    // Mail
    (143, "IMAP"),
    (993, "IMAPS"),
    (587, "SMTP-SUB"),
    (465, "SMTPS"),
    // Network services
    (123, "NTP"),
    (161, "SNMP"),
    (162, "SNMP-TRAP"),
    (514, "Syslog"),
    // Containers
    (2375, "Docker"),
    (2376, "Docker-TLS"),
    (6443, "K8s-API"),
    (10250, "Kubelet"),
    (2379, "etcd"),
    // Gaming and streaming
    (25565, "Minecraft"),
    (27015, "Source"),
    (7777, "GameSrv"),
    (1935, "RTMP"),
    (8554, "RTSP"),
    // VPN and proxies
    (1194, "OpenVPN"),
    (1723, "PPTP"),
    (500, "IKE"),
    (4500, "IPSec"),
    (1080, "SOCKS"),
    (3128, "Squid"),
    (8888, "Proxy"),
];

/// Client-side names, keyed by the server port on the other end
const CLIENT_PORTS: &[(u16, &str)] = &[
    (80, "HTTP-Client"),
    (443, "HTTPS-Client"),
    (22, "SSH-Client"),
    (3306, "MySQL-Client"),
    (5432, "PgSQL-Client"),
    (6379, "Redis-Client"),
    (27017, "Mongo-Client"),
    (25, "SMTP-Client"),
    (110, "POP3-Client"),
    (143, "IMAP-Client"),
    (3389, "RDP-Client"),
    (5900, "VNC-Client"),
];

fn table(cell: &'static OnceLock<FxHashMap<u16, &'static str>>, rows: &'static [(u16, &'static str)]) -> &'static FxHashMap<u16, &'static str> {
    cell.get_or_init(|| rows.iter().copied().collect())
}

fn service_table() -> &'static FxHashMap<u16, &'static str> {
    static TABLE: OnceLock<FxHashMap<u16, &'static str>> = OnceLock::new();
    table(&TABLE, SERVICE_PORTS)
}

fn client_table() -> &'static FxHashMap<u16, &'static str> {
    static TABLE: OnceLock<FxHashMap<u16, &'static str>> = OnceLock::new();
    table(&TABLE, CLIENT_PORTS)
}

/// Service name for a well-known motion pattern
pub fn pattern_label(pattern: MotionPattern) -> Option<&'static str> {
    match pattern {
        MotionPattern::Straight => Some("HTTP"),
        MotionPattern::Zigzag => Some("HTTPS"),
        MotionPattern::Double => Some("FTP"),
        MotionPattern::Fast => Some("SSH"),
        MotionPattern::Chain => Some("SMTP"),
        MotionPattern::Seeking => Some("DNS"),
        MotionPattern::Pulling => Some("POP3"),
        MotionPattern::Spreading => Some("DHCP"),
        MotionPattern::Loopback => Some("LOOP"),
        MotionPattern::Broadcast => Some("BCAST"),
        MotionPattern::None => None,
    }
}

/// Named service on a specific port, if any
pub fn lookup(port: u16) -> Option<&'static str> {
    service_table().get(&port).copied()
}

/// Resolve the display label for a packet.
///
/// `port_pattern` is the pattern derived from the port alone, before any IP
/// class override, so that broadcast HTTP still reads as HTTP.
pub fn resolve(packet: &PacketDescriptor, port: u16, port_pattern: MotionPattern, ip_class: IpClass) -> Cow<'static, str> {
    if let Some(label) = pattern_label(port_pattern) {
        return Cow::Borrowed(label);
    }
    match ip_class {
        IpClass::Loopback => return Cow::Borrowed("LOOP"),
        IpClass::Broadcast => return Cow::Borrowed("BCAST"),
        IpClass::Global | IpClass::Private => {}
    }
    if let Some(label) = lookup(port) {
        return Cow::Borrowed(label);
    }
    Cow::Borrowed(match port {
        p if p >= ports::EPHEMERAL_START => match packet.other_port(p) {
            Some(other) => client_table().get(&other).copied().unwrap_or("Client"),
            None => "Ephemeral",
        },
        1024..=4999 => "App",
        5000..=9999 => "Service",
        10000..=29999 => "Custom",
        30000..=49151 => "Dynamic",
        _ => match &packet.protocol {
            Protocol::Icmp => "Ping",
            other => return Cow::Owned(other.name().to_string()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(src: Option<u16>, dst: Option<u16>) -> PacketDescriptor {
        PacketDescriptor::new(Protocol::Tcp, 200).with_ports(src, dst)
    }

    fn label(packet: &PacketDescriptor) -> String {
        let port = packet.effective_port();
        resolve(packet, port, MotionPattern::for_port(port), IpClass::Global).into_owned()
    }

    #[test]
    fn test_pattern_ports_use_pattern_label() {
        assert_eq!(label(&tcp(Some(51000), Some(80))), "HTTP");
        assert_eq!(label(&tcp(Some(51000), Some(443))), "HTTPS");
        assert_eq!(label(&tcp(None, Some(53))), "DNS");
        assert_eq!(label(&tcp(None, Some(20))), "FTP");
    }

    #[test]
    fn test_static_table() {
        assert_eq!(label(&tcp(Some(51000), Some(5432))), "PostgreSQL");
        assert_eq!(label(&tcp(Some(51000), Some(25565))), "Minecraft");
        assert_eq!(label(&tcp(None, Some(445))), "SMB");
    }

    #[test]
    fn test_ephemeral_uses_other_port() {
        // Server to client: destination is the ephemeral side
        assert_eq!(label(&tcp(Some(443), Some(51000))), "HTTPS-Client");
        assert_eq!(label(&tcp(Some(6379), Some(60000))), "Redis-Client");
        assert_eq!(label(&tcp(Some(1234), Some(60000))), "Client");
        assert_eq!(label(&tcp(None, Some(60000))), "Ephemeral");
    }

    #[test]
    fn test_range_tiers() {
        assert_eq!(label(&tcp(None, Some(1500))), "App");
        assert_eq!(label(&tcp(None, Some(6000))), "Service");
        assert_eq!(label(&tcp(None, Some(20000))), "Custom");
        assert_eq!(label(&tcp(None, Some(40000))), "Dynamic");
    }

    #[test]
    fn test_protocol_fallbacks() {
        let ping = PacketDescriptor::new(Protocol::Icmp, 64);
        assert_eq!(label(&ping), "Ping");
        assert_eq!(label(&tcp(None, Some(7))), "TCP");
        let gre = PacketDescriptor::new(Protocol::from_name("GRE"), 64);
        assert_eq!(label(&gre), "GRE");
        let unknown = PacketDescriptor::new(Protocol::from_name(""), 64);
        assert_eq!(label(&unknown), "Unknown");
    }

    #[test]
    fn test_ip_class_labels_without_port_pattern() {
        let packet = tcp(None, Some(1500));
        assert_eq!(resolve(&packet, 1500, MotionPattern::None, IpClass::Loopback), "LOOP");
        assert_eq!(resolve(&packet, 1500, MotionPattern::None, IpClass::Broadcast), "BCAST");
        // Port pattern label survives the IP override
        let http = tcp(None, Some(80));
        assert_eq!(resolve(&http, 80, MotionPattern::Straight, IpClass::Broadcast), "HTTP");
    }
}
