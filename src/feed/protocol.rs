//! Wire records for the packet feed
//!
//! The feed is newline-delimited JSON. Each line is an object tagged by
//! `type`: either a raw `packet_batch` from a capture client or the hub's
//! `game_state` broadcast. Every packet field is optional; conversion into a
//! [`PacketDescriptor`] never fails.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::game::constants::size;
use crate::game::packet::{PacketDescriptor, Protocol, Rgb, SourceIdentity, TcpFlags};

/// Largest accepted feed line (bytes)
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Feed decoding errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Message has no type tag")]
    MissingType,
    #[error("Unsupported message type: {0}")]
    Unsupported(String),
    #[error("Line too large: {0} bytes (max {1})")]
    TooLarge(usize, usize),
}

/// One decoded feed message
#[derive(Debug, Clone)]
pub enum FeedMessage {
    PacketBatch(Vec<PacketRecord>),
    GameState {
        bullets: Vec<PacketRecord>,
        sources: Vec<CaptureSource>,
    },
}

impl FeedMessage {
    /// Packets carried by this message
    pub fn packets(&self) -> &[PacketRecord] {
        match self {
            FeedMessage::PacketBatch(packets) => packets,
            FeedMessage::GameState { bullets, .. } => bullets,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PacketBatchBody {
    #[serde(default)]
    packets: Vec<PacketRecord>,
}

#[derive(Debug, Deserialize)]
struct GameStateBody {
    #[serde(default)]
    bullets: Vec<PacketRecord>,
    #[serde(default)]
    capture_sources: HashMap<String, CaptureSourceRecord>,
}

/// TCP flags as either "SYN,ACK" or ["SYN", "ACK"]
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlagsField {
    Text(String),
    List(Vec<String>),
}

impl FlagsField {
    pub fn to_flags(&self) -> TcpFlags {
        match self {
            FlagsField::Text(text) => TcpFlags::parse(text),
            FlagsField::List(items) => items
                .iter()
                .filter_map(|t| TcpFlags::from_token(t))
                .fold(TcpFlags::empty(), TcpFlags::union),
        }
    }
}

/// Packet as it appears on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacketRecord {
    pub protocol: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<serde_json::Number>,
    #[serde(alias = "port")]
    pub dst_port: Option<serde_json::Number>,
    pub size: Option<serde_json::Number>,
    pub tcp_flags: Option<FlagsField>,
    #[serde(alias = "source")]
    pub source_id: Option<String>,
    #[serde(alias = "source_name")]
    pub src_name: Option<String>,
    pub color: Option<String>,
}

impl PacketRecord {
    pub fn to_descriptor(&self) -> PacketDescriptor {
        let protocol = self
            .protocol
            .as_deref()
            .map(Protocol::from_name)
            .unwrap_or_else(|| Protocol::from_name(""));

        let size = self
            .size
            .as_ref()
            .and_then(number_to_u64)
            .map(|s| s.min(u32::MAX as u64) as u32)
            .unwrap_or(size::DEFAULT_BYTES);

        let source = match (non_empty(&self.source_id), non_empty(&self.src_name)) {
            (None, None) => None,
            (id, name) => Some(SourceIdentity {
                id: id.map(Arc::from),
                name: name.map(Arc::from),
                spawn_hint: None,
            }),
        };

        PacketDescriptor {
            protocol,
            src_ip: non_empty(&self.src_ip).map(str::to_string),
            dst_ip: non_empty(&self.dst_ip).map(str::to_string),
            src_port: self.src_port.as_ref().and_then(number_to_port),
            dst_port: self.dst_port.as_ref().and_then(number_to_port),
            size,
            tcp_flags: self.tcp_flags.as_ref().map(FlagsField::to_flags),
            source,
            color: self.color.as_deref().and_then(Rgb::parse_hex),
        }
    }
}

/// Capture source entry of a `game_state` message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureSourceRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "ip_address")]
    pub ip: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, alias = "packet_rate")]
    pub packets_per_second: Option<f64>,
}

/// Normalised capture source
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSource {
    pub id: String,
    pub name: String,
    pub ip: Option<String>,
    pub active: bool,
    pub packets_per_second: f64,
}

impl CaptureSource {
    fn from_record(id: String, record: CaptureSourceRecord) -> Self {
        let name = record.name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.clone());
        let packets_per_second = record.packets_per_second.unwrap_or(0.0);
        Self {
            ip: record.ip.as_deref().and_then(expand_source_ip),
            active: record.active.unwrap_or(packets_per_second > 0.0),
            packets_per_second,
            name,
            id,
        }
    }

    /// Last octet of the source address, if known
    pub fn last_octet(&self) -> Option<u8> {
        self.ip.as_deref()?.rsplit('.').next()?.parse().ok()
    }
}

/// Decode one feed line. Blank lines decode to `None`.
pub fn decode_line(line: &str) -> Result<Option<FeedMessage>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(FeedError::TooLarge(line.len(), MAX_LINE_BYTES));
    }

    let value: serde_json::Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(FeedError::MissingType)?
        .to_string();

    match kind.as_str() {
        "packet_batch" | "packet_data" => {
            let body: PacketBatchBody = serde_json::from_value(value)?;
            Ok(Some(FeedMessage::PacketBatch(body.packets)))
        }
        "game_state" => {
            let body: GameStateBody = serde_json::from_value(value)?;
            let mut sources: Vec<CaptureSource> = body
                .capture_sources
                .into_iter()
                .map(|(id, record)| CaptureSource::from_record(id, record))
                .collect();
            sources.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(Some(FeedMessage::GameState {
                bullets: body.bullets,
                sources,
            }))
        }
        _ => Err(FeedError::Unsupported(kind)),
    }
}

/// "100" becomes "192.168.1.100"; full addresses pass through; "unknown" is dropped
fn expand_source_ip(ip: &str) -> Option<String> {
    let ip = ip.trim();
    if ip.is_empty() || ip.eq_ignore_ascii_case("unknown") {
        return None;
    }
    if ip.parse::<u8>().is_ok() {
        return Some(format!("192.168.1.{}", ip));
    }
    Some(ip.to_string())
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn number_to_u64(n: &serde_json::Number) -> Option<u64> {
    n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f as u64))
}

fn number_to_port(n: &serde_json::Number) -> Option<u16> {
    number_to_u64(n).and_then(|p| u16::try_from(p).ok())
}
