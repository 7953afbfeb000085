//! Packet admission control
//!
//! Two independent stages bound the spawn rate: ingestion points happen at
//! most once per level-dependent interval, and each ingestion point admits at
//! most a level-dependent number of packets. Anything over the cap is dropped,
//! never carried over.

use tracing::debug;

use crate::game::constants::admission;
use crate::game::packet::PacketDescriptor;

/// Minimum time between ingestion points
#[inline]
pub fn ingest_interval_ms(level: u32) -> f64 {
    (admission::BASE_INTERVAL_MS - admission::INTERVAL_STEP_MS * level as f64).max(admission::MIN_INTERVAL_MS)
}

/// Packets admitted per ingestion point
#[inline]
pub fn packet_cap(level: u32) -> usize {
    let scaled = (level as f32 * admission::CAP_PER_LEVEL).floor() as u32;
    (admission::BASE_CAP + scaled).min(admission::MAX_CAP) as usize
}

/// Packets admitted at one ingestion point
#[derive(Debug, Default)]
pub struct Admitted {
    pub packets: Vec<PacketDescriptor>,
    pub dropped: usize,
}

/// Tracks the last ingestion point
#[derive(Debug, Default)]
pub struct AdmissionGate {
    last_ingest_ms: Option<f64>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the level's interval has elapsed since the last ingestion
    pub fn is_due(&self, now_ms: f64, level: u32) -> bool {
        match self.last_ingest_ms {
            None => true,
            Some(last) => now_ms - last >= ingest_interval_ms(level),
        }
    }

    /// Flatten buffered batches in arrival order and admit up to the cap.
    ///
    /// An ingestion point only consumes the interval when it actually had
    /// packets to look at.
    pub fn admit<I>(&mut self, now_ms: f64, level: u32, batches: I) -> Admitted
    where
        I: IntoIterator<Item = Vec<PacketDescriptor>>,
    {
        let cap = packet_cap(level);
        let mut admitted = Admitted::default();
        let mut seen = 0usize;

        for batch in batches {
            seen += batch.len();
            let room = cap - admitted.packets.len();
            if batch.len() <= room {
                admitted.packets.extend(batch);
            } else {
                admitted.packets.extend(batch.into_iter().take(room));
            }
        }

        if seen == 0 {
            return admitted;
        }

        admitted.dropped = seen - admitted.packets.len();
        self.last_ingest_ms = Some(now_ms);
        debug!(
            level,
            cap,
            admitted = admitted.packets.len(),
            dropped = admitted.dropped,
            "Ingestion point"
        );
        admitted
    }

    pub fn reset(&mut self) {
        self.last_ingest_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::packet::Protocol;

    fn batch(n: usize) -> Vec<PacketDescriptor> {
        (0..n)
            .map(|i| PacketDescriptor::new(Protocol::Tcp, 100).with_ports(None, Some(1000 + i as u16)))
            .collect()
    }

    #[test]
    fn test_interval_by_level() {
        assert_eq!(ingest_interval_ms(1), 900.0);
        assert_eq!(ingest_interval_ms(5), 500.0);
        assert_eq!(ingest_interval_ms(8), 200.0);
        assert_eq!(ingest_interval_ms(20), 200.0);
    }

    #[test]
    fn test_cap_by_level() {
        assert_eq!(packet_cap(1), 6);
        assert_eq!(packet_cap(2), 8);
        assert_eq!(packet_cap(3), 9);
        assert_eq!(packet_cap(10), 20);
        assert_eq!(packet_cap(50), 20);
    }

    #[test]
    fn test_batch_of_fifty_at_level_one() {
        let mut gate = AdmissionGate::new();
        let admitted = gate.admit(0.0, 1, vec![batch(50)]);
        assert_eq!(admitted.packets.len(), 6);
        assert_eq!(admitted.dropped, 44);
        // First packets win, in order
        assert_eq!(admitted.packets[0].dst_port, Some(1000));
        assert_eq!(admitted.packets[5].dst_port, Some(1005));
    }

    #[test]
    fn test_multiple_batches_flattened() {
        let mut gate = AdmissionGate::new();
        let admitted = gate.admit(0.0, 1, vec![batch(2), batch(3), batch(4)]);
        assert_eq!(admitted.packets.len(), 6);
        assert_eq!(admitted.dropped, 3);
        assert_eq!(admitted.packets[2].dst_port, Some(1000));
    }

    #[test]
    fn test_interval_gates_ingestion() {
        let mut gate = AdmissionGate::new();
        assert!(gate.is_due(0.0, 1));
        gate.admit(100.0, 1, vec![batch(1)]);
        assert!(!gate.is_due(500.0, 1));
        assert!(gate.is_due(1000.0, 1));
        // Higher level shortens the interval
        assert!(gate.is_due(400.0, 8));
    }

    #[test]
    fn test_empty_ingestion_keeps_gate_open() {
        let mut gate = AdmissionGate::new();
        let admitted = gate.admit(100.0, 1, Vec::<Vec<PacketDescriptor>>::new());
        assert!(admitted.packets.is_empty());
        assert_eq!(admitted.dropped, 0);
        assert!(gate.is_due(101.0, 1));

        gate.admit(200.0, 1, vec![Vec::new()]);
        assert!(gate.is_due(201.0, 1));
    }

    #[test]
    fn test_reset() {
        let mut gate = AdmissionGate::new();
        gate.admit(100.0, 1, vec![batch(1)]);
        gate.reset();
        assert!(gate.is_due(101.0, 1));
    }
}
