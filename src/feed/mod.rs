//! Packet feed: wire decoding, the batch inbox and capture sources

pub mod inbox;
pub mod protocol;
pub mod sources;
