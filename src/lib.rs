//! Packet Dodge Engine Library
//!
//! Turns a live stream of network packet descriptors into bullet-hell
//! projectiles. Packets are classified into motion patterns, advanced frame by
//! frame, and queried for collisions and grazes against a player avatar.
//!
//! # Layout
//!
//! - `game` - classification, motion engine, spatial queries, scoring and the session
//! - `feed` - JSON-lines wire format, batch inbox, capture source registry
//! - `metrics` - Prometheus endpoint for the headless driver

pub mod config;
pub mod feed;
pub mod game;
pub mod metrics;
pub mod util;
