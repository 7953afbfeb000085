pub mod admission;
pub mod classifier;
pub mod constants;
pub mod engine;
pub mod packet;
pub mod progress;
pub mod projectile;
pub mod services;
pub mod session;
pub mod spatial;
pub mod stats;
