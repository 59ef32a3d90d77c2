//! Fixed-point RF signal-analysis core.
//!
//! Built for on-device capture of sub-GHz OOK/FSK/ASK traffic: fixed-point
//! math and statistics, pulse/frame compression codecs, k-means clustering
//! over extracted features, physical-layer device fingerprinting,
//! protocol-structure inference, and a lightweight threat/vulnerability
//! model, all reachable through a single locked facade ([`context::CoreContext`]).
//!
//! No heap growth after each engine's construction, no panics on
//! malformed input, no floating point in the ingest hot path.
#![forbid(unsafe_code)]

pub mod cluster;
pub mod codec;
pub mod config;
pub mod context;
pub mod crc;
pub mod error;
pub mod fingerprint;
pub mod fixed;
pub mod protocol;
pub mod stats;
pub mod threat;
pub mod types;

pub use config::CoreConfig;
pub use context::CoreContext;
pub use error::{CoreError, CoreResult};
