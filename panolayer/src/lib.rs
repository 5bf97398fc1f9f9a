//! PanoLayer - Tile streaming engine for panoramic imagery viewers
//!
//! This library keeps a constantly-moving camera supplied with correctly
//! prioritized image tiles without ever blocking the render loop: a
//! cooperative, frame-budgeted scheduler drains prioritized fetch jobs
//! under a deadline derived from recent frame cost, and an LRU cache
//! bounds total resident imagery.
//!
//! # High-Level API
//!
//! For most use cases, the [`engine`] module provides a simplified facade:
//!
//! ```ignore
//! use std::rc::Rc;
//! use panolayer::engine::{EngineConfig, TileEngine};
//! use panolayer::time::SystemClock;
//!
//! let mut engine = TileEngine::new(EngineConfig::default(), provider, SystemClock);
//!
//! // Each render frame: declare what the camera needs, then pump.
//! engine.apply_needed(&needed_tiles);
//! let summary = engine.tick(std::time::Instant::now());
//! ```

pub mod cache;
pub mod coord;
pub mod engine;
pub mod job;
pub mod logging;
pub mod provider;
pub mod sched;
pub mod tile;
pub mod time;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
