//! Wiring shared by the demo binaries.
//!
//! - `config` - Locate and load the JSON configuration
//! - `offline` - Stand-in connection client
//! - `telemetry` - Tracing subscriber setup

pub mod config;
pub mod offline;
pub mod telemetry;

pub use config::{load, open_store};
pub use offline::{OfflineClient, OfflineFactory};
pub use telemetry::init_tracing;
