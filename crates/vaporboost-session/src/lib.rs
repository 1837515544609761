//! Session orchestration and storage for concurrent account connections.
//!
//! Provides:
//! - `SessionManager` - Start, stop and observe account sessions
//! - `ReconnectPolicy` - Retry decisions from classified errors
//! - Storage implementations (memory, JSON files)
//! - Message log sinks

pub mod counters;
pub mod manager;
pub mod policy;
mod session;
pub mod sink;
pub mod storage;
pub mod timer;

#[cfg(test)]
mod testing;

pub use counters::RunCounters;
pub use manager::{ManagerError, SessionManager, StartReport};
pub use policy::{Decision, ReconnectPolicy};
pub use sink::{FileMessageLog, MemoryMessageLog};
pub use timer::OnlineTimer;
