//! Observer surfaces for session snapshots and events.
//!
//! Provides:
//! - `SessionControl` - The operations observers may invoke on a manager
//! - Wire protocol (JSON, tagged by `type`)
//! - WebSocket and HTTP snapshot routes (feature: websocket)
//! - Status panel for ratatui applications (feature: tui)

pub mod control;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use control::SessionControl;
pub use protocol::{ClientMessage, ServerMessage, dispatch};
