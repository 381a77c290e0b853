//! funkrelais-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die vom
//! Protokoll-, Relay- und Client-Crate gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FunkError, Result};
pub use event::RelayEreignis;
pub use types::ConnectionId;
