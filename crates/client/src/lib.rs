//! funkrelais-client – Gegenstelle zum Relay-Server
//!
//! - [`RelayClient`] sendet Nachrichten und Dateien und liefert alles
//!   Empfangene als [`ClientEreignis`] ueber einen `mpsc`-Kanal
//! - [`FrameReceiver`] empfaengt die Frames eines Frame-Servers und haelt
//!   jeweils nur den neuesten

pub mod config;
pub mod connection;
pub mod empfang;
pub mod frames;

pub use config::ClientConfig;
pub use connection::RelayClient;
pub use empfang::ClientEreignis;
pub use frames::FrameReceiver;
