//! funkrelais-protocol – Wire-Formate des Relays
//!
//! Zwei voneinander unabhaengige Framing-Schemata teilen sich denselben
//! Byte-Strom. Welches verwendet wird, entscheidet der Aufrufer ueber den
//! konfigurierten Relay-Modus:
//!
//! - [`file`] – `FILE://<name>://<size>`-Header gefolgt von `size` Roh-Bytes
//! - [`frame`] – 8-stelliger dezimaler Laengen-Header gefolgt vom Blob
//!
//! Alles, was kein erkannter Header ist, wird als Control-Nachricht
//! unveraendert weitergereicht.

pub mod file;
pub mod frame;

pub use file::{decode_control_or_file_header, encode_file_header, FileHeader, Incoming};
pub use frame::{
    decode_frame_header, encode_frame_header, read_blob, write_blob, FrameBlobCodec, FRAME_HEADER_LEN,
    MAX_FRAME_LEN,
};

/// Standard-Groesse eines einzelnen Transport-Reads
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
