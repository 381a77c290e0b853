//! funkrelais-relay – TCP-Relay mit Broadcast und Frame-Publisher
//!
//! Dieser Crate implementiert den Kern des Relays: ein Server nimmt
//! beliebig viele TCP-Clients an und verteilt, was einer sendet, an alle
//! anderen. Datei-Uebertragungen werden gestreamt weitergeleitet, Frames
//! nach dem Latest-wins-Prinzip verteilt.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! VerbindungsHandler (pro Verbindung ein Task)
//!     |  State Machine: WartetAufNachricht -> EmpfaengtDatei -> WartetAufNachricht
//!     |
//!     v
//! Broadcaster ---> VerbindungsRegister (Momentaufnahme)
//!     |  reiht pro Peer in die Ausgangs-Queue ein
//!     v
//! Schreib-Task (pro Verbindung) ---> Socket
//!
//! Publisher (ein Task) ---> FrameSlot ---> frames_senden (pro Verbindung)
//! EreignisBus – Ereignisse fuer Beobachter
//! ```

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod handler;
pub mod publisher;
pub mod registry;
pub mod state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::Broadcaster;
pub use connection::{AusgangsOptionen, Verbindung};
pub use events::EreignisBus;
pub use handler::{HandlerZustand, VerbindungsHandler};
pub use publisher::{frames_senden, FrameQuelle, FrameSlot, Publisher};
pub use registry::VerbindungsRegister;
pub use state::{RelayConfig, RelayModus, RelayState};
pub use tcp::{RelayServer, ServerHandle};
