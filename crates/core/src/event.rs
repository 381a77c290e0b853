//! Relay-Ereignisse
//!
//! Typisierte Ereignisse, die das Relay ueber seinen Ereignis-Bus
//! veroeffentlicht. Ersetzt verstreute Callbacks durch einen einzigen
//! abonnierbaren Strom.

use crate::types::ConnectionId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Alle Ereignisse, die ueber den Relay-Ereignis-Bus fliessen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayEreignis {
    /// Eine Verbindung wurde akzeptiert und registriert
    VerbindungAufgebaut { id: ConnectionId, peer: SocketAddr },
    /// Eine Verbindung wurde entfernt und geschlossen
    VerbindungGetrennt { id: ConnectionId, peer: SocketAddr },
    /// Ein Client hat einen Datei-Header gesendet
    DateiAngekuendigt {
        id: ConnectionId,
        name: String,
        groesse: u64,
    },
    /// Alle angekuendigten Datei-Bytes wurden weitergeleitet
    DateiWeitergeleitet {
        id: ConnectionId,
        name: String,
        groesse: u64,
    },
    /// Die Datei endete vor der angekuendigten Groesse
    DateiUnvollstaendig {
        id: ConnectionId,
        name: String,
        erwartet: u64,
        erhalten: u64,
    },
    /// Ein Client hat gegen das Protokoll verstossen und wurde getrennt
    ProtokollVerletzung { id: ConnectionId, grund: String },
}

impl RelayEreignis {
    /// Gibt die betroffene Verbindung zurueck
    pub fn verbindung(&self) -> ConnectionId {
        match self {
            Self::VerbindungAufgebaut { id, .. }
            | Self::VerbindungGetrennt { id, .. }
            | Self::DateiAngekuendigt { id, .. }
            | Self::DateiWeitergeleitet { id, .. }
            | Self::DateiUnvollstaendig { id, .. }
            | Self::ProtokollVerletzung { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = RelayEreignis::DateiUnvollstaendig {
            id: ConnectionId::new(),
            name: "report.txt".into(),
            erwartet: 100,
            erhalten: 40,
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: RelayEreignis = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn verbindung_wird_geliefert() {
        let id = ConnectionId::new();
        let event = RelayEreignis::VerbindungAufgebaut {
            id,
            peer: "127.0.0.1:4000".parse().unwrap(),
        };
        assert_eq!(event.verbindung(), id);
    }
}
