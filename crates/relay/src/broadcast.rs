//! Broadcaster – Sendet Payloads an alle registrierten Verbindungen
//!
//! Fuer jeden Broadcast wird eine Momentaufnahme des Registers genommen und
//! die Payload in die Ausgangs-Queue jeder Verbindung ausser der
//! ausgeschlossenen eingereiht. Geschrieben wird von den Schreib-Tasks der
//! Verbindungen; ein langsamer Peer haelt so weder den Absender noch die
//! anderen Peers auf. Ist die Queue eines Peers voll oder die Verbindung
//! bereits geschlossen, wird nur diese Verbindung entfernt und geschlossen;
//! der Fehler wird nicht an den Aufrufer weitergereicht und nicht
//! wiederholt.
//!
//! ## Sende-Sperre
//! Alle Broadcasts eines Relays reihen unter einer gemeinsamen Sperre ein.
//! Damit ist die Reihenfolge in jeder Queue fuer alle Peers gleich. Eine
//! Datei-Uebertragung haelt die Sperre ueber [`Broadcaster::exklusiv`] vom
//! Header bis zum letzten Chunk, damit bei keinem Peer eine andere
//! Nachricht dazwischen landet.

use bytes::Bytes;
use funkrelais_core::ConnectionId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::registry::VerbindungsRegister;

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Fan-out an alle Verbindungen eines Registers
///
/// Clone teilt Register und Sende-Sperre.
#[derive(Clone)]
pub struct Broadcaster {
    register: VerbindungsRegister,
    sende_sperre: Arc<Mutex<()>>,
}

impl Broadcaster {
    /// Erstellt einen neuen Broadcaster ueber dem gegebenen Register
    pub fn neu(register: VerbindungsRegister) -> Self {
        Self {
            register,
            sende_sperre: Arc::new(Mutex::new(())),
        }
    }

    /// Sendet eine Payload an alle Verbindungen ausser `ausgeschlossen`
    ///
    /// Gibt die Anzahl der Verbindungen zurueck, bei denen die Payload
    /// eingereiht wurde. Wartet nur auf die Sende-Sperre, nie auf Peers.
    pub async fn an_alle_ausser_senden(
        &self,
        payload: &[u8],
        ausgeschlossen: Option<ConnectionId>,
    ) -> usize {
        let _sperre = self.sende_sperre.lock().await;
        self.verteilen(payload, ausgeschlossen)
    }

    /// Sendet eine Payload an alle Verbindungen
    pub async fn an_alle_senden(&self, payload: &[u8]) -> usize {
        self.an_alle_ausser_senden(payload, None).await
    }

    /// Reserviert das Relay fuer eine zusammenhaengende Folge von Broadcasts
    ///
    /// Andere Broadcasts warten, bis der zurueckgegebene Guard fallen gelassen
    /// wird.
    pub async fn exklusiv(&self) -> ExklusiverBroadcast {
        let sperre = Arc::clone(&self.sende_sperre).lock_owned().await;
        ExklusiverBroadcast {
            _sperre: sperre,
            broadcaster: self.clone(),
        }
    }

    fn verteilen(&self, payload: &[u8], ausgeschlossen: Option<ConnectionId>) -> usize {
        let payload = Bytes::copy_from_slice(payload);
        let mut ziele = 0;
        let mut erreicht = 0;

        for verbindung in self.register.snapshot() {
            if Some(verbindung.id()) == ausgeschlossen {
                continue;
            }
            ziele += 1;
            match verbindung.einreihen(payload.clone()) {
                Ok(()) => erreicht += 1,
                Err(e) => {
                    tracing::warn!(
                        verbindung = %verbindung.id(),
                        peer = %verbindung.peer_addr(),
                        fehler = %e,
                        "Broadcast nicht zustellbar – Verbindung wird entfernt"
                    );
                    self.register.trennen(&verbindung);
                }
            }
        }

        tracing::trace!(bytes = payload.len(), erreicht, ziele, "Broadcast verteilt");
        erreicht
    }
}

// ---------------------------------------------------------------------------
// ExklusiverBroadcast
// ---------------------------------------------------------------------------

/// Haelt die Sende-Sperre fuer eine zusammenhaengende Uebertragung
pub struct ExklusiverBroadcast {
    _sperre: OwnedMutexGuard<()>,
    broadcaster: Broadcaster,
}

impl ExklusiverBroadcast {
    /// Sendet eine Payload an alle Verbindungen ausser `ausgeschlossen`
    pub async fn an_alle_ausser_senden(
        &self,
        payload: &[u8],
        ausgeschlossen: Option<ConnectionId>,
    ) -> usize {
        self.broadcaster.verteilen(payload, ausgeschlossen)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
