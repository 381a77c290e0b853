//! Ereignis-Bus des Relays
//!
//! Duenner Wrapper um `tokio::sync::broadcast`. Senden ohne Abonnenten ist
//! kein Fehler; langsame Abonnenten verpassen aeltere Ereignisse.

use funkrelais_core::RelayEreignis;
use tokio::sync::broadcast;

/// Groesse des Ereignis-Puffers pro Abonnent
const EREIGNIS_KAPAZITAET: usize = 256;

/// Verteilt `RelayEreignis`se an beliebig viele Abonnenten
#[derive(Clone, Debug)]
pub struct EreignisBus {
    tx: broadcast::Sender<RelayEreignis>,
}

impl EreignisBus {
    pub fn neu() -> Self {
        let (tx, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        Self { tx }
    }

    /// Veroeffentlicht ein Ereignis
    pub fn senden(&self, ereignis: RelayEreignis) {
        tracing::trace!(?ereignis, "Relay-Ereignis");
        let _ = self.tx.send(ereignis);
    }

    /// Abonniert alle zukuenftigen Ereignisse
    pub fn abonnieren(&self) -> broadcast::Receiver<RelayEreignis> {
        self.tx.subscribe()
    }
}

impl Default for EreignisBus {
    fn default() -> Self {
        Self::neu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funkrelais_core::ConnectionId;

    #[test]
    fn senden_ohne_abonnenten_ist_ok() {
        let bus = EreignisBus::neu();
        bus.senden(RelayEreignis::ProtokollVerletzung {
            id: ConnectionId::new(),
            grund: "test".into(),
        });
    }

    #[tokio::test]
    async fn abonnent_empfaengt() {
        let bus = EreignisBus::neu();
        let mut rx = bus.abonnieren();
        let id = ConnectionId::new();
        bus.senden(RelayEreignis::VerbindungAufgebaut {
            id,
            peer: "127.0.0.1:1".parse().unwrap(),
        });
        let ereignis = rx.recv().await.unwrap();
        assert_eq!(ereignis.verbindung(), id);
    }
}
