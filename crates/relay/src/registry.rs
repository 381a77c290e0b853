//! Verbindungs-Register – Alle lebenden Verbindungen eines Servers
//!
//! Eine Verbindung steht genau dann im Register, wenn ihr Transport offen
//! ist und das System sie noch nicht geschlossen hat. Zugriffe sind ueber
//! einen `RwLock` serialisiert; `snapshot` liefert eine Kopie, ueber die
//! ohne Lock iteriert werden kann.

use funkrelais_core::ConnectionId;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::connection::Verbindung;

/// Thread-sichere Sammlung aller registrierten Verbindungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct VerbindungsRegister {
    inner: Arc<RwLock<Vec<Arc<Verbindung>>>>,
}

impl VerbindungsRegister {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt eine neu akzeptierte Verbindung hinzu
    pub fn registrieren(&self, verbindung: Arc<Verbindung>) {
        tracing::debug!(
            verbindung = %verbindung.id(),
            peer = %verbindung.peer_addr(),
            "Verbindung registriert"
        );
        self.inner.write().push(verbindung);
    }

    /// Entfernt eine Verbindung
    ///
    /// Idempotent: eine bereits entfernte Verbindung ist kein Fehler.
    pub fn entfernen(&self, id: &ConnectionId) -> Option<Arc<Verbindung>> {
        let mut verbindungen = self.inner.write();
        let index = verbindungen.iter().position(|v| v.id() == *id)?;
        let entfernt = verbindungen.remove(index);
        tracing::debug!(verbindung = %id, "Verbindung aus Register entfernt");
        Some(entfernt)
    }

    /// Entfernt und schliesst eine Verbindung
    pub fn trennen(&self, verbindung: &Verbindung) {
        self.entfernen(&verbindung.id());
        verbindung.schliessen();
    }

    /// Momentaufnahme aller Verbindungen in Registrierungsreihenfolge
    pub fn snapshot(&self) -> Vec<Arc<Verbindung>> {
        self.inner.read().clone()
    }

    /// Entfernt und schliesst alle Verbindungen
    ///
    /// Gibt die Anzahl der geschlossenen Verbindungen zurueck.
    pub fn alle_schliessen(&self) -> usize {
        let verbindungen = std::mem::take(&mut *self.inner.write());
        for verbindung in &verbindungen {
            verbindung.schliessen();
        }
        verbindungen.len()
    }

    pub fn anzahl(&self) -> usize {
        self.inner.read().len()
    }

    pub fn ist_leer(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn enthaelt(&self, id: &ConnectionId) -> bool {
        self.inner.read().iter().any(|v| v.id() == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbindung(port: u16) -> Arc<Verbindung> {
        let (lokal, _peer) = tokio::io::duplex(8);
        Verbindung::neu(format!("127.0.0.1:{port}").parse().unwrap(), lokal)
    }

    #[tokio::test]
    async fn registrieren_und_snapshot_in_reihenfolge() {
        let register = VerbindungsRegister::neu();
        let a = verbindung(1);
        let b = verbindung(2);
        let c = verbindung(3);
        register.registrieren(Arc::clone(&a));
        register.registrieren(Arc::clone(&b));
        register.registrieren(Arc::clone(&c));

        let ids: Vec<_> = register.snapshot().iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
        assert_eq!(register.anzahl(), 3);
    }

    #[tokio::test]
    async fn entfernen_ist_idempotent() {
        let register = VerbindungsRegister::neu();
        let a = verbindung(1);
        register.registrieren(Arc::clone(&a));

        assert!(register.entfernen(&a.id()).is_some());
        assert!(register.entfernen(&a.id()).is_none());
        assert!(register.ist_leer());
        assert!(!register.enthaelt(&a.id()));
    }

    #[tokio::test]
    async fn snapshot_ist_unabhaengige_kopie() {
        let register = VerbindungsRegister::neu();
        let a = verbindung(1);
        register.registrieren(Arc::clone(&a));

        let snapshot = register.snapshot();
        register.entfernen(&a.id());
        register.registrieren(verbindung(2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
    }

    #[tokio::test]
    async fn trennen_schliesst() {
        let register = VerbindungsRegister::neu();
        let a = verbindung(1);
        register.registrieren(Arc::clone(&a));

        register.trennen(&a);
        assert!(a.ist_geschlossen());
        assert!(register.ist_leer());
    }

    #[tokio::test]
    async fn alle_schliessen_leert_register() {
        let register = VerbindungsRegister::neu();
        let verbindungen: Vec<_> = (0..4).map(verbindung).collect();
        for v in &verbindungen {
            register.registrieren(Arc::clone(v));
        }

        assert_eq!(register.alle_schliessen(), 4);
        assert!(register.ist_leer());
        assert!(verbindungen.iter().all(|v| v.ist_geschlossen()));
    }

    #[tokio::test]
    async fn paralleles_registrieren_und_entfernen() {
        let register = VerbindungsRegister::neu();
        let mut tasks = Vec::new();
        for port in 0..32u16 {
            let register = register.clone();
            tasks.push(tokio::spawn(async move {
                let v = verbindung(port);
                register.registrieren(Arc::clone(&v));
                let _ = register.snapshot();
                if port % 2 == 0 {
                    register.entfernen(&v.id());
                }
                v
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(register.anzahl(), 16);
    }
}
