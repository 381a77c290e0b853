//! Verbindungs-Record – Eine akzeptierte Transport-Verbindung
//!
//! Die Lese-Seite gehoert dem `VerbindungsHandler`. Die Schreib-Seite gehoert
//! einem eigenen Schreib-Task pro Verbindung, der Auftraege aus einer
//! begrenzten Ausgangs-Queue abarbeitet. Jeder Auftrag wird vollstaendig
//! geschrieben, bevor der naechste beginnt; Broadcast und Frame-Sender
//! schreiben so ganze Payloads ohne Verschraenkung.
//!
//! Ein Schreibfehler oder ein abgelaufener `schreib_timeout` schliesst die
//! Verbindung. Schliessen ist idempotent und endgueltig: das Schliess-Signal
//! (ein `watch`-Kanal) weckt jeden Task, der auf dieser Verbindung
//! blockiert, und beendet den Schreib-Task, der dabei die Schreib-Seite
//! freigibt.

use bytes::Bytes;
use funkrelais_core::ConnectionId;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

/// Schreib-Seite einer Verbindung
pub type Schreiber = Box<dyn AsyncWrite + Send + Unpin>;

/// Standard-Frist fuer einen einzelnen Schreibauftrag
pub const DEFAULT_SCHREIB_TIMEOUT: Duration = Duration::from_secs(5);

/// Standard-Kapazitaet der Ausgangs-Queue (in Auftraegen)
pub const DEFAULT_AUSGANGS_KAPAZITAET: usize = 256;

/// Einstellungen fuer die Schreib-Seite einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AusgangsOptionen {
    /// Maximale Dauer eines Schreibauftrags
    pub schreib_timeout: Duration,
    /// Maximale Anzahl wartender Auftraege
    pub kapazitaet: usize,
}

impl Default for AusgangsOptionen {
    fn default() -> Self {
        Self {
            schreib_timeout: DEFAULT_SCHREIB_TIMEOUT,
            kapazitaet: DEFAULT_AUSGANGS_KAPAZITAET,
        }
    }
}

/// Ein Eintrag der Ausgangs-Queue
struct Auftrag {
    teile: Vec<Bytes>,
    /// Meldet das Ergebnis an einen wartenden Sender
    bestaetigung: Option<oneshot::Sender<io::Result<()>>>,
}

/// Eine lebende Verbindung mit ihrem Zustand
pub struct Verbindung {
    id: ConnectionId,
    peer_addr: SocketAddr,
    /// True solange eine mehrteilige Datei von diesem Peer empfangen wird
    empfaengt_datei: AtomicBool,
    ausgang: mpsc::Sender<Auftrag>,
    geschlossen_tx: watch::Sender<bool>,
}

impl Verbindung {
    /// Erstellt einen neuen Record mit Standard-Optionen
    ///
    /// Startet den Schreib-Task und muss daher innerhalb einer tokio-Runtime
    /// aufgerufen werden.
    pub fn neu<W>(peer_addr: SocketAddr, schreiber: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::mit_optionen(peer_addr, schreiber, AusgangsOptionen::default())
    }

    /// Erstellt einen neuen Record und startet seinen Schreib-Task
    pub fn mit_optionen<W>(
        peer_addr: SocketAddr,
        schreiber: W,
        optionen: AusgangsOptionen,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (geschlossen_tx, geschlossen_rx) = watch::channel(false);
        let (ausgang, eingang) = mpsc::channel(optionen.kapazitaet.max(1));
        let verbindung = Arc::new(Self {
            id: ConnectionId::new(),
            peer_addr,
            empfaengt_datei: AtomicBool::new(false),
            ausgang,
            geschlossen_tx,
        });

        tokio::spawn(schreiben_lassen(
            Arc::downgrade(&verbindung),
            Box::new(schreiber),
            eingang,
            geschlossen_rx,
            optionen.schreib_timeout,
        ));
        verbindung
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn empfaengt_datei(&self) -> bool {
        self.empfaengt_datei.load(Ordering::Acquire)
    }

    pub fn datei_empfang_setzen(&self, aktiv: bool) {
        self.empfaengt_datei.store(aktiv, Ordering::Release);
    }

    /// Reiht eine Payload ein, ohne auf den Peer zu warten
    ///
    /// # Fehler
    /// - `NotConnected` wenn die Verbindung geschlossen ist
    /// - `WouldBlock` wenn die Ausgangs-Queue voll ist
    pub fn einreihen(&self, daten: Bytes) -> io::Result<()> {
        if self.ist_geschlossen() {
            return Err(nicht_verbunden());
        }
        let auftrag = Auftrag {
            teile: vec![daten],
            bestaetigung: None,
        };
        match self.ausgang.try_send(auftrag) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Ausgangs-Queue voll",
            )),
            Err(TrySendError::Closed(_)) => Err(nicht_verbunden()),
        }
    }

    /// Schreibt mehrere Teile als eine zusammenhaengende Einheit
    ///
    /// Wartet, bis alle Teile geschrieben und geflusht sind.
    ///
    /// # Fehler
    /// - `NotConnected` wenn die Verbindung geschlossen ist oder wird
    /// - `TimedOut` wenn der Schreibvorgang `schreib_timeout` ueberschreitet
    /// - jeder IO-Fehler des Transports
    pub async fn senden_teile(&self, teile: Vec<Bytes>) -> io::Result<()> {
        if self.ist_geschlossen() {
            return Err(nicht_verbunden());
        }
        let (bestaetigung, ergebnis) = oneshot::channel();
        self.ausgang
            .send(Auftrag {
                teile,
                bestaetigung: Some(bestaetigung),
            })
            .await
            .map_err(|_| nicht_verbunden())?;
        // Ein verworfener Auftrag heisst: der Schreib-Task ist beendet
        ergebnis.await.unwrap_or_else(|_| Err(nicht_verbunden()))
    }

    /// Schliesst die Verbindung
    ///
    /// Gibt `true` zurueck, wenn dieser Aufruf die Verbindung geschlossen hat.
    pub fn schliessen(&self) -> bool {
        let geschlossen = self.geschlossen_tx.send_if_modified(|zustand| {
            if *zustand {
                false
            } else {
                *zustand = true;
                true
            }
        });
        if geschlossen {
            tracing::debug!(verbindung = %self.id, peer = %self.peer_addr, "Verbindung geschlossen");
        }
        geschlossen
    }

    pub fn ist_geschlossen(&self) -> bool {
        *self.geschlossen_tx.borrow()
    }

    /// Wartet bis die Verbindung geschlossen wird
    ///
    /// Kehrt sofort zurueck, wenn sie es bereits ist. Abbruchsicher und
    /// daher fuer `tokio::select!` geeignet.
    pub async fn geschlossen_abwarten(&self) {
        let mut rx = self.geschlossen_tx.subscribe();
        geschlossen(&mut rx).await;
    }
}

impl std::fmt::Debug for Verbindung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verbindung")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("empfaengt_datei", &self.empfaengt_datei())
            .field("geschlossen", &self.ist_geschlossen())
            .finish()
    }
}

fn nicht_verbunden() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Verbindung geschlossen")
}

async fn geschlossen(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|geschlossen| *geschlossen).await;
}

async fn teile_schreiben(schreiber: &mut Schreiber, teile: &[Bytes]) -> io::Result<()> {
    for teil in teile {
        schreiber.write_all(teil).await?;
    }
    schreiber.flush().await
}

// ---------------------------------------------------------------------------
// Schreib-Task
// ---------------------------------------------------------------------------

/// Arbeitet die Ausgangs-Queue einer Verbindung ab
///
/// Endet, wenn die Verbindung geschlossen oder der Record verworfen wird.
/// Ein fehlgeschlagener oder abgelaufener Auftrag schliesst die Verbindung.
async fn schreiben_lassen(
    verbindung: Weak<Verbindung>,
    mut schreiber: Schreiber,
    mut eingang: mpsc::Receiver<Auftrag>,
    mut geschlossen_rx: watch::Receiver<bool>,
    schreib_timeout: Duration,
) {
    loop {
        let auftrag = tokio::select! {
            _ = geschlossen(&mut geschlossen_rx) => break,
            auftrag = eingang.recv() => match auftrag {
                Some(auftrag) => auftrag,
                None => break,
            },
        };

        let ergebnis = tokio::select! {
            _ = geschlossen(&mut geschlossen_rx) => break,
            ergebnis = tokio::time::timeout(
                schreib_timeout,
                teile_schreiben(&mut schreiber, &auftrag.teile),
            ) => ergebnis.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "Schreib-Timeout"))
            }),
        };

        let fehlgeschlagen = match &ergebnis {
            Ok(()) => false,
            Err(e) => {
                if let Some(v) = verbindung.upgrade() {
                    tracing::warn!(
                        verbindung = %v.id(),
                        peer = %v.peer_addr(),
                        fehler = %e,
                        "Senden fehlgeschlagen – Verbindung wird geschlossen"
                    );
                    v.schliessen();
                }
                true
            }
        };
        if let Some(bestaetigung) = auftrag.bestaetigung {
            let _ = bestaetigung.send(ergebnis);
        }
        if fehlgeschlagen {
            break;
        }
    }
    // Schreib-Seite faellt hier; bei TCP geht damit das FIN raus
}

/// Schreiber mit festgelegtem Fehlverhalten fuer Tests
#[cfg(test)]
pub(crate) mod test_schreiber {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;

    /// Schreiber, dessen Writes immer mit `BrokenPipe` scheitern
    pub(crate) struct KaputterSchreiber;

    impl AsyncWrite for KaputterSchreiber {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "Peer weg")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Schreiber, der nie fertig wird (Peer liest nicht mehr)
    pub(crate) struct HaengenderSchreiber;

    impl AsyncWrite for HaengenderSchreiber {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }
}
