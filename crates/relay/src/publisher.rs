//! Frame-Publisher – Latest-wins Verteilung von Binaer-Frames
//!
//! Ein einzelner [`Publisher`] besitzt eine [`FrameQuelle`] (z. B. eine
//! Kamera) und ueberschreibt mit jedem erzeugten Frame den [`FrameSlot`],
//! unabhaengig davon, ob Clients verbunden sind. Pro Verbindung laeuft ein
//! [`frames_senden`]-Task, der den jeweils neuesten Frame mit dem
//! 8-stelligen Laengen-Header an seinen Client schreibt.
//!
//! Der Slot haelt einen unveraenderlichen `Bytes`-Handle; ein Update ist ein
//! atomarer Austausch dieses Handles. Leser sehen nie einen halb
//! geschriebenen Frame. Zwischenwerte koennen uebersprungen werden.

use bytes::Bytes;
use funkrelais_core::Result;
use funkrelais_protocol::encode_frame_header;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connection::Verbindung;
use crate::registry::VerbindungsRegister;

/// Pause nach einem Fehler der Quelle
const QUELLEN_FEHLER_PAUSE: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// FrameSlot
// ---------------------------------------------------------------------------

/// Ein-Platz-Register fuer den neuesten Frame
///
/// Clone teilt den Slot.
#[derive(Clone, Debug)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<Option<Bytes>>>,
}

impl FrameSlot {
    pub fn neu() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Ersetzt den aktuellen Frame, auch ohne Abonnenten
    pub fn veroeffentlichen(&self, frame: Bytes) {
        self.tx.send_replace(Some(frame));
    }

    /// Der zuletzt veroeffentlichte Frame
    pub fn aktuell(&self) -> Option<Bytes> {
        self.tx.borrow().clone()
    }

    pub fn abonnieren(&self) -> watch::Receiver<Option<Bytes>> {
        self.tx.subscribe()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// FrameQuelle
// ---------------------------------------------------------------------------

/// Erzeuger von Frames (Kamera, Encoder, Testbild)
pub trait FrameQuelle: Send + 'static {
    /// Erfasst den naechsten Frame
    ///
    /// `Ok(None)` bedeutet, dass die Quelle erschoepft ist.
    fn erfassen(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

/// Callback, der jeden veroeffentlichten Frame sieht (z. B. lokale Vorschau)
pub type FrameBeobachter = Arc<dyn Fn(&Bytes) + Send + Sync>;

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Schreibt jeden Frame einer Quelle in den Slot
pub struct Publisher<Q: FrameQuelle> {
    quelle: Q,
    slot: FrameSlot,
    beobachter: Option<FrameBeobachter>,
}

impl<Q: FrameQuelle> Publisher<Q> {
    pub fn neu(quelle: Q, slot: FrameSlot) -> Self {
        Self {
            quelle,
            slot,
            beobachter: None,
        }
    }

    /// Registriert einen Beobachter fuer jeden veroeffentlichten Frame
    pub fn mit_beobachter(mut self, beobachter: impl Fn(&Bytes) + Send + Sync + 'static) -> Self {
        self.beobachter = Some(Arc::new(beobachter));
        self
    }

    /// Startet den Publisher als eigenen Task
    pub fn starten(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(self.laufen(shutdown_rx))
    }

    /// Erfasst und veroeffentlicht Frames bis Shutdown oder Ende der Quelle
    ///
    /// Gibt die Anzahl der veroeffentlichten Frames zurueck.
    pub async fn laufen(mut self, mut shutdown_rx: watch::Receiver<bool>) -> u64 {
        let mut veroeffentlicht = 0u64;
        let mut fehler_pause = false;
        tracing::info!("Frame-Publisher gestartet");

        loop {
            tokio::select! {
                _ = shutdown_abwarten(&mut shutdown_rx) => {
                    tracing::info!("Frame-Publisher: Shutdown-Signal empfangen");
                    break;
                }
                ergebnis = self.quelle.erfassen() => match ergebnis {
                    Ok(Some(frame)) => {
                        if let Some(beobachter) = &self.beobachter {
                            beobachter(&frame);
                        }
                        self.slot.veroeffentlichen(frame);
                        veroeffentlicht += 1;
                    }
                    Ok(None) => {
                        tracing::info!("Frame-Quelle erschoepft");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Frame-Erfassung fehlgeschlagen");
                        fehler_pause = true;
                    }
                },
            }

            if std::mem::take(&mut fehler_pause) {
                tokio::time::sleep(QUELLEN_FEHLER_PAUSE).await;
            }
        }

        tracing::info!(veroeffentlicht, "Frame-Publisher gestoppt");
        veroeffentlicht
    }
}

/// Wartet bis das Shutdown-Signal gesetzt ist (auch wenn es das schon ist)
pub(crate) async fn shutdown_abwarten(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

// ---------------------------------------------------------------------------
// Sender pro Verbindung
// ---------------------------------------------------------------------------

/// Schreibt den jeweils neuesten Frame an eine Verbindung
///
/// Wartet auf Aenderungen des Slots; waehrend eines langsamen Writes
/// erschienene Frames werden zugunsten des neuesten uebersprungen. Endet,
/// wenn die Verbindung geschlossen wird oder ein Write fehlschlaegt; im
/// zweiten Fall wird die Verbindung aus dem Register entfernt.
///
/// Gibt die Anzahl der gesendeten Frames zurueck.
pub async fn frames_senden(
    verbindung: Arc<Verbindung>,
    mut slot_rx: watch::Receiver<Option<Bytes>>,
    register: VerbindungsRegister,
) -> u64 {
    let id = verbindung.id();
    let mut gesendet = 0u64;
    let mut naechster = slot_rx.borrow_and_update().clone();

    loop {
        if let Some(frame) = naechster.take() {
            match encode_frame_header(frame.len() as u64) {
                Ok(header) => {
                    // Endet auch beim Schliessen, dann mit `NotConnected`
                    let teile = vec![Bytes::copy_from_slice(&header), frame];
                    if let Err(e) = verbindung.senden_teile(teile).await {
                        if e.kind() != io::ErrorKind::NotConnected {
                            tracing::warn!(
                                verbindung = %id,
                                fehler = %e,
                                "Frame-Senden fehlgeschlagen"
                            );
                        }
                        register.trennen(&verbindung);
                        break;
                    }
                    gesendet += 1;
                }
                Err(e) => {
                    tracing::warn!(verbindung = %id, fehler = %e, "Frame verworfen");
                }
            }
        }

        tokio::select! {
            _ = verbindung.geschlossen_abwarten() => break,
            geaendert = slot_rx.changed() => {
                if geaendert.is_err() {
                    break;
                }
                naechster = slot_rx.borrow_and_update().clone();
            }
        }
    }

    tracing::debug!(verbindung = %id, gesendet, "Frame-Sender beendet");
    gesendet
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
