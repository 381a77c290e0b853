//! Verbindungs-Handler – Empfangsschleife einer einzelnen Verbindung
//!
//! Jede Verbindung bekommt einen `VerbindungsHandler` in einem eigenen
//! tokio-Task. Das Verhalten haengt vom [`RelayModus`] des Servers ab.
//!
//! ## State Machine (Modus `Dateien`)
//! ```text
//! WartetAufNachricht --Control--> WartetAufNachricht (Broadcast)
//!     |
//!     +--FILE-Header--> EmpfaengtDatei { verbleibend }
//!                           |  Chunk: Broadcast, verbleibend -= n
//!                           +--verbleibend == 0 / vorzeitiges EOF--> WartetAufNachricht
//!
//! * --Lesefehler / EOF in WartetAufNachricht / Schliess-Signal--> Geschlossen
//! ```
//!
//! Im Modus `Nachrichten` wird jeder Chunk als Control-Nachricht behandelt,
//! im Modus `Frames` wird die Lese-Seite nur geleert, um das Trennen des
//! Peers zu erkennen.

use funkrelais_core::{FunkError, RelayEreignis};
use funkrelais_protocol::{decode_control_or_file_header, FileHeader, Incoming};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::broadcast::ExklusiverBroadcast;
use crate::connection::Verbindung;
use crate::state::{RelayModus, RelayState};

// ---------------------------------------------------------------------------
// Zustand
// ---------------------------------------------------------------------------

/// Zustand der Empfangsschleife
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerZustand {
    /// Wartet auf eine Control-Nachricht oder einen Datei-Header
    WartetAufNachricht,
    /// Streamt eine angekuendigte Datei an die Peers
    EmpfaengtDatei {
        name: String,
        groesse: u64,
        verbleibend: u64,
    },
    /// Terminal
    Geschlossen,
}

/// Ergebnis eines einzelnen Transport-Reads
enum Lesen {
    Daten(usize),
    /// Peer hat seine Schreib-Seite geschlossen
    Eof,
    /// Keine Daten innerhalb der Frist
    Zeitueberschreitung,
    /// Die Verbindung wurde vom System geschlossen
    Geschlossen,
    Fehler(io::Error),
}

// ---------------------------------------------------------------------------
// VerbindungsHandler
// ---------------------------------------------------------------------------

/// Verarbeitet die Lese-Seite einer Verbindung
pub struct VerbindungsHandler {
    state: Arc<RelayState>,
    verbindung: Arc<Verbindung>,
    /// Sende-Sperre waehrend einer laufenden Datei-Uebertragung
    datei_sperre: Option<ExklusiverBroadcast>,
}

impl VerbindungsHandler {
    pub fn neu(state: Arc<RelayState>, verbindung: Arc<Verbindung>) -> Self {
        Self {
            state,
            verbindung,
            datei_sperre: None,
        }
    }

    /// Startet die Empfangsschleife
    ///
    /// Laeuft bis der Peer trennt, ein fataler Fehler auftritt oder die
    /// Verbindung geschlossen wird. Danach ist die Verbindung aus dem
    /// Register entfernt und geschlossen.
    pub async fn verarbeiten<R>(mut self, mut leser: R) -> HandlerZustand
    where
        R: AsyncRead + Unpin,
    {
        let peer = self.verbindung.peer_addr();
        let id = self.verbindung.id();
        let modus = self.state.config.modus;
        let mut puffer = vec![0u8; self.state.config.puffer_groesse];
        let mut zustand = HandlerZustand::WartetAufNachricht;

        tracing::info!(verbindung = %id, peer = %peer, %modus, "Empfangsschleife gestartet");

        while zustand != HandlerZustand::Geschlossen {
            zustand = match zustand {
                HandlerZustand::WartetAufNachricht => {
                    let ergebnis = self.lesen(&mut leser, &mut puffer, None).await;
                    self.nachricht_verarbeiten(modus, ergebnis, &puffer).await
                }
                HandlerZustand::EmpfaengtDatei {
                    name,
                    groesse,
                    verbleibend,
                } => {
                    let n = verbleibend.min(puffer.len() as u64) as usize;
                    let frist = Some(self.state.config.datei_lese_timeout);
                    let ergebnis = self.lesen(&mut leser, &mut puffer[..n], frist).await;
                    self.datei_chunk_verarbeiten(ergebnis, &puffer, name, groesse, verbleibend)
                        .await
                }
                HandlerZustand::Geschlossen => HandlerZustand::Geschlossen,
            };
        }

        self.aufraeumen();
        zustand
    }

    /// Liest hoechstens `puffer.len()` Bytes, unterbrechbar durch das Schliess-Signal
    async fn lesen<R>(&self, leser: &mut R, puffer: &mut [u8], frist: Option<Duration>) -> Lesen
    where
        R: AsyncRead + Unpin,
    {
        let lesen = async {
            match frist {
                Some(frist) => match tokio::time::timeout(frist, leser.read(puffer)).await {
                    Ok(ergebnis) => ergebnis.map(Some),
                    Err(_) => Ok(None),
                },
                None => leser.read(puffer).await.map(Some),
            }
        };

        tokio::select! {
            _ = self.verbindung.geschlossen_abwarten() => Lesen::Geschlossen,
            ergebnis = lesen => match ergebnis {
                Ok(Some(0)) => Lesen::Eof,
                Ok(Some(n)) => Lesen::Daten(n),
                Ok(None) => Lesen::Zeitueberschreitung,
                Err(e) => Lesen::Fehler(e),
            },
        }
    }

    async fn nachricht_verarbeiten(
        &mut self,
        modus: RelayModus,
        ergebnis: Lesen,
        puffer: &[u8],
    ) -> HandlerZustand {
        let id = self.verbindung.id();
        let peer = self.verbindung.peer_addr();

        let n = match ergebnis {
            Lesen::Daten(n) => n,
            Lesen::Eof => {
                tracing::info!(verbindung = %id, peer = %peer, "Verbindung vom Client getrennt");
                return HandlerZustand::Geschlossen;
            }
            Lesen::Geschlossen => return HandlerZustand::Geschlossen,
            Lesen::Zeitueberschreitung => return HandlerZustand::WartetAufNachricht,
            Lesen::Fehler(e) => {
                tracing::warn!(verbindung = %id, peer = %peer, fehler = %e, "Lesefehler");
                return HandlerZustand::Geschlossen;
            }
        };
        let daten = &puffer[..n];

        match modus {
            RelayModus::Nachrichten => {
                self.control_weiterleiten(daten).await;
                HandlerZustand::WartetAufNachricht
            }
            RelayModus::Frames => {
                tracing::trace!(verbindung = %id, bytes = n, "Eingehende Daten im Frame-Modus verworfen");
                HandlerZustand::WartetAufNachricht
            }
            RelayModus::Dateien => match decode_control_or_file_header(daten) {
                Ok(Incoming::Control(nachricht)) => {
                    self.control_weiterleiten(&nachricht).await;
                    HandlerZustand::WartetAufNachricht
                }
                Ok(Incoming::FileHeader(header)) => self.datei_beginnen(header, daten).await,
                Err(e) => {
                    self.protokoll_verletzung(e);
                    HandlerZustand::Geschlossen
                }
            },
        }
    }

    async fn control_weiterleiten(&self, nachricht: &[u8]) {
        tracing::debug!(
            verbindung = %self.verbindung.id(),
            bytes = nachricht.len(),
            "Control-Nachricht empfangen"
        );
        self.state
            .broadcaster
            .an_alle_ausser_senden(nachricht, Some(self.verbindung.id()))
            .await;
    }

    async fn datei_beginnen(&mut self, header: FileHeader, roh: &[u8]) -> HandlerZustand {
        let id = self.verbindung.id();
        tracing::info!(
            verbindung = %id,
            datei = %header.name,
            groesse = header.groesse,
            "Datei-Uebertragung angekuendigt"
        );

        // Peers erfahren zuerst Name und Groesse; der Header muss dort als
        // eigener Read ankommen, getrennt von vorherigen Payloads und vom
        // ersten Chunk
        let sperre = self.state.broadcaster.exklusiv().await;
        self.kopf_pause().await;
        sperre.an_alle_ausser_senden(roh, Some(id)).await;
        self.kopf_pause().await;

        self.verbindung.datei_empfang_setzen(true);
        self.state.ereignisse.senden(RelayEreignis::DateiAngekuendigt {
            id,
            name: header.name.clone(),
            groesse: header.groesse,
        });

        if header.groesse == 0 {
            self.datei_abschliessen(header.name, 0, 0);
            return HandlerZustand::WartetAufNachricht;
        }

        self.datei_sperre = Some(sperre);
        HandlerZustand::EmpfaengtDatei {
            name: header.name,
            groesse: header.groesse,
            verbleibend: header.groesse,
        }
    }

    async fn datei_chunk_verarbeiten(
        &mut self,
        ergebnis: Lesen,
        puffer: &[u8],
        name: String,
        groesse: u64,
        verbleibend: u64,
    ) -> HandlerZustand {
        match ergebnis {
            Lesen::Daten(n) => {
                if let Some(sperre) = &self.datei_sperre {
                    sperre
                        .an_alle_ausser_senden(&puffer[..n], Some(self.verbindung.id()))
                        .await;
                }
                let verbleibend = verbleibend - n as u64;
                if verbleibend == 0 {
                    self.datei_abschliessen(name, groesse, 0);
                    HandlerZustand::WartetAufNachricht
                } else {
                    HandlerZustand::EmpfaengtDatei {
                        name,
                        groesse,
                        verbleibend,
                    }
                }
            }
            // Vorzeitiges Ende: Warnung, die Verbindung bleibt offen
            Lesen::Eof | Lesen::Zeitueberschreitung => {
                self.datei_abschliessen(name, groesse, verbleibend);
                HandlerZustand::WartetAufNachricht
            }
            Lesen::Geschlossen => HandlerZustand::Geschlossen,
            Lesen::Fehler(e) => {
                tracing::warn!(
                    verbindung = %self.verbindung.id(),
                    fehler = %e,
                    "Lesefehler waehrend Datei-Uebertragung"
                );
                HandlerZustand::Geschlossen
            }
        }
    }

    fn datei_abschliessen(&mut self, name: String, groesse: u64, verbleibend: u64) {
        let id = self.verbindung.id();
        self.datei_sperre = None;
        self.verbindung.datei_empfang_setzen(false);

        if verbleibend == 0 {
            tracing::info!(verbindung = %id, datei = %name, groesse, "Datei-Uebertragung abgeschlossen");
            self.state
                .ereignisse
                .senden(RelayEreignis::DateiWeitergeleitet { id, name, groesse });
        } else {
            let fehler = FunkError::IncompleteTransfer {
                erwartet: groesse,
                erhalten: groesse - verbleibend,
            };
            tracing::warn!(verbindung = %id, datei = %name, fehler = %fehler, "Datei-Uebertragung unvollstaendig");
            self.state.ereignisse.senden(RelayEreignis::DateiUnvollstaendig {
                id,
                name,
                erwartet: groesse,
                erhalten: groesse - verbleibend,
            });
        }
    }

    fn protokoll_verletzung(&self, fehler: FunkError) {
        let id = self.verbindung.id();
        tracing::warn!(
            verbindung = %id,
            peer = %self.verbindung.peer_addr(),
            fehler = %fehler,
            "Protokollverletzung – Verbindung wird getrennt"
        );
        self.state.ereignisse.senden(RelayEreignis::ProtokollVerletzung {
            id,
            grund: fehler.to_string(),
        });
    }

    async fn kopf_pause(&self) {
        if !self.state.config.kopf_pause.is_zero() {
            tokio::time::sleep(self.state.config.kopf_pause).await;
        }
    }

    fn aufraeumen(&mut self) {
        self.datei_sperre = None;
        self.verbindung.datei_empfang_setzen(false);
        self.state.register.trennen(&self.verbindung);
        self.state.ereignisse.senden(RelayEreignis::VerbindungGetrennt {
            id: self.verbindung.id(),
            peer: self.verbindung.peer_addr(),
        });
        tracing::info!(
            verbindung = %self.verbindung.id(),
            peer = %self.verbindung.peer_addr(),
            "Verbindungs-Task beendet"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
