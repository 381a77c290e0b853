//! Empfangsschleife des Clients
//!
//! Spiegelt den Handler auf Server-Seite: ein Chunk ist entweder eine
//! Nachricht oder ein Datei-Header. Nach einem Header werden exakt
//! `groesse` Bytes in das Download-Verzeichnis geschrieben.

use bytes::Bytes;
use funkrelais_protocol::{decode_control_or_file_header, Incoming};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;

/// Dateiname fuer Header, deren Name keinen letzten Pfadbestandteil hat
const ERSATZ_NAME: &str = "unbenannt";

/// Alles, was ein Client vom Relay erhaelt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEreignis {
    /// Nachricht eines anderen Clients (ein Read, unveraendert)
    Nachricht(Bytes),
    /// Datei vollstaendig empfangen und gespeichert
    DateiEmpfangen { pfad: PathBuf, groesse: u64 },
    /// Verbindung endete vor dem letzten angekuendigten Byte
    DateiUnvollstaendig {
        pfad: PathBuf,
        erwartet: u64,
        erhalten: u64,
    },
    /// Ungueltiger Header oder lokaler Dateifehler
    ProtokollFehler(String),
    /// Verbindung beendet
    Getrennt,
}

/// Reduziert einen empfangenen Namen auf seinen letzten Pfadbestandteil
pub(crate) fn ziel_pfad(verzeichnis: &Path, name: &str) -> PathBuf {
    let basis = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(ERSATZ_NAME);
    verzeichnis.join(basis)
}

pub(crate) struct Empfaenger<R> {
    leser: R,
    config: Arc<ClientConfig>,
    ereignisse: mpsc::Sender<ClientEreignis>,
    stop_rx: watch::Receiver<bool>,
}

enum Lesen {
    Daten(usize),
    Ende,
}

impl<R> Empfaenger<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn neu(
        leser: R,
        config: Arc<ClientConfig>,
        ereignisse: mpsc::Sender<ClientEreignis>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            leser,
            config,
            ereignisse,
            stop_rx,
        }
    }

    /// Laeuft bis der Server trennt oder der Client geschlossen wird
    pub(crate) async fn laufen(mut self) {
        let mut puffer = vec![0u8; self.config.puffer_groesse];

        loop {
            let n = match self.lesen(&mut puffer).await {
                Lesen::Daten(n) => n,
                Lesen::Ende => break,
            };

            match decode_control_or_file_header(&puffer[..n]) {
                Ok(Incoming::Control(nachricht)) => {
                    tracing::debug!(bytes = nachricht.len(), "Nachricht empfangen");
                    self.melden(ClientEreignis::Nachricht(nachricht)).await;
                }
                Ok(Incoming::FileHeader(header)) => {
                    let pfad = ziel_pfad(&self.config.download_verzeichnis, &header.name);
                    if !self.datei_empfangen(&mut puffer, pfad, header.groesse).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Ungueltiger Header vom Server");
                    self.melden(ClientEreignis::ProtokollFehler(e.to_string()))
                        .await;
                }
            }
        }

        tracing::info!("Empfangsschleife beendet");
        self.melden(ClientEreignis::Getrennt).await;
    }

    /// Schreibt `groesse` Bytes in `pfad`
    ///
    /// Gibt `false` zurueck, wenn die Verbindung dabei endete.
    async fn datei_empfangen(&mut self, puffer: &mut [u8], pfad: PathBuf, groesse: u64) -> bool {
        tracing::info!(datei = %pfad.display(), groesse, "Datei-Empfang beginnt");

        // Ohne Zieldatei werden die Bytes trotzdem konsumiert
        let mut datei = match Self::datei_anlegen(&pfad).await {
            Ok(datei) => Some(datei),
            Err(e) => {
                tracing::error!(datei = %pfad.display(), fehler = %e, "Datei nicht anlegbar");
                self.melden(ClientEreignis::ProtokollFehler(format!(
                    "{}: {e}",
                    pfad.display()
                )))
                .await;
                None
            }
        };

        let mut verbleibend = groesse;
        while verbleibend > 0 {
            let n = verbleibend.min(puffer.len() as u64) as usize;
            let gelesen = match self.lesen(&mut puffer[..n]).await {
                Lesen::Daten(gelesen) => gelesen,
                Lesen::Ende => break,
            };
            if let Some(d) = datei.as_mut() {
                if let Err(e) = d.write_all(&puffer[..gelesen]).await {
                    tracing::error!(datei = %pfad.display(), fehler = %e, "Schreibfehler");
                    datei = None;
                }
            }
            verbleibend -= gelesen as u64;
        }

        if let Some(mut d) = datei {
            if let Err(e) = d.flush().await {
                tracing::error!(datei = %pfad.display(), fehler = %e, "Flush fehlgeschlagen");
            }
        }

        if verbleibend == 0 {
            tracing::info!(datei = %pfad.display(), groesse, "Datei empfangen");
            self.melden(ClientEreignis::DateiEmpfangen { pfad, groesse })
                .await;
            true
        } else {
            tracing::error!(
                datei = %pfad.display(),
                erwartet = groesse,
                erhalten = groesse - verbleibend,
                "Datei-Uebertragung unvollstaendig"
            );
            self.melden(ClientEreignis::DateiUnvollstaendig {
                pfad,
                erwartet: groesse,
                erhalten: groesse - verbleibend,
            })
            .await;
            false
        }
    }

    async fn datei_anlegen(pfad: &Path) -> std::io::Result<File> {
        if let Some(verzeichnis) = pfad.parent() {
            tokio::fs::create_dir_all(verzeichnis).await?;
        }
        File::create(pfad).await
    }

    async fn lesen(&mut self, puffer: &mut [u8]) -> Lesen {
        if *self.stop_rx.borrow() {
            return Lesen::Ende;
        }
        tokio::select! {
            _ = self.stop_rx.changed() => Lesen::Ende,
            ergebnis = self.leser.read(puffer) => match ergebnis {
                Ok(0) => Lesen::Ende,
                Ok(n) => Lesen::Daten(n),
                Err(e) => {
                    tracing::warn!(fehler = %e, "Lesefehler");
                    Lesen::Ende
                }
            },
        }
    }

    async fn melden(&self, ereignis: ClientEreignis) {
        // Ein verworfener Empfaenger ist kein Fehler
        let _ = self.ereignisse.send(ereignis).await;
    }
}
