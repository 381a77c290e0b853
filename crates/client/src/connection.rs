//! Client-seitige TCP-Verbindung zum Relay
//!
//! Die Lese-Seite gehoert einem eigenen Task ([`crate::empfang`]), die
//! Schreib-Seite liegt hinter einem async Mutex. Eine Datei-Uebertragung
//! haelt den Mutex vom Header bis zum letzten Chunk, damit keine Nachricht
//! des eigenen Clients dazwischen landet.

use funkrelais_core::{FunkError, Result};
use funkrelais_protocol::{encode_file_header, FileHeader};
use funkrelais_protocol::file::FILE_PREFIX;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::empfang::{ClientEreignis, Empfaenger};

// ---------------------------------------------------------------------------
// RelayClient
// ---------------------------------------------------------------------------

/// Verbindung eines Clients zum Relay-Server
pub struct RelayClient {
    schreiber: Arc<Mutex<OwnedWriteHalf>>,
    config: Arc<ClientConfig>,
    lokale_adresse: SocketAddr,
    stop_tx: watch::Sender<bool>,
    empfang: JoinHandle<()>,
}

impl RelayClient {
    /// Baut die Verbindung auf und startet die Empfangsschleife
    ///
    /// Alle empfangenen Daten kommen als [`ClientEreignis`] ueber den
    /// zurueckgegebenen Kanal; das letzte Ereignis ist immer `Getrennt`.
    pub async fn verbinden(
        adresse: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEreignis>)> {
        config.validieren()?;

        let stream = TcpStream::connect(adresse).await?;
        stream.set_nodelay(true)?;
        let lokale_adresse = stream.local_addr()?;
        tracing::info!(
            lokal = %lokale_adresse,
            server = %stream.peer_addr()?,
            "Verbindung zum Relay hergestellt"
        );

        let config = Arc::new(config);
        let (leser, schreiber) = stream.into_split();
        let (ereignis_tx, ereignis_rx) = mpsc::channel(config.ereignis_kapazitaet);
        let (stop_tx, stop_rx) = watch::channel(false);

        let empfaenger = Empfaenger::neu(leser, Arc::clone(&config), ereignis_tx, stop_rx);
        let empfang = tokio::spawn(empfaenger.laufen());

        Ok((
            Self {
                schreiber: Arc::new(Mutex::new(schreiber)),
                config,
                lokale_adresse,
                stop_tx,
                empfang,
            },
            ereignis_rx,
        ))
    }

    pub fn lokale_adresse(&self) -> SocketAddr {
        self.lokale_adresse
    }

    /// Sendet eine Nachricht an alle anderen Clients
    ///
    /// Nachrichten, die wie ein Datei-Header beginnen, werden abgelehnt:
    /// der Server wuerde sie als Header lesen.
    pub async fn nachricht_senden(&self, nachricht: &[u8]) -> Result<()> {
        if nachricht.starts_with(FILE_PREFIX.as_bytes()) {
            return Err(FunkError::malformed(
                "Nachricht beginnt mit dem Datei-Praefix",
            ));
        }
        let mut schreiber = self.schreiber.lock().await;
        schreiber.write_all(nachricht).await?;
        schreiber.flush().await?;
        tracing::debug!(bytes = nachricht.len(), "Nachricht gesendet");
        Ok(())
    }

    /// Sendet eine Datei als Header plus Roh-Bytes
    ///
    /// Uebertragen wird nur der Dateiname, nicht der Pfad. Gibt die Anzahl
    /// der gesendeten Datei-Bytes zurueck.
    ///
    /// # Fehler
    /// - `Transport` wenn die Datei nicht lesbar ist oder der Socket bricht
    /// - `MalformedHeader` wenn der Name nicht ueber das Wire-Format passt
    /// - `IncompleteTransfer` wenn die Datei waehrend des Sendens schrumpft
    pub async fn datei_senden(&self, pfad: impl AsRef<Path>) -> Result<u64> {
        let pfad = pfad.as_ref();
        let name = pfad
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FunkError::malformed(format!("Kein Dateiname: {}", pfad.display())))?;
        if !FileHeader::name_ist_transportierbar(name) {
            return Err(FunkError::malformed(format!(
                "Dateiname nicht transportierbar: {name}"
            )));
        }

        let mut datei = tokio::fs::File::open(pfad).await?;
        let groesse = datei.metadata().await?.len();

        let mut schreiber = self.schreiber.lock().await;

        // Der Header muss beim Server als eigener Read ankommen, getrennt
        // von der vorherigen Nachricht und vom ersten Chunk
        self.kopf_pause().await;
        schreiber.write_all(&encode_file_header(name, groesse)).await?;
        schreiber.flush().await?;
        tracing::info!(datei = %name, groesse, "Datei-Uebertragung gestartet");
        self.kopf_pause().await;

        let mut puffer = vec![0u8; self.config.puffer_groesse];
        let mut gesendet = 0u64;
        while gesendet < groesse {
            let n = (groesse - gesendet).min(puffer.len() as u64) as usize;
            let gelesen = datei.read(&mut puffer[..n]).await?;
            if gelesen == 0 {
                break;
            }
            schreiber.write_all(&puffer[..gelesen]).await?;
            gesendet += gelesen as u64;
        }
        schreiber.flush().await?;

        if gesendet < groesse {
            tracing::error!(datei = %name, erwartet = groesse, gesendet, "Datei waehrend des Sendens geschrumpft");
            return Err(FunkError::IncompleteTransfer {
                erwartet: groesse,
                erhalten: gesendet,
            });
        }

        tracing::info!(datei = %name, groesse, "Datei gesendet");
        Ok(gesendet)
    }

    async fn kopf_pause(&self) {
        if !self.config.kopf_pause.is_zero() {
            tokio::time::sleep(self.config.kopf_pause).await;
        }
    }

    /// Schliesst die Verbindung und wartet auf das Ende der Empfangsschleife
    pub async fn schliessen(self) {
        self.stop_tx.send_replace(true);
        {
            let mut schreiber = self.schreiber.lock().await;
            if let Err(e) = schreiber.shutdown().await {
                tracing::debug!(fehler = %e, "Shutdown der Schreib-Seite fehlgeschlagen");
            }
        }
        if let Err(e) = self.empfang.await {
            tracing::warn!(fehler = %e, "Empfangs-Task abgebrochen");
        }
        tracing::info!(lokal = %self.lokale_adresse, "Verbindung zum Relay geschlossen");
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("lokale_adresse", &self.lokale_adresse)
            .field("beendet", &self.empfang.is_finished())
            .finish()
    }
}
