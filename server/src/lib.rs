//! funkrelais-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Relay und (im Frame-Modus) den Publisher mit
//! der Testbild-Quelle. Stellt den Einstiegspunkt fuer Integrationstests
//! bereit.

pub mod config;
pub mod logging;
pub mod testbild;

use anyhow::{Context, Result};
use config::ServerConfig;
use funkrelais_relay::{Publisher, RelayModus, RelayServer, RelayState, ServerHandle};
use std::future::Future;
use std::net::SocketAddr;
use testbild::TestbildQuelle;
use tokio::sync::broadcast::error::RecvError;

/// Haelt den Server-Zustand vor dem Binden zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bindet den Listen-Socket
    ///
    /// Ein Bind-Fehler ist fatal und wird nicht wiederholt.
    pub fn binden(self) -> Result<GebundenerServer> {
        let adresse = self.config.bind_adresse()?;
        let state = RelayState::neu(self.config.relay_config())?;
        let relay = RelayServer::binden(adresse, state)
            .with_context(|| format!("Bind auf {adresse} fehlgeschlagen"))?;
        Ok(GebundenerServer {
            config: self.config,
            relay,
        })
    }

    /// Bindet, startet und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.binden()?
            .laufen_bis(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
                    std::future::pending::<()>().await;
                }
            })
            .await
    }
}

/// Gebundener, noch nicht laufender Server
pub struct GebundenerServer {
    config: ServerConfig,
    relay: RelayServer,
}

impl GebundenerServer {
    pub fn lokale_adresse(&self) -> Result<SocketAddr> {
        Ok(self.relay.lokale_adresse()?)
    }

    pub fn handle(&self) -> ServerHandle {
        self.relay.handle()
    }

    /// Laeuft bis `stop` fertig ist, dann geordneter Shutdown
    ///
    /// Reihenfolge:
    /// 1. Ereignis-Protokollierung starten
    /// 2. Publisher starten (nur Frame-Modus)
    /// 3. Accept-Loop starten
    /// 4. Auf `stop` warten, alle Verbindungen schliessen
    pub async fn laufen_bis<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.relay.handle();
        let state = self.relay.state().clone();

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.relay.lokale_adresse()?,
            modus = %self.config.server.modus,
            max_verbindungen = self.config.server.max_verbindungen,
            "Server startet"
        );

        let protokoll = tokio::spawn(ereignisse_protokollieren(
            state.ereignisse.abonnieren(),
        ));

        let publisher = if self.config.server.modus == RelayModus::Frames {
            let quelle = TestbildQuelle::neu(self.config.frames.fps, self.config.frames.groesse as usize);
            tracing::info!(
                fps = self.config.frames.fps,
                groesse = self.config.frames.groesse,
                "Testbild-Publisher wird gestartet"
            );
            Some(Publisher::neu(quelle, state.frame_slot.clone()).starten(handle.shutdown_signal()))
        } else {
            None
        };

        let mut accept = tokio::spawn(self.relay.starten());

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        let ergebnis = tokio::select! {
            _ = stop => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                handle.herunterfahren();
                accept.await
            }
            ergebnis = &mut accept => {
                handle.herunterfahren();
                ergebnis
            }
        };

        if let Some(publisher) = publisher {
            match publisher.await {
                Ok(anzahl) => tracing::info!(frames = anzahl, "Publisher beendet"),
                Err(e) => tracing::warn!(fehler = %e, "Publisher-Task abgebrochen"),
            }
        }
        protokoll.abort();

        ergebnis.context("Accept-Task abgebrochen")??;
        tracing::info!(uptime_sek = state.uptime_sek(), "Server gestoppt");
        Ok(())
    }
}

/// Schreibt alle Relay-Ereignisse ins Log
async fn ereignisse_protokollieren(mut rx: tokio::sync::broadcast::Receiver<funkrelais_core::RelayEreignis>) {
    loop {
        match rx.recv().await {
            Ok(ereignis) => tracing::debug!(?ereignis, "Relay-Ereignis"),
            Err(RecvError::Lagged(verpasst)) => {
                tracing::warn!(verpasst, "Ereignis-Protokoll hinkt hinterher")
            }
            Err(RecvError::Closed) => break,
        }
    }
}
