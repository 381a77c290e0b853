//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` bindet einen TCP-Socket mit konfigurierbarem Backlog
//! und startet fuer jede eingehende Verbindung einen eigenen tokio-Task mit
//! einem `VerbindungsHandler`. Im Frame-Modus kommt pro Verbindung ein
//! Frame-Sender hinzu.
//!
//! ## Shutdown
//! [`ServerHandle::herunterfahren`] schliesst zuerst alle registrierten
//! Verbindungen und beendet dann die Accept-Loop, die den Listen-Socket
//! freigibt. Die Accept-Loop wartet per `select!` parallel auf das
//! Shutdown-Signal und blockiert daher nie unbegrenzt.

use funkrelais_core::{RelayEreignis, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;

use crate::connection::Verbindung;
use crate::handler::VerbindungsHandler;
use crate::publisher::{frames_senden, shutdown_abwarten};
use crate::state::{RelayModus, RelayState};

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Steuerungs-Handle fuer einen laufenden Server
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<RelayState>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Schliesst alle Verbindungen und stoppt die Accept-Loop
    pub fn herunterfahren(&self) {
        let geschlossen = self.state.register.alle_schliessen();
        tracing::info!(geschlossen, "Relay wird heruntergefahren");
        self.shutdown_tx.send_replace(true);
    }

    /// Empfaenger fuer das Shutdown-Signal (z. B. fuer den Publisher)
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl RelayServer {
    /// Bindet den Listen-Socket
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden. Ein Fehler hier
    /// ist fatal fuer den Start und wird dem Aufrufer zurueckgegeben.
    pub fn binden(bind_addr: SocketAddr, state: Arc<RelayState>) -> Result<Self> {
        let socket = if bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(bind_addr)?;
        let listener = socket.listen(state.config.backlog)?;

        tracing::info!(
            adresse = %listener.local_addr()?,
            modus = %state.config.modus,
            backlog = state.config.backlog,
            "TCP Relay-Server gebunden"
        );

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            state,
            listener,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// Gibt die tatsaechlich gebundene Adresse zurueck
    pub fn lokale_adresse(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Akzeptiert Verbindungen bis zum Shutdown
    pub async fn starten(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.annehmen(stream, peer_addr),
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                _ = shutdown_abwarten(&mut shutdown_rx) => {
                    tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        // Verbindungen, die waehrend des Shutdowns noch akzeptiert wurden
        self.state.register.alle_schliessen();
        drop(self.listener);
        tracing::info!("TCP Relay-Server gestoppt");
        Ok(())
    }

    fn annehmen(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let online = self.state.register.anzahl();
        if online >= self.state.config.max_verbindungen {
            tracing::warn!(
                peer = %peer_addr,
                max = self.state.config.max_verbindungen,
                "Server voll – Verbindung abgelehnt"
            );
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let (leser, schreiber) = stream.into_split();
        let optionen = self.state.config.ausgangs_optionen();
        let verbindung = Verbindung::mit_optionen(peer_addr, schreiber, optionen);
        self.state.register.registrieren(Arc::clone(&verbindung));
        self.state.ereignisse.senden(RelayEreignis::VerbindungAufgebaut {
            id: verbindung.id(),
            peer: peer_addr,
        });
        tracing::info!(verbindung = %verbindung.id(), peer = %peer_addr, "Verbindung akzeptiert");

        if self.state.config.modus == RelayModus::Frames {
            tokio::spawn(frames_senden(
                Arc::clone(&verbindung),
                self.state.frame_slot.abonnieren(),
                self.state.register.clone(),
            ));
        }

        let handler = VerbindungsHandler::neu(Arc::clone(&self.state), verbindung);
        tokio::spawn(async move {
            handler.verarbeiten(leser).await;
        });
    }
}
