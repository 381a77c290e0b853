//! Frame-Empfang von einem Frame-Server
//!
//! Dekodiert den Strom mit dem `FrameBlobCodec` und legt jeden Frame in
//! einen Latest-wins-Slot. Wer langsamer liest als der Server sendet,
//! sieht nur den jeweils neuesten Frame.

use bytes::Bytes;
use funkrelais_core::Result;
use funkrelais_protocol::FrameBlobCodec;
use futures_util::StreamExt;
use std::net::SocketAddr;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

/// Empfaenger fuer den Frame-Strom eines Servers
pub struct FrameReceiver {
    slot: watch::Receiver<Option<Bytes>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<u64>,
    server: SocketAddr,
}

impl FrameReceiver {
    /// Verbindet sich und startet die Dekodier-Schleife
    pub async fn verbinden(adresse: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(adresse).await?;
        let server = stream.peer_addr()?;
        tracing::info!(server = %server, "Frame-Empfang verbunden");

        let (slot_tx, slot) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(empfangen(
            FramedRead::new(stream, FrameBlobCodec::new()),
            slot_tx,
            stop_rx,
        ));

        Ok(Self {
            slot,
            stop_tx,
            task,
            server,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Neuester empfangener Frame (ohne Warten)
    pub fn neuester(&self) -> Option<Bytes> {
        self.slot.borrow().clone()
    }

    /// Wartet auf einen Frame, der noch nicht abgeholt wurde
    ///
    /// Gibt `None` zurueck, wenn der Strom geendet hat.
    pub async fn geaendert(&mut self) -> Option<Bytes> {
        self.slot.changed().await.ok()?;
        self.slot.borrow_and_update().clone()
    }

    pub fn ist_verbunden(&self) -> bool {
        !self.task.is_finished()
    }

    /// Beendet den Empfang und gibt die Anzahl empfangener Frames zurueck
    pub async fn schliessen(self) -> u64 {
        self.stop_tx.send_replace(true);
        match self.task.await {
            Ok(anzahl) => anzahl,
            Err(e) => {
                tracing::warn!(fehler = %e, "Frame-Task abgebrochen");
                0
            }
        }
    }
}

async fn empfangen(
    mut frames: FramedRead<TcpStream, FrameBlobCodec>,
    slot: watch::Sender<Option<Bytes>>,
    mut stop_rx: watch::Receiver<bool>,
) -> u64 {
    let mut anzahl = 0u64;
    loop {
        tokio::select! {
            _ = stop_abwarten(&mut stop_rx) => break,
            naechster = frames.next() => match naechster {
                Some(Ok(frame)) => {
                    anzahl += 1;
                    tracing::trace!(bytes = frame.len(), anzahl, "Frame empfangen");
                    slot.send_replace(Some(frame));
                }
                Some(Err(e)) => {
                    tracing::warn!(fehler = %e, "Frame-Strom fehlerhaft");
                    break;
                }
                None => {
                    tracing::info!(anzahl, "Frame-Strom beendet");
                    break;
                }
            },
        }
    }
    anzahl
}

async fn stop_abwarten(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
