//! Integration-Tests fuer den kompletten Server (Konfiguration bis Shutdown)

use funkrelais_client::{ClientConfig, ClientEreignis, FrameReceiver, RelayClient};
use funkrelais_relay::RelayModus;
use funkrelais_server::{config::ServerConfig, Server};
use std::time::Duration;
use tokio::sync::oneshot;

const FRIST: Duration = Duration::from_secs(5);

fn config(modus: RelayModus) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.modus = modus;
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.port = 0;
    config.relay.kopf_pause_ms = 10;
    config.frames.fps = 200;
    config.frames.groesse = 64;
    config
}

#[tokio::test]
async fn frame_server_liefert_testbilder() {
    let server = Server::neu(config(RelayModus::Frames)).binden().unwrap();
    let adresse = server.lokale_adresse().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let laufend = tokio::spawn(server.laufen_bis(async {
        let _ = stop_rx.await;
    }));

    let mut empfaenger = FrameReceiver::verbinden(adresse).await.unwrap();
    let erster = tokio::time::timeout(FRIST, empfaenger.geaendert())
        .await
        .unwrap()
        .unwrap();
    let zweiter = tokio::time::timeout(FRIST, empfaenger.geaendert())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(erster.len(), 64);
    assert_eq!(zweiter.len(), 64);

    // Laufende Nummern steigen streng
    let nummer = |bild: &bytes::Bytes| u64::from_be_bytes(bild[..8].try_into().unwrap());
    assert!(nummer(&zweiter) > nummer(&erster));

    stop_tx.send(()).unwrap();
    tokio::time::timeout(FRIST, laufend)
        .await
        .expect("Server wurde nicht beendet")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn datei_server_leitet_nachrichten_weiter() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::neu(config(RelayModus::Dateien)).binden().unwrap();
    let adresse = server.lokale_adresse().unwrap();
    let handle = server.handle();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let laufend = tokio::spawn(server.laufen_bis(async {
        let _ = stop_rx.await;
    }));

    let (a, _a_rx) = RelayClient::verbinden(adresse, ClientConfig::mit_download_verzeichnis(dir.path()))
        .await
        .unwrap();
    let (_b, mut b_rx) = RelayClient::verbinden(adresse, ClientConfig::mit_download_verzeichnis(dir.path()))
        .await
        .unwrap();
    tokio::time::timeout(FRIST, async {
        while handle.state().register.anzahl() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    a.nachricht_senden(b"ping").await.unwrap();
    let ereignis = tokio::time::timeout(FRIST, b_rx.recv()).await.unwrap();
    assert_eq!(
        ereignis,
        Some(ClientEreignis::Nachricht(bytes::Bytes::from_static(b"ping")))
    );

    stop_tx.send(()).unwrap();
    tokio::time::timeout(FRIST, laufend)
        .await
        .expect("Server wurde nicht beendet")
        .unwrap()
        .unwrap();

    let ereignis = tokio::time::timeout(FRIST, b_rx.recv()).await.unwrap();
    assert_eq!(ereignis, Some(ClientEreignis::Getrennt));
}

#[tokio::test]
async fn belegter_port_ist_fataler_fehler() {
    let erster = Server::neu(config(RelayModus::Dateien)).binden().unwrap();
    let adresse = erster.lokale_adresse().unwrap();

    let mut zweite_config = config(RelayModus::Dateien);
    zweite_config.netzwerk.port = adresse.port();
    assert!(Server::neu(zweite_config).binden().is_err());
}
