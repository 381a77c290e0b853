//! Client-Konfiguration

use funkrelais_core::{FunkError, Result};
use funkrelais_protocol::DEFAULT_BUFFER_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Einstellungen eines `RelayClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Obergrenze fuer Reads und Datei-Chunks
    pub puffer_groesse: usize,
    /// Zielverzeichnis fuer empfangene Dateien
    pub download_verzeichnis: PathBuf,
    /// Wartezeit vor dem Datei-Header und zwischen Header und erstem Chunk
    pub kopf_pause: Duration,
    /// Kapazitaet des Ereignis-Kanals
    pub ereignis_kapazitaet: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            puffer_groesse: DEFAULT_BUFFER_SIZE,
            download_verzeichnis: PathBuf::from("downloads"),
            kopf_pause: Duration::from_millis(25),
            ereignis_kapazitaet: 64,
        }
    }
}

impl ClientConfig {
    /// Standard-Konfiguration mit eigenem Download-Verzeichnis
    pub fn mit_download_verzeichnis(verzeichnis: impl Into<PathBuf>) -> Self {
        Self {
            download_verzeichnis: verzeichnis.into(),
            ..Self::default()
        }
    }

    pub fn validieren(&self) -> Result<()> {
        if self.puffer_groesse == 0 {
            return Err(FunkError::Konfiguration(
                "puffer_groesse muss groesser als 0 sein".into(),
            ));
        }
        if self.ereignis_kapazitaet == 0 {
            return Err(FunkError::Konfiguration(
                "ereignis_kapazitaet muss groesser als 0 sein".into(),
            ));
        }
        Ok(())
    }
}
