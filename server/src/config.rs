//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Context};
use funkrelais_protocol::{DEFAULT_BUFFER_SIZE, MAX_FRAME_LEN};
use funkrelais_relay::{RelayConfig, RelayModus};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::logging;
use crate::testbild::MAX_FPS;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Puffer, Timeouts)
    pub relay: RelayEinstellungen,
    /// Testbild-Quelle fuer den Frame-Modus
    pub frames: FrameEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_verbindungen: usize,
    /// Betriebsmodus: "nachrichten", "dateien" oder "frames"
    pub modus: RelayModus,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Funkrelais".into(),
            max_verbindungen: 512,
            modus: RelayModus::default(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse des Listen-Sockets
    pub bind_adresse: String,
    /// TCP-Port
    pub port: u16,
    /// Backlog des Listen-Sockets
    pub backlog: u32,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8000,
            backlog: 128,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Obergrenze fuer jeden Transport-Read in Bytes
    pub puffer_groesse: usize,
    /// Maximale Dauer eines Writes an einen Peer
    pub schreib_timeout_ms: u64,
    /// Maximale Anzahl wartender Payloads pro Peer
    pub ausgangs_kapazitaet: usize,
    /// Maximale Pause zwischen zwei Datei-Chunks
    pub datei_lese_timeout_ms: u64,
    /// Wartezeit vor und nach einem weitergeleiteten Datei-Header
    pub kopf_pause_ms: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            puffer_groesse: DEFAULT_BUFFER_SIZE,
            schreib_timeout_ms: 5_000,
            ausgangs_kapazitaet: 256,
            datei_lese_timeout_ms: 30_000,
            kopf_pause_ms: 25,
        }
    }
}

/// Einstellungen der Testbild-Quelle (nur im Frame-Modus)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameEinstellungen {
    /// Bilder pro Sekunde
    pub fps: u32,
    /// Groesse eines Frames in Bytes
    pub groesse: u64,
}

impl Default for FrameEinstellungen {
    fn default() -> Self {
        Self {
            fps: 25,
            groesse: 64 * 1024,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte, die TOML allein nicht ausschliessen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.relay_config().validieren()?;
        self.bind_adresse()?;

        if self.server.modus == RelayModus::Frames {
            if self.frames.fps == 0 || self.frames.fps > MAX_FPS {
                bail!(
                    "frames.fps ({}) muss zwischen 1 und {MAX_FPS} liegen",
                    self.frames.fps
                );
            }
            if self.frames.groesse > MAX_FRAME_LEN {
                bail!(
                    "frames.groesse ({}) ueberschreitet das Protokoll-Maximum {MAX_FRAME_LEN}",
                    self.frames.groesse
                );
            }
        }
        if !logging::log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes Log-Level: {}", self.logging.level);
        }
        if !logging::log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format: {}", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    /// Uebersetzt die Einstellungen in die Relay-Konfiguration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            modus: self.server.modus,
            puffer_groesse: self.relay.puffer_groesse,
            schreib_timeout: Duration::from_millis(self.relay.schreib_timeout_ms),
            ausgangs_kapazitaet: self.relay.ausgangs_kapazitaet,
            datei_lese_timeout: Duration::from_millis(self.relay.datei_lese_timeout_ms),
            kopf_pause: Duration::from_millis(self.relay.kopf_pause_ms),
            max_verbindungen: self.server.max_verbindungen,
            backlog: self.netzwerk.backlog,
        }
    }
}
