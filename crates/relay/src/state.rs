//! Gemeinsamer Relay-Zustand
//!
//! Haelt Konfiguration, Verbindungs-Register, Broadcaster, Ereignis-Bus und
//! den Frame-Slot als Arc-Referenzen, die sicher zwischen tokio-Tasks
//! geteilt werden koennen. Es gibt keinen globalen Zustand: jeder Server
//! besitzt genau einen `RelayState`.

use funkrelais_core::{FunkError, Result};
use funkrelais_protocol::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broadcast::Broadcaster;
use crate::connection::{AusgangsOptionen, DEFAULT_AUSGANGS_KAPAZITAET, DEFAULT_SCHREIB_TIMEOUT};
use crate::events::EreignisBus;
use crate::publisher::FrameSlot;
use crate::registry::VerbindungsRegister;

/// Verhalten, mit dem jede Verbindung eines Servers betrieben wird
///
/// Wird beim Einrichten gewaehlt und aendert sich zur Laufzeit nicht.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayModus {
    /// Jeder empfangene Chunk wird unveraendert an alle anderen weitergeleitet
    Nachrichten,
    /// Wie `Nachrichten`, zusaetzlich werden `FILE://`-Header erkannt und
    /// die folgende Datei gestreamt weitergeleitet
    #[default]
    Dateien,
    /// Jede Verbindung erhaelt den jeweils neuesten Frame des Publishers
    Frames,
}

impl std::fmt::Display for RelayModus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Nachrichten => "nachrichten",
            Self::Dateien => "dateien",
            Self::Frames => "frames",
        };
        f.write_str(name)
    }
}

/// Konfiguration fuer das Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Verhalten aller Verbindungen
    pub modus: RelayModus,
    /// Obergrenze fuer jeden einzelnen Transport-Read
    pub puffer_groesse: usize,
    /// Maximale Dauer eines einzelnen Schreibvorgangs an einen Peer
    pub schreib_timeout: Duration,
    /// Maximale Anzahl wartender Payloads pro Peer; ein Peer mit voller
    /// Queue wird getrennt
    pub ausgangs_kapazitaet: usize,
    /// Maximale Pause zwischen zwei Datei-Chunks
    pub datei_lese_timeout: Duration,
    /// Wartezeit vor und nach einem weitergeleiteten Datei-Header
    ///
    /// Das Wire-Format hat keinen Terminator; der Header muss beim Empfaenger
    /// als eigener Read ankommen.
    pub kopf_pause: Duration,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Backlog des Listen-Sockets
    pub backlog: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            modus: RelayModus::default(),
            puffer_groesse: DEFAULT_BUFFER_SIZE,
            schreib_timeout: DEFAULT_SCHREIB_TIMEOUT,
            ausgangs_kapazitaet: DEFAULT_AUSGANGS_KAPAZITAET,
            datei_lese_timeout: Duration::from_secs(30),
            kopf_pause: Duration::from_millis(25),
            max_verbindungen: 512,
            backlog: 128,
        }
    }
}

impl RelayConfig {
    /// Einstellungen fuer die Schreib-Seite jeder Verbindung
    pub fn ausgangs_optionen(&self) -> AusgangsOptionen {
        AusgangsOptionen {
            schreib_timeout: self.schreib_timeout,
            kapazitaet: self.ausgangs_kapazitaet,
        }
    }

    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<()> {
        if self.puffer_groesse == 0 {
            return Err(FunkError::Konfiguration(
                "puffer_groesse muss groesser als 0 sein".into(),
            ));
        }
        if self.backlog == 0 {
            return Err(FunkError::Konfiguration(
                "backlog muss groesser als 0 sein".into(),
            ));
        }
        if self.ausgangs_kapazitaet == 0 {
            return Err(FunkError::Konfiguration(
                "ausgangs_kapazitaet muss groesser als 0 sein".into(),
            ));
        }
        if self.max_verbindungen == 0 {
            return Err(FunkError::Konfiguration(
                "max_verbindungen muss groesser als 0 sein".into(),
            ));
        }
        if self.schreib_timeout.is_zero() || self.datei_lese_timeout.is_zero() {
            return Err(FunkError::Konfiguration(
                "Timeouts muessen groesser als 0 sein".into(),
            ));
        }
        Ok(())
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Relay-Konfiguration
    pub config: Arc<RelayConfig>,
    /// Alle lebenden Verbindungen
    pub register: VerbindungsRegister,
    /// Fan-out an alle registrierten Verbindungen
    pub broadcaster: Broadcaster,
    /// Ereignisse fuer Beobachter (Logs, Tests, Anzeige)
    pub ereignisse: EreignisBus,
    /// Neuester Frame des Publishers (nur im Frame-Modus befuellt)
    pub frame_slot: FrameSlot,
    /// Startzeitpunkt (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(config: RelayConfig) -> Result<Arc<Self>> {
        config.validieren()?;
        let register = VerbindungsRegister::neu();
        let broadcaster = Broadcaster::neu(register.clone());
        Ok(Arc::new(Self {
            config: Arc::new(config),
            register,
            broadcaster,
            ereignisse: EreignisBus::neu(),
            frame_slot: FrameSlot::neu(),
            start_time: Instant::now(),
        }))
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let config = RelayConfig::default();
        assert!(config.validieren().is_ok());
        assert_eq!(config.puffer_groesse, 4096);
        assert_eq!(config.modus, RelayModus::Dateien);
    }

    #[test]
    fn puffer_null_abgelehnt() {
        let config = RelayConfig {
            puffer_groesse: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            RelayState::neu(config),
            Err(FunkError::Konfiguration(_))
        ));
    }

    #[test]
    fn ausgangs_kapazitaet_null_abgelehnt() {
        let config = RelayConfig {
            ausgangs_kapazitaet: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validieren(),
            Err(FunkError::Konfiguration(_))
        ));
        assert_eq!(
            RelayConfig::default().ausgangs_optionen(),
            AusgangsOptionen::default()
        );
    }

    #[test]
    fn modus_aus_toml() {
        #[derive(Deserialize)]
        struct Huelle {
            modus: RelayModus,
        }
        let huelle: Huelle = toml::from_str(r#"modus = "frames""#).unwrap();
        assert_eq!(huelle.modus, RelayModus::Frames);
        assert_eq!(RelayModus::Nachrichten.to_string(), "nachrichten");
    }
}
