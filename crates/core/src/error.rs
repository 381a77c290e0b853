//! Fehlertypen fuer Funkrelais
//!
//! Zentraler Fehler-Enum mit der Fehler-Taxonomie des Relays. Alle Fehler
//! einer Verbindung bleiben auf diese Verbindung beschraenkt; nur ein
//! fehlgeschlagenes Binden des Listeners ist fuer den Server fatal.

use thiserror::Error;

/// Globaler Result-Alias fuer Funkrelais
pub type Result<T> = std::result::Result<T, FunkError>;

/// Alle moeglichen Fehler im Funkrelais-System
#[derive(Debug, Error)]
pub enum FunkError {
    // --- Transport ---
    /// Connect/Accept/Read/Write fehlgeschlagen
    #[error("Transportfehler: {0}")]
    Transport(#[from] std::io::Error),

    // --- Protokoll ---
    /// Header nicht parsebar (falscher Aufbau, keine Dezimalziffern, Short-Read)
    #[error("Ungueltiger Header: {0}")]
    MalformedHeader(String),

    /// Payload kuerzer als angekuendigt
    #[error("Unvollstaendige Uebertragung: erwartet={erwartet}, erhalten={erhalten}")]
    IncompleteTransfer { erwartet: u64, erhalten: u64 },

    /// Laenge passt nicht in den 8-stelligen Frame-Header
    #[error("Kapazitaet ueberschritten: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    CapacityExceeded { laenge: u64, maximum: u64 },

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl FunkError {
    /// Erstellt einen Header-Fehler
    pub fn malformed(grund: impl Into<String>) -> Self {
        Self::MalformedHeader(grund.into())
    }

    /// Gibt true zurueck wenn die betroffene Verbindung geschlossen werden muss
    ///
    /// Unvollstaendige Uebertragungen und Kapazitaetsfehler sind Warnungen,
    /// die Verbindung bleibt offen.
    pub fn ist_verbindungsfatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedHeader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = FunkError::malformed("size ist keine Zahl");
        assert_eq!(e.to_string(), "Ungueltiger Header: size ist keine Zahl");
    }

    #[test]
    fn unvollstaendig_anzeige() {
        let e = FunkError::IncompleteTransfer {
            erwartet: 100,
            erhalten: 40,
        };
        assert!(e.to_string().contains("erwartet=100"));
        assert!(e.to_string().contains("erhalten=40"));
    }

    #[test]
    fn verbindungsfatal_erkennung() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "weg");
        assert!(FunkError::from(io).ist_verbindungsfatal());
        assert!(FunkError::malformed("x").ist_verbindungsfatal());
        assert!(!FunkError::IncompleteTransfer {
            erwartet: 1,
            erhalten: 0
        }
        .ist_verbindungsfatal());
        assert!(!FunkError::CapacityExceeded {
            laenge: 100_000_000,
            maximum: 99_999_999
        }
        .ist_verbindungsfatal());
        assert!(!FunkError::Konfiguration("fps".into()).ist_verbindungsfatal());
    }
}
