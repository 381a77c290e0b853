//! Structured Logging Setup via tracing-subscriber
//!
//! Die Werte aus `[logging]` lassen sich per Umgebungsvariable ueberschreiben:
//! - `FUNKRELAIS_LOG_LEVEL`: Filter-Direktive (z. B. `debug` oder
//!   `funkrelais_relay=trace,info`)
//! - `FUNKRELAIS_LOG_FORMAT`: `text` oder `json`

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingEinstellungen;

pub const ENV_LOG_LEVEL: &str = "FUNKRELAIS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "FUNKRELAIS_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Kombiniert Konfigurationswerte mit optionalen Umgebungswerten
///
/// Umgebungswerte haben Vorrang; ein unbekanntes Format faellt auf `Text`
/// zurueck.
pub fn einstellungen_aufloesen(
    config: &LoggingEinstellungen,
    env_level: Option<String>,
    env_format: Option<String>,
) -> (String, LogFormat) {
    let level = env_level
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| config.level.clone());
    let format = match env_format.as_deref().unwrap_or(&config.format) {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    };
    (level, format)
}

/// Initialisiert das Logging-System
///
/// Ein ungueltiger Filter faellt auf `info` zurueck. Schlaegt fehl, wenn
/// bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(config: &LoggingEinstellungen) -> anyhow::Result<()> {
    let (level, format) = einstellungen_aufloesen(
        config,
        std::env::var(ENV_LOG_LEVEL).ok(),
        std::env::var(ENV_LOG_FORMAT).ok(),
    );
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str, format: &str) -> LoggingEinstellungen {
        LoggingEinstellungen {
            level: level.into(),
            format: format.into(),
        }
    }

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
    }

    #[test]
    fn ohne_umgebung_gilt_config() {
        let (level, format) = einstellungen_aufloesen(&config("warn", "json"), None, None);
        assert_eq!(level, "warn");
        assert_eq!(format, LogFormat::Json);
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let (level, format) = einstellungen_aufloesen(
            &config("info", "json"),
            Some("funkrelais_relay=trace".into()),
            Some("text".into()),
        );
        assert_eq!(level, "funkrelais_relay=trace");
        assert_eq!(format, LogFormat::Text);
    }

    #[test]
    fn leeres_env_level_ignoriert() {
        let (level, _) = einstellungen_aufloesen(&config("debug", "text"), Some("  ".into()), None);
        assert_eq!(level, "debug");
    }

    #[test]
    fn unbekanntes_format_wird_text() {
        let (_, format) = einstellungen_aufloesen(&config("info", "text"), None, Some("xml".into()));
        assert_eq!(format, LogFormat::Text);
    }
}
