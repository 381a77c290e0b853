//! Datei-Header (delimitiertes Text-Schema)
//!
//! ## Wire-Format
//!
//! ```text
//! FILE://<name>://<size>
//! ```
//!
//! `<size>` ist eine Dezimalzahl. Direkt danach folgen exakt `<size>`
//! Roh-Bytes. Header und Payload bilden eine atomare Einheit.
//!
//! Das Format hat keinen Terminator: der Header muss als eigener Read beim
//! Empfaenger ankommen. Namen, die selbst `://` enthalten, sind nicht
//! dekodierbar.

use bytes::Bytes;
use funkrelais_core::{FunkError, Result};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Marker-Feld des Datei-Headers
pub const FILE_MARKER: &str = "FILE";

/// Trennzeichen zwischen den Header-Feldern
pub const DELIMITER: &str = "://";

/// Praefix, an dem ein Datei-Header erkannt wird
pub const FILE_PREFIX: &str = "FILE://";

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Angekuendigte Datei-Uebertragung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Dateiname (ohne Verzeichnis)
    pub name: String,
    /// Anzahl der folgenden Roh-Bytes
    pub groesse: u64,
}

impl FileHeader {
    pub fn neu(name: impl Into<String>, groesse: u64) -> Self {
        Self {
            name: name.into(),
            groesse,
        }
    }

    /// Serialisiert den Header ins Wire-Format
    pub fn encode(&self) -> Bytes {
        encode_file_header(&self.name, self.groesse)
    }

    /// Prueft ob der Name verlustfrei ueber das Wire-Format transportiert werden kann
    pub fn name_ist_transportierbar(name: &str) -> bool {
        !name.is_empty() && !name.contains(DELIMITER)
    }
}

/// Ergebnis der Dekodierung eines empfangenen Chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Beliebige Bytes ohne erkannten Header
    Control(Bytes),
    /// Ankuendigung einer Datei
    FileHeader(FileHeader),
}

// ---------------------------------------------------------------------------
// Kodierung
// ---------------------------------------------------------------------------

/// Inspiziert einen empfangenen Chunk
///
/// Beginnt er mit `FILE://`, muss er sich an `://` in genau drei Felder
/// (Marker, Name, Groesse) zerlegen lassen und die Groesse eine
/// nicht-negative Ganzzahl sein. Andernfalls `MalformedHeader`.
/// Alle anderen Chunks werden unveraendert als Control-Nachricht geliefert.
pub fn decode_control_or_file_header(daten: &[u8]) -> Result<Incoming> {
    if !daten.starts_with(FILE_PREFIX.as_bytes()) {
        return Ok(Incoming::Control(Bytes::copy_from_slice(daten)));
    }

    let text = std::str::from_utf8(daten)
        .map_err(|_| FunkError::malformed("Datei-Header ist kein gueltiges UTF-8"))?;

    let felder: Vec<&str> = text.split(DELIMITER).collect();
    let [marker, name, groesse] = felder.as_slice() else {
        return Err(FunkError::malformed(format!(
            "Datei-Header hat {} statt 3 Felder",
            felder.len()
        )));
    };

    debug_assert_eq!(*marker, FILE_MARKER);

    if name.is_empty() {
        return Err(FunkError::malformed("Datei-Header ohne Namen"));
    }

    if groesse.is_empty() || !groesse.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FunkError::malformed(format!(
            "Dateigroesse ist keine nicht-negative Ganzzahl: {groesse:?}"
        )));
    }
    let groesse: u64 = groesse
        .parse()
        .map_err(|e| FunkError::malformed(format!("Dateigroesse nicht lesbar: {e}")))?;

    Ok(Incoming::FileHeader(FileHeader::neu(*name, groesse)))
}

/// Formatiert einen Datei-Header
pub fn encode_file_header(name: &str, groesse: u64) -> Bytes {
    Bytes::from(format!("{FILE_PREFIX}{name}{DELIMITER}{groesse}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_nachricht_bleibt_unveraendert() {
        let ergebnis = decode_control_or_file_header(b"hallo zusammen").unwrap();
        assert_eq!(ergebnis, Incoming::Control(Bytes::from_static(b"hallo zusammen")));
    }

    #[test]
    fn binaere_control_nachricht() {
        let daten = [0xffu8, 0x00, 0x46, 0x49];
        let ergebnis = decode_control_or_file_header(&daten).unwrap();
        assert_eq!(ergebnis, Incoming::Control(Bytes::copy_from_slice(&daten)));
    }

    #[test]
    fn datei_header_wird_erkannt() {
        let ergebnis = decode_control_or_file_header(b"FILE://report.txt://12").unwrap();
        assert_eq!(
            ergebnis,
            Incoming::FileHeader(FileHeader::neu("report.txt", 12))
        );
    }

    #[test]
    fn header_encode_format() {
        assert_eq!(
            encode_file_header("bild.png", 2048),
            Bytes::from_static(b"FILE://bild.png://2048")
        );
        let header = FileHeader::neu("leer", 0);
        assert_eq!(
            decode_control_or_file_header(&header.encode()).unwrap(),
            Incoming::FileHeader(header)
        );
    }

    #[test]
    fn zu_wenige_felder() {
        let err = decode_control_or_file_header(b"FILE://nur-name").unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }

    #[test]
    fn zu_viele_felder() {
        let err = decode_control_or_file_header(b"FILE://a://b://12").unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }

    #[test]
    fn groesse_keine_zahl() {
        for kaputt in [
            &b"FILE://a.txt://zwoelf"[..],
            b"FILE://a.txt://-5",
            b"FILE://a.txt://",
            b"FILE://a.txt://12hello",
        ] {
            let err = decode_control_or_file_header(kaputt).unwrap_err();
            assert!(
                matches!(err, FunkError::MalformedHeader(_)),
                "{:?} muss abgelehnt werden",
                String::from_utf8_lossy(kaputt)
            );
        }
    }

    #[test]
    fn groesse_ueberlauf() {
        let err = decode_control_or_file_header(b"FILE://a://99999999999999999999999").unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }

    #[test]
    fn ungueltiges_utf8_im_header() {
        let err = decode_control_or_file_header(b"FILE://\xff\xfe://3").unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }

    #[test]
    fn transportierbare_namen() {
        assert!(FileHeader::name_ist_transportierbar("report.txt"));
        assert!(!FileHeader::name_ist_transportierbar("http://x"));
        assert!(!FileHeader::name_ist_transportierbar(""));
    }
}
