//! Frame-Format (fester dezimaler Laengen-Header)
//!
//! Wird fuer das Frame-Streaming verwendet. Jeder Blob ist eine
//! vollstaendige, unabhaengig dekodierbare Einheit.
//!
//! ## Frame-Format
//!
//! ```text
//! +---+---+---+---+---+---+---+---+----...----+
//! | Laenge (8 ASCII-Dezimalziffern) | Payload    |
//! +---+---+---+---+---+---+---+---+----...----+
//! ```
//!
//! Die Laenge ist mit Nullen aufgefuellt. Damit ist die Payload hart auf
//! 99.999.999 Bytes begrenzt ([`MAX_FRAME_LEN`]). Diese Grenze ist Teil des
//! Protokolls und wird nicht stillschweigend erweitert.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use funkrelais_core::{FunkError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesse des Laengen-Felds in Bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// Groesste darstellbare Payload-Laenge
pub const MAX_FRAME_LEN: u64 = 99_999_999;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Formatiert eine Laenge als 8-stelligen, mit Nullen aufgefuellten Header
///
/// # Fehler
/// - `CapacityExceeded` wenn `laenge > MAX_FRAME_LEN`
pub fn encode_frame_header(laenge: u64) -> Result<[u8; FRAME_HEADER_LEN]> {
    if laenge > MAX_FRAME_LEN {
        return Err(FunkError::CapacityExceeded {
            laenge,
            maximum: MAX_FRAME_LEN,
        });
    }

    let mut header = [b'0'; FRAME_HEADER_LEN];
    let mut rest = laenge;
    for stelle in header.iter_mut().rev() {
        *stelle = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
    Ok(header)
}

/// Liest die Laenge aus einem 8-Byte-Header
///
/// # Fehler
/// - `MalformedHeader` bei weniger als 8 Bytes (Short-Read) oder
///   Zeichen, die keine Dezimalziffern sind
pub fn decode_frame_header(header: &[u8]) -> Result<u64> {
    if header.len() < FRAME_HEADER_LEN {
        return Err(FunkError::malformed(format!(
            "Frame-Header zu kurz: {} von {} Bytes",
            header.len(),
            FRAME_HEADER_LEN
        )));
    }
    if header.len() > FRAME_HEADER_LEN {
        return Err(FunkError::malformed(format!(
            "Frame-Header zu lang: {} statt {} Bytes",
            header.len(),
            FRAME_HEADER_LEN
        )));
    }

    header.iter().try_fold(0u64, |laenge, &b| {
        if b.is_ascii_digit() {
            Ok(laenge * 10 + u64::from(b - b'0'))
        } else {
            Err(FunkError::malformed(format!(
                "Frame-Header enthaelt Nicht-Ziffer: {:?}",
                String::from_utf8_lossy(header)
            )))
        }
    })
}

// ---------------------------------------------------------------------------
// FrameBlobCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer Frame-Blobs
///
/// Implementiert `Encoder<Bytes>` und `Decoder` fuer die Verwendung mit
/// `tokio_util::codec::FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Default)]
pub struct FrameBlobCodec {
    /// Laenge des aktuell erwarteten Blobs (Header bereits verbraucht)
    erwartet: Option<usize>,
}

impl FrameBlobCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameBlobCodec {
    type Item = Bytes;
    type Error = FunkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let laenge = match self.erwartet {
            Some(laenge) => laenge,
            None => {
                // Warte auf das vollstaendige Laengen-Feld
                if src.len() < FRAME_HEADER_LEN {
                    return Ok(None);
                }
                let laenge = decode_frame_header(&src[..FRAME_HEADER_LEN])? as usize;
                src.advance(FRAME_HEADER_LEN);
                self.erwartet = Some(laenge);
                laenge
            }
        };

        if src.len() < laenge {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(laenge - src.len());
            return Ok(None);
        }

        self.erwartet = None;
        Ok(Some(src.split_to(laenge).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.erwartet.is_none() => Ok(None),
            None => match self.erwartet.take() {
                Some(laenge) => Err(FunkError::IncompleteTransfer {
                    erwartet: laenge as u64,
                    erhalten: src.len() as u64,
                }),
                None => Err(FunkError::malformed(format!(
                    "Frame-Header zu kurz: {} von {} Bytes",
                    src.len(),
                    FRAME_HEADER_LEN
                ))),
            },
        }
    }
}

impl Encoder<Bytes> for FrameBlobCodec {
    type Error = FunkError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        let header = encode_frame_header(item.len() as u64)?;
        dst.reserve(FRAME_HEADER_LEN + item.len());
        dst.put_slice(&header);
        dst.put_slice(&item);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Blob aus einem `AsyncRead`
///
/// Toleriert beliebig kurze Reads. Gibt `Ok(None)` zurueck, wenn der Strom
/// sauber vor einem neuen Header endet.
///
/// # Fehler
/// - `MalformedHeader` bei kurzem oder ungueltigem Header
/// - `IncompleteTransfer` wenn die Payload kuerzer als angekuendigt ist
pub async fn read_blob<R>(reader: &mut R) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut gelesen = 0;
    while gelesen < FRAME_HEADER_LEN {
        let n = reader.read(&mut header[gelesen..]).await?;
        if n == 0 {
            if gelesen == 0 {
                return Ok(None);
            }
            return decode_frame_header(&header[..gelesen]).map(|_| None);
        }
        gelesen += n;
    }

    let laenge = decode_frame_header(&header)?;
    let mut payload = BytesMut::zeroed(laenge as usize);
    let mut erhalten = 0usize;
    while erhalten < payload.len() {
        let n = reader.read(&mut payload[erhalten..]).await?;
        if n == 0 {
            return Err(FunkError::IncompleteTransfer {
                erwartet: laenge,
                erhalten: erhalten as u64,
            });
        }
        erhalten += n;
    }

    Ok(Some(payload.freeze()))
}

/// Schreibt einen einzelnen Blob in einen `AsyncWrite`
///
/// # Fehler
/// - `CapacityExceeded` wenn die Payload die Protokollgrenze ueberschreitet,
///   bevor irgendein Byte geschrieben wurde
pub async fn write_blob<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = encode_frame_header(payload.len() as u64)?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_format_mit_nullen() {
        assert_eq!(&encode_frame_header(0).unwrap(), b"00000000");
        assert_eq!(&encode_frame_header(1234).unwrap(), b"00001234");
        assert_eq!(&encode_frame_header(MAX_FRAME_LEN).unwrap(), b"99999999");
    }

    #[test]
    fn header_round_trip_grenzen() {
        for n in [0, 1, 9, 10, 4096, 1_000_000, MAX_FRAME_LEN - 1, MAX_FRAME_LEN] {
            let header = encode_frame_header(n).unwrap();
            assert_eq!(decode_frame_header(&header).unwrap(), n);
        }
    }

    #[test]
    fn header_ueber_grenze_abgelehnt() {
        let err = encode_frame_header(MAX_FRAME_LEN + 1).unwrap_err();
        assert!(matches!(
            err,
            FunkError::CapacityExceeded {
                laenge: 100_000_000,
                maximum: MAX_FRAME_LEN
            }
        ));
    }

    #[test]
    fn header_short_read() {
        let err = decode_frame_header(b"0000012").unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }

    #[test]
    fn header_nicht_dezimal() {
        for kaputt in [b"0000x012", b"    1234", b"-0000001"] {
            let err = decode_frame_header(kaputt).unwrap_err();
            assert!(matches!(err, FunkError::MalformedHeader(_)));
        }
    }

    #[test]
    fn codec_encode_decode() {
        let mut codec = FrameBlobCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"frame-eins"), &mut buf).unwrap();
        assert_eq!(&buf[..FRAME_HEADER_LEN], b"00000010");

        let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(frame, Bytes::from_static(b"frame-eins"));
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_stueckweise_lieferung() {
        let mut codec = FrameBlobCodec::new();
        let mut vollstaendig = BytesMut::new();
        codec.encode(Bytes::from_static(b"abcdefgh"), &mut vollstaendig).unwrap();
        codec.encode(Bytes::from_static(b"zweiter"), &mut vollstaendig).unwrap();

        // Byte fuer Byte einspeisen
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for byte in vollstaendig.iter() {
            buf.put_u8(*byte);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(
            frames,
            vec![Bytes::from_static(b"abcdefgh"), Bytes::from_static(b"zweiter")]
        );
    }

    #[test]
    fn codec_leerer_frame() {
        let mut codec = FrameBlobCodec::new();
        let mut buf = BytesMut::from(&b"00000000"[..]);
        let frame = codec.decode(&mut buf).unwrap().expect("leerer Frame erwartet");
        assert!(frame.is_empty());
    }

    #[test]
    fn codec_eof_mitten_im_frame() {
        let mut codec = FrameBlobCodec::new();
        let mut buf = BytesMut::from(&b"00000100abc"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            FunkError::IncompleteTransfer {
                erwartet: 100,
                erhalten: 3
            }
        ));
    }

    #[test]
    fn codec_ablehnung_ungueltiger_header() {
        let mut codec = FrameBlobCodec::new();
        let mut buf = BytesMut::from(&b"abcdefgh-payload"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[tokio::test]
    async fn async_read_write_blob() {
        let mut buffer: Vec<u8> = Vec::new();
        write_blob(&mut buffer, b"erster").await.unwrap();
        write_blob(&mut buffer, b"").await.unwrap();
        assert_eq!(&buffer[..FRAME_HEADER_LEN], b"00000006");

        let mut cursor = std::io::Cursor::new(buffer);
        assert_eq!(
            read_blob(&mut cursor).await.unwrap(),
            Some(Bytes::from_static(b"erster"))
        );
        assert_eq!(read_blob(&mut cursor).await.unwrap(), Some(Bytes::new()));
        assert_eq!(read_blob(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn async_read_blob_unvollstaendig() {
        let mut cursor = std::io::Cursor::new(b"00000100nur-vierzig".to_vec());
        let err = read_blob(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            FunkError::IncompleteTransfer {
                erwartet: 100,
                erhalten: 11
            }
        ));
    }

    #[tokio::test]
    async fn async_read_blob_kurzer_header() {
        let mut cursor = std::io::Cursor::new(b"0001".to_vec());
        let err = read_blob(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FunkError::MalformedHeader(_)));
    }
}
