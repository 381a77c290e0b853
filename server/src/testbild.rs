//! Testbild-Quelle fuer den Frame-Modus
//!
//! Erzeugt Frames fester Groesse in festem Takt. Jeder Frame beginnt mit
//! seiner laufenden Nummer (u64 BE), der Rest ist ein von der Nummer
//! abhaengiges Byte-Muster.

use bytes::{BufMut, Bytes, BytesMut};
use funkrelais_core::Result;
use funkrelais_relay::FrameQuelle;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Hoechste unterstuetzte Bildrate
pub const MAX_FPS: u32 = 1000;

/// Synthetische Frame-Quelle
pub struct TestbildQuelle {
    takt: Interval,
    groesse: usize,
    nummer: u64,
    /// Nach so vielen Frames ist die Quelle erschoepft (`None` = endlos)
    limit: Option<u64>,
}

impl TestbildQuelle {
    /// Erstellt eine Quelle mit `fps` Bildern pro Sekunde
    ///
    /// `fps` wird auf `1..=MAX_FPS` begrenzt. Muss innerhalb einer
    /// tokio-Runtime aufgerufen werden.
    pub fn neu(fps: u32, groesse: usize) -> Self {
        let periode = Duration::from_secs(1) / fps.clamp(1, MAX_FPS);
        let mut takt = interval(periode);
        takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            takt,
            groesse,
            nummer: 0,
            limit: None,
        }
    }

    pub fn mit_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn bild(&self) -> Bytes {
        let mut bild = BytesMut::with_capacity(self.groesse);
        let kopf = self.nummer.to_be_bytes();
        let kopf_len = kopf.len().min(self.groesse);
        bild.put_slice(&kopf[..kopf_len]);
        let saat = self.nummer as usize;
        for i in kopf_len..self.groesse {
            bild.put_u8(((i + saat) % 251) as u8);
        }
        bild.freeze()
    }
}

impl FrameQuelle for TestbildQuelle {
    async fn erfassen(&mut self) -> Result<Option<Bytes>> {
        if self.limit.is_some_and(|limit| self.nummer >= limit) {
            return Ok(None);
        }
        self.takt.tick().await;
        let bild = self.bild();
        self.nummer += 1;
        Ok(Some(bild))
    }
}
