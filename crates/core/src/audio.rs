//! Audio frame type and the PCM container codec
//!
//! All audio in the pipeline is single-channel, 16-bit signed little-endian
//! PCM at 24 kHz. Frames carry the raw bytes untouched; the codec wraps a
//! finished buffer in a WAV container for durable storage.

use bytes::Bytes;
use std::io::Cursor;
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Sample rate of every frame (Hz)
pub const SAMPLE_RATE: u32 = 24_000;
/// Channel count of every frame
pub const CHANNELS: u16 = 1;
/// Bits per sample of every frame
pub const BITS_PER_SAMPLE: u16 = 16;

const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;

fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// One chunk of raw PCM received from the client
///
/// Immutable once built. Cloning shares the underlying buffer, so the
/// accumulator and the transcription channel see the very same bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw PCM16 LE bytes
    pub data: Bytes,
    /// Frame sequence number within the session
    pub sequence: u64,
    /// Timestamp when the frame was received
    pub received_at: Instant,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("bytes", &self.data.len())
            .field("sequence", &self.sequence)
            .field("duration", &self.duration())
            .finish()
    }
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, sequence: u64) -> Self {
        Self {
            data: data.into(),
            sequence,
            received_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of the payload
    pub fn duration(&self) -> Duration {
        pcm_duration(self.data.len())
    }
}

/// Playback duration of `len` bytes of PCM16 mono at [`SAMPLE_RATE`]
pub fn pcm_duration(len: usize) -> Duration {
    let samples = len / BYTES_PER_SAMPLE / CHANNELS as usize;
    Duration::from_secs_f64(samples as f64 / SAMPLE_RATE as f64)
}

/// Wrap raw PCM16 LE bytes in a WAV container (mono, 16 bit, 24 kHz)
pub fn encode_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::Codec(format!(
            "PCM16 buffer has odd length {}",
            pcm.len()
        )));
    }

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec())?;
        for sample in pcm.chunks_exact(BYTES_PER_SAMPLE) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Extract raw PCM16 LE bytes from a WAV container produced by [`encode_wav`]
pub fn decode_wav(wav: &[u8]) -> Result<Vec<u8>> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    if spec != wav_spec() {
        return Err(Error::Codec(format!(
            "unsupported container format: {} ch, {} Hz, {} bit {:?}",
            spec.channels, spec.sample_rate, spec.bits_per_sample, spec.sample_format
        )));
    }

    let mut pcm = Vec::with_capacity(reader.len() as usize * BYTES_PER_SAMPLE);
    for sample in reader.into_samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize) -> Vec<u8> {
        (0..samples)
            .map(|i| ((i as f32 * 0.05).sin() * 12_000.0) as i16)
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let pcm = tone(2400);
        let wav = encode_wav(&pcm).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(decode_wav(&wav).unwrap(), pcm);
    }

    #[test]
    fn test_round_trip_empty() {
        let wav = encode_wav(&[]).unwrap();
        assert!(decode_wav(&wav).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_extremes() {
        let pcm: Vec<u8> = [i16::MIN, -1, 0, 1, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(decode_wav(&encode_wav(&pcm).unwrap()).unwrap(), pcm);
    }

    #[test]
    fn test_header_describes_format() {
        let wav = encode_wav(&tone(10)).unwrap();
        let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(encode_wav(&[0, 1, 2]), Err(Error::Codec(_))));
    }

    #[test]
    fn test_foreign_format_rejected() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }
        assert!(decode_wav(&cursor.into_inner()).is_err());
    }

    #[test]
    fn test_frame_duration() {
        // 100ms at 24kHz mono 16-bit
        let frame = AudioFrame::new(vec![0u8; 4800], 0);
        assert_eq!(frame.duration(), Duration::from_millis(100));
        assert_eq!(frame.len(), 4800);
    }
}
