//! RIFF/WAVE container for recorded speech.
//!
//! 16-bit PCM keeps a minute of mono 48 kHz audio well under the upload limit.

const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

pub const WAV_MIME: &str = "audio/wav";

fn to_i16(s: f32) -> i16 {
    let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
    (s * i16::MAX as f32).round() as i16
}

/// Mono `f32` samples in [-1, 1] to a 16-bit PCM WAV file.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate_hz: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate_hz * u32::from(block_align);
    let data_len = (samples.len() * usize::from(block_align)) as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(HEADER_LEN as u32 - 8 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    for v in [FORMAT_PCM, channels] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&sample_rate_hz.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    for v in [block_align, BITS_PER_SAMPLE] {
        out.extend_from_slice(&v.to_le_bytes());
    }

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend(samples.iter().flat_map(|s| to_i16(*s).to_le_bytes()));

    out
}

/// Size of the WAV produced for `n_samples` mono samples.
pub fn encoded_len(n_samples: usize) -> usize {
    HEADER_LEN + n_samples * 2
}
