//! G.711 μ-law codec and canonical PCM WAV framing.
//!
//! Pure functions operating on 8 kHz mono audio. No I/O, no allocation beyond
//! the output buffer, no error cases — malformed or zero-length input is
//! handled by truncation, never by failure.

const MULAW_BIAS: i16 = 0x84;
const MULAW_CLIP: i16 = 32635;

/// Encode little-endian signed 16-bit PCM samples to G.711 μ-law bytes.
///
/// A trailing odd byte (half a sample) is dropped.
pub fn encode_pcm16_to_mulaw(pcm_le_bytes: &[u8]) -> Vec<u8> {
    pcm_le_bytes
        .chunks_exact(2)
        .map(|c| pcm_to_mulaw(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

/// Decode G.711 μ-law bytes to little-endian signed 16-bit PCM.
pub fn decode_mulaw_to_pcm16(mulaw_bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(mulaw_bytes.len() * 2);
    for &b in mulaw_bytes {
        out.extend_from_slice(&mulaw_to_pcm(b).to_le_bytes());
    }
    out
}

fn pcm_to_mulaw(sample: i16) -> u8 {
    let sign: u8;
    let mut sample = sample;

    if sample < 0 {
        sign = 0x80;
        sample = sample.saturating_neg();
    } else {
        sign = 0;
    }

    if sample > MULAW_CLIP {
        sample = MULAW_CLIP;
    }
    sample += MULAW_BIAS;

    let exponent = segment(sample >> 7);
    let mantissa = ((sample >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// 8-segment exponent derived by leading-bit scan over the biased magnitude.
fn segment(val: i16) -> u8 {
    match val {
        0..=1 => 0,
        2..=3 => 1,
        4..=7 => 2,
        8..=15 => 3,
        16..=31 => 4,
        32..=63 => 5,
        64..=127 => 6,
        _ => 7,
    }
}

fn mulaw_to_pcm(mulaw: u8) -> i16 {
    let inverted = !mulaw;

    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i16;
    let mantissa = (inverted & 0x0F) as i16;

    let magnitude = ((mantissa << 3) + MULAW_BIAS) << exponent;
    let magnitude = magnitude - MULAW_BIAS;

    if sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Prepend a 44-byte canonical PCM WAV header to raw little-endian 16-bit samples.
pub fn wrap_pcm16_as_wav(pcm_le_bytes: &[u8], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align: u16 = CHANNELS * (BITS_PER_SAMPLE / 8);
    let byte_rate: u32 = sample_rate * block_align as u32;
    let data_len = pcm_le_bytes.len() as u32;
    let riff_len = 36 + data_len;

    let mut wav = Vec::with_capacity(44 + pcm_le_bytes.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&riff_len.to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm_le_bytes);

    wav
}
