//! ITU-T G.711 companding.
//!
//! G.711 maps 16-bit linear PCM to 8-bit logarithmic samples and is the
//! baseline codec of the PSTN. Both variants are implemented:
//!
//! - μ-law (PCMU, payload type 0), used in North America and Japan
//! - A-law (PCMA, payload type 8), used in Europe and the rest of the world
//!
//! The segment/mantissa arithmetic follows the classic reference
//! companding algorithm; no lookup tables are required at these frame
//! sizes. G.711 is defined at 8 kHz only, whatever a peer's SDP claims.

use crate::error::{CodecError, Result};
use crate::Sample;
use tracing::trace;

/// Samples per 20 ms frame at 8 kHz.
pub const SAMPLES_PER_FRAME: usize = 160;

/// μ-law byte encoding a zero sample. Used as the silence payload.
pub const ULAW_SILENCE: u8 = 0xFF;

/// A-law byte encoding a zero sample.
pub const ALAW_SILENCE: u8 = 0xD5;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

/// G.711 codec variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Variant {
    /// μ-law (PCMU, payload type 0)
    MuLaw,
    /// A-law (PCMA, payload type 8)
    ALaw,
}

/// Find the companding segment for a magnitude, starting from the first
/// segment boundary. Segments double in width; there are eight of them.
fn segment(value: i32, first_bound: i32) -> u32 {
    let mut seg = 0;
    let mut bound = first_bound;
    while seg < 7 && value > bound {
        seg += 1;
        bound = (bound << 1) | 1;
    }
    seg
}

/// Encode one 16-bit linear sample to 8-bit μ-law.
pub fn encode_ulaw(sample: Sample) -> u8 {
    let mut pcm = sample as i32;
    let sign: u8 = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > ULAW_CLIP {
        pcm = ULAW_CLIP;
    }
    pcm += ULAW_BIAS;

    let seg = segment(pcm, 0xFF);
    let mantissa = ((pcm >> (seg + 3)) & 0x0F) as u8;
    // The wire byte is the one's complement of sign|segment|mantissa.
    !(sign | ((seg as u8) << 4) | mantissa)
}

/// Decode one 8-bit μ-law byte to a 16-bit linear sample.
pub fn decode_ulaw(byte: u8) -> Sample {
    let u = !byte;
    let seg = (u & 0x70) >> 4;
    let mut magnitude = (((u & 0x0F) as i32) << 3) + ULAW_BIAS;
    magnitude <<= seg;
    if u & 0x80 != 0 {
        (ULAW_BIAS - magnitude) as Sample
    } else {
        (magnitude - ULAW_BIAS) as Sample
    }
}

/// Encode one 16-bit linear sample to 8-bit A-law.
pub fn encode_alaw(sample: Sample) -> u8 {
    // A-law operates on 13-bit magnitudes.
    let mut pcm = (sample as i32) >> 3;
    let mask: u8 = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let seg = segment(pcm, 0x1F);
    let mut aval = (seg as u8) << 4;
    if seg < 2 {
        aval |= ((pcm >> 1) & 0x0F) as u8;
    } else {
        aval |= ((pcm >> seg) & 0x0F) as u8;
    }
    aval ^ mask
}

/// Decode one 8-bit A-law byte to a 16-bit linear sample.
pub fn decode_alaw(byte: u8) -> Sample {
    let a = byte ^ 0x55;
    let seg = (a & 0x70) >> 4;
    let mut magnitude = ((a & 0x0F) as i32) << 4;
    match seg {
        0 => magnitude += 0x8,
        1 => magnitude += 0x108,
        _ => {
            magnitude += 0x108;
            magnitude <<= seg - 1;
        }
    }
    if a & 0x80 != 0 {
        magnitude as Sample
    } else {
        (-magnitude) as Sample
    }
}

/// Decode a μ-law payload into little-endian PCM16 bytes.
///
/// The output is exactly twice the input length.
pub fn ulaw_to_pcm16(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() * 2);
    for &byte in payload {
        out.extend_from_slice(&decode_ulaw(byte).to_le_bytes());
    }
    out
}

/// Encode little-endian PCM16 bytes into a μ-law payload.
///
/// The input length must be even; the output is exactly half of it.
pub fn pcm16_to_ulaw(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::UnalignedPcm { len: pcm.len() });
    }
    let mut out = Vec::with_capacity(pcm.len() / 2);
    for pair in pcm.chunks_exact(2) {
        out.push(encode_ulaw(Sample::from_le_bytes([pair[0], pair[1]])));
    }
    Ok(out)
}

/// A G.711 codec bound to one variant.
#[derive(Debug, Clone, Copy)]
pub struct G711Codec {
    variant: G711Variant,
}

impl G711Codec {
    pub fn new(variant: G711Variant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> G711Variant {
        self.variant
    }

    /// RTP codec name as it appears in an rtpmap attribute.
    pub fn name(&self) -> &'static str {
        match self.variant {
            G711Variant::MuLaw => "PCMU",
            G711Variant::ALaw => "PCMA",
        }
    }

    /// Static RTP payload type.
    pub fn payload_type(&self) -> u8 {
        match self.variant {
            G711Variant::MuLaw => 0,
            G711Variant::ALaw => 8,
        }
    }

    /// G.711 is 8 kHz only.
    pub fn sample_rate(&self) -> u32 {
        8000
    }

    /// The wire byte representing silence for this variant.
    pub fn silence_byte(&self) -> u8 {
        match self.variant {
            G711Variant::MuLaw => ULAW_SILENCE,
            G711Variant::ALaw => ALAW_SILENCE,
        }
    }

    /// Encode linear samples into wire bytes, one byte per sample.
    pub fn encode(&self, samples: &[Sample]) -> Vec<u8> {
        let encode = match self.variant {
            G711Variant::MuLaw => encode_ulaw,
            G711Variant::ALaw => encode_alaw,
        };
        let out: Vec<u8> = samples.iter().map(|&s| encode(s)).collect();
        trace!("G.711 {} encoded {} samples", self.name(), out.len());
        out
    }

    /// Decode wire bytes into linear samples, one sample per byte.
    pub fn decode(&self, payload: &[u8]) -> Vec<Sample> {
        let decode = match self.variant {
            G711Variant::MuLaw => decode_ulaw,
            G711Variant::ALaw => decode_alaw,
        };
        payload.iter().map(|&b| decode(b)).collect()
    }
}
