//! SDP offer parsing and answer construction (RFC 3264 subset).
//!
//! The bridge answers audio offers only. Codec selection is pinned to
//! G.711 μ-law: payload type 0 when offered, otherwise the first
//! dynamic type whose rtpmap names PCMU. Some gateways advertise that
//! dynamic type as `PCMU/16000`; the advertised rate is echoed in the
//! answer for compatibility, but G.711 is defined at 8 kHz only and
//! all internal framing, timestamps and resampling assume 8 kHz.

use rand::Rng;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Clock rate G.711 actually runs at, whatever the SDP claims.
pub const G711_RATE: u32 = 8000;

/// An rtpmap entry: codec name and advertised clock rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub name: String,
    pub clock_rate: u32,
}

/// The audio media description extracted from an offer.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    /// Address from the `c=` line.
    pub connection_ip: Option<IpAddr>,
    /// Port from the `m=audio` line.
    pub audio_port: u16,
    /// Payload types in offer order.
    pub payload_types: Vec<u8>,
    /// rtpmap attributes keyed by payload type.
    pub rtpmaps: HashMap<u8, RtpMap>,
}

/// Parse the audio section of an SDP body.
pub fn parse_sdp(body: &str) -> Result<MediaDescription> {
    let mut connection_ip = None;
    let mut audio_port = None;
    let mut payload_types = Vec::new();
    let mut rtpmaps = HashMap::new();

    for line in body.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("c=IN IP4 ") {
            connection_ip = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("m=audio ") {
            let mut parts = rest.split_whitespace();
            audio_port = parts
                .next()
                .and_then(|p| p.parse().ok());
            // Skip the transport token ("RTP/AVP"), the rest are types.
            let _ = parts.next();
            payload_types = parts.filter_map(|t| t.parse().ok()).collect();
        } else if let Some(rest) = line.strip_prefix("a=rtpmap:") {
            // a=rtpmap:<pt> <name>/<rate>[/<channels>]
            let mut parts = rest.split_whitespace();
            let pt: Option<u8> = parts.next().and_then(|t| t.parse().ok());
            let encoding = parts.next().unwrap_or_default();
            let mut enc_parts = encoding.split('/');
            let name = enc_parts.next().unwrap_or_default().to_string();
            let clock_rate = enc_parts.next().and_then(|r| r.parse().ok()).unwrap_or(G711_RATE);
            if let Some(pt) = pt {
                rtpmaps.insert(pt, RtpMap { name, clock_rate });
            }
        }
    }

    let audio_port = audio_port.ok_or_else(|| Error::Sdp("no m=audio line".into()))?;
    Ok(MediaDescription {
        connection_ip,
        audio_port,
        payload_types,
        rtpmaps,
    })
}

/// The negotiated codec for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecChoice {
    /// Payload type to put on the wire.
    pub payload_type: u8,
    /// Rate to advertise in the answer's rtpmap.
    pub advertised_rate: u32,
}

impl CodecChoice {
    /// The rate all internal processing runs at. Always 8 kHz.
    pub fn internal_rate(&self) -> u32 {
        G711_RATE
    }
}

/// Select PCMU from an offer.
///
/// Static payload type 0 wins when present. Otherwise the first
/// offered type mapped to PCMU is taken, echoing its advertised rate
/// (the gateway may claim 16000 for a dynamic type). With no usable
/// offer the standard PCMU/8000 is assumed.
pub fn select_pcmu(offer: &MediaDescription) -> CodecChoice {
    if offer.payload_types.contains(&0) {
        return CodecChoice {
            payload_type: 0,
            advertised_rate: G711_RATE,
        };
    }
    for &pt in &offer.payload_types {
        if let Some(map) = offer.rtpmaps.get(&pt) {
            if map.name.eq_ignore_ascii_case("PCMU") {
                return CodecChoice {
                    payload_type: pt,
                    advertised_rate: map.clock_rate,
                };
            }
        }
    }
    CodecChoice {
        payload_type: 0,
        advertised_rate: G711_RATE,
    }
}

/// Build the answer SDP for a negotiated call.
pub fn build_answer(local_ip: IpAddr, rtp_port: u16, choice: CodecChoice) -> String {
    let mut rng = rand::thread_rng();
    let session_id: u32 = rng.gen_range(1_000_000..10_000_000);
    let session_version: u32 = rng.gen_range(1_000_000..10_000_000);
    format!(
        "v=0\r\n\
         o=- {session_id} {session_version} IN IP4 {local_ip}\r\n\
         s=voicebridge\r\n\
         c=IN IP4 {local_ip}\r\n\
         t=0 0\r\n\
         m=audio {rtp_port} RTP/AVP {pt}\r\n\
         a=rtpmap:{pt} PCMU/{rate}\r\n\
         a=sendrecv\r\n",
        pt = choice.payload_type,
        rate = choice.advertised_rate,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=caller 123 456 IN IP4 192.168.1.1\r\n\
        s=-\r\n\
        c=IN IP4 192.168.1.1\r\n\
        t=0 0\r\n\
        m=audio 40000 RTP/AVP 0 8\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:8 PCMA/8000\r\n";

    #[test]
    fn parses_standard_offer() {
        let offer = parse_sdp(OFFER).unwrap();
        assert_eq!(offer.connection_ip, Some("192.168.1.1".parse().unwrap()));
        assert_eq!(offer.audio_port, 40000);
        assert_eq!(offer.payload_types, vec![0, 8]);
        assert_eq!(
            offer.rtpmaps.get(&0),
            Some(&RtpMap {
                name: "PCMU".into(),
                clock_rate: 8000
            })
        );
    }

    #[test]
    fn prefers_static_pcmu() {
        let choice = select_pcmu(&parse_sdp(OFFER).unwrap());
        assert_eq!(choice.payload_type, 0);
        assert_eq!(choice.advertised_rate, 8000);
        assert_eq!(choice.internal_rate(), 8000);
    }

    #[test]
    fn accepts_mislabelled_dynamic_pcmu() {
        // Gateways may offer PCMU under a dynamic type labelled 16 kHz.
        let body = "c=IN IP4 10.0.0.1\r\n\
                    m=audio 7078 RTP/AVP 121 8\r\n\
                    a=rtpmap:121 PCMU/16000\r\n\
                    a=rtpmap:8 PCMA/8000\r\n";
        let choice = select_pcmu(&parse_sdp(body).unwrap());
        assert_eq!(choice.payload_type, 121);
        assert_eq!(choice.advertised_rate, 16000);
        // The wire label lies; processing stays at 8 kHz.
        assert_eq!(choice.internal_rate(), 8000);
    }

    #[test]
    fn defaults_to_pcmu_without_usable_offer() {
        let body = "c=IN IP4 10.0.0.1\r\n\
                    m=audio 7078 RTP/AVP 97\r\n\
                    a=rtpmap:97 opus/48000/2\r\n";
        let choice = select_pcmu(&parse_sdp(body).unwrap());
        assert_eq!(choice.payload_type, 0);
        assert_eq!(choice.advertised_rate, 8000);
    }

    #[test]
    fn missing_media_line_is_an_error() {
        assert!(parse_sdp("v=0\r\nc=IN IP4 1.2.3.4\r\n").is_err());
    }

    #[test]
    fn answer_has_expected_lines() {
        let answer = build_answer(
            "192.168.1.40".parse().unwrap(),
            12000,
            CodecChoice {
                payload_type: 0,
                advertised_rate: 8000,
            },
        );
        assert!(answer.starts_with("v=0\r\n"));
        assert!(answer.contains("c=IN IP4 192.168.1.40\r\n"));
        assert!(answer.contains("m=audio 12000 RTP/AVP 0\r\n"));
        assert!(answer.contains("a=rtpmap:0 PCMU/8000\r\n"));
        assert!(answer.contains("a=sendrecv\r\n"));
        assert!(answer.contains("t=0 0\r\n"));
    }

    #[test]
    fn answer_echoes_advertised_rate() {
        let answer = build_answer(
            "10.0.0.2".parse().unwrap(),
            10500,
            CodecChoice {
                payload_type: 121,
                advertised_rate: 16000,
            },
        );
        assert!(answer.contains("m=audio 10500 RTP/AVP 121\r\n"));
        assert!(answer.contains("a=rtpmap:121 PCMU/16000\r\n"));
    }
}
