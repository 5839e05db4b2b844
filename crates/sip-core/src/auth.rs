//! RFC 2617 digest authentication (MD5, no qop).
//!
//! Residential registrars challenge REGISTER and OPTIONS with a plain
//! MD5 digest. The response is
//! `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`; `opaque` is
//! echoed back when the challenge carried one.

use md5::{Digest, Md5};

/// A parsed WWW-Authenticate / Proxy-Authenticate digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Extract realm/nonce/opaque from a challenge header value.
    /// Returns `None` unless the scheme is Digest and both realm and
    /// nonce are present.
    pub fn parse(header: &str) -> Option<Self> {
        if !header.trim_start().starts_with("Digest") {
            return None;
        }
        let realm = quoted_param(header, "realm")?;
        let nonce = quoted_param(header, "nonce")?;
        let opaque = quoted_param(header, "opaque");
        Some(Self {
            realm,
            nonce,
            opaque,
        })
    }
}

/// Find `name="value"` inside a challenge header.
fn quoted_param(header: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let lower = header.to_ascii_lowercase();
    let start = lower.find(&needle.to_ascii_lowercase())? + needle.len();
    let rest = &header[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn md5_hex(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Compute the Authorization header value for a challenged request.
pub fn digest_authorization(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
) -> String {
    let ha1 = md5_hex(&format!("{username}:{}:{password}", challenge.realm));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let response = md5_hex(&format!("{ha1}:{}:{ha2}", challenge.nonce));

    let mut header = format!(
        "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\"",
        challenge.realm, challenge.nonce
    );
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_challenge_with_opaque() {
        let header = r#"Digest realm="fritz.box", nonce="1A2B3C4D", opaque="xyz", algorithm=MD5"#;
        let challenge = DigestChallenge::parse(header).unwrap();
        assert_eq!(challenge.realm, "fritz.box");
        assert_eq!(challenge.nonce, "1A2B3C4D");
        assert_eq!(challenge.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn rejects_non_digest_schemes() {
        assert!(DigestChallenge::parse("Basic realm=\"x\"").is_none());
        assert!(DigestChallenge::parse("Digest nonce=\"only\"").is_none());
    }

    #[test]
    fn register_response_vector() {
        // HA1 = MD5("user:fritz.box:pw"), HA2 = MD5("REGISTER:sip:registrar"),
        // response = MD5(HA1:abc123:HA2).
        let challenge = DigestChallenge {
            realm: "fritz.box".into(),
            nonce: "abc123".into(),
            opaque: None,
        };
        let header = digest_authorization("user", "pw", "REGISTER", "sip:registrar", &challenge);
        assert!(header.contains("response=\"d49b2886b0a83d652a74e16fa890195f\""));
        assert!(header.contains("username=\"user\""));
        assert!(header.contains("uri=\"sip:registrar\""));
        assert!(!header.contains("opaque"));
    }

    #[test]
    fn account_style_vector_with_numeric_user() {
        let challenge = DigestChallenge {
            realm: "fritz.box".into(),
            nonce: "0A1B2C".into(),
            opaque: None,
        };
        let header =
            digest_authorization("621234567", "secret", "REGISTER", "sip:fritz.box", &challenge);
        assert!(header.contains("response=\"4978e417e4c381b70020e80e6810c016\""));
    }

    #[test]
    fn opaque_is_echoed() {
        let challenge = DigestChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            opaque: Some("cookie".into()),
        };
        let header = digest_authorization("u", "p", "OPTIONS", "sip:r", &challenge);
        assert!(header.ends_with("opaque=\"cookie\""));
    }
}
