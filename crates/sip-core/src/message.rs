//! SIP message model: methods, headers, requests and responses.
//!
//! Parsing is line-oriented over the UDP datagram text. Header names
//! are matched case-insensitively and serialized in insertion order
//! with CRLF line endings.

use rand::Rng;
use std::fmt;

use crate::error::{Error, Result};

/// SIP request methods the bridge sends or accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Options,
    /// Anything else; parsed so unknown requests can be ignored cleanly.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Options => "OPTIONS",
            Method::Other(name) => name,
        }
    }
}

impl From<&str> for Method {
    fn from(token: &str) -> Self {
        match token {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value of the named header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence or append.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.into(),
            None => self.push(name, value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn write_to(&self, out: &mut String) {
        for (name, value) in &self.0 {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
    }
}

/// A SIP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
    pub body: String,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: String::new(),
        }
    }

    /// Parsed CSeq header: sequence number and method token.
    pub fn cseq(&self) -> Result<(u32, String)> {
        parse_cseq(self.headers.get("CSeq"))
    }

    pub fn call_id(&self) -> Result<&str> {
        self.headers.get("Call-ID").ok_or(Error::MissingHeader("Call-ID"))
    }

    /// User part of the From URI: the caller's identity as the
    /// gateway presents it (`"Name" <sip:USER@host>` or bare).
    pub fn caller_identity(&self) -> Option<String> {
        let from = self.headers.get("From")?;
        let start = from.find("sip:")? + 4;
        let rest = &from[start..];
        let end = rest.find(|c| c == '@' || c == '>' || c == ';')?;
        Some(rest[..end].to_string())
    }

    pub fn to_wire(&self) -> String {
        let mut out = format!("{} {} SIP/2.0\r\n", self.method, self.uri);
        self.headers.write_to(&mut out);
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// A SIP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Headers::new(),
            body: String::new(),
        }
    }

    pub fn cseq(&self) -> Result<(u32, String)> {
        parse_cseq(self.headers.get("CSeq"))
    }

    pub fn call_id(&self) -> Result<&str> {
        self.headers.get("Call-ID").ok_or(Error::MissingHeader("Call-ID"))
    }

    /// `Expires` header as seconds, if present and numeric.
    pub fn expires(&self) -> Option<u32> {
        self.headers.get("Expires")?.trim().parse().ok()
    }

    pub fn to_wire(&self) -> String {
        let mut out = format!("SIP/2.0 {} {}\r\n", self.status, self.reason);
        self.headers.write_to(&mut out);
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// Either kind of SIP message.
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

fn parse_cseq(value: Option<&str>) -> Result<(u32, String)> {
    let value = value.ok_or(Error::MissingHeader("CSeq"))?;
    let mut parts = value.split_whitespace();
    let seq = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::Parse(format!("bad CSeq: {value}")))?;
    let method = parts.next().unwrap_or_default().to_string();
    Ok((seq, method))
}

/// Parse one UDP datagram as a SIP message.
pub fn parse_message(text: &str) -> Result<SipMessage> {
    let mut lines = text.split("\r\n");
    let start_line = lines
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::Parse("empty datagram".into()))?;

    let mut headers = Headers::new();
    let mut body = String::new();
    let mut in_body = false;
    for line in lines {
        if in_body {
            if !body.is_empty() {
                body.push_str("\r\n");
            }
            body.push_str(line);
        } else if line.is_empty() {
            in_body = true;
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push(name.trim(), value.trim());
        }
        // Header lines without a colon are silently skipped; the
        // gateway occasionally pads keep-alive datagrams.
    }

    if let Some(rest) = start_line.strip_prefix("SIP/2.0 ") {
        let mut parts = rest.splitn(2, ' ');
        let status = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| Error::Parse(format!("bad status line: {start_line}")))?;
        let reason = parts.next().unwrap_or_default().to_string();
        Ok(SipMessage::Response(Response {
            status,
            reason,
            headers,
            body,
        }))
    } else {
        let mut parts = start_line.split_whitespace();
        let method_token = parts.next().unwrap_or_default();
        let uri = parts
            .next()
            .ok_or_else(|| Error::Parse(format!("bad request line: {start_line}")))?;
        let version = parts.next().unwrap_or_default();
        if version != "SIP/2.0" {
            return Err(Error::Parse(format!("unsupported version: {start_line}")));
        }
        Ok(SipMessage::Request(Request {
            method: Method::from(method_token),
            uri: uri.to_string(),
            headers,
            body,
        }))
    }
}

fn random_hex(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

/// Via branch parameter: magic cookie plus 16 random hex digits.
pub fn generate_branch() -> String {
    format!("z9hG4bK{}", random_hex(16))
}

/// From/To tag: 8 random hex digits.
pub fn generate_tag() -> String {
    random_hex(8)
}

/// Call-ID: 32 random hex digits, the shape the gateway expects.
pub fn generate_call_id() -> String {
    random_hex(32)
}
