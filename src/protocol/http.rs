//! Minimal HTTP/1.1 message model for the opening handshake.
//!
//! The processor only needs a method, a version, a status and a header
//! map with case-insensitive lookup. Raw parsing and serialization are
//! provided for tests and for embedders without an HTTP stack of their
//! own; anything beyond a complete header block is left to the caller.

use std::fmt;

use crate::error::{Error, Result};
use crate::extensions::{ExtensionOffer, ExtensionParam};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Header map with case-insensitive names that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Look up a header value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// `true` if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Set a header, replacing any existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Add a header value. A repeated name is folded into the existing
    /// entry as a comma-separated list.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => {
                let existing = &mut self.entries[i].1;
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of distinct headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if the comma-separated header `name` contains `token`,
    /// compared case-insensitively.
    #[must_use]
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
    }

    fn write_to(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        f.write_str("\r\n")
    }
}

/// HTTP request as seen by the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/chat?room=1`.
    pub uri: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Request headers.
    pub headers: HeaderMap,
}

impl Request {
    /// Create an `HTTP/1.1` request with no headers.
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
        }
    }

    /// Convenience lookup into [`headers`](Self::headers).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Parse a complete request head.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedHttp` if the head is incomplete, not
    /// UTF-8, or does not have a three-part request line.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (start, headers) = parse_head(data)?;
        let mut parts = start.split(' ').filter(|p| !p.is_empty());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(uri), Some(version), None) => Ok(Self {
                method: method.to_string(),
                uri: uri.to_string(),
                version: version.to_string(),
                headers,
            }),
            _ => Err(Error::MalformedHttp(format!("invalid request line: {}", start))),
        }
    }

    /// Serialize the request head.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, self.version)?;
        self.headers.write_to(f)
    }
}

/// HTTP response as seen by the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status: 200,
            reason: "OK".to_string(),
            headers: HeaderMap::new(),
        }
    }
}

impl Response {
    /// Create an empty `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status code and its standard reason phrase.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
        self.reason = reason_phrase(status).to_string();
    }

    /// Convenience lookup into [`headers`](Self::headers).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Parse a complete response head.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedHttp` if the head is incomplete, not UTF-8,
    /// or the status line is malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (start, headers) = parse_head(data)?;
        let malformed = || Error::MalformedHttp(format!("invalid status line: {}", start));

        let (version, rest) = start.split_once(' ').ok_or_else(malformed)?;
        let (status, reason) = rest.split_once(' ').unwrap_or((rest, ""));
        let status = status.parse::<u16>().map_err(|_| malformed())?;

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers,
        })
    }

    /// Serialize the response head.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.version, self.status, self.reason)?;
        self.headers.write_to(f)
    }
}

/// Standard reason phrase for the status codes the handshake uses.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Split a head into its start line and headers.
fn parse_head(data: &[u8]) -> Result<(&str, HeaderMap)> {
    let end = data
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .ok_or_else(|| Error::MalformedHttp("incomplete header block".into()))?;
    let text = std::str::from_utf8(&data[..end])
        .map_err(|_| Error::MalformedHttp("header block is not UTF-8".into()))?;

    let mut lines = text.split("\r\n");
    let start = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::MalformedHttp("missing start line".into()))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedHttp(format!("invalid header line: {}", line)))?;
        let name = name.trim();
        if name.is_empty() || !name.bytes().all(is_tchar) {
            return Err(Error::MalformedHttp(format!("invalid header name: {}", name)));
        }
        headers.append(name, value.trim());
    }
    Ok((start, headers))
}

/// RFC 7230 `tchar`.
const fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.'
        | b'^' | b'_' | b'`' | b'|' | b'~')
        || b.is_ascii_alphanumeric()
}

/// `true` if `s` is a non-empty RFC 7230 token.
#[must_use]
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_tchar)
}

/// Parse a comma-separated token list such as `Sec-WebSocket-Protocol`.
///
/// Returns `None` if any element is empty or not a token.
#[must_use]
pub fn token_list(value: &str) -> Option<Vec<String>> {
    value
        .split(',')
        .map(str::trim)
        .map(|t| is_token(t).then(|| t.to_string()))
        .collect()
}

/// Parse an extension header into offers (RFC 6455 Section 9.1).
///
/// ```text
/// extension-list = 1#extension
/// extension      = token *( ";" extension-param )
/// extension-param = token [ "=" ( token | quoted-string ) ]
/// ```
///
/// # Errors
///
/// Returns `Error::ExtensionParseError` on any syntax violation.
pub fn parameter_list(value: &str) -> Result<Vec<ExtensionOffer>> {
    let mut offers = Vec::new();
    for item in split_unquoted(value, ',')? {
        let mut parts = split_unquoted(item, ';')?.into_iter();
        let name = parts.next().map(str::trim).unwrap_or_default();
        if !is_token(name) {
            return Err(Error::ExtensionParseError);
        }
        let params = parts.map(parse_param).collect::<Result<Vec<_>>>()?;
        offers.push(ExtensionOffer::with_params(name, params));
    }
    Ok(offers)
}

fn parse_param(raw: &str) -> Result<ExtensionParam> {
    let raw = raw.trim();
    let Some((name, value)) = raw.split_once('=') else {
        return if is_token(raw) {
            Ok(ExtensionParam::flag(raw))
        } else {
            Err(Error::ExtensionParseError)
        };
    };

    let name = name.trim();
    let value = value.trim();
    if !is_token(name) {
        return Err(Error::ExtensionParseError);
    }
    let value = match value.strip_prefix('"') {
        Some(quoted) => quoted
            .strip_suffix('"')
            .map(|v| v.replace("\\\"", "\""))
            .ok_or(Error::ExtensionParseError)?,
        None if is_token(value) => value.to_string(),
        None => return Err(Error::ExtensionParseError),
    };
    Ok(ExtensionParam::new(name, value))
}

/// Split on `sep` outside double quotes. Empty elements are an error.
fn split_unquoted(s: &str, sep: char) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if quoted {
        return Err(Error::ExtensionParseError);
    }
    parts.push(&s[start..]);
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::ExtensionParseError);
    }
    Ok(parts)
}
