//! Status-line and header-line parsing.
//!
//! Pure functions over a single line with the terminator already stripped.

use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::{StatusCode, Version};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: Cow<'static, str>,
}

/// Parses `HTTP/1.x SP DDD [SP reason]`.
///
/// Any `HTTP/1.<digit>` is accepted and reported as HTTP/1.1, except
/// `HTTP/1.0` which keeps its own version.
pub fn parse_status_line(line: &[u8]) -> Result<StatusLine, NetError> {
    const MIN_LEN: usize = 12; // "HTTP/1.1 200"
    if line.len() < MIN_LEN {
        return Err(NetError::InvalidStatusLine);
    }

    let version = match &line[..8] {
        b"HTTP/1.1" => Version::HTTP_11,
        b"HTTP/1.0" => Version::HTTP_10,
        [b'H', b'T', b'T', b'P', b'/', b'1', b'.', minor] if minor.is_ascii_digit() => {
            Version::HTTP_11
        }
        _ => return Err(NetError::InvalidStatusLine),
    };
    if line[8] != b' ' {
        return Err(NetError::InvalidStatusLine);
    }

    let mut code: u16 = 0;
    for &digit in &line[9..12] {
        if !digit.is_ascii_digit() {
            return Err(NetError::InvalidStatusLine);
        }
        code = code * 10 + u16::from(digit - b'0');
    }
    let status = StatusCode::from_u16(code).map_err(|_| NetError::InvalidStatusLine)?;

    let reason = match &line[12..] {
        [] => Cow::Borrowed(""),
        [b' ', text @ ..] => match status.canonical_reason() {
            Some(canonical) if canonical.as_bytes() == text => Cow::Borrowed(canonical),
            _ => Cow::Owned(String::from_utf8_lossy(text).into_owned()),
        },
        _ => return Err(NetError::InvalidStatusLine),
    };

    Ok(StatusLine { version, status, reason })
}

/// Parses `Name: value`.
///
/// The colon must be followed by a space or tab unless the value is
/// empty. Surrounding whitespace is trimmed from the value.
pub fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), NetError> {
    let colon = line.iter().position(|&b| b == b':').ok_or(NetError::InvalidHeaderLine)?;
    let (name, rest) = (&line[..colon], &line[colon + 1..]);
    if name.is_empty() {
        return Err(NetError::InvalidHeaderLine);
    }
    if let Some(&first) = rest.first() {
        if first != b' ' && first != b'\t' {
            return Err(NetError::InvalidHeaderLine);
        }
    }

    let name = HeaderName::from_bytes(name).map_err(|_| NetError::InvalidHeaderLine)?;
    let value = HeaderValue::from_bytes(trim_ows(rest)).map_err(|_| NetError::InvalidHeaderLine)?;
    Ok((name, value))
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Headers that describe the payload rather than the message.
pub fn is_content_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("content-")
        || name == "expires"
        || name == "last-modified"
        || name == "allow"
}

/// Writes `name` with each dash-separated word capitalised (`x-test` → `X-Test`).
pub fn write_title_case(name: &HeaderName, out: &mut Vec<u8>) {
    let mut upper = true;
    for &b in name.as_str().as_bytes() {
        out.push(if upper { b.to_ascii_uppercase() } else { b });
        upper = b == b'-';
    }
}

/// Whether a comma-separated header value contains `token` (case-insensitive).
pub fn has_token(value: &HeaderValue, token: &str) -> bool {
    value
        .as_bytes()
        .split(|&b| b == b',')
        .any(|part| trim_ows(part).eq_ignore_ascii_case(token.as_bytes()))
}

/// Last token of a comma-separated header value, trimmed.
pub fn last_token(value: &HeaderValue) -> Option<&[u8]> {
    value
        .as_bytes()
        .rsplit(|&b| b == b',')
        .map(trim_ows)
        .find(|part| !part.is_empty())
}
