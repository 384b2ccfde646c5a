//! Header handling.
//!
//! The semantic type is "ordered sequence of (name, value) byte-string
//! pairs". Order matters (Set-Cookie, duplicate fields), so the primary
//! representation is the raw sequence in received case; name comparisons
//! are done case-insensitively on demand rather than through a lookup map.

use crate::abnf::{CONTENT_LENGTH_RE, FIELD_NAME_RE, FIELD_VALUE_RE};
use crate::error::LocalProtocolError;
use crate::events::Request;

/// An ordered, case-preserving sequence of header fields.
///
/// Built through [`Headers::from_pairs`], which validates and normalizes;
/// there is no way to construct an unvalidated instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Headers {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Headers {
    /// Validate and normalize caller-supplied header pairs.
    ///
    /// Rejects illegal field names and values, conflicting repeated
    /// `Content-Length` headers, repeated `Transfer-Encoding` headers, and
    /// transfer codings other than `chunked`/`identity`. Leading/trailing
    /// optional whitespace on values is stripped.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, LocalProtocolError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(n, v)| (n.as_ref().to_vec(), v.as_ref().to_vec()))
            .collect();
        normalize_and_validate(pairs, false)
    }

    /// Same normalization for fields that came off the wire; the tokenizer
    /// has already enforced the name/value grammar.
    pub(crate) fn from_parsed(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Self, LocalProtocolError> {
        normalize_and_validate(pairs, true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_slice(), value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive presence check.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    fn push(&mut self, name: Vec<u8>, value: Vec<u8>) {
        self.entries.push((name, value));
    }
}

fn strip_ows(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map(|idx| idx + 1)
        .unwrap_or(start);
    &value[start..end]
}

fn normalize_and_validate(
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
    parsed: bool,
) -> Result<Headers, LocalProtocolError> {
    let mut out = Headers::default();
    let mut seen_content_length: Option<Vec<u8>> = None;
    let mut saw_transfer_encoding = false;
    for (name, value) in pairs {
        if !parsed {
            if !FIELD_NAME_RE.is_match(&name) {
                return Err(LocalProtocolError::new(format!(
                    "illegal header name {:?}",
                    String::from_utf8_lossy(&name)
                )));
            }
            if !FIELD_VALUE_RE.is_match(strip_ows(&value)) {
                return Err(LocalProtocolError::new(format!(
                    "illegal header value for {:?}",
                    String::from_utf8_lossy(&name)
                )));
            }
        }
        let value = strip_ows(&value).to_vec();
        if name.eq_ignore_ascii_case(b"content-length") {
            // "If a message is received that has multiple Content-Length
            // header fields with field-values consisting of the same
            // decimal value ... the recipient MUST either reject the
            // message as invalid or replace the duplicated field-values
            // with a single valid Content-Length field."
            // https://tools.ietf.org/html/rfc7230#section-3.3.2
            let lengths: Vec<&[u8]> = value
                .split(|&b| b == b',')
                .map(strip_ows)
                .filter(|piece| !piece.is_empty())
                .collect();
            let length = match lengths.as_slice() {
                [single] => single.to_vec(),
                [first, rest @ ..] if rest.iter().all(|l| l == first) => first.to_vec(),
                _ => {
                    return Err(LocalProtocolError::new("conflicting Content-Length headers"));
                }
            };
            if !CONTENT_LENGTH_RE.is_match(&length) {
                return Err(LocalProtocolError::new("bad Content-Length"));
            }
            match &seen_content_length {
                None => {
                    seen_content_length = Some(length.clone());
                    out.push(name, length);
                }
                Some(seen) if *seen == length => {
                    // identical repeat, drop it
                }
                Some(_) => {
                    return Err(LocalProtocolError::new("conflicting Content-Length headers"));
                }
            }
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            // "A server that receives a request message with a transfer
            // coding it does not understand SHOULD respond with 501."
            // https://tools.ietf.org/html/rfc7230#section-3.3.1
            if saw_transfer_encoding {
                return Err(LocalProtocolError::with_hint(
                    "multiple Transfer-Encoding headers",
                    501,
                ));
            }
            // "All transfer-coding names are case-insensitive."
            // https://tools.ietf.org/html/rfc7230#section-4
            let value = value.to_ascii_lowercase();
            for coding in value.split(|&b| b == b',').map(strip_ows) {
                if coding != b"chunked" && coding != b"identity" {
                    return Err(LocalProtocolError::with_hint(
                        format!(
                            "unsupported Transfer-Encoding {:?}",
                            String::from_utf8_lossy(coding)
                        ),
                        501,
                    ));
                }
            }
            saw_transfer_encoding = true;
            out.push(name, value);
        } else {
            out.push(name, value);
        }
    }
    Ok(out)
}

/// Collect the comma-separated elements of every occurrence of a
/// list-valued header (Connection, Transfer-Encoding, Upgrade, Expect).
/// Elements come back lowercased and OWS-stripped; all the tokens these
/// headers carry are case-insensitive.
pub(crate) fn get_comma_header(headers: &Headers, name: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for (found_name, value) in headers.iter() {
        if found_name.eq_ignore_ascii_case(name) {
            for piece in value.split(|&b| b == b',') {
                let piece = strip_ows(piece);
                if !piece.is_empty() {
                    out.push(piece.to_ascii_lowercase());
                }
            }
        }
    }
    out
}

/// Replace every occurrence of `name` with one entry per element of
/// `new_values`, appended at the end in order. An empty `new_values`
/// deletes the header.
pub(crate) fn set_comma_header(
    headers: &Headers,
    name: &[u8],
    new_values: Vec<Vec<u8>>,
) -> Result<Headers, LocalProtocolError> {
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = headers
        .iter()
        .filter(|(found_name, _)| !found_name.eq_ignore_ascii_case(name))
        .map(|(n, v)| (n.to_vec(), v.to_vec()))
        .collect();
    for value in new_values {
        pairs.push((name.to_vec(), value));
    }
    normalize_and_validate(pairs, false)
}

pub(crate) fn has_expect_100_continue(request: &Request) -> bool {
    // "A server that receives a 100-continue expectation in an HTTP/1.0
    // request MUST ignore that expectation."
    // https://tools.ietf.org/html/rfc7231#section-5.1.1
    if request.http_version < b"1.1"[..].to_vec() {
        return false;
    }
    get_comma_header(&request.headers, b"expect")
        .iter()
        .any(|token| token == b"100-continue")
}
