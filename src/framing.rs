//! Deciding how a message body is delimited on the wire.
//!
//! Reference: https://tools.ietf.org/html/rfc7230#section-3.3.3

use crate::error::LocalProtocolError;
use crate::events::{Request, Response};
use crate::headers::get_comma_header;

/// How a message body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    /// Exactly this many bytes. Zero means no body at all.
    ContentLength(u64),
    Chunked,
    /// The body runs until the peer closes the connection. Responses only.
    UntilClose,
}

// Chunked framing triggers on "chunked" as the final transfer coding;
// "identity" is a no-op and falls through to Content-Length.
fn has_chunked_framing(transfer_encodings: &[Vec<u8>]) -> bool {
    transfer_encodings.last().map(Vec::as_slice) == Some(&b"chunked"[..])
}

fn declared_content_length(
    content_lengths: &[Vec<u8>],
) -> Result<Option<u64>, LocalProtocolError> {
    let Some(value) = content_lengths.first() else {
        return Ok(None);
    };
    // The digits are already validated; what's left to catch is overflow.
    let length = std::str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse::<u64>().ok())
        .filter(|&length| length <= i64::MAX as u64)
        .ok_or_else(|| LocalProtocolError::new("Content-Length too large"))?;
    Ok(Some(length))
}

pub(crate) fn request_body_framing(request: &Request) -> Result<BodyFraming, LocalProtocolError> {
    let transfer_encodings = get_comma_header(&request.headers, b"transfer-encoding");
    if has_chunked_framing(&transfer_encodings) {
        return Ok(BodyFraming::Chunked);
    }
    // A request can't be close-delimited: chunked anywhere but last leaves
    // the length unknowable. Identity alone is a no-op and falls through.
    if transfer_encodings.iter().any(|coding| coding == b"chunked") {
        return Err(LocalProtocolError::new(
            "request Transfer-Encoding must end in chunked",
        ));
    }
    match declared_content_length(&get_comma_header(&request.headers, b"content-length"))? {
        Some(length) => Ok(BodyFraming::ContentLength(length)),
        None => Ok(BodyFraming::ContentLength(0)),
    }
}

pub(crate) fn response_body_framing(
    request_method: Option<&[u8]>,
    response: &Response,
) -> Result<BodyFraming, LocalProtocolError> {
    // Some responses never have a body, whatever the headers say. 1xx
    // responses travel as InformationalResponse and never get here.
    debug_assert!(response.status >= 200);
    if response.status == 204
        || response.status == 304
        || request_method == Some(&b"HEAD"[..])
        || (request_method == Some(&b"CONNECT"[..]) && (200..300).contains(&response.status))
    {
        return Ok(BodyFraming::ContentLength(0));
    }

    // Transfer-Encoding beats Content-Length.
    let transfer_encodings = get_comma_header(&response.headers, b"transfer-encoding");
    if has_chunked_framing(&transfer_encodings) {
        return Ok(BodyFraming::Chunked);
    }

    match declared_content_length(&get_comma_header(&response.headers, b"content-length"))? {
        Some(length) => Ok(BodyFraming::ContentLength(length)),
        None => Ok(BodyFraming::UntilClose),
    }
}
