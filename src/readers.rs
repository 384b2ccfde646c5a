//! Incremental readers: pull bytes out of the receive buffer, produce
//! events.
//!
//! Every reader is resumable: `next_event` either consumes enough of the
//! buffer to emit an event, or returns `None` to say "feed me more". The
//! active reader is selected by the connection from (party direction,
//! framing mode); the whole family lives in one enum so selection and
//! dispatch are exhaustive matches.
//!
//! Parse failures are reported as `LocalProtocolError` and flipped to
//! `RemoteProtocolError` by the connection; see `error.rs`.

use bytes::Bytes;

use crate::abnf::{CHUNK_HEADER_RE, HEADER_FIELD_RE, REQUEST_LINE_RE, STATUS_LINE_RE};
use crate::buffer::ReceiveBuffer;
use crate::error::LocalProtocolError;
use crate::events::{Data, EndOfMessage, Event, Request, Response};
use crate::headers::Headers;

fn decode_header_lines(lines: &[Bytes]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LocalProtocolError> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        // obs-fold continuation lines are obsolete and rejected outright.
        if line.first() == Some(&b' ') || line.first() == Some(&b'\t') {
            return Err(LocalProtocolError::new("obsolete line folding in headers"));
        }
        let caps = HEADER_FIELD_RE.captures(line).ok_or_else(|| {
            LocalProtocolError::new(format!(
                "illegal header line {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;
        out.push((caps["field_name"].to_vec(), caps["field_value"].to_vec()));
    }
    Ok(out)
}

fn read_request_head(buf: &mut ReceiveBuffer) -> Result<Option<Event>, LocalProtocolError> {
    let Some(lines) = buf.maybe_extract_lines() else {
        if buf.next_line_obviously_invalid() {
            return Err(LocalProtocolError::new("illegal request line"));
        }
        return Ok(None);
    };
    let Some((request_line, header_lines)) = lines.split_first() else {
        return Err(LocalProtocolError::new("no request line received"));
    };
    let caps = REQUEST_LINE_RE.captures(request_line).ok_or_else(|| {
        LocalProtocolError::new(format!(
            "illegal request line {:?}",
            String::from_utf8_lossy(request_line)
        ))
    })?;
    let headers = Headers::from_parsed(decode_header_lines(header_lines)?)?;
    let request = Request::new(
        caps["method"].to_vec(),
        caps["target"].to_vec(),
        headers,
        caps["http_version"].to_vec(),
    )?;
    Ok(Some(request.into()))
}

fn read_response_head(buf: &mut ReceiveBuffer) -> Result<Option<Event>, LocalProtocolError> {
    let Some(lines) = buf.maybe_extract_lines() else {
        if buf.next_line_obviously_invalid() {
            return Err(LocalProtocolError::new("illegal status line"));
        }
        return Ok(None);
    };
    let Some((status_line, header_lines)) = lines.split_first() else {
        return Err(LocalProtocolError::new("no status line received"));
    };
    let caps = STATUS_LINE_RE.captures(status_line).ok_or_else(|| {
        LocalProtocolError::new(format!(
            "illegal status line {:?}",
            String::from_utf8_lossy(status_line)
        ))
    })?;
    let http_version = caps["http_version"].to_vec();
    if http_version != b"1.0" && http_version != b"1.1" {
        return Err(LocalProtocolError::with_hint(
            format!(
                "unsupported HTTP version {:?}",
                String::from_utf8_lossy(&http_version)
            ),
            505,
        ));
    }
    // Three digits by construction; only the u16 conversion can fail, and
    // it can't.
    let status: u16 = std::str::from_utf8(&caps["status_code"])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| LocalProtocolError::new("illegal status code"))?;
    let reason = caps
        .name("reason")
        .map(|m| m.as_bytes().to_vec())
        .unwrap_or_default();
    let headers = Headers::from_parsed(decode_header_lines(header_lines)?)?;
    let response = Response {
        status,
        headers,
        http_version,
        reason,
    };
    Ok(Some(response.into()))
}

/// The incremental reader for one direction of the connection.
#[derive(Debug)]
pub(crate) enum Reader {
    /// Waiting for a request head (we are the server, they are Idle).
    RequestHead,
    /// Waiting for a response head (we are the client, they are Idle or
    /// SendResponse).
    ResponseHead,
    /// Fixed-length body.
    ContentLength { length: u64, remaining: u64 },
    /// Chunked body.
    Chunked {
        bytes_left_in_chunk: u64,
        chunk_terminator_left: u8,
        at_chunk_start: bool,
        reading_trailers: bool,
    },
    /// Close-delimited body: everything until EOF.
    UntilClose,
    /// The peer has nothing legal left to say (Done/MustClose/Closed).
    ExpectNothing,
}

impl Reader {
    pub fn content_length(length: u64) -> Reader {
        Reader::ContentLength {
            length,
            remaining: length,
        }
    }

    pub fn chunked() -> Reader {
        Reader::Chunked {
            bytes_left_in_chunk: 0,
            chunk_terminator_left: 0,
            at_chunk_start: false,
            reading_trailers: false,
        }
    }

    /// Try to produce the next event from the buffer. `None` means more
    /// data is needed.
    pub fn next_event(
        &mut self,
        buf: &mut ReceiveBuffer,
    ) -> Result<Option<Event>, LocalProtocolError> {
        match self {
            Reader::RequestHead => read_request_head(buf),
            Reader::ResponseHead => read_response_head(buf),
            Reader::ContentLength { remaining, .. } => {
                if *remaining == 0 {
                    return Ok(Some(EndOfMessage::default().into()));
                }
                match buf.maybe_extract_at_most(clamp_to_usize(*remaining)) {
                    Some(data) => {
                        *remaining -= data.len() as u64;
                        Ok(Some(Data::new(data).into()))
                    }
                    None => Ok(None),
                }
            }
            Reader::Chunked {
                bytes_left_in_chunk,
                chunk_terminator_left,
                at_chunk_start,
                reading_trailers,
            } => next_chunked_event(
                buf,
                bytes_left_in_chunk,
                chunk_terminator_left,
                at_chunk_start,
                reading_trailers,
            ),
            Reader::UntilClose => match buf.maybe_extract_at_most(usize::MAX) {
                Some(data) => Ok(Some(Data::new(data).into())),
                None => Ok(None),
            },
            Reader::ExpectNothing => {
                if buf.is_empty() {
                    Ok(None)
                } else {
                    Err(LocalProtocolError::new("got data when expecting EOF"))
                }
            }
        }
    }

    /// The buffer is drained and the peer has signalled EOF; decide what
    /// that means under the current framing.
    pub fn read_eof(&self) -> Result<Event, LocalProtocolError> {
        match self {
            Reader::ContentLength { length, remaining } => Err(LocalProtocolError::new(format!(
                "peer closed connection without sending complete message body \
                 (received {} bytes, expected {})",
                length - remaining,
                length
            ))),
            Reader::Chunked { .. } => Err(LocalProtocolError::new(
                "peer closed connection without sending complete message body \
                 (incomplete chunked read)",
            )),
            // EOF is how a close-delimited body ends.
            Reader::UntilClose => Ok(EndOfMessage::default().into()),
            // EOF at a message boundary is a clean close.
            Reader::RequestHead | Reader::ResponseHead | Reader::ExpectNothing => {
                Ok(Event::ConnectionClosed)
            }
        }
    }
}

fn clamp_to_usize(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

fn next_chunked_event(
    buf: &mut ReceiveBuffer,
    bytes_left_in_chunk: &mut u64,
    chunk_terminator_left: &mut u8,
    at_chunk_start: &mut bool,
    reading_trailers: &mut bool,
) -> Result<Option<Event>, LocalProtocolError> {
    loop {
        if *reading_trailers {
            let Some(lines) = buf.maybe_extract_lines() else {
                return Ok(None);
            };
            let trailers = Headers::from_parsed(decode_header_lines(&lines)?)?;
            return Ok(Some(EndOfMessage::with_trailers(trailers).into()));
        }
        if *chunk_terminator_left > 0 {
            // Discard the CRLF that closes the previous chunk-data. It may
            // arrive split across reads.
            let Some(discarded) = buf.maybe_extract_at_most(*chunk_terminator_left as usize)
            else {
                return Ok(None);
            };
            *chunk_terminator_left -= discarded.len() as u8;
            continue;
        }
        if *bytes_left_in_chunk == 0 {
            let Some(line) = buf.maybe_extract_next_line() else {
                return Ok(None);
            };
            let caps = CHUNK_HEADER_RE.captures(&line).ok_or_else(|| {
                LocalProtocolError::new(format!(
                    "illegal chunk header {:?}",
                    String::from_utf8_lossy(&line)
                ))
            })?;
            let size = std::str::from_utf8(&caps["chunk_size"])
                .ok()
                .and_then(|digits| u64::from_str_radix(digits, 16).ok())
                .ok_or_else(|| LocalProtocolError::new("chunk size too large"))?;
            if size == 0 {
                *reading_trailers = true;
                continue;
            }
            *bytes_left_in_chunk = size;
            *at_chunk_start = true;
            continue;
        }
        return match buf.maybe_extract_at_most(clamp_to_usize(*bytes_left_in_chunk)) {
            Some(data) => {
                *bytes_left_in_chunk -= data.len() as u64;
                let chunk_start = std::mem::replace(at_chunk_start, false);
                let chunk_end = *bytes_left_in_chunk == 0;
                if chunk_end {
                    *chunk_terminator_left = 2;
                }
                Ok(Some(
                    Data {
                        data,
                        chunk_start,
                        chunk_end,
                    }
                    .into(),
                ))
            }
            None => Ok(None),
        };
    }
}
