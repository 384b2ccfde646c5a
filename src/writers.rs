//! Writers: serialize outgoing events into wire bytes.
//!
//! The writer enum mirrors the reader enum: head writers for the
//! request/status line plus headers, one body writer per framing mode.
//! Bytes are appended to a caller-supplied buffer; nothing is retained
//! between calls except framing bookkeeping.

use crate::error::LocalProtocolError;
use crate::events::{Event, Request, Response};
use crate::headers::Headers;

fn write_headers(headers: &Headers, out: &mut Vec<u8>) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

fn check_http_version(http_version: &[u8]) -> Result<(), LocalProtocolError> {
    if http_version != b"1.0" && http_version != b"1.1" {
        return Err(LocalProtocolError::with_hint(
            format!(
                "can't send HTTP version {:?}",
                String::from_utf8_lossy(http_version)
            ),
            505,
        ));
    }
    Ok(())
}

fn write_request_head(request: &Request, out: &mut Vec<u8>) -> Result<(), LocalProtocolError> {
    check_http_version(&request.http_version)?;
    out.extend_from_slice(&request.method);
    out.push(b' ');
    out.extend_from_slice(&request.target);
    out.extend_from_slice(b" HTTP/");
    out.extend_from_slice(&request.http_version);
    out.extend_from_slice(b"\r\n");
    write_headers(&request.headers, out);
    Ok(())
}

fn write_response_head(response: &Response, out: &mut Vec<u8>) -> Result<(), LocalProtocolError> {
    check_http_version(&response.http_version)?;
    out.extend_from_slice(b"HTTP/");
    out.extend_from_slice(&response.http_version);
    out.push(b' ');
    out.extend_from_slice(response.status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(&response.reason);
    out.extend_from_slice(b"\r\n");
    write_headers(&response.headers, out);
    Ok(())
}

/// The serializer for one direction of the connection.
#[derive(Debug)]
pub(crate) enum Writer {
    /// Client Idle: the next event is a request head.
    RequestHead,
    /// Server Idle/SendResponse: informational or final response heads.
    ResponseHead,
    ContentLength { remaining: u64 },
    Chunked,
    UntilClose,
}

impl Writer {
    pub fn content_length(length: u64) -> Writer {
        Writer::ContentLength { remaining: length }
    }

    pub fn write(&mut self, event: &Event, out: &mut Vec<u8>) -> Result<(), LocalProtocolError> {
        match (self, event) {
            (Writer::RequestHead, Event::Request(request)) => write_request_head(request, out),
            (
                Writer::ResponseHead,
                Event::Response(response) | Event::InformationalResponse(response),
            ) => write_response_head(response, out),

            (Writer::ContentLength { remaining }, Event::Data(data)) => {
                let len = data.data.len() as u64;
                if len > *remaining {
                    return Err(LocalProtocolError::new(
                        "too much data for declared Content-Length",
                    ));
                }
                *remaining -= len;
                out.extend_from_slice(&data.data);
                Ok(())
            }
            (Writer::ContentLength { remaining }, Event::EndOfMessage(end)) => {
                if *remaining != 0 {
                    return Err(LocalProtocolError::new(
                        "too little data for declared Content-Length",
                    ));
                }
                if !end.headers.is_empty() {
                    return Err(LocalProtocolError::new(
                        "Content-Length and trailers don't mix",
                    ));
                }
                Ok(())
            }

            (Writer::Chunked, Event::Data(data)) => {
                // A zero-length chunk would read as end-of-body, so skip
                // empty payloads entirely.
                if !data.data.is_empty() {
                    out.extend_from_slice(format!("{:x}\r\n", data.data.len()).as_bytes());
                    out.extend_from_slice(&data.data);
                    out.extend_from_slice(b"\r\n");
                }
                Ok(())
            }
            (Writer::Chunked, Event::EndOfMessage(end)) => {
                out.extend_from_slice(b"0\r\n");
                // Trailers ride in the same block as the final CRLF.
                write_headers(&end.headers, out);
                Ok(())
            }

            (Writer::UntilClose, Event::Data(data)) => {
                out.extend_from_slice(&data.data);
                Ok(())
            }
            (Writer::UntilClose, Event::EndOfMessage(end)) => {
                if !end.headers.is_empty() {
                    return Err(LocalProtocolError::new(
                        "can't send trailers on a close-delimited body",
                    ));
                }
                // The Connection: close machinery takes care of the rest.
                Ok(())
            }

            (writer, event) => Err(LocalProtocolError::new(format!(
                "event {:?} doesn't match the current write state {:?}",
                event.kind(),
                writer
            ))),
        }
    }
}
