//! The high-level events the engine consumes and produces.

use bytes::Bytes;

use crate::abnf::{METHOD_RE, REQUEST_TARGET_RE};
use crate::error::LocalProtocolError;
use crate::headers::Headers;

/// The head of an HTTP request (client → server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Vec<u8>,
    pub target: Vec<u8>,
    pub headers: Headers,
    pub http_version: Vec<u8>,
}

impl Request {
    pub fn new(
        method: impl Into<Vec<u8>>,
        target: impl Into<Vec<u8>>,
        headers: Headers,
        http_version: impl Into<Vec<u8>>,
    ) -> Result<Self, LocalProtocolError> {
        let request = Request {
            method: method.into(),
            target: target.into(),
            headers,
            http_version: http_version.into(),
        };
        if !METHOD_RE.is_match(&request.method) {
            return Err(LocalProtocolError::new("illegal method characters"));
        }
        if !REQUEST_TARGET_RE.is_match(&request.target) {
            return Err(LocalProtocolError::new("illegal target characters"));
        }
        if request.http_version != b"1.0" && request.http_version != b"1.1" {
            return Err(LocalProtocolError::with_hint(
                format!(
                    "unsupported HTTP version {:?}",
                    String::from_utf8_lossy(&request.http_version)
                ),
                505,
            ));
        }
        // "A client MUST send a Host header field in all HTTP/1.1 request
        // messages." https://tools.ietf.org/html/rfc7230#section-5.4
        let host_count = request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(b"host"))
            .count();
        if request.http_version == b"1.1" && host_count == 0 {
            return Err(LocalProtocolError::new("missing mandatory Host: header"));
        }
        if host_count > 1 {
            return Err(LocalProtocolError::new("found multiple Host: headers"));
        }
        Ok(request)
    }
}

/// The head of an HTTP response (server → client).
///
/// A status of 100-199 travels as [`Event::InformationalResponse`],
/// anything else as [`Event::Response`]; converting a `Response` into an
/// [`Event`] picks the right variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub http_version: Vec<u8>,
    pub reason: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: Headers) -> Self {
        Response {
            status,
            headers,
            http_version: b"1.1".to_vec(),
            reason: Vec::new(),
        }
    }

    pub fn with_http_version(mut self, http_version: impl Into<Vec<u8>>) -> Self {
        self.http_version = http_version.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<Vec<u8>>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// A piece of message body.
///
/// For chunked framing, `chunk_start`/`chunk_end` report whether this
/// payload begins/ends a wire chunk. For other framing they are always
/// false, and writers ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Data {
    pub data: Bytes,
    pub chunk_start: bool,
    pub chunk_end: bool,
}

impl Data {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Data {
            data: data.into(),
            chunk_start: false,
            chunk_end: false,
        }
    }
}

/// The end of a message body. `headers` holds chunked trailers, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfMessage {
    pub headers: Headers,
}

impl EndOfMessage {
    pub fn with_trailers(headers: Headers) -> Self {
        EndOfMessage { headers }
    }
}

/// Everything that can happen on a connection, as one tagged sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(Request),
    InformationalResponse(Response),
    Response(Response),
    Data(Data),
    EndOfMessage(EndOfMessage),
    ConnectionClosed,
}

/// Discriminant of [`Event`], for state-machine tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Request,
    InformationalResponse,
    Response,
    Data,
    EndOfMessage,
    ConnectionClosed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Request(_) => EventKind::Request,
            Event::InformationalResponse(_) => EventKind::InformationalResponse,
            Event::Response(_) => EventKind::Response,
            Event::Data(_) => EventKind::Data,
            Event::EndOfMessage(_) => EventKind::EndOfMessage,
            Event::ConnectionClosed => EventKind::ConnectionClosed,
        }
    }
}

impl From<Request> for Event {
    fn from(request: Request) -> Self {
        Event::Request(request)
    }
}

impl From<Response> for Event {
    fn from(response: Response) -> Self {
        match response.status {
            100..=199 => Event::InformationalResponse(response),
            _ => Event::Response(response),
        }
    }
}

impl From<Data> for Event {
    fn from(data: Data) -> Self {
        Event::Data(data)
    }
}

impl From<EndOfMessage> for Event {
    fn from(end: EndOfMessage) -> Self {
        Event::EndOfMessage(end)
    }
}

/// What [`Connection::next_event`](crate::Connection::next_event) hands
/// back: a parsed event, or one of the two non-event outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextEvent {
    Event(Event),
    /// The buffer does not yet hold a complete event.
    NeedData,
    /// Reading is intentionally stopped: the next message belongs to a
    /// future cycle, or framing ended with a protocol switch.
    Paused,
}

impl NextEvent {
    pub fn is_need_data(&self) -> bool {
        matches!(self, NextEvent::NeedData)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, NextEvent::Paused)
    }
}
