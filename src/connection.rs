//! The Connection: everything else in the crate revolves around this.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::buffer::ReceiveBuffer;
use crate::error::{LocalProtocolError, ProtocolError, RemoteProtocolError};
use crate::events::{Event, EventKind, NextEvent, Response};
use crate::framing::{request_body_framing, response_body_framing, BodyFraming};
use crate::headers::{get_comma_header, has_expect_100_continue, set_comma_header, Headers};
use crate::readers::Reader;
use crate::state::{ConnectionState, Role, State, Switch};
use crate::writers::Writer;

/// Maximum bytes we are willing to buffer without being able to parse a
/// complete event. In practice this bounds the request/response line plus
/// headers, since bodies stream out incrementally.
///
/// Some precedents for defaults: node.js 80 KiB, IIS 16 KiB, Apache 8 KiB
/// per line.
pub const DEFAULT_MAX_INCOMPLETE_EVENT_SIZE: usize = 16 * 1024;

// RFC 7230's connection lifecycle rules, simplified: we close if anyone
// says Connection: close, and we close if anyone speaks HTTP/1.0. (1.0
// keep-alive negotiation exists but is a mess -- proxies aren't even
// allowed to send it -- so we decline to play.)
fn keep_alive(headers: &Headers, http_version: &[u8]) -> bool {
    let connection = get_comma_header(headers, b"connection");
    if connection.iter().any(|token| token == b"close") {
        return false;
    }
    if http_version < &b"1.1"[..] {
        return false;
    }
    true
}

/// A sans-I/O HTTP/1.1 connection in either role.
///
/// Feed received bytes in with [`receive_data`](Connection::receive_data),
/// pull parsed events out with [`next_event`](Connection::next_event), and
/// turn outgoing events into wire bytes with [`send`](Connection::send).
/// The connection never touches a socket; transmitting and closing are the
/// caller's job.
pub struct Connection {
    our_role: Role,
    cstate: ConnectionState,
    writer: Option<Writer>,
    reader: Option<Reader>,
    max_incomplete_event_size: usize,
    receive_buffer: ReceiveBuffer,
    receive_buffer_closed: bool,
    their_http_version: Option<Vec<u8>>,
    request_method: Option<Vec<u8>>,
    client_is_waiting_for_100_continue: bool,
}

impl Connection {
    pub fn new(our_role: Role) -> Self {
        Self::with_max_incomplete_event_size(our_role, DEFAULT_MAX_INCOMPLETE_EVENT_SIZE)
    }

    pub fn with_max_incomplete_event_size(our_role: Role, limit: usize) -> Self {
        Connection {
            our_role,
            cstate: ConnectionState::new(),
            writer: match our_role {
                Role::Client => Some(Writer::RequestHead),
                Role::Server => Some(Writer::ResponseHead),
            },
            reader: match our_role {
                Role::Client => Some(Reader::ResponseHead),
                Role::Server => Some(Reader::RequestHead),
            },
            max_incomplete_event_size: limit,
            receive_buffer: ReceiveBuffer::new(),
            receive_buffer_closed: false,
            their_http_version: None,
            request_method: None,
            client_is_waiting_for_100_continue: false,
        }
    }

    pub fn our_role(&self) -> Role {
        self.our_role
    }

    pub fn their_role(&self) -> Role {
        self.our_role.peer()
    }

    pub fn our_state(&self) -> State {
        self.cstate.state_of(self.our_role)
    }

    pub fn their_state(&self) -> State {
        self.cstate.state_of(self.their_role())
    }

    pub fn client_state(&self) -> State {
        self.cstate.state_of(Role::Client)
    }

    pub fn server_state(&self) -> State {
        self.cstate.state_of(Role::Server)
    }

    /// The peer's HTTP version, once their first message head has been
    /// processed. Survives [`start_next_cycle`](Connection::start_next_cycle).
    pub fn their_http_version(&self) -> Option<&[u8]> {
        self.their_http_version.as_deref()
    }

    pub fn client_is_waiting_for_100_continue(&self) -> bool {
        self.client_is_waiting_for_100_continue
    }

    pub fn they_are_waiting_for_100_continue(&self) -> bool {
        self.their_role() == Role::Client && self.client_is_waiting_for_100_continue
    }

    /// Received-but-unprocessed bytes, plus whether the peer has signalled
    /// EOF after them. This is how tunnel bytes are recovered after a
    /// protocol switch.
    pub fn trailing_data(&self) -> (Bytes, bool) {
        (self.receive_buffer.peek(), self.receive_buffer_closed)
    }

    /// Reset `(DONE, DONE)` back to `(IDLE, IDLE)` for the next
    /// request/response cycle on a keep-alive connection.
    pub fn start_next_cycle(&mut self) -> Result<(), ProtocolError> {
        let old_states = (self.cstate.client, self.cstate.server);
        self.cstate.start_next_cycle()?;
        self.request_method = None;
        // their_http_version is deliberately kept: it describes the peer,
        // not the message, and response cleanup needs it next cycle.
        debug_assert!(!self.client_is_waiting_for_100_continue);
        trace!("starting next request/response cycle");
        self.respond_to_state_changes(old_states, None)?;
        Ok(())
    }

    fn process_error(&mut self, role: Role) {
        let old_states = (self.cstate.client, self.cstate.server);
        self.cstate.process_error(role);
        // Swapping readers/writers can't fail on the error path: no framing
        // decision is involved in entering ERROR.
        let _ = self.respond_to_state_changes(old_states, None);
    }

    fn server_switch_event(&self, event: &Event) -> Option<Switch> {
        if let Event::InformationalResponse(response) = event {
            if response.status == 101 {
                return Some(Switch::Upgrade);
            }
        }
        if let Event::Response(response) = event {
            if self.cstate.pending_switch_proposals.contains(Switch::Connect)
                && (200..300).contains(&response.status)
            {
                return Some(Switch::Connect);
            }
        }
        None
    }

    // Every event, sent or received, passes through here exactly once.
    fn process_event(&mut self, role: Role, event: &Event) -> Result<(), LocalProtocolError> {
        let old_states = (self.cstate.client, self.cstate.server);

        if role == Role::Client {
            if let Event::Request(request) = event {
                if request.method == b"CONNECT" {
                    self.cstate.process_client_switch_proposal(Switch::Connect);
                }
                if !get_comma_header(&request.headers, b"upgrade").is_empty() {
                    self.cstate.process_client_switch_proposal(Switch::Upgrade);
                }
            }
        }
        let server_switch = if role == Role::Server {
            self.server_switch_event(event)
        } else {
            None
        };
        self.cstate.process_event(role, event.kind(), server_switch)?;

        if let Event::Request(request) = event {
            self.request_method = Some(request.method.clone());
        }

        if role == self.their_role() {
            match event {
                Event::Request(request) => {
                    self.their_http_version = Some(request.http_version.clone());
                }
                Event::Response(response) | Event::InformationalResponse(response) => {
                    self.their_http_version = Some(response.http_version.clone());
                }
                _ => {}
            }
        }

        // RFC 7230 never says what Connection: close on a 1xx response
        // would mean, so informational responses don't feed keep-alive.
        match event {
            Event::Request(request) => {
                if !keep_alive(&request.headers, &request.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
            }
            Event::Response(response) => {
                if !keep_alive(&response.headers, &response.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
            }
            _ => {}
        }

        // 100-continue bookkeeping. Pure flow control; the state machines
        // don't care.
        match event {
            Event::Request(request) => {
                if has_expect_100_continue(request) {
                    self.client_is_waiting_for_100_continue = true;
                }
            }
            Event::InformationalResponse(_) | Event::Response(_) => {
                self.client_is_waiting_for_100_continue = false;
            }
            Event::Data(_) | Event::EndOfMessage(_) if role == Role::Client => {
                // The client giving up on waiting also clears the flag.
                self.client_is_waiting_for_100_continue = false;
            }
            _ => {}
        }

        self.respond_to_state_changes(old_states, Some(event))
    }

    fn body_framing_for(&self, event: Option<&Event>) -> Result<BodyFraming, LocalProtocolError> {
        match event {
            Some(Event::Request(request)) => request_body_framing(request),
            Some(Event::Response(response)) => {
                response_body_framing(self.request_method.as_deref(), response)
            }
            _ => Err(LocalProtocolError::new(
                "no message head available to determine body framing",
            )),
        }
    }

    // Must run after anything that may have moved either state; `event` is
    // the message that triggered the change, when there was one (entering
    // SEND_BODY needs it to pick framing).
    fn respond_to_state_changes(
        &mut self,
        old_states: (State, State),
        event: Option<&Event>,
    ) -> Result<(), LocalProtocolError> {
        let (old_client, old_server) = old_states;
        let (our_old, their_old) = match self.our_role {
            Role::Client => (old_client, old_server),
            Role::Server => (old_server, old_client),
        };

        if self.our_state() != our_old {
            self.writer = match self.our_state() {
                State::SendBody => Some(match self.body_framing_for(event)? {
                    BodyFraming::ContentLength(length) => Writer::content_length(length),
                    BodyFraming::Chunked => Writer::Chunked,
                    BodyFraming::UntilClose => Writer::UntilClose,
                }),
                state => match (self.our_role, state) {
                    (Role::Client, State::Idle) => Some(Writer::RequestHead),
                    (Role::Server, State::Idle) | (Role::Server, State::SendResponse) => {
                        Some(Writer::ResponseHead)
                    }
                    _ => None,
                },
            };
            debug!(role = ?self.our_role, state = ?self.our_state(), "switched writer");
        }
        if self.their_state() != their_old {
            self.reader = match self.their_state() {
                State::SendBody => Some(match self.body_framing_for(event)? {
                    BodyFraming::ContentLength(length) => Reader::content_length(length),
                    BodyFraming::Chunked => Reader::chunked(),
                    BodyFraming::UntilClose => Reader::UntilClose,
                }),
                state => match (self.their_role(), state) {
                    (Role::Client, State::Idle) => Some(Reader::RequestHead),
                    (Role::Server, State::Idle) | (Role::Server, State::SendResponse) => {
                        Some(Reader::ResponseHead)
                    }
                    (_, State::Done) | (_, State::MustClose) | (_, State::Closed) => {
                        Some(Reader::ExpectNothing)
                    }
                    _ => None,
                },
            };
            debug!(role = ?self.their_role(), state = ?self.their_state(), "switched reader");
        }
        Ok(())
    }

    /// Hand the engine bytes received from the peer. An empty slice means
    /// the peer closed its sending side (EOF).
    pub fn receive_data(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.is_empty() {
            self.receive_buffer_closed = true;
            return Ok(());
        }
        if self.receive_buffer_closed {
            self.process_error(self.their_role());
            return Err(RemoteProtocolError::new(
                "received data after the peer already closed the connection",
            )
            .into());
        }
        self.receive_buffer.add(data);
        Ok(())
    }

    fn extract_next_receive_event(&mut self) -> Result<NextEvent, LocalProtocolError> {
        let state = self.their_state();
        // Done doesn't pause by itself -- a ConnectionClosed can still
        // arrive there -- but buffered data in Done means the next message
        // belongs to the next cycle, and we must not read into it.
        if state == State::Done && !self.receive_buffer.is_empty() {
            return Ok(NextEvent::Paused);
        }
        if state == State::MightSwitchProtocol || state == State::SwitchedProtocol {
            return Ok(NextEvent::Paused);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(NextEvent::NeedData);
        };
        if let Some(event) = reader.next_event(&mut self.receive_buffer)? {
            return Ok(NextEvent::Event(event));
        }
        if self.receive_buffer.is_empty() && self.receive_buffer_closed {
            // EOF can itself be an event: end of a close-delimited body,
            // or a clean close between messages.
            return Ok(NextEvent::Event(reader.read_eof()?));
        }
        Ok(NextEvent::NeedData)
    }

    /// Parse the next event out of the receive buffer.
    ///
    /// Returns [`NextEvent::NeedData`] when the buffer holds less than one
    /// complete event and [`NextEvent::Paused`] when reading is
    /// intentionally stopped (next cycle not started, or the protocol has
    /// been switched).
    pub fn next_event(&mut self) -> Result<NextEvent, ProtocolError> {
        if self.their_state() == State::Error {
            return Err(RemoteProtocolError::new(
                "can't receive data when peer state is ERROR",
            )
            .into());
        }
        match self.next_event_inner() {
            Ok(next) => Ok(next),
            Err(error) => {
                self.process_error(self.their_role());
                // Their message failed our validation: the violation is
                // theirs.
                Err(error.into_remote().into())
            }
        }
    }

    fn next_event_inner(&mut self) -> Result<NextEvent, LocalProtocolError> {
        let next = self.extract_next_receive_event()?;
        match &next {
            NextEvent::Event(event) => {
                trace!(event = ?event.kind(), "received event");
                self.process_event(self.their_role(), event)?;
            }
            NextEvent::NeedData => {
                if self.receive_buffer.len() > self.max_incomplete_event_size {
                    // 431 Request Header Fields Too Large: the only place
                    // we buffer ahead is the head.
                    return Err(LocalProtocolError::with_hint("receive buffer too long", 431));
                }
                if self.receive_buffer_closed {
                    return Err(LocalProtocolError::new("peer unexpectedly closed connection"));
                }
            }
            NextEvent::Paused => {}
        }
        Ok(next)
    }

    /// Serialize an outgoing event, returning the bytes the caller must
    /// now transmit. A [`Event::ConnectionClosed`] returns no bytes; the
    /// caller performs the actual shutdown.
    pub fn send(&mut self, event: Event) -> Result<Vec<u8>, ProtocolError> {
        if self.our_state() == State::Error {
            return Err(LocalProtocolError::new("can't send data when our state is ERROR").into());
        }
        match self.send_inner(event) {
            Ok(bytes) => Ok(bytes),
            Err(error) => {
                self.process_error(self.our_role);
                Err(error.into())
            }
        }
    }

    fn send_inner(&mut self, event: Event) -> Result<Vec<u8>, LocalProtocolError> {
        let event = match event {
            Event::Response(response) => {
                Event::Response(self.clean_up_response_headers_for_sending(response)?)
            }
            event => event,
        };
        self.validate_framing_headers_for_sending(&event)?;

        // The event that causes a state change is written by the writer
        // that was current *before* the change (a Request goes through the
        // head writer; the transition installs the body writer for what
        // follows). Take it out, run the transition, then use it.
        let old_state = self.our_state();
        let mut writer = self.writer.take();
        self.process_event(self.our_role, &event)?;
        trace!(event = ?event.kind(), "sending event");

        if event.kind() == EventKind::ConnectionClosed {
            return Ok(Vec::new());
        }
        let active = writer
            .as_mut()
            .ok_or_else(|| LocalProtocolError::new("no writer available in this state"))?;
        let mut out = Vec::new();
        active.write(&event, &mut out)?;
        if self.our_state() == old_state {
            // No transition: the same (body) writer keeps its bookkeeping.
            self.writer = writer;
        }
        Ok(out)
    }

    /// Tell the engine that transmitting previously returned bytes failed.
    /// Our side is dead; moves us to ERROR.
    pub fn send_failed(&mut self) {
        self.process_error(self.our_role);
    }

    // 1xx and 204 responses, and 2xx responses to CONNECT, must not carry
    // framing headers; requests must not mix chunked with Content-Length.
    fn validate_framing_headers_for_sending(
        &self,
        event: &Event,
    ) -> Result<(), LocalProtocolError> {
        match event {
            Event::InformationalResponse(response) => {
                if !(100..200).contains(&response.status) {
                    return Err(LocalProtocolError::new(format!(
                        "InformationalResponse with status {}",
                        response.status
                    )));
                }
                if response.headers.contains(b"content-length")
                    || response.headers.contains(b"transfer-encoding")
                {
                    return Err(LocalProtocolError::new(format!(
                        "{} response must not carry Content-Length or Transfer-Encoding",
                        response.status
                    )));
                }
            }
            Event::Response(response) => {
                if response.status < 200 {
                    return Err(LocalProtocolError::new(format!(
                        "Response with 1xx status {}",
                        response.status
                    )));
                }
                let bodiless = response.status == 204
                    || ((200..300).contains(&response.status)
                        && self.request_method.as_deref() == Some(&b"CONNECT"[..]));
                if bodiless
                    && (response.headers.contains(b"content-length")
                        || response.headers.contains(b"transfer-encoding"))
                {
                    return Err(LocalProtocolError::new(format!(
                        "{} response must not carry Content-Length or Transfer-Encoding",
                        response.status
                    )));
                }
            }
            Event::Request(request) => {
                let chunked = get_comma_header(&request.headers, b"transfer-encoding")
                    .last()
                    .map(|coding| coding == b"chunked")
                    .unwrap_or(false);
                if chunked && request.headers.contains(b"content-length") {
                    return Err(LocalProtocolError::new(
                        "request with both Transfer-Encoding: chunked and Content-Length",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    // When sending a final Response we take responsibility for the framing
    // headers: pick chunked vs close-delimited for bodies of unknown
    // length based on what the peer understands, and make sure
    // Connection: close is present whenever this connection won't be
    // reused.
    fn clean_up_response_headers_for_sending(
        &self,
        response: Response,
    ) -> Result<Response, LocalProtocolError> {
        let mut headers = response.headers.clone();
        let mut need_close = false;

        // The framing headers of a HEAD response must describe the body a
        // GET would have had.
        let method_for_framing = match self.request_method.as_deref() {
            Some(b"HEAD") => Some(&b"GET"[..]),
            method => method,
        };
        let framing = response_body_framing(method_for_framing, &response)?;
        if matches!(framing, BodyFraming::Chunked | BodyFraming::UntilClose) {
            // Unknown-length body. Stray Content-Length would lie about
            // the framing (the peer's Transfer-Encoding wins anyway, so
            // fix rather than reject -- same respect RFC 7230 asks us to
            // extend to peers).
            headers = set_comma_header(&headers, b"Content-Length", vec![])?;
            let peer_is_pre_1_1 = self
                .their_http_version
                .as_deref()
                .map(|version| version < &b"1.1"[..])
                .unwrap_or(true);
            let response_is_pre_1_1 = response.http_version < b"1.1"[..].to_vec();
            if peer_is_pre_1_1 || response_is_pre_1_1 {
                // Either we never saw a valid request (assume the worst),
                // or somebody here doesn't speak chunked. Close-delimit.
                headers = set_comma_header(&headers, b"Transfer-Encoding", vec![])?;
                if self.request_method.as_deref() != Some(&b"HEAD"[..]) {
                    need_close = true;
                }
            } else {
                headers =
                    set_comma_header(&headers, b"Transfer-Encoding", vec![b"chunked".to_vec()])?;
            }
        }

        if !self.cstate.keep_alive || need_close {
            let mut connection = get_comma_header(&headers, b"connection");
            connection.retain(|token| token != b"keep-alive");
            if !connection.iter().any(|token| token == b"close") {
                connection.push(b"close".to_vec());
            }
            headers = set_comma_header(&headers, b"Connection", connection)?;
        }

        Ok(Response { headers, ..response })
    }
}
