//! A sans-I/O HTTP/1.1 protocol engine.
//!
//! `hone` is a pure in-memory state machine for one HTTP/1.1 connection,
//! usable in either the client or the server role. It owns no sockets, no
//! timers, and no threads: you feed it bytes received from your transport
//! and it hands back parsed events; you hand it outgoing events and it
//! returns the bytes to transmit. Any I/O style works on top -- blocking,
//! thread-per-connection, or an async reactor.
//!
//! The hard parts of HTTP/1.1 live in here: Content-Length vs chunked
//! framing, keep-alive vs close, 100-continue coordination, CONNECT and
//! Upgrade handoff, and the paired client/server state machines that keep
//! both ends honest.
//!
//! ```
//! use hone::{Connection, EndOfMessage, Event, Headers, NextEvent, Request, Role};
//!
//! // A client sends a request...
//! let mut client = Connection::new(Role::Client);
//! let request = Request::new(
//!     "GET",
//!     "/",
//!     Headers::from_pairs([("Host", "example.com")]).unwrap(),
//!     "1.1",
//! )
//! .unwrap();
//! let bytes = client.send(request.into()).unwrap();
//! assert_eq!(bytes, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
//! assert!(client.send(EndOfMessage::default().into()).unwrap().is_empty());
//!
//! // ...and parses the response the transport hands back.
//! client
//!     .receive_data(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi")
//!     .unwrap();
//! let response = match client.next_event().unwrap() {
//!     NextEvent::Event(Event::Response(response)) => response,
//!     other => panic!("unexpected {:?}", other),
//! };
//! assert_eq!(response.status, 200);
//! match client.next_event().unwrap() {
//!     NextEvent::Event(Event::Data(data)) => assert_eq!(&data.data[..], b"hi"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert!(matches!(
//!     client.next_event().unwrap(),
//!     NextEvent::Event(Event::EndOfMessage(_))
//! ));
//! ```

mod abnf;
mod buffer;
mod connection;
mod error;
mod events;
mod framing;
mod headers;
mod readers;
mod state;
mod writers;

pub use connection::{Connection, DEFAULT_MAX_INCOMPLETE_EVENT_SIZE};
pub use error::{LocalProtocolError, ProtocolError, RemoteProtocolError};
pub use events::{Data, EndOfMessage, Event, EventKind, NextEvent, Request, Response};
pub use headers::Headers;
pub use state::{Role, State};
