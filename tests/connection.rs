// End-to-end scenarios driven through a loopback client/server pair.


use bytes::Bytes;
use helper::{get_all_events, normalize_data_events, receive_and_get, ConnectionPair};
use hone::{
    Connection, Data, EndOfMessage, Event, Headers, NextEvent, Request, Response, Role, State,
};

fn req(method: &str, target: &str, headers: &[(&str, &str)]) -> Request {
    Request::new(
        method,
        target,
        Headers::from_pairs(headers.iter().copied()).unwrap(),
        "1.1",
    )
    .unwrap()
}

fn resp(status: u16, headers: &[(&str, &str)]) -> Response {
    Response::new(status, Headers::from_pairs(headers.iter().copied()).unwrap())
}

fn data(payload: &'static [u8]) -> Data {
    Data::new(payload)
}

/// A Data event the way the chunked reader reports it: one whole chunk.
fn chunk(payload: &'static [u8]) -> Data {
    Data {
        data: Bytes::from_static(payload),
        chunk_start: true,
        chunk_end: true,
    }
}

#[test]
fn test_basic_get_keep_alive_and_reuse() {
    let mut p = ConnectionPair::new();

    let wire = p
        .send(
            Role::Client,
            vec![
                req("GET", "/", &[("Host", "x")]).into(),
                EndOfMessage::default().into(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(wire, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(p.get(Role::Client).our_state(), State::Done);
    assert_eq!(p.get(Role::Client).their_state(), State::SendResponse);
    assert_eq!(p.get(Role::Server).our_state(), State::SendResponse);
    assert_eq!(p.get(Role::Server).their_state(), State::Done);
    assert_eq!(p.get(Role::Client).their_http_version(), None);
    assert_eq!(p.get(Role::Server).their_http_version(), Some(&b"1.1"[..]));

    let wire = p
        .send(
            Role::Server,
            vec![
                resp(200, &[("Content-Length", "2")]).into(),
                data(b"hi").into(),
                EndOfMessage::default().into(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(wire, b"HTTP/1.1 200 \r\nContent-Length: 2\r\n\r\nhi");

    for role in [Role::Client, Role::Server] {
        assert_eq!(p.get(role).our_state(), State::Done);
        assert_eq!(p.get(role).their_state(), State::Done);
        p.get_mut(role).start_next_cycle().unwrap();
        assert_eq!(p.get(role).our_state(), State::Idle);
        assert_eq!(p.get(role).their_state(), State::Idle);
    }

    // their_http_version survives the cycle boundary; it describes the
    // peer, not the message.
    assert_eq!(p.get(Role::Server).their_http_version(), Some(&b"1.1"[..]));

    // The connection is genuinely reusable.
    p.send(
        Role::Client,
        vec![
            req("GET", "/again", &[("Host", "x")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
    p.send(
        Role::Server,
        vec![
            resp(200, &[("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
}

#[test]
fn test_informational_response_then_final() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("GET", "/", &[("Host", "x")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();

    // 100 and 200 arrive as two separate events; the server stays in
    // SendResponse across the informational one.
    p.send(Role::Server, vec![resp(100, &[]).into()], None).unwrap();
    assert_eq!(p.get(Role::Server).our_state(), State::SendResponse);

    // The zero-length head completes the body on the client side at once;
    // the server is still on the hook for its own EndOfMessage.
    p.send(
        Role::Server,
        vec![resp(200, &[("Content-Length", "0")]).into()],
        Some(vec![
            resp(200, &[("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ]),
    )
    .unwrap();
    assert_eq!(p.get(Role::Server).our_state(), State::SendBody);
}

#[test]
fn test_chunked_upload() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![req(
            "POST",
            "/up",
            &[("Host", "x"), ("Transfer-Encoding", "chunked")],
        )
        .into()],
        None,
    )
    .unwrap();

    let wire = p
        .send(
            Role::Client,
            vec![data(b"ABCDE").into()],
            Some(vec![chunk(b"ABCDE").into()]),
        )
        .unwrap();
    assert_eq!(wire, b"5\r\nABCDE\r\n");

    let wire = p
        .send(
            Role::Client,
            vec![data(b"FG").into()],
            Some(vec![chunk(b"FG").into()]),
        )
        .unwrap();
    assert_eq!(wire, b"2\r\nFG\r\n");

    let wire = p
        .send(Role::Client, vec![EndOfMessage::default().into()], None)
        .unwrap();
    assert_eq!(wire, b"0\r\n\r\n");

    // And a chunked response back.
    p.send(
        Role::Server,
        vec![
            resp(200, &[("Transfer-Encoding", "chunked")]).into(),
            data(b"ok").into(),
            EndOfMessage::default().into(),
        ],
        Some(vec![
            resp(200, &[("Transfer-Encoding", "chunked")]).into(),
            chunk(b"ok").into(),
            EndOfMessage::default().into(),
        ]),
    )
    .unwrap();
}

#[test]
fn test_chunked_trailers() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![req(
            "POST",
            "/up",
            &[("Host", "x"), ("Transfer-Encoding", "chunked")],
        )
        .into()],
        None,
    )
    .unwrap();

    let trailers = Headers::from_pairs([("X-Trailer", "some value")]).unwrap();
    let wire = p
        .send(
            Role::Client,
            vec![
                data(b"xx").into(),
                EndOfMessage::with_trailers(trailers.clone()).into(),
            ],
            Some(vec![
                chunk(b"xx").into(),
                EndOfMessage::with_trailers(trailers).into(),
            ]),
        )
        .unwrap();
    assert_eq!(wire, b"2\r\nxx\r\n0\r\nX-Trailer: some value\r\n\r\n");
}

#[test]
fn test_chunked_rechunking_is_transparent() {
    let mut server = Connection::new(Role::Server);
    receive_and_get(
        &mut server,
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n",
    )
    .unwrap();

    let mut events = Vec::new();
    for piece in [b"5\r\nAB".as_slice(), b"CDE\r\n2\r\nFG\r\n0\r\n\r\n".as_slice()] {
        events.extend(receive_and_get(&mut server, piece).unwrap());
    }
    assert_eq!(
        normalize_data_events(events),
        vec![
            Data::new(&b"ABCDEFG"[..]).into(),
            EndOfMessage::default().into()
        ]
    );
}

#[test]
fn test_zero_length_bodies() {
    // Explicit Content-Length: 0 -> EndOfMessage without any Data.
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("GET", "/", &[("Host", "a"), ("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();

    // Chunked body consisting only of the terminating chunk: same.
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![req(
            "POST",
            "/",
            &[("Host", "a"), ("Transfer-Encoding", "chunked")],
        )
        .into()],
        None,
    )
    .unwrap();
    let wire = p
        .send(Role::Client, vec![EndOfMessage::default().into()], None)
        .unwrap();
    assert_eq!(wire, b"0\r\n\r\n");
}

#[test]
fn test_http10_close_framed_response() {
    let mut p = ConnectionPair::new();
    let request = Request::new(
        "GET",
        "/",
        Headers::from_pairs([("Host", "a")]).unwrap(),
        "1.0",
    )
    .unwrap();
    let wire = p
        .send(
            Role::Client,
            vec![request.into(), EndOfMessage::default().into()],
            None,
        )
        .unwrap();
    assert_eq!(wire, b"GET / HTTP/1.0\r\nHost: a\r\n\r\n");

    // HTTP/1.0 kills keep-alive: the client is already MustClose.
    assert_eq!(p.get(Role::Client).our_state(), State::MustClose);
    assert_eq!(p.get(Role::Server).their_http_version(), Some(&b"1.0"[..]));

    // A response with no framing headers to a 1.0 peer is close-delimited;
    // the engine adds Connection: close on its way out.
    let response = Response::new(200, Headers::default())
        .with_http_version("1.0")
        .with_reason("OK");
    let on_the_wire = Response::new(
        200,
        Headers::from_pairs([("Connection", "close")]).unwrap(),
    )
    .with_http_version("1.0")
    .with_reason("OK");
    let wire = p
        .send(
            Role::Server,
            vec![response.into(), data(b"body").into()],
            Some(vec![on_the_wire.into(), data(b"body").into()]),
        )
        .unwrap();
    assert_eq!(wire, b"HTTP/1.0 200 OK\r\nConnection: close\r\n\r\nbody");

    // EOF both ends the body and closes the connection, as two events in
    // order.
    p.send(
        Role::Server,
        vec![EndOfMessage::default().into(), Event::ConnectionClosed],
        Some(vec![
            EndOfMessage::default().into(),
            Event::ConnectionClosed,
        ]),
    )
    .unwrap();
    assert_eq!(p.get(Role::Server).our_state(), State::Closed);
    assert_eq!(p.get(Role::Client).their_state(), State::Closed);

    p.get_mut(Role::Client).send(Event::ConnectionClosed).unwrap();
    assert_eq!(p.get(Role::Client).our_state(), State::Closed);
}

#[test]
fn test_automatic_chunking_for_11_peer() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("GET", "/", &[("Host", "a")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();

    // No framing headers on the response: the engine picks chunked for a
    // 1.1 peer.
    let wire = p
        .send(
            Role::Server,
            vec![resp(200, &[]).into()],
            Some(vec![resp(200, &[("Transfer-Encoding", "chunked")]).into()]),
        )
        .unwrap();
    assert_eq!(wire, b"HTTP/1.1 200 \r\nTransfer-Encoding: chunked\r\n\r\n");

    p.send(
        Role::Server,
        vec![data(b"stream").into()],
        Some(vec![chunk(b"stream").into()]),
    )
    .unwrap();
    p.send(Role::Server, vec![EndOfMessage::default().into()], None)
        .unwrap();
}

#[test]
fn test_expect_100_continue() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![req(
            "POST",
            "/",
            &[
                ("Host", "x"),
                ("Content-Length", "5"),
                ("Expect", "100-continue"),
            ],
        )
        .into()],
        None,
    )
    .unwrap();

    assert!(p.get(Role::Client).client_is_waiting_for_100_continue());
    assert!(!p.get(Role::Client).they_are_waiting_for_100_continue());
    assert!(p.get(Role::Server).client_is_waiting_for_100_continue());
    assert!(p.get(Role::Server).they_are_waiting_for_100_continue());

    // The 100 clears the flag on both ends.
    p.send(Role::Server, vec![resp(100, &[]).into()], None).unwrap();
    assert!(!p.get(Role::Client).client_is_waiting_for_100_continue());
    assert!(!p.get(Role::Server).they_are_waiting_for_100_continue());

    // Body flows, exchange completes.
    p.send(
        Role::Client,
        vec![data(b"12345").into(), EndOfMessage::default().into()],
        None,
    )
    .unwrap();
    p.send(
        Role::Server,
        vec![
            resp(200, &[("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
}

#[test]
fn test_client_gives_up_waiting_for_100_continue() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![req(
            "POST",
            "/",
            &[
                ("Host", "x"),
                ("Content-Length", "5"),
                ("Expect", "100-continue"),
            ],
        )
        .into()],
        None,
    )
    .unwrap();
    assert!(p.get(Role::Client).client_is_waiting_for_100_continue());

    // Sending body data (after a caller-side timeout) clears the flag.
    // The five bytes also complete the body as far as the server can see.
    p.send(
        Role::Client,
        vec![data(b"12345").into()],
        Some(vec![data(b"12345").into(), EndOfMessage::default().into()]),
    )
    .unwrap();
    assert!(!p.get(Role::Client).client_is_waiting_for_100_continue());
}

#[test]
fn test_connect_tunnel() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("CONNECT", "example.com:443", &[("Host", "example.com")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
    assert_eq!(p.get(Role::Client).our_state(), State::MightSwitchProtocol);
    assert_eq!(p.get(Role::Server).their_state(), State::MightSwitchProtocol);

    // Any 2xx accepts the CONNECT; framing stops on both sides.
    p.send(Role::Server, vec![resp(200, &[]).into()], None).unwrap();
    for role in [Role::Client, Role::Server] {
        assert_eq!(p.get(role).our_state(), State::SwitchedProtocol);
        assert_eq!(p.get(role).their_state(), State::SwitchedProtocol);
    }

    // Tunnel bytes are not framed: reading pauses, and the raw bytes are
    // recoverable through trailing_data.
    p.get_mut(Role::Client).receive_data(b"tunnel bytes").unwrap();
    assert_eq!(p.get_mut(Role::Client).next_event().unwrap(), NextEvent::Paused);
    assert_eq!(
        p.get(Role::Client).trailing_data(),
        (Bytes::from_static(b"tunnel bytes"), false)
    );
    assert_eq!(p.get_mut(Role::Server).next_event().unwrap(), NextEvent::Paused);

    p.get_mut(Role::Client).start_next_cycle().unwrap_err();
}

#[test]
fn test_upgrade_101() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req(
                "GET",
                "/chat",
                &[
                    ("Host", "x"),
                    ("Upgrade", "websocket"),
                    ("Connection", "upgrade"),
                ],
            )
            .into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
    assert_eq!(p.get(Role::Client).our_state(), State::MightSwitchProtocol);

    p.send(
        Role::Server,
        vec![resp(101, &[("Upgrade", "websocket")]).into()],
        None,
    )
    .unwrap();
    for role in [Role::Client, Role::Server] {
        assert_eq!(p.get(role).our_state(), State::SwitchedProtocol);
        assert_eq!(p.get(role).their_state(), State::SwitchedProtocol);
    }
}

#[test]
fn test_connect_denied() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("CONNECT", "x:443", &[("Host", "x")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();

    // A non-2xx response denies the switch; everything proceeds as a
    // normal exchange and the connection stays reusable.
    p.send(
        Role::Server,
        vec![
            resp(404, &[("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
    for role in [Role::Client, Role::Server] {
        assert_eq!(p.get(role).our_state(), State::Done);
        p.get_mut(role).start_next_cycle().unwrap();
    }
}

#[test]
fn test_pipelined_requests_pause_the_server() {
    let mut server = Connection::new(Role::Server);
    let events = receive_and_get(
        &mut server,
        b"GET /1 HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\n12345GET /2 HTTP/1.1\r\nHost: a\r\n\r\n",
    )
    .unwrap();
    assert_eq!(
        events,
        vec![
            req("GET", "/1", &[("Host", "a"), ("Content-Length", "5")]).into(),
            data(b"12345").into(),
            EndOfMessage::default().into(),
        ]
    );

    // The second request stays untouched until this cycle is over.
    assert_eq!(server.next_event().unwrap(), NextEvent::Paused);

    server
        .send(resp(200, &[("Content-Length", "0")]).into())
        .unwrap();
    server.send(EndOfMessage::default().into()).unwrap();
    assert_eq!(server.next_event().unwrap(), NextEvent::Paused);

    server.start_next_cycle().unwrap();
    let events = get_all_events(&mut server).unwrap();
    assert_eq!(
        events,
        vec![
            req("GET", "/2", &[("Host", "a")]).into(),
            EndOfMessage::default().into(),
        ]
    );
}

#[test]
fn test_connection_close_request_header() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("GET", "/", &[("Host", "a"), ("Connection", "close")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();
    assert_eq!(p.get(Role::Client).our_state(), State::MustClose);
    assert_eq!(p.get(Role::Server).their_state(), State::MustClose);

    // The response picks up Connection: close automatically.
    p.send(
        Role::Server,
        vec![
            resp(200, &[("Content-Length", "0")]).into(),
            EndOfMessage::default().into(),
        ],
        Some(vec![
            resp(200, &[("Content-Length", "0"), ("Connection", "close")]).into(),
            EndOfMessage::default().into(),
        ]),
    )
    .unwrap();
    assert_eq!(p.get(Role::Server).our_state(), State::MustClose);

    p.get_mut(Role::Client).start_next_cycle().unwrap_err();
}

#[test]
fn test_head_response_body_is_not_consumed() {
    let mut p = ConnectionPair::new();
    p.send(
        Role::Client,
        vec![
            req("HEAD", "/", &[("Host", "a")]).into(),
            EndOfMessage::default().into(),
        ],
        None,
    )
    .unwrap();

    // Content-Length: 99 goes out on the wire, but no body follows and
    // none is expected.
    let wire = p
        .send(
            Role::Server,
            vec![
                resp(200, &[("Content-Length", "99")]).into(),
                EndOfMessage::default().into(),
            ],
            None,
        )
        .unwrap();
    assert_eq!(wire, b"HTTP/1.1 200 \r\nContent-Length: 99\r\n\r\n");
    assert_eq!(p.get(Role::Client).our_state(), State::Done);
    assert_eq!(p.get(Role::Client).their_state(), State::Done);
}

#[test]
fn test_bare_lf_accepted_in_header_block() {
    let mut server = Connection::new(Role::Server);
    let events = receive_and_get(&mut server, b"GET / HTTP/1.1\nHost: a\n\n").unwrap();
    assert_eq!(
        events,
        vec![
            req("GET", "/", &[("Host", "a")]).into(),
            EndOfMessage::default().into(),
        ]
    );
}

#[test]
fn test_response_with_both_framing_headers_prefers_chunked() {
    let mut client = Connection::new(Role::Client);
    client
        .send(req("GET", "/", &[("Host", "a")]).into())
        .unwrap();
    client.send(EndOfMessage::default().into()).unwrap();

    let events = receive_and_get(
        &mut client,
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    )
    .unwrap();
    assert_eq!(
        normalize_data_events(events),
        vec![
            resp(
                200,
                &[("Content-Length", "100"), ("Transfer-Encoding", "chunked")]
            )
            .with_reason("OK")
            .into(),
            Data::new(&b"hello"[..]).into(),
            EndOfMessage::default().into(),
        ]
    );
}

#[test]
fn test_clean_close_while_idle() {
    let mut server = Connection::new(Role::Server);
    let events = receive_and_get(&mut server, b"").unwrap();
    assert_eq!(events, vec![Event::ConnectionClosed]);
    assert_eq!(server.their_state(), State::Closed);
    // A closed peer while we're idle means we must close too.
    assert_eq!(server.our_state(), State::MustClose);
    assert!(server.send(Event::ConnectionClosed).unwrap().is_empty());
    assert_eq!(server.our_state(), State::Closed);
}
