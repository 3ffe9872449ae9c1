//! End-to-end scenarios for the frame/message processor.
//!
//! Each test drives a client and a server processor against each other
//! or against hand-written wire bytes.

use hybi13::protocol::handshake::{self, headers};
use hybi13::protocol::{FrameHeader, OpCode, Response, encode_frame};
use hybi13::{CloseCode, Config, Error, Message, Processor, Role, State};

fn rng() -> impl FnMut() -> u32 + Send {
    let mut state = 0x9e37_79b9_u32;
    move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    }
}

fn client(config: Config) -> Processor {
    Processor::new(Role::Client, config, rng())
}

fn server(config: Config) -> Processor {
    Processor::new(Role::Server, config, rng())
}

fn client_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(fin, opcode, payload.len()).with_mask([0x11, 0x22, 0x33, 0x44]);
    encode_frame(&header, payload)
}

/// Feed `wire` to `p` and collect every message it yields.
fn drain(p: &mut Processor, mut wire: &[u8]) -> Vec<Message> {
    let mut out = Vec::new();
    while !wire.is_empty() {
        let n = p.consume(wire).unwrap();
        wire = &wire[n..];
        if let Some(msg) = p.get_message() {
            out.push(msg);
        }
    }
    out
}

#[test]
fn test_client_empty_binary() {
    let mut p = client(Config::new());
    assert_eq!(p.consume(&[0x82, 0x00]).unwrap(), 2);
    assert!(p.ready());

    let msg = p.get_message().unwrap();
    assert_eq!(msg.opcode(), OpCode::Binary);
    assert!(msg.fin());
    assert!(msg.is_empty());
}

#[test]
fn test_server_unmasks_payload() {
    let mut p = server(Config::new());
    let wire = [0x82, 0x82, 0xFF, 0xFF, 0xFF, 0xFF, 0xD5, 0xD5];
    assert_eq!(p.consume(&wire).unwrap(), 8);
    assert_eq!(p.get_message().unwrap().payload(), b"**");
}

#[test]
fn test_fragmented_control_rejected() {
    let mut p = client(Config::new());
    assert_eq!(p.consume(&[0x08, 0x00]), Err(Error::FragmentedControl));
    assert_eq!(p.state(), State::FatalError);
    assert_eq!(p.consume(&[0x81, 0x00]), Err(Error::FragmentedControl));
    assert!(p.get_message().is_none());
}

#[test]
fn test_violations_reported_on_basic_header() {
    // Only the two fixed bytes are supplied; the extended length and
    // masking key never arrive.
    let mut p = client(Config::new());
    assert_eq!(p.consume(&[0x08, 0x7E]), Err(Error::FragmentedControl));
    assert_eq!(p.state(), State::FatalError);

    let mut p = server(Config::new());
    assert_eq!(p.consume(&[0x82, 0x7F]), Err(Error::MaskingRequired));
    assert_eq!(p.state(), State::FatalError);

    let mut p = client(Config::new());
    assert_eq!(p.consume(&[0x89, 0x7E]), Err(Error::ControlTooBig(126)));

    let mut p = server(Config::new());
    assert_eq!(p.consume(&[0x00, 0xFF]), Err(Error::InvalidContinuation));
}

#[test]
fn test_valid_basic_header_waits_for_extension() {
    let mut p = server(Config::new());
    assert_eq!(p.consume(&[0x82, 0xFE]).unwrap(), 2);
    assert_eq!(p.state(), State::HeaderExtended);
    assert_eq!(p.bytes_needed(), 6);
}

#[test]
fn test_fragments_assemble() {
    let mut p = server(Config::new());
    let mut wire = client_frame(false, OpCode::Text, b"hel");
    wire.extend(client_frame(false, OpCode::Continuation, b"lo "));
    wire.extend(client_frame(true, OpCode::Continuation, b"world"));

    let messages = drain(&mut p, &wire);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].opcode(), OpCode::Text);
    assert_eq!(messages[0].as_text(), Some("hello world"));
}

#[test]
fn test_boundary_payload_lengths() {
    for len in [0usize, 125, 126, 65535, 65536] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut tx = client(Config::new());
        let mut rx = server(Config::new());

        let frame = tx.prepare_data_frame(&Message::binary(&payload)).unwrap();
        let expected_header = match len {
            0..=125 => 6,
            126..=65535 => 8,
            _ => 14,
        };
        assert_eq!(frame.header.len(), expected_header, "len {}", len);

        let wire = frame.to_vec();
        assert_eq!(rx.consume(&wire).unwrap(), wire.len());
        assert_eq!(rx.get_message().unwrap().payload(), payload.as_slice(), "len {}", len);
    }
}

#[test]
fn test_byte_at_a_time() {
    let mut tx = client(Config::new());
    let mut rx = server(Config::new());
    let text = "héllo wörld, ½ of €";
    let wire = tx.prepare_data_frame(&Message::text(text)).unwrap().to_vec();

    for (i, byte) in wire.iter().enumerate() {
        assert_eq!(rx.consume(std::slice::from_ref(byte)).unwrap(), 1);
        assert_eq!(rx.ready(), i == wire.len() - 1);
    }
    assert_eq!(rx.get_message().unwrap().as_text(), Some(text));
}

#[test]
fn test_arbitrary_splits_match_single_pass() {
    let mut tx = client(Config::new());
    let mut wire = Vec::new();
    for i in 0..5 {
        let payload = vec![i as u8; 40 + i * 50];
        wire.extend(tx.prepare_data_frame(&Message::binary(payload)).unwrap().to_vec());
    }
    wire.extend(tx.prepare_ping(b"still there?").unwrap().to_vec());

    let mut whole = server(Config::new());
    let expected = drain(&mut whole, &wire);
    assert_eq!(expected.len(), 6);

    for chunk in [1, 3, 7, 64, 333] {
        let mut rx = server(Config::new());
        let mut got = Vec::new();
        for piece in wire.chunks(chunk) {
            got.extend(drain(&mut rx, piece));
        }
        assert_eq!(got, expected, "chunk size {}", chunk);
    }
}

#[test]
fn test_ping_interleaved_with_fragments() {
    let mut p = server(Config::new());
    let mut wire = client_frame(false, OpCode::Binary, &[1, 2]);
    wire.extend(client_frame(true, OpCode::Ping, b"ping"));
    wire.extend(client_frame(true, OpCode::Continuation, &[3]));

    let messages = drain(&mut p, &wire);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].opcode(), OpCode::Ping);
    assert_eq!(messages[0].payload(), b"ping");
    assert_eq!(messages[1].opcode(), OpCode::Binary);
    assert_eq!(messages[1].payload(), &[1u8, 2, 3]);
}

#[test]
fn test_message_too_big_at_crossing_fragment() {
    let mut p = server(Config::new().with_max_message_size(10));

    let first = client_frame(false, OpCode::Binary, b"hello");
    let second = client_frame(false, OpCode::Continuation, b"abcde");
    let third = client_frame(true, OpCode::Continuation, b"x");

    assert_eq!(p.consume(&first).unwrap(), first.len());
    assert_eq!(p.consume(&second).unwrap(), second.len());
    assert_eq!(p.state(), State::HeaderBasic);
    assert_eq!(
        p.consume(&third),
        Err(Error::MessageTooBig { size: 11, max: 10 })
    );
    assert_eq!(
        Error::MessageTooBig { size: 11, max: 10 }.close_code(),
        CloseCode::MessageTooBig
    );
}

#[test]
fn test_limit_resets_between_messages() {
    let mut p = server(Config::new().with_max_message_size(4));
    let mut wire = client_frame(true, OpCode::Binary, b"abcd");
    wire.extend(client_frame(true, OpCode::Binary, b"efgh"));
    assert_eq!(drain(&mut p, &wire).len(), 2);
}

#[test]
fn test_invalid_utf8_across_fragments() {
    let mut p = server(Config::new());
    // U+20AC split over two fragments is fine
    let mut wire = client_frame(false, OpCode::Text, &[0xe2, 0x82]);
    wire.extend(client_frame(true, OpCode::Continuation, &[0xac]));
    assert_eq!(drain(&mut p, &wire)[0].as_text(), Some("€"));

    let mut p = server(Config::new());
    let mut wire = client_frame(false, OpCode::Text, &[0xe2, 0x82]);
    wire.extend(client_frame(true, OpCode::Continuation, b"a"));
    assert_eq!(p.consume(&wire), Err(Error::InvalidUtf8));
}

#[test]
fn test_close_round_trip() {
    let mut tx = client(Config::new());
    let mut rx = server(Config::new());
    let wire = tx.prepare_close(CloseCode::GoingAway, "bye").unwrap().to_vec();

    let msg = drain(&mut rx, &wire).remove(0);
    assert_eq!(msg.opcode(), OpCode::Close);
    let close = msg.close_frame().unwrap().unwrap();
    assert_eq!(close.code, CloseCode::GoingAway);
    assert_eq!(close.reason, "bye");
}

#[test]
fn test_client_handshake_request() {
    let mut p = client(Config::new());
    let request = p.client_handshake_request("ws://localhost/", &[]).unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.version, "HTTP/1.1");
    assert_eq!(request.uri, "/");
    assert_eq!(request.header("Host"), Some("localhost"));
    assert_eq!(request.header("Upgrade"), Some("websocket"));
    assert_eq!(request.header("Connection"), Some("upgrade"));
    assert_eq!(request.header("Sec-WebSocket-Version"), Some("13"));
    assert_eq!(request.header("Sec-WebSocket-Key").map(str::len), Some(24));
    assert!(request.header("Sec-WebSocket-Extensions").is_none());
    assert!(request.header("Sec-WebSocket-Protocol").is_none());
}

#[test]
fn test_client_handshake_request_errors() {
    let mut p = client(Config::new());
    assert!(matches!(
        p.client_handshake_request("ftp://example.com/", &[]),
        Err(Error::InvalidUri(_))
    ));
}

#[test]
fn test_accept_key_sample() {
    assert_eq!(
        hybi13::compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

#[test]
fn test_handshake_round_trip() {
    let mut c = client(Config::new());
    let request = c
        .client_handshake_request("wss://example.com:8443/chat?room=1", &["chat", "superchat"])
        .unwrap();
    assert_eq!(request.header("Host"), Some("example.com:8443"));
    assert_eq!(request.uri, "/chat?room=1");

    handshake::validate_handshake(&request).unwrap();
    assert_eq!(
        handshake::extract_subprotocols(&request).unwrap(),
        vec!["chat".to_string(), "superchat".to_string()]
    );

    let mut response = Response::new();
    handshake::process_handshake(&request, Some("chat"), &mut response).unwrap();
    assert_eq!(response.status, 101);
    handshake::validate_server_handshake_response(&request, &response).unwrap();

    response.headers.insert(headers::SEC_WEBSOCKET_ACCEPT, "bogus");
    assert_eq!(
        handshake::validate_server_handshake_response(&request, &response),
        Err(Error::MissingRequiredHeader(headers::SEC_WEBSOCKET_ACCEPT.into()))
    );
}

#[test]
fn test_extensions_without_support() {
    let mut s = server(Config::new());
    let mut c = client(Config::new());
    let request = c.client_handshake_request("ws://localhost/", &[]).unwrap();
    assert_eq!(s.negotiate_extensions(&request), Ok(None));

    let mut request = request;
    request
        .headers
        .insert(headers::SEC_WEBSOCKET_EXTENSIONS, "permessage-deflate");
    assert_eq!(s.negotiate_extensions(&request), Err(Error::ExtensionsDisabled));

    request.headers.insert(headers::SEC_WEBSOCKET_EXTENSIONS, "permessage-deflate; =");
    assert_eq!(s.negotiate_extensions(&request), Err(Error::ExtensionParseError));
}

#[test]
fn test_rsv1_rejected_without_negotiation() {
    let mut p = server(Config::server());
    let mut wire = client_frame(true, OpCode::Text, b"hi");
    wire[0] |= 0x40;
    assert_eq!(p.consume(&wire), Err(Error::InvalidRsvBit));
}

#[cfg(feature = "compression")]
mod deflate {
    use super::*;
    use hybi13::{DeflateConfig, Limits, WindowBitsMode};

    /// Run the opening handshake between two processors, returning the
    /// negotiated extension header.
    fn connect(c: &mut Processor, s: &mut Processor) -> Option<String> {
        let request = c.client_handshake_request("ws://localhost/", &[]).unwrap();
        assert!(request.header("Sec-WebSocket-Extensions").is_some());

        let mut response = Response::new();
        handshake::process_handshake(&request, None, &mut response).unwrap();
        let accepted = s.negotiate_extensions(&request).unwrap();
        if let Some(value) = &accepted {
            response
                .headers
                .insert(headers::SEC_WEBSOCKET_EXTENSIONS, value.as_str());
        }
        handshake::validate_server_handshake_response(&request, &response).unwrap();
        c.process_server_extensions(&response).unwrap();
        accepted
    }

    #[test]
    fn test_compressed_round_trip_both_ways() {
        let mut c = client(Config::client());
        let mut s = server(Config::server());
        let accepted = connect(&mut c, &mut s).unwrap();
        assert!(accepted.starts_with("permessage-deflate"));
        assert!(c.extension().is_enabled());
        assert!(s.extension().is_enabled());

        let text = "a fairly repetitive message, a fairly repetitive message";
        for _ in 0..3 {
            let frame = c.prepare_data_frame(&Message::text(text).compressed(true)).unwrap();
            assert_eq!(frame.header[0] & 0x40, 0x40);
            assert!(frame.payload.len() < text.len());

            let msg = drain(&mut s, &frame.to_vec()).remove(0);
            assert!(msg.is_compressed());
            assert_eq!(msg.as_text(), Some(text));

            let reply = s.prepare_data_frame(&Message::binary(text).compressed(true)).unwrap();
            let msg = drain(&mut c, &reply.to_vec()).remove(0);
            assert_eq!(msg.opcode(), OpCode::Binary);
            assert_eq!(msg.payload(), text.as_bytes());
        }
    }

    #[test]
    fn test_uncompressed_message_on_deflate_connection() {
        let mut c = client(Config::client());
        let mut s = server(Config::server());
        connect(&mut c, &mut s).unwrap();

        let frame = c.prepare_data_frame(&Message::text("plain")).unwrap();
        assert_eq!(frame.header[0], 0x81);
        let msg = drain(&mut s, &frame.to_vec()).remove(0);
        assert!(!msg.is_compressed());
        assert_eq!(msg.as_text(), Some("plain"));
    }

    #[test]
    fn test_renegotiation_refused() {
        let mut c = client(Config::client());
        let mut s = server(Config::server());
        connect(&mut c, &mut s).unwrap();

        let request = c.client_handshake_request("ws://localhost/", &[]).unwrap();
        assert_eq!(
            s.negotiate_extensions(&request),
            Err(Error::InvalidAttributes("already negotiated".into()))
        );
        let frame = c.prepare_data_frame(&Message::text("still here").compressed(true)).unwrap();
        let msg = drain(&mut s, &frame.to_vec()).remove(0);
        assert_eq!(msg.as_text(), Some("still here"));
    }

    #[test]
    fn test_smallest_windows_round_trip() {
        let smallest = DeflateConfig::new()
            .server_max_window_bits(15, WindowBitsMode::Smallest)
            .unwrap()
            .client_max_window_bits(15, WindowBitsMode::Smallest)
            .unwrap();
        let mut c = client(Config::client());
        let mut s = server(Config::server().with_deflate(smallest));
        let accepted = connect(&mut c, &mut s).unwrap();
        assert_eq!(accepted, "permessage-deflate; client_max_window_bits=9");

        let text = "window ".repeat(200);
        let frame = c.prepare_data_frame(&Message::text(&text).compressed(true)).unwrap();
        assert_eq!(drain(&mut s, &frame.to_vec()).remove(0).as_text(), Some(text.as_str()));
        let reply = s.prepare_data_frame(&Message::text(&text).compressed(true)).unwrap();
        assert_eq!(drain(&mut c, &reply.to_vec()).remove(0).as_text(), Some(text.as_str()));
    }

    #[test]
    fn test_no_context_takeover_negotiated() {
        let mut c = client(
            Config::client().with_deflate(DeflateConfig::new().client_no_context_takeover(true)),
        );
        let mut s = server(
            Config::server().with_deflate(DeflateConfig::new().server_no_context_takeover(true)),
        );
        let accepted = connect(&mut c, &mut s).unwrap();
        assert!(accepted.contains("server_no_context_takeover"));
        assert!(accepted.contains("client_no_context_takeover"));

        let first = c.prepare_data_frame(&Message::text("repeat me").compressed(true)).unwrap();
        let second = c.prepare_data_frame(&Message::text("repeat me").compressed(true)).unwrap();
        assert_eq!(first.payload.len(), second.payload.len());

        let mut wire = first.to_vec();
        wire.extend(second.to_vec());
        let messages = drain(&mut s, &wire);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.as_text() == Some("repeat me")));
    }

    #[test]
    fn test_decompressed_size_limit() {
        let mut c = client(Config::client());
        let mut s = server(Config::server().with_limits(Limits::new(1024)));
        connect(&mut c, &mut s).unwrap();

        let big = vec![b'z'; 4096];
        let frame = c.prepare_data_frame(&Message::binary(&big).compressed(true)).unwrap();
        assert!(frame.payload.len() < 1024);

        let err = s.consume(&frame.to_vec()).unwrap_err();
        assert!(matches!(err, Error::MessageTooBig { max: 1024, .. }), "{:?}", err);
        assert_eq!(s.state(), State::FatalError);
    }

    #[test]
    fn test_rsv1_on_continuation_rejected() {
        let mut c = client(Config::client());
        let mut s = server(Config::server());
        connect(&mut c, &mut s).unwrap();

        let mut wire = client_frame(false, OpCode::Text, b"a");
        wire[0] |= 0x40;
        let mut cont = client_frame(true, OpCode::Continuation, b"b");
        cont[0] |= 0x40;
        wire.extend(cont);
        assert_eq!(s.consume(&wire), Err(Error::InvalidRsvBit));
    }

    #[test]
    fn test_corrupt_compressed_payload() {
        let mut c = client(Config::client());
        let mut s = server(Config::server());
        connect(&mut c, &mut s).unwrap();

        let mut wire = client_frame(true, OpCode::Binary, &[0xff, 0xff, 0xff, 0xff]);
        wire[0] |= 0x40;
        let err = s.consume(&wire).unwrap_err();
        assert!(matches!(err, Error::Compression(_)), "{:?}", err);
        assert_eq!(err.close_code(), CloseCode::InvalidPayload);
    }
}
