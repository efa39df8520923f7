use super::*;
use serde_json::json;

// -------------------------------------------------------------------------
// Line buffering
// -------------------------------------------------------------------------

fn complete(text: &str) -> RawLine {
    RawLine::Complete(text.to_string())
}

#[test]
fn line_buffer_keeps_partial_tail() {
    let mut buffer = LineBuffer::new(1024);
    assert_eq!(buffer.push(b"{\"latitude\":1"), Vec::<RawLine>::new());
    assert_eq!(buffer.pending_len(), 13);
    assert_eq!(
        buffer.push(b",\"longitude\":2}\nCONN"),
        vec![complete("{\"latitude\":1,\"longitude\":2}")]
    );
    assert_eq!(buffer.pending_len(), 4);
}

#[test]
fn line_buffer_splits_multiple_lines_in_order() {
    let mut buffer = LineBuffer::new(1024);
    let lines = buffer.push(b"CONNECTING:AA:BB:CC:DD:EE:FF\nCONNECTED\n\n");
    assert_eq!(
        lines,
        vec![
            complete("CONNECTING:AA:BB:CC:DD:EE:FF"),
            complete("CONNECTED"),
            complete(""),
        ]
    );
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn line_buffer_strips_carriage_return() {
    let mut buffer = LineBuffer::new(1024);
    assert_eq!(buffer.push(b"CONNECTED\r\n"), vec![complete("CONNECTED")]);
}

#[test]
fn line_buffer_replaces_invalid_utf8() {
    let mut buffer = LineBuffer::new(1024);
    let lines = buffer.push(b"BT_ERROR:\xff\n");
    assert_eq!(lines, vec![complete("BT_ERROR:\u{fffd}")]);
}

#[test]
fn line_buffer_reassembles_split_utf8() {
    let mut buffer = LineBuffer::new(1024);
    let bytes = "ERROR:café\n".as_bytes();
    let (head, tail) = bytes.split_at(10);
    assert!(buffer.push(head).is_empty());
    assert_eq!(buffer.push(tail), vec![complete("ERROR:café")]);
}

#[test]
fn line_buffer_reports_overflow_once_and_recovers() {
    let mut buffer = LineBuffer::new(8);
    assert_eq!(buffer.push(b"0123456789"), vec![RawLine::Overflow]);
    assert_eq!(buffer.pending_len(), 0);
    // Rest of the oversized line is dropped without a second report.
    assert!(buffer.push(b"abcdef").is_empty());
    assert_eq!(buffer.push(b"ghi\nok\n"), vec![complete("ok")]);
}

#[test]
fn line_buffer_reports_overflow_for_long_complete_line() {
    let mut buffer = LineBuffer::new(4);
    assert_eq!(
        buffer.push(b"toolong\nfine\n"),
        vec![RawLine::Overflow, complete("fine")]
    );
}

// -------------------------------------------------------------------------
// Data channel
// -------------------------------------------------------------------------

#[test]
fn decode_data_line_accepts_objects() {
    match decode_data_line(r#"{"latitude":37.7749,"longitude":-122.4194}"#) {
        DataLine::Record(map) => {
            assert_eq!(map.get("latitude"), Some(&json!(37.7749)));
            assert_eq!(map.get("longitude"), Some(&json!(-122.4194)));
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn decode_data_line_skips_blank_lines() {
    assert_eq!(decode_data_line("   "), DataLine::Blank);
}

#[test]
fn decode_data_line_flags_malformed_json() {
    assert!(matches!(
        decode_data_line("{\"latitude\":"),
        DataLine::ParseError(_)
    ));
}

#[test]
fn decode_data_line_rejects_non_objects() {
    assert!(matches!(decode_data_line("[1,2]"), DataLine::ParseError(_)));
    assert!(matches!(decode_data_line("42"), DataLine::ParseError(_)));
}

#[test]
fn decode_data_line_truncates_snippet() {
    let long = "x".repeat(200);
    match decode_data_line(&long) {
        DataLine::ParseError(snippet) => assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS),
        other => panic!("expected parse error, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Control channel
// -------------------------------------------------------------------------

#[test]
fn control_tokens_parse_grammar() {
    assert_eq!(
        ControlToken::parse("CONNECTING:AA:BB:CC:DD:EE:FF"),
        ControlToken::Connecting {
            address: "AA:BB:CC:DD:EE:FF".to_string()
        }
    );
    assert_eq!(
        ControlToken::parse("CONNECTED"),
        ControlToken::Connected { detail: None }
    );
    assert_eq!(
        ControlToken::parse("CONNECTION_LOST"),
        ControlToken::ConnectionLost { detail: None }
    );
    assert_eq!(ControlToken::parse("DISCONNECTED"), ControlToken::Disconnected);
    assert_eq!(
        ControlToken::parse("CONNECTION_FAILED:Could not establish connection on any port"),
        ControlToken::ConnectionFailed {
            reason: "Could not establish connection on any port".to_string()
        }
    );
    assert_eq!(
        ControlToken::parse("BT_ERROR:[Errno 104] Connection reset by peer"),
        ControlToken::BtError {
            reason: "[Errno 104] Connection reset by peer".to_string()
        }
    );
    assert_eq!(
        ControlToken::parse("PARSE_ERROR:{\"lat"),
        ControlToken::ParseError {
            snippet: "{\"lat".to_string()
        }
    );
    assert_eq!(
        ControlToken::parse("ERROR:Invalid arguments"),
        ControlToken::Error {
            reason: "Invalid arguments".to_string()
        }
    );
    assert_eq!(
        ControlToken::parse("FATAL_ERROR:boom"),
        ControlToken::FatalError {
            reason: "boom".to_string()
        }
    );
}

#[test]
fn control_tokens_keep_optional_details() {
    assert_eq!(
        ControlToken::parse("CONNECTED:Channel 1 via /dev/rfcomm0"),
        ControlToken::Connected {
            detail: Some("Channel 1 via /dev/rfcomm0".to_string())
        }
    );
    assert_eq!(
        ControlToken::parse("CONNECTION_LOST:No data received"),
        ControlToken::ConnectionLost {
            detail: Some("No data received".to_string())
        }
    );
}

#[test]
fn control_tokens_classify_progress_chatter() {
    assert_eq!(
        ControlToken::parse("CONNECT_ATTEMPT:1/3,channel=1"),
        ControlToken::Progress {
            tag: "CONNECT_ATTEMPT".to_string(),
            detail: Some("1/3,channel=1".to_string())
        }
    );
    assert_eq!(
        ControlToken::parse("SOCKET_CLOSED"),
        ControlToken::Progress {
            tag: "SOCKET_CLOSED".to_string(),
            detail: None
        }
    );
}

#[test]
fn control_tokens_fall_back_to_unrecognized() {
    assert_eq!(
        ControlToken::parse("Traceback (most recent call last):"),
        ControlToken::Unrecognized("Traceback (most recent call last):".to_string())
    );
    assert_eq!(
        ControlToken::parse("connected"),
        ControlToken::Unrecognized("connected".to_string())
    );
}

#[test]
fn diagnostic_tokens_are_flagged() {
    assert!(ControlToken::parse("BT_ERROR:x").is_diagnostic());
    assert!(ControlToken::parse("ERROR:x").is_diagnostic());
    assert!(ControlToken::parse("FATAL_ERROR:x").is_diagnostic());
    assert!(!ControlToken::parse("CONNECTION_LOST").is_diagnostic());
    assert!(!ControlToken::parse("PARSE_ERROR:x").is_diagnostic());
}
