#![allow(clippy::float_cmp)]

use super::*;

fn decode(payload: &str) -> StreamEvent {
    decode_event(payload, ProgressScale::Fraction).expect("decode should succeed")
}

// =============================================================
// decode_event
// =============================================================

#[test]
fn decodes_message_start_with_session() {
    let ev = decode(r#"{"type":"message_start","session_id":"s-1"}"#);
    assert_eq!(ev.kind, EventKind::MessageStart);
    assert_eq!(ev.session_id.as_deref(), Some("s-1"));
    assert_eq!(ev.message_id, None);
}

#[test]
fn decodes_delta_content() {
    let ev = decode(r#"{"type":"message_delta","content":"Okay, "}"#);
    assert_eq!(ev.kind, EventKind::MessageDelta { content: "Okay, ".into() });
}

#[test]
fn delta_without_content_is_empty() {
    let ev = decode(r#"{"type":"message_delta"}"#);
    assert_eq!(ev.kind, EventKind::MessageDelta { content: String::new() });
}

#[test]
fn decodes_complete_with_ids() {
    let ev = decode(r#"{"type":"message_complete","message_id":"m-9","content":"all"}"#);
    assert_eq!(ev.kind, EventKind::MessageComplete { content: Some("all".into()) });
    assert_eq!(ev.message_id.as_deref(), Some("m-9"));
    assert!(ev.kind.is_terminal());
}

#[test]
fn decodes_status_update_fields() {
    let ev = decode(
        r#"{"type":"status_update","phase":"tool_use","progress":0.6,"message":"Writing",
            "step":{"current":2,"total":5},"filename":"game.js"}"#,
    );
    let EventKind::StatusUpdate(update) = ev.kind else {
        panic!("expected status update");
    };
    assert_eq!(update.phase(), Some(Phase::ToolUse));
    assert!((update.percentage.unwrap() - 60.0).abs() < 1e-9);
    assert_eq!(update.message.as_deref(), Some("Writing"));
    assert_eq!(update.step, Some(Step { current: 2, total: 5 }));
    assert_eq!(update.filename.as_deref(), Some("game.js"));
}

#[test]
fn status_update_with_object_message_drops_it() {
    let ev = decode(r#"{"type":"status_update","phase":"planning","message":{"id":"x"}}"#);
    let EventKind::StatusUpdate(update) = ev.kind else {
        panic!("expected status update");
    };
    assert_eq!(update.message, None);
    assert_eq!(update.percentage, None);
}

#[test]
fn status_update_unknown_phase_keeps_raw_name() {
    let ev = decode(r#"{"type":"status_update","phase":"daydreaming"}"#);
    let EventKind::StatusUpdate(update) = ev.kind else {
        panic!("expected status update");
    };
    assert_eq!(update.phase.as_deref(), Some("daydreaming"));
    assert_eq!(update.phase(), None);
}

#[test]
fn decodes_error_text() {
    let ev = decode(r#"{"type":"error","error":"rate limited"}"#);
    assert_eq!(ev.kind, EventKind::Error { error: Some("rate limited".into()) });
    assert!(ev.kind.is_terminal());
}

#[test]
fn unknown_fields_are_ignored() {
    let ev = decode(r#"{"type":"message_start","project_id":"p","extra":[1,2]}"#);
    assert_eq!(ev.kind, EventKind::MessageStart);
}

#[test]
fn rejects_unknown_type() {
    let err = decode_event(r#"{"type":"message_paused"}"#, ProgressScale::Fraction).unwrap_err();
    assert!(matches!(err, CodecError::UnknownType(t) if t == "message_paused"));
}

#[test]
fn rejects_missing_type() {
    let err = decode_event(r#"{"content":"x"}"#, ProgressScale::Fraction).unwrap_err();
    assert!(matches!(err, CodecError::MissingType));
}

#[test]
fn rejects_malformed_json() {
    let err = decode_event(r#"{"type":"message_delta","#, ProgressScale::Fraction).unwrap_err();
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn rejects_empty_payload() {
    assert!(matches!(decode_event("  ", ProgressScale::Fraction), Err(CodecError::Empty)));
}

// =============================================================
// ProgressScale
// =============================================================

#[test]
fn fraction_scale_multiplies_and_clamps() {
    assert!((ProgressScale::Fraction.to_percent(0.3) - 30.0).abs() < 1e-9);
    assert_eq!(ProgressScale::Fraction.to_percent(1.7), 100.0);
    assert_eq!(ProgressScale::Fraction.to_percent(-0.2), 0.0);
}

#[test]
fn percent_scale_passes_through_and_clamps() {
    assert_eq!(ProgressScale::Percent.to_percent(42.0), 42.0);
    assert_eq!(ProgressScale::Percent.to_percent(250.0), 100.0);
    assert_eq!(ProgressScale::Percent.to_percent(f64::NAN), 0.0);
}

#[test]
fn percent_scale_decodes_as_is() {
    let ev = decode_event(r#"{"type":"status_update","progress":45}"#, ProgressScale::Percent).unwrap();
    let EventKind::StatusUpdate(update) = ev.kind else {
        panic!("expected status update");
    };
    assert_eq!(update.percentage, Some(45.0));
}

#[test]
fn scale_parses_from_config_strings() {
    assert_eq!("fraction".parse::<ProgressScale>(), Ok(ProgressScale::Fraction));
    assert_eq!(" Percent ".parse::<ProgressScale>(), Ok(ProgressScale::Percent));
    assert_eq!("ratio".parse::<ProgressScale>(), Err(UnknownScale("ratio".into())));
}

// =============================================================
// encode_event
// =============================================================

#[test]
fn encode_frames_as_single_data_line() {
    let frame = encode_event(&StreamEvent::delta("hi").with_session("s"), ProgressScale::Fraction);
    assert!(frame.starts_with("data: {"));
    assert!(frame.ends_with("}\n\n"));
    assert_eq!(frame.matches('\n').count(), 2);
}

#[test]
fn encode_converts_percentage_back_to_wire_scale() {
    let ev = StreamEvent::status(Phase::Understanding, 10.0, "Analyzing your request...");
    let frame = encode_event(&ev, ProgressScale::Fraction);
    let json: serde_json::Value = serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(json["type"], "status_update");
    assert_eq!(json["phase"], "understanding");
    assert!((json["progress"].as_f64().unwrap() - 0.1).abs() < 1e-9);
}

#[test]
fn encoded_frames_decode_through_sse() {
    let events = vec![
        StreamEvent::new(EventKind::MessageStart).with_session("s-1"),
        StreamEvent::status(Phase::Generating, 70.0, "Crafting response..."),
        StreamEvent::delta("line one\nline two"),
        StreamEvent::error("boom"),
    ];
    let wire: String = events.iter().map(|e| encode_event(e, ProgressScale::Fraction)).collect();

    let mut dec = SseDecoder::new();
    let decoded: Vec<StreamEvent> = dec
        .push(wire.as_bytes())
        .into_iter()
        .map(|p| decode_event(&p.unwrap(), ProgressScale::Fraction).unwrap())
        .collect();

    assert_eq!(decoded.len(), events.len());
    assert_eq!(decoded[0], events[0]);
    assert_eq!(decoded[2], events[2]);
    assert_eq!(decoded[3], events[3]);
    let EventKind::StatusUpdate(update) = &decoded[1].kind else {
        panic!("expected status update");
    };
    assert!((update.percentage.unwrap() - 70.0).abs() < 1e-9);
}
