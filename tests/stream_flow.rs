use agent_stream::SessionEnvelope;
use serde_json::json;
use stream_transducer::{transduce, CompactState, Transducer, UiChunk};

fn envelope(value: serde_json::Value) -> SessionEnvelope {
    serde_json::from_value(value).expect("envelope fixture should parse")
}

fn text_stream_envelopes() -> Vec<SessionEnvelope> {
    vec![
        envelope(json!({
            "type": "stream_event",
            "event": {
                "type": "content_block_start",
                "index": 0,
                "content_block": { "type": "text", "text": "" }
            }
        })),
        envelope(json!({
            "type": "stream_event",
            "event": {
                "type": "content_block_delta",
                "index": 0,
                "delta": { "type": "text_delta", "text": "Hi" }
            }
        })),
        envelope(json!({
            "type": "stream_event",
            "event": { "type": "content_block_stop", "index": 0 }
        })),
    ]
}

#[test]
fn text_stream_then_result_produces_full_ordered_sequence() {
    let mut envelopes = text_stream_envelopes();
    envelopes.push(envelope(json!({
        "type": "result",
        "usage": { "input_tokens": 10, "output_tokens": 2 }
    })));

    let chunks = transduce(&envelopes);

    assert_eq!(chunks.len(), 8);
    assert_eq!(chunks[0], UiChunk::Start);
    assert_eq!(chunks[1], UiChunk::StartStep);
    assert_eq!(
        chunks[2],
        UiChunk::TextStart {
            id: "text_1".to_string(),
        }
    );
    assert_eq!(
        chunks[3],
        UiChunk::TextDelta {
            id: "text_1".to_string(),
            delta: "Hi".to_string(),
        }
    );
    assert_eq!(
        chunks[4],
        UiChunk::TextEnd {
            id: "text_1".to_string(),
        }
    );

    let UiChunk::MessageMetadata { metadata } = &chunks[5] else {
        panic!("expected terminal message-metadata, got {:?}", chunks[5]);
    };
    assert_eq!(metadata.input_tokens, Some(10));
    assert_eq!(metadata.output_tokens, Some(2));
    assert_eq!(metadata.total_tokens, Some(12));
    assert_eq!(metadata.result_subtype.as_deref(), Some("success"));
    assert_eq!(metadata.final_text_id.as_deref(), Some("text_1"));

    assert_eq!(chunks[6], UiChunk::FinishStep);
    let UiChunk::Finish { metadata: finish } = &chunks[7] else {
        panic!("expected finish, got {:?}", chunks[7]);
    };
    assert_eq!(finish, metadata);
}

#[test]
fn start_appears_exactly_once_and_first() {
    let mut envelopes = text_stream_envelopes();
    envelopes.extend(text_stream_envelopes());
    envelopes.push(envelope(json!({ "type": "result" })));

    let chunks = transduce(&envelopes);

    assert_eq!(chunks[0], UiChunk::Start);
    let starts = chunks
        .iter()
        .filter(|chunk| matches!(chunk, UiChunk::Start))
        .count();
    assert_eq!(starts, 1);
}

#[test]
fn text_delta_without_prior_block_start_synthesizes_one() {
    let chunks = transduce(&[envelope(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_delta",
            "delta": { "type": "text_delta", "text": "orphan" }
        }
    }))]);

    assert_eq!(
        chunks,
        vec![
            UiChunk::Start,
            UiChunk::StartStep,
            UiChunk::TextStart {
                id: "text_1".to_string(),
            },
            UiChunk::TextDelta {
                id: "text_1".to_string(),
                delta: "orphan".to_string(),
            },
        ]
    );
}

#[test]
fn result_with_open_text_block_closes_it_before_finish() {
    let mut transducer = Transducer::new();
    transducer.handle_envelope(&envelope(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_start",
            "content_block": { "type": "text", "text": "" }
        }
    })));

    let terminal = transducer.handle_envelope(&envelope(json!({ "type": "result" })));

    assert_eq!(
        terminal[0],
        UiChunk::TextEnd {
            id: "text_1".to_string(),
        }
    );
    assert!(matches!(terminal.last(), Some(UiChunk::Finish { .. })));
}

#[test]
fn result_metadata_carries_session_cost_and_subtype() {
    let chunks = transduce(&[envelope(json!({
        "type": "result",
        "subtype": "error_during_execution",
        "usage": {
            "input_tokens": 4,
            "output_tokens": 6,
            "cache_read_input_tokens": 100
        },
        "total_cost_usd": 0.0123,
        "session_id": "sess-9"
    }))]);

    let UiChunk::Finish { metadata } = chunks.last().expect("chunks should not be empty") else {
        panic!("expected finish chunk");
    };
    assert_eq!(metadata.session_id.as_deref(), Some("sess-9"));
    assert_eq!(metadata.total_cost_usd, Some(0.0123));
    assert_eq!(metadata.cache_read_input_tokens, Some(100));
    assert_eq!(
        metadata.result_subtype.as_deref(),
        Some("error_during_execution")
    );
    assert_eq!(metadata.final_text_id, None);
    assert!(metadata.duration_ms.is_some());
}

#[test]
fn compaction_status_pair_shares_one_cycle_id() {
    let chunks = transduce(&[
        envelope(json!({ "type": "system", "subtype": "status", "status": "compacting" })),
        envelope(json!({ "type": "system", "subtype": "compact_boundary" })),
    ]);

    let compacts: Vec<_> = chunks
        .iter()
        .filter_map(|chunk| match chunk {
            UiChunk::SystemCompact {
                tool_call_id,
                state,
            } => Some((tool_call_id.clone(), *state)),
            _ => None,
        })
        .collect();

    assert_eq!(compacts.len(), 2);
    assert_eq!(compacts[0].0, compacts[1].0);
    assert_eq!(compacts[0].1, CompactState::InputStreaming);
    assert_eq!(compacts[1].1, CompactState::OutputAvailable);
}

#[test]
fn compact_boundary_without_outstanding_cycle_is_dropped() {
    let chunks = transduce(&[envelope(json!({
        "type": "system",
        "subtype": "compact_boundary"
    }))]);

    assert_eq!(chunks, vec![UiChunk::Start, UiChunk::StartStep]);
}

#[test]
fn consecutive_compaction_cycles_get_distinct_ids() {
    let envelopes = vec![
        envelope(json!({ "type": "system", "subtype": "status", "status": "compacting" })),
        envelope(json!({ "type": "system", "subtype": "compact_boundary" })),
        envelope(json!({ "type": "system", "subtype": "status", "status": "compacting" })),
        envelope(json!({ "type": "system", "subtype": "compact_boundary" })),
    ];

    let ids: Vec<_> = transduce(&envelopes)
        .into_iter()
        .filter_map(|chunk| match chunk {
            UiChunk::SystemCompact { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        })
        .collect();

    assert_eq!(ids.len(), 4);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[2], ids[3]);
    assert_ne!(ids[0], ids[2]);
}

#[test]
fn unrecognized_envelope_types_emit_no_chunks() {
    let mut transducer = Transducer::new();
    transducer.handle_envelope(&envelope(json!({ "type": "system", "subtype": "init" })));

    let chunks = transducer.handle_envelope(&envelope(json!({
        "type": "telemetry",
        "payload": { "ignored": true }
    })));

    assert!(chunks.is_empty());
}

#[test]
fn uuid_checkpoint_precedes_type_specific_chunks() {
    let chunks = transduce(&[envelope(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_start",
            "content_block": { "type": "text", "text": "" }
        },
        "uuid": "u-77"
    }))]);

    assert_eq!(chunks[0], UiChunk::Start);
    assert_eq!(chunks[1], UiChunk::StartStep);
    let UiChunk::MessageMetadata { metadata } = &chunks[2] else {
        panic!("expected checkpoint metadata before text-start");
    };
    assert_eq!(metadata.sdk_message_uuid.as_deref(), Some("u-77"));
    assert!(matches!(chunks[3], UiChunk::TextStart { .. }));
}
