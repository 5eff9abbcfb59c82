//! Raw wire-tag classification, independent of the decoded oneof.
//!
//! `router_types::SessionFrame::classify` already gives a cheap,
//! already-decoded classification for the hot path. This module exists to
//! pin down the literal claim that the *first byte* of a marshaled frame
//! predicts its class without touching the rest of the buffer. The
//! conformance test below exercises that claim directly against encoded
//! bytes, independent of whatever prost does internally to decode the
//! oneof.

use router_types::Classification;

/// Classifies a frame from its raw encoded bytes. Field numbers 1/2/3
/// (`init`/`data`/`close`) are load-bearing across every schema in
/// `proto/session.proto`: renumbering any of them is a wire-format break.
pub fn classify_wire_tag(bytes: &[u8]) -> Classification {
    match bytes.first() {
        Some(0x0A) => Classification::Init,
        Some(0x12) => Classification::Data,
        Some(0x1A) => Classification::Close,
        _ => Classification::Unknown,
    }
}

/// Errors the codec layer can raise before a frame reaches the registry.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Classification was `Unknown` (empty buffer or unrecognized leading
    /// byte). Maps to the `expected_init`/`protocol_error` terminal
    /// reasons depending on where it's encountered.
    #[error("frame is empty or carries an unrecognized leading byte")]
    UnknownFrame,
    /// The `Init` frame's inner fields failed to decode structurally.
    #[error(transparent)]
    MalformedInit(#[from] router_types::MalformedInit),
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use prost::Message as _;
    use router_types::proto;

    use super::*;

    fn assert_init_data_close<M: prost::Message>(init: M, data: M, close: M) {
        assert_eq!(classify_wire_tag(&init.encode_to_vec()), Classification::Init);
        assert_eq!(classify_wire_tag(&data.encode_to_vec()), Classification::Data);
        assert_eq!(classify_wire_tag(&close.encode_to_vec()), Classification::Close);
    }

    /// Exercised here on the raw encoded bytes for the `exec` pair; the
    /// router-types crate covers the remaining five kinds plus the legacy
    /// `TunnelMessage` via `SessionFrame::classify`.
    #[test]
    fn exec_request_wire_tag_conformance() {
        assert_init_data_close(
            proto::ExecRequest {
                payload: Some(proto::exec_request::Payload::Init(proto::ExecInit {
                    session_key: "k".into(),
                    cookie: "c".into(),
                    workflow_id: "w".into(),
                })),
            },
            proto::ExecRequest {
                payload: Some(proto::exec_request::Payload::Data(proto::DataFrame {
                    payload: Bytes::from_static(b"x"),
                    seq: 0,
                })),
            },
            proto::ExecRequest {
                payload: Some(proto::exec_request::Payload::Close(proto::ExecClose {
                    reason: String::new(),
                    exit_code: 0,
                })),
            },
        );
    }

    #[test]
    fn exec_response_wire_tag_conformance() {
        assert_init_data_close(
            proto::ExecResponse {
                payload: Some(proto::exec_response::Payload::Init(proto::ExecInit {
                    session_key: "k".into(),
                    cookie: "c".into(),
                    workflow_id: "w".into(),
                })),
            },
            proto::ExecResponse {
                payload: Some(proto::exec_response::Payload::Data(proto::DataFrame {
                    payload: Bytes::from_static(b"x"),
                    seq: 0,
                })),
            },
            proto::ExecResponse {
                payload: Some(proto::exec_response::Payload::Close(proto::ExecClose {
                    reason: String::new(),
                    exit_code: 0,
                })),
            },
        );
    }

    #[test]
    fn empty_bytes_are_unknown() {
        assert_eq!(classify_wire_tag(&[]), Classification::Unknown);
    }
}
