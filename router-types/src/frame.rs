//! Kind-agnostic view over the six generated request/response message types.
//!
//! The Splicer and Stream Endpoints are written once against the
//! [`SessionFrame`] trait instead of six times against
//! `ExecRequest`/`ExecResponse`/... This mirrors field numbers 1/2/3
//! (`init`/`data`/`close`) being identical across all six schemas (see
//! `proto/session.proto`): only the shape of `Init` and `Close` varies per
//! kind, and that variance is captured by [`KindOptions`](crate::ids::KindOptions)
//! and [`CloseInfo`] rather than by duplicating the forwarding logic.

use bytes::Bytes;

use crate::ids::{Cookie, InitFields, KindOptions, PortForwardProtocol, RsyncDirection, SessionKey, WorkflowId};
use crate::proto;

/// What a raw frame turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Init,
    Data,
    Close,
    /// Empty message, or (should never happen with a well-formed oneof) no
    /// variant set at all.
    Unknown,
}

/// Why decoding an `Init` frame's inner fields failed. Maps to the
/// `malformed_init` terminal reason.
#[derive(Debug, thiserror::Error)]
pub enum MalformedInit {
    #[error("init frame is missing the session_key field")]
    MissingSessionKey,
    #[error("init frame is missing the cookie field")]
    MissingCookie,
    #[error("init frame is missing the workflow_id field")]
    MissingWorkflowId,
    #[error("port-forward init has an out-of-range remote_port: {0}")]
    PortOutOfRange(i32),
    #[error("rsync init has an unrecognized direction: {0:?}")]
    UnknownDirection(String),
}

/// Unified view of a `Close` frame across all three kinds. Only `exec`
/// populates `exit_code`; only `rsync` populates `success`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    pub success: Option<bool>,
}

/// Common behavior over `{Exec,PortForward,Rsync}{Request,Response}`.
///
/// Implementors are the types generated from `proto/session.proto`. The
/// Frame Codec never needs to know which of the six concrete types it is
/// holding once code is written against this trait.
pub trait SessionFrame: prost::Message + Default + Clone + Sized + 'static {
    /// Classifies the frame without attempting to decode `Init`/`Close`
    /// contents. Cheap: it only matches on the already-decoded oneof
    /// discriminant, which corresponds 1:1 to the wire tag (see
    /// `osmo_router_core::codec` for the raw-byte form of this same
    /// classification, exercised by the conformance test).
    fn classify(&self) -> Classification;

    /// Decodes the kind-specific `Init` fields. Only ever called once per
    /// half: an `Init` frame is accepted exactly once per half.
    fn decode_init(&self) -> Result<InitFields, MalformedInit>;

    /// Returns the payload bytes of a `Data` frame, if this is one.
    /// `Bytes::clone` is a refcount bump, not a copy (see build.rs).
    fn as_data(&self) -> Option<(&Bytes, u64)>;

    /// Returns the unified close information, if this is a `Close` frame.
    fn as_close(&self) -> Option<CloseInfo>;

    /// Builds a `Data` frame carrying `payload`/`seq`, for forwarding.
    fn data_frame(payload: Bytes, seq: u64) -> Self;

    /// Builds a `Close` frame carrying `info`, for forwarding/mirroring.
    fn close_frame(info: CloseInfo) -> Self;
}

fn require(value: String, err: MalformedInit) -> Result<String, MalformedInit> {
    if value.is_empty() { Err(err) } else { Ok(value) }
}

fn port_forward_options(protocol: i32, remote_port: i32) -> Result<KindOptions, MalformedInit> {
    let protocol = match proto::Protocol::try_from(protocol).unwrap_or(proto::Protocol::Tcp) {
        proto::Protocol::Tcp => PortForwardProtocol::Tcp,
        proto::Protocol::Udp => PortForwardProtocol::Udp,
    };
    let remote_port: u16 = remote_port
        .try_into()
        .map_err(|_| MalformedInit::PortOutOfRange(remote_port))?;
    Ok(KindOptions::PortForward { protocol, remote_port })
}

fn rsync_options(direction: &str) -> Result<KindOptions, MalformedInit> {
    let direction = match direction {
        "upload" => RsyncDirection::Upload,
        "download" => RsyncDirection::Download,
        other => return Err(MalformedInit::UnknownDirection(other.to_owned())),
    };
    Ok(KindOptions::Rsync { direction })
}

/// Generates a `SessionFrame` impl for one `{Exec,PortForward,Rsync}{Request,Response}`
/// type. `$init_extra` builds the `KindOptions` from the kind-specific init
/// fields; `$close_build`/`$close_read` convert between the kind-specific
/// close message and [`CloseInfo`].
macro_rules! impl_session_frame {
    (
        $ty:ty, $module:ident,
        init_options: |$init:ident| $init_extra:expr,
        close_read: |$close_in:ident| $close_read:expr,
        close_build: |$close_out:ident| $close_build:expr $(,)?
    ) => {
        impl SessionFrame for $ty {
            fn classify(&self) -> Classification {
                match &self.payload {
                    Some(proto::$module::Payload::Init(_)) => Classification::Init,
                    Some(proto::$module::Payload::Data(_)) => Classification::Data,
                    Some(proto::$module::Payload::Close(_)) => Classification::Close,
                    None => Classification::Unknown,
                }
            }

            fn decode_init(&self) -> Result<InitFields, MalformedInit> {
                let $init = match &self.payload {
                    Some(proto::$module::Payload::Init(init)) => init,
                    _ => {
                        return Err(MalformedInit::MissingSessionKey);
                    }
                };
                let session_key = require($init.session_key.clone(), MalformedInit::MissingSessionKey)?;
                let cookie = require($init.cookie.clone(), MalformedInit::MissingCookie)?;
                let workflow_id = require($init.workflow_id.clone(), MalformedInit::MissingWorkflowId)?;
                Ok(InitFields {
                    session_key: SessionKey::new(session_key).ok_or(MalformedInit::MissingSessionKey)?,
                    cookie: Cookie::new(cookie).ok_or(MalformedInit::MissingCookie)?,
                    workflow_id: WorkflowId::new(workflow_id).ok_or(MalformedInit::MissingWorkflowId)?,
                    options: $init_extra,
                })
            }

            fn as_data(&self) -> Option<(&Bytes, u64)> {
                match &self.payload {
                    Some(proto::$module::Payload::Data(data)) => Some((&data.payload, data.seq)),
                    _ => None,
                }
            }

            fn as_close(&self) -> Option<CloseInfo> {
                match &self.payload {
                    Some(proto::$module::Payload::Close($close_in)) => Some($close_read),
                    _ => None,
                }
            }

            fn data_frame(payload: Bytes, seq: u64) -> Self {
                Self {
                    payload: Some(proto::$module::Payload::Data(proto::DataFrame { payload, seq })),
                }
            }

            fn close_frame(info: CloseInfo) -> Self {
                let $close_out = info;
                Self {
                    payload: Some(proto::$module::Payload::Close($close_build)),
                }
            }
        }
    };
}

impl_session_frame!(
    proto::ExecRequest, exec_request,
    init_options: |init| { let _ = init; KindOptions::Exec },
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: Some(c.exit_code), success: None },
    close_build: |info| proto::ExecClose {
        reason: info.reason.unwrap_or_default(),
        exit_code: info.exit_code.unwrap_or_default(),
    },
);

impl_session_frame!(
    proto::ExecResponse, exec_response,
    init_options: |init| { let _ = init; KindOptions::Exec },
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: Some(c.exit_code), success: None },
    close_build: |info| proto::ExecClose {
        reason: info.reason.unwrap_or_default(),
        exit_code: info.exit_code.unwrap_or_default(),
    },
);

impl_session_frame!(
    proto::PortForwardRequest, port_forward_request,
    init_options: |init| port_forward_options(init.protocol, init.remote_port)?,
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: None, success: None },
    close_build: |info| proto::PortForwardClose { reason: info.reason.unwrap_or_default() },
);

impl_session_frame!(
    proto::PortForwardResponse, port_forward_response,
    init_options: |init| port_forward_options(init.protocol, init.remote_port)?,
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: None, success: None },
    close_build: |info| proto::PortForwardClose { reason: info.reason.unwrap_or_default() },
);

impl_session_frame!(
    proto::RsyncRequest, rsync_request,
    init_options: |init| rsync_options(&init.direction)?,
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: None, success: Some(c.success) },
    close_build: |info| proto::RsyncClose {
        success: info.success.unwrap_or(false),
        reason: info.reason.unwrap_or_default(),
    },
);

impl_session_frame!(
    proto::RsyncResponse, rsync_response,
    init_options: |init| rsync_options(&init.direction)?,
    close_read: |c| CloseInfo { reason: Some(c.reason.clone()), exit_code: None, success: Some(c.success) },
    close_build: |info| proto::RsyncClose {
        success: info.success.unwrap_or(false),
        reason: info.reason.unwrap_or_default(),
    },
);

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    fn canonical_init() -> proto::TunnelInit {
        proto::TunnelInit {
            session_key: "k1".into(),
            cookie: "c1".into(),
            workflow_id: "wf-32".into(),
        }
    }

    /// The legacy `TunnelMessage` wire tag matches 0x0A/0x12/0x1A for
    /// init/data/close, same as every other frame type in this schema.
    #[test]
    fn tunnel_message_wire_tags() {
        let init = proto::TunnelMessage {
            payload: Some(proto::tunnel_message::Payload::Init(canonical_init())),
        };
        let data = proto::TunnelMessage {
            payload: Some(proto::tunnel_message::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"hi"),
                seq: 1,
            })),
        };
        let close = proto::TunnelMessage {
            payload: Some(proto::tunnel_message::Payload::Close(proto::ExecClose {
                reason: "done".into(),
                exit_code: 0,
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
    }

    #[test]
    fn exec_request_wire_tags() {
        let init = proto::ExecRequest {
            payload: Some(proto::exec_request::Payload::Init(proto::ExecInit {
                session_key: "k".into(),
                cookie: "c".into(),
                workflow_id: "w".into(),
            })),
        };
        let data = proto::ExecRequest {
            payload: Some(proto::exec_request::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"ls\n"),
                seq: 1,
            })),
        };
        let close = proto::ExecRequest {
            payload: Some(proto::exec_request::Payload::Close(proto::ExecClose {
                reason: String::new(),
                exit_code: 0,
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
        assert_eq!(init.classify(), Classification::Init);
        assert_eq!(data.classify(), Classification::Data);
        assert_eq!(close.classify(), Classification::Close);
    }

    #[test]
    fn port_forward_request_wire_tags() {
        let init = proto::PortForwardRequest {
            payload: Some(proto::port_forward_request::Payload::Init(proto::PortForwardInit {
                session_key: "k".into(),
                cookie: "c".into(),
                workflow_id: "w".into(),
                protocol: proto::Protocol::Tcp as i32,
                remote_port: 22,
            })),
        };
        let data = proto::PortForwardRequest {
            payload: Some(proto::port_forward_request::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"x"),
                seq: 0,
            })),
        };
        let close = proto::PortForwardRequest {
            payload: Some(proto::port_forward_request::Payload::Close(proto::PortForwardClose {
                reason: String::new(),
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
    }

    #[test]
    fn port_forward_response_wire_tags() {
        let init = proto::PortForwardResponse {
            payload: Some(proto::port_forward_response::Payload::Init(proto::PortForwardInit {
                session_key: "k".into(),
                cookie: "c".into(),
                workflow_id: "w".into(),
                protocol: proto::Protocol::Udp as i32,
                remote_port: 53,
            })),
        };
        let data = proto::PortForwardResponse {
            payload: Some(proto::port_forward_response::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"x"),
                seq: 0,
            })),
        };
        let close = proto::PortForwardResponse {
            payload: Some(proto::port_forward_response::Payload::Close(proto::PortForwardClose {
                reason: String::new(),
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
    }

    #[test]
    fn rsync_request_wire_tags() {
        let init = proto::RsyncRequest {
            payload: Some(proto::rsync_request::Payload::Init(proto::RsyncInit {
                session_key: "k".into(),
                cookie: "c".into(),
                workflow_id: "w".into(),
                direction: "upload".into(),
            })),
        };
        let data = proto::RsyncRequest {
            payload: Some(proto::rsync_request::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"x"),
                seq: 0,
            })),
        };
        let close = proto::RsyncRequest {
            payload: Some(proto::rsync_request::Payload::Close(proto::RsyncClose {
                success: true,
                reason: String::new(),
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
    }

    #[test]
    fn rsync_response_wire_tags() {
        let init = proto::RsyncResponse {
            payload: Some(proto::rsync_response::Payload::Init(proto::RsyncInit {
                session_key: "k".into(),
                cookie: "c".into(),
                workflow_id: "w".into(),
                direction: "download".into(),
            })),
        };
        let data = proto::RsyncResponse {
            payload: Some(proto::rsync_response::Payload::Data(proto::DataFrame {
                payload: Bytes::from_static(b"x"),
                seq: 0,
            })),
        };
        let close = proto::RsyncResponse {
            payload: Some(proto::rsync_response::Payload::Close(proto::RsyncClose {
                success: false,
                reason: String::new(),
            })),
        };
        assert_eq!(init.encode_to_vec()[0], 0x0A);
        assert_eq!(data.encode_to_vec()[0], 0x12);
        assert_eq!(close.encode_to_vec()[0], 0x1A);
    }

    #[test]
    fn port_forward_init_decodes_protocol_and_port() {
        let req = proto::PortForwardRequest {
            payload: Some(proto::port_forward_request::Payload::Init(proto::PortForwardInit {
                session_key: "k2".into(),
                cookie: "c2".into(),
                workflow_id: "wf-32".into(),
                protocol: proto::Protocol::Tcp as i32,
                remote_port: 8080,
            })),
        };
        let init = req.decode_init().unwrap();
        assert_eq!(
            init.options,
            KindOptions::PortForward { protocol: PortForwardProtocol::Tcp, remote_port: 8080 }
        );
    }

    #[test]
    fn rsync_init_rejects_unknown_direction() {
        let req = proto::RsyncRequest {
            payload: Some(proto::rsync_request::Payload::Init(proto::RsyncInit {
                session_key: "k3".into(),
                cookie: "c3".into(),
                workflow_id: "wf-32".into(),
                direction: "sideways".into(),
            })),
        };
        assert!(matches!(req.decode_init(), Err(MalformedInit::UnknownDirection(_))));
    }

    #[test]
    fn empty_frame_is_unknown() {
        let req = proto::ExecRequest { payload: None };
        assert_eq!(req.classify(), Classification::Unknown);
    }
}
