//! Strongly-typed identifiers shared by every crate in the workspace.
//!
//! These wrap the opaque strings carried on the wire (`session_key`,
//! `cookie`, `workflow_id`) so that call sites can't accidentally swap two
//! `String`s of the same shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The 128-bit opaque key used to rendezvous a client half with an agent
/// half. Carried as a `string` on the wire; callers are free to mint it
/// however they like (a UUID is the expected convention).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

/// Opaque token minted per-session by the authorization system, scoped to
/// the `(workflow_id, session_key)` pair. The router never inspects its
/// contents beyond equality.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(String);

/// Identifies the workflow that launched the task pod this session talks to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl SessionKey {
    /// Wraps a raw key. Returns `None` for the empty string, which is never
    /// a valid session key (see the `expected_init` / `malformed_init`
    /// terminal reasons).
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Cookie {
    /// Wraps a raw cookie value. Returns `None` for the empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl WorkflowId {
    /// Wraps a raw workflow id. Returns `None` for the empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Cookies are never logged: manual Debug that redacts the value.
impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cookie(..)")
    }
}

/// The three session kinds this router brokers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    /// Remote shell / TTY.
    Exec,
    /// TCP or UDP tunnel to a port inside the pod.
    PortForward,
    /// File synchronization over a streamed transport.
    Rsync,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionKind::Exec => "exec",
            SessionKind::PortForward => "port_forward",
            SessionKind::Rsync => "rsync",
        };
        f.write_str(s)
    }
}

/// Transport protocol for a `port_forward` session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortForwardProtocol {
    Tcp,
    Udp,
}

/// Direction of an `rsync` session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsyncDirection {
    Upload,
    Download,
}

/// Kind-specific fields carried by an `Init` frame. `Exec` has no extras.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindOptions {
    Exec,
    PortForward {
        protocol: PortForwardProtocol,
        remote_port: u16,
    },
    Rsync {
        direction: RsyncDirection,
    },
}

impl KindOptions {
    /// The [`SessionKind`] these options belong to.
    pub fn kind(&self) -> SessionKind {
        match self {
            KindOptions::Exec => SessionKind::Exec,
            KindOptions::PortForward { .. } => SessionKind::PortForward,
            KindOptions::Rsync { .. } => SessionKind::Rsync,
        }
    }
}

/// The fully decoded, kind-agnostic contents of an `Init` frame. This is
/// the only frame class the codec ever deserializes.
#[derive(Clone, Debug)]
pub struct InitFields {
    pub session_key: SessionKey,
    pub cookie: Cookie,
    pub workflow_id: WorkflowId,
    pub options: KindOptions,
}

impl InitFields {
    /// Returns `true` iff `self` and `other` agree on everything the
    /// registry requires to bind two halves together: workflow, cookie,
    /// kind, and kind-specific options.
    pub fn matches_peer(&self, other: &InitFields) -> bool {
        self.workflow_id == other.workflow_id
            && self.cookie == other.cookie
            && self.options == other.options
    }
}
