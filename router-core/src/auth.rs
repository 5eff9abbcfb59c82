//! Auth Adjudicator: a stateless predicate checked before `attach_*` is
//! allowed to mutate the registry. The router core only depends on the
//! trait; a concrete implementation is supplied by the hosting binary,
//! which keeps the registry itself free of any particular verification
//! scheme.

use async_trait::async_trait;
use router_types::{Cookie, SessionKind, WorkflowId};

/// Why the adjudicator refused a session. The router never reveals this
/// to the caller beyond the generic `unauthorized` terminal reason, so a
/// failed attach never leaks whether the key, cookie, or workflow was the
/// part that didn't match.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Denied(pub String);

/// Caller identity as established by the transport layer (e.g. an mTLS
/// subject or bearer-token subject). Opaque to the router core; the
/// adjudicator implementation decides what it means.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CallerIdentity(pub Option<String>);

/// A pure function over externally-supplied policy state: workflow
/// ownership, role bindings, token validity. The router core does not
/// prescribe its internals beyond three requirements: the cookie must be
/// scoped to `(workflow_id, session_key)`, expiry must be enforced, and
/// denial must be deterministic from its inputs.
#[async_trait]
pub trait AuthAdjudicator: Send + Sync {
    /// Checks whether `caller` may open a session of `kind` for
    /// `workflow_id` using `cookie`.
    async fn authorize(
        &self,
        kind: SessionKind,
        workflow_id: &WorkflowId,
        cookie: &Cookie,
        caller: &CallerIdentity,
    ) -> Result<(), Denied>;
}

/// Reference adjudicator that allows every request. Useful for local
/// development and the test harness; never appropriate for a deployment
/// that handles real cookies.
pub struct AllowAll;

#[async_trait]
impl AuthAdjudicator for AllowAll {
    async fn authorize(
        &self,
        _kind: SessionKind,
        _workflow_id: &WorkflowId,
        _cookie: &Cookie,
        _caller: &CallerIdentity,
    ) -> Result<(), Denied> {
        Ok(())
    }
}
