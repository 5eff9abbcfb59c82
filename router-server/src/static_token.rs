//! [`StaticTokenAdjudicator`]: a config-file-driven [`AuthAdjudicator`] that
//! checks the presented cookie against a pre-shared value for the workflow.
//! Reference implementation for a deployment that mints cookies out-of-band
//! and hands this binary a manifest of them; a deployment with a real
//! token-issuing service would swap this out for its own adjudicator
//! without touching `osmo-router`/`osmo-router-core`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use router_core::auth::{AuthAdjudicator, CallerIdentity, Denied};
use router_types::{Cookie, SessionKind, WorkflowId};
use serde::Deserialize;
use tracing::instrument;

/// One entry in the static manifest: the cookie `workflow_id` must present.
#[derive(Debug, Deserialize)]
struct Entry {
    workflow_id: String,
    cookie: String,
}

/// Adjudicator backed by a static, loaded-once manifest mapping
/// `workflow_id` to the cookie it must present. `kind` and `caller` are not
/// consulted: the manifest is the sole source of truth, trusting whatever
/// it's handed rather than doing its own lookups.
///
/// `AuthAdjudicator::authorize` is not handed the session key — its
/// signature is `(kind, workflow_id, cookie, caller)` — so a single shared
/// secret per workflow is the strongest binding this reference
/// implementation can enforce; see DESIGN.md for why per-session-key
/// scoping is left to a deployment that mints signed, session-bound
/// cookies instead of static ones.
pub struct StaticTokenAdjudicator {
    cookies: HashMap<String, Cookie>,
}

impl StaticTokenAdjudicator {
    /// Loads the manifest from a JSON file: a top-level array of
    /// `{"workflow_id", "cookie"}` objects.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| eyre::eyre!("reading {}: {err}", path.display()))?;
        let entries: Vec<Entry> =
            serde_json::from_str(&raw).map_err(|err| eyre::eyre!("parsing {}: {err}", path.display()))?;
        let mut cookies = HashMap::with_capacity(entries.len());
        for entry in entries {
            let cookie = Cookie::new(entry.cookie).ok_or_else(|| eyre::eyre!("empty cookie for workflow {}", entry.workflow_id))?;
            cookies.insert(entry.workflow_id, cookie);
        }
        tracing::info!(entries = cookies.len(), "loaded static token manifest");
        Ok(Self { cookies })
    }
}

#[async_trait]
impl AuthAdjudicator for StaticTokenAdjudicator {
    #[instrument(level = "debug", skip_all, fields(%kind, %workflow_id))]
    async fn authorize(
        &self,
        kind: SessionKind,
        workflow_id: &WorkflowId,
        cookie: &Cookie,
        _caller: &CallerIdentity,
    ) -> Result<(), Denied> {
        let _ = kind;
        match self.cookies.get(workflow_id.as_str()) {
            Some(expected) if expected == cookie => Ok(()),
            _ => Err(Denied("cookie did not match the static manifest".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("osmo-router-static-token-test-{name}.json"));
        std::fs::write(&path, contents).expect("write temp manifest");
        path
    }

    #[tokio::test]
    async fn matching_cookie_is_authorized() {
        let path = write_manifest("match", r#"[{"workflow_id": "wf-1", "cookie": "secret-1"}]"#);
        let adjudicator = StaticTokenAdjudicator::load(&path).expect("loads");
        let result = adjudicator
            .authorize(
                SessionKind::Exec,
                &WorkflowId::new("wf-1").unwrap(),
                &Cookie::new("secret-1").unwrap(),
                &CallerIdentity::default(),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mismatched_cookie_is_denied() {
        let path = write_manifest("mismatch", r#"[{"workflow_id": "wf-1", "cookie": "secret-1"}]"#);
        let adjudicator = StaticTokenAdjudicator::load(&path).expect("loads");
        let result = adjudicator
            .authorize(
                SessionKind::Exec,
                &WorkflowId::new("wf-1").unwrap(),
                &Cookie::new("wrong").unwrap(),
                &CallerIdentity::default(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_workflow_is_denied() {
        let path = write_manifest("unknown", r#"[{"workflow_id": "wf-1", "cookie": "secret-1"}]"#);
        let adjudicator = StaticTokenAdjudicator::load(&path).expect("loads");
        let result = adjudicator
            .authorize(
                SessionKind::Exec,
                &WorkflowId::new("wf-unknown").unwrap(),
                &Cookie::new("secret-1").unwrap(),
                &CallerIdentity::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
