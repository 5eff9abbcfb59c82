//! Session Registry: the process-wide `session_key -> Session` map,
//! sharded by `hash(key) % N` so the rendezvous-path lock never sits on
//! the data path. Each shard holds a typed payload per entry rather than
//! a bare membership check.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use router_types::{CloseInfo, InitFields, SessionFrame, SessionKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::half::Half;
use crate::lifecycle::{TerminalEvent, TerminalEventSink, TerminalReason};
use crate::metrics::{METRICS_ID_REGISTRY_SESSIONS_OPEN, METRICS_ID_REGISTRY_SESSIONS_TIMEOUT};

/// Why `attach_client`/`attach_agent` refused to bind a half.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A half of this role is already attached (or parked) for this key.
    #[error("a half of this role is already attached for this session key")]
    Duplicate,
    /// The presented init fields disagree with the peer already parked on
    /// this key (`workflow_id`, `cookie`, or kind-specific options).
    #[error("presented init fields do not match the peer already waiting on this key")]
    KeyMismatch,
    /// The registry is at its configured capacity.
    #[error("registry is at capacity")]
    Overloaded,
}

/// Why the background sweep or an admin action tore down a parked/bound
/// session without a normal close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictReason {
    /// TTL elapsed while only one half was present.
    PeerUnmatched,
    /// Explicit administrative eviction.
    AdminEvict,
}

impl EvictReason {
    fn as_terminal_reason(self) -> &'static str {
        self.as_terminal_reason_enum().as_str()
    }

    fn as_terminal_reason_enum(self) -> TerminalReason {
        match self {
            EvictReason::PeerUnmatched => TerminalReason::PeerUnmatched,
            EvictReason::AdminEvict => TerminalReason::AdminEvict,
        }
    }
}

/// Tunables for a [`SessionRegistry`]. See `DESIGN.md` for the resolved
/// defaults.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Number of independently-locked shards.
    pub shard_count: usize,
    /// Soft cap on concurrently tracked sessions (parked + bound).
    pub capacity: usize,
    /// How long a session may sit `AwaitingPeer` before eviction.
    pub session_ttl: Duration,
    /// How often the background sweep scans for expired entries.
    pub ttl_check_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shard_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            capacity: 10_000,
            session_ttl: Duration::from_secs(60),
            ttl_check_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryState {
    AwaitingPeer,
    Bound,
}

struct Entry<Req: SessionFrame, Resp: SessionFrame> {
    init: InitFields,
    state: EntryState,
    created_at: Instant,
    deadline: Instant,
    cancel: CancellationToken,
    client: Option<Half<Req, Resp>>,
    agent: Option<Half<Resp, Req>>,
}

#[derive(Default)]
struct Shard<Req: SessionFrame, Resp: SessionFrame> {
    entries: HashMap<SessionKey, Entry<Req, Resp>>,
}

/// Result of `attach_client`/`attach_agent`. `Mine` is the type of the
/// half the caller presented; `Other` is the type of the opposite half.
pub enum AttachOutcome<Mine, Other> {
    /// No peer yet. The registry now owns `mine` until a matching peer
    /// attaches or the TTL/an admin evict tears it down; the caller has
    /// nothing further to do for this half.
    Parked,
    /// A matching peer was already parked. Hands back `mine` alongside
    /// the peer's half and the session's cancellation token: `mine` was
    /// only ever borrowed by this call (it never needed to enter the
    /// map), and the caller owns both halves now and must drive them
    /// with the Splicer/Lifecycle Coordinator. The token is handed back
    /// directly rather than requiring a second keyed lookup, since the
    /// entry backing it can already be gone by the time a spawned task
    /// would otherwise go looking for it (an admin evict races with
    /// nothing once the caller already holds the token).
    Spliced(Mine, Other, CancellationToken),
    /// Rejected. `mine` is handed back so the caller can close it.
    Error(RegistryError, Mine),
}

/// Process-wide registry for one session kind (one `(Req, Resp)` frame
/// pair). `osmo-router` holds one instance per kind (`exec`,
/// `port_forward`, `rsync`): the Splicer is kind-agnostic, but storage is
/// monomorphized per kind to avoid type erasure on the hot path.
pub struct SessionRegistry<Req: SessionFrame, Resp: SessionFrame> {
    shards: Vec<Mutex<Shard<Req, Resp>>>,
    config: RegistryConfig,
    size: AtomicUsize,
    shutdown: CancellationToken,
    sink: Arc<dyn TerminalEventSink>,
}

impl<Req: SessionFrame, Resp: SessionFrame> SessionRegistry<Req, Resp> {
    /// Builds an empty registry with `config.shard_count` shards. Every
    /// session's cancellation token is a child of `shutdown`, so cancelling
    /// `shutdown` tears down every in-flight session without the caller
    /// having to track them individually. `sink` records the terminal event
    /// for sessions this registry itself tears down — TTL eviction and
    /// admin eviction — since those never reach the Lifecycle Coordinator's
    /// `lifecycle::run` (that only drives sessions that actually spliced).
    pub fn new(config: RegistryConfig, shutdown: CancellationToken, sink: Arc<dyn TerminalEventSink>) -> Self {
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count).map(|_| Mutex::new(Shard::default())).collect();
        metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).set(0.0);
        Self { shards, config, size: AtomicUsize::new(0), shutdown, sink }
    }

    fn shard_index(&self, key: &SessionKey) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Current number of sessions tracked (parked or bound).
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// `true` iff no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Presents a client half for `key`: parks it if no agent has arrived
    /// yet, or binds it to the agent already parked on `key`.
    #[instrument(level = "debug", skip(self, half, init), fields(session_key = %key))]
    pub fn attach_client(
        &self,
        key: SessionKey,
        half: Half<Req, Resp>,
        init: InitFields,
    ) -> AttachOutcome<Half<Req, Resp>, Half<Resp, Req>> {
        let idx = self.shard_index(&key);
        let mut shard = self.shards[idx].lock();
        match shard.entries.get_mut(&key) {
            None => {
                if self.size.load(Ordering::Relaxed) >= self.config.capacity {
                    return AttachOutcome::Error(RegistryError::Overloaded, half);
                }
                self.size.fetch_add(1, Ordering::Relaxed);
                metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).increment(1.0);
                let now = Instant::now();
                shard.entries.insert(
                    key,
                    Entry {
                        init,
                        state: EntryState::AwaitingPeer,
                        created_at: now,
                        deadline: now + self.config.session_ttl,
                        cancel: self.shutdown.child_token(),
                        client: Some(half),
                        agent: None,
                    },
                );
                AttachOutcome::Parked
            }
            // Already spliced: both halves have already left the entry
            // (see `finish`, called once the session's Splicer exits), but
            // the placeholder stays in the map until then so a second
            // attacher of either role is rejected rather than panicking
            // on a `.take()` of a slot that was never going to be refilled.
            Some(entry) if entry.state == EntryState::Bound => {
                debug!("client attach rejected: session already bound");
                AttachOutcome::Error(RegistryError::Duplicate, half)
            }
            Some(entry) if entry.client.is_some() => {
                debug!("duplicate client attach rejected");
                AttachOutcome::Error(RegistryError::Duplicate, half)
            }
            Some(entry) => {
                if !init.matches_peer(&entry.init) {
                    warn!("client attach rejected: key_mismatch");
                    return AttachOutcome::Error(RegistryError::KeyMismatch, half);
                }
                entry.state = EntryState::Bound;
                let cancel = entry.cancel.clone();
                let agent = entry
                    .agent
                    .take()
                    .expect("entry only exists with at least one half; client slot was empty");
                AttachOutcome::Spliced(half, agent, cancel)
            }
        }
    }

    /// Presents an agent half for `key`. Symmetric to
    /// [`attach_client`](Self::attach_client) with roles reversed.
    #[instrument(level = "debug", skip(self, half, init), fields(session_key = %key))]
    pub fn attach_agent(
        &self,
        key: SessionKey,
        half: Half<Resp, Req>,
        init: InitFields,
    ) -> AttachOutcome<Half<Resp, Req>, Half<Req, Resp>> {
        let idx = self.shard_index(&key);
        let mut shard = self.shards[idx].lock();
        match shard.entries.get_mut(&key) {
            None => {
                if self.size.load(Ordering::Relaxed) >= self.config.capacity {
                    return AttachOutcome::Error(RegistryError::Overloaded, half);
                }
                self.size.fetch_add(1, Ordering::Relaxed);
                metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).increment(1.0);
                let now = Instant::now();
                shard.entries.insert(
                    key,
                    Entry {
                        init,
                        state: EntryState::AwaitingPeer,
                        created_at: now,
                        deadline: now + self.config.session_ttl,
                        cancel: self.shutdown.child_token(),
                        client: None,
                        agent: Some(half),
                    },
                );
                AttachOutcome::Parked
            }
            Some(entry) if entry.state == EntryState::Bound => {
                debug!("agent attach rejected: session already bound");
                AttachOutcome::Error(RegistryError::Duplicate, half)
            }
            Some(entry) if entry.agent.is_some() => {
                debug!("duplicate agent attach rejected");
                AttachOutcome::Error(RegistryError::Duplicate, half)
            }
            Some(entry) => {
                if !init.matches_peer(&entry.init) {
                    warn!("agent attach rejected: key_mismatch");
                    return AttachOutcome::Error(RegistryError::KeyMismatch, half);
                }
                entry.state = EntryState::Bound;
                let cancel = entry.cancel.clone();
                let client = entry
                    .client
                    .take()
                    .expect("entry only exists with at least one half; agent slot was empty");
                AttachOutcome::Spliced(half, client, cancel)
            }
        }
    }

    /// Forcibly removes the session at `key`, closing any half still
    /// owned by the registry (i.e. still `AwaitingPeer`). A `Bound`
    /// session's halves have already left the registry with the caller
    /// that received `Spliced`; for those, `evict` only cancels the
    /// token the Splicer is watching.
    pub async fn evict(&self, key: &SessionKey, reason: EvictReason) {
        let idx = self.shard_index(key);
        let removed = self.shards[idx].lock().entries.remove(key);
        let Some(entry) = removed else { return };
        entry.cancel.cancel();
        self.size.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).decrement(1.0);
        let info = CloseInfo { reason: Some(reason.as_terminal_reason().to_string()), ..Default::default() };
        self.sink.record(TerminalEvent {
            session_key: key.clone(),
            kind: entry.init.options.kind(),
            duration: entry.created_at.elapsed(),
            bytes_a_to_b: 0,
            bytes_b_to_a: 0,
            reason: reason.as_terminal_reason_enum(),
        });
        if let Some(half) = entry.client {
            half.close(info.clone()).await;
        }
        if let Some(half) = entry.agent {
            half.close(info).await;
        }
    }

    /// Sweeps every shard once, evicting `AwaitingPeer` entries whose
    /// deadline has passed. Intended to be called on a `ttl_check_interval`
    /// cadence by a background task (see `spawn_ttl_sweeper`).
    pub async fn tick(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        for shard in &self.shards {
            let mut guard = shard.lock();
            let due: Vec<SessionKey> = guard
                .entries
                .iter()
                .filter(|(_, e)| e.state == EntryState::AwaitingPeer && e.deadline <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for key in due {
                if let Some(entry) = guard.entries.remove(&key) {
                    expired.push((key, entry));
                }
            }
        }
        if expired.is_empty() {
            return;
        }
        self.size.fetch_sub(expired.len(), Ordering::Relaxed);
        metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).decrement(expired.len() as f64);
        metrics::counter!(METRICS_ID_REGISTRY_SESSIONS_TIMEOUT).increment(expired.len() as u64);
        let info = CloseInfo { reason: Some("peer_unmatched".to_string()), ..Default::default() };
        for (key, entry) in expired {
            entry.cancel.cancel();
            self.sink.record(TerminalEvent {
                session_key: key,
                kind: entry.init.options.kind(),
                duration: entry.created_at.elapsed(),
                bytes_a_to_b: 0,
                bytes_b_to_a: 0,
                reason: TerminalReason::PeerUnmatched,
            });
            if let Some(half) = entry.client {
                half.close(info.clone()).await;
            }
            if let Some(half) = entry.agent {
                half.close(info.clone()).await;
            }
        }
    }

    /// Removes the (now halve-less) `Bound` placeholder for `key`. Called
    /// by the Lifecycle Coordinator once a spliced session reaches a
    /// terminal state.
    pub fn finish(&self, key: &SessionKey) {
        let idx = self.shard_index(key);
        let removed = self.shards[idx].lock().entries.remove(key);
        if removed.is_some() {
            self.size.fetch_sub(1, Ordering::Relaxed);
            metrics::gauge!(METRICS_ID_REGISTRY_SESSIONS_OPEN).decrement(1.0);
        }
    }

    /// Spawns the background task that calls [`tick`](Self::tick) on
    /// `config.ttl_check_interval`, until `shutdown` fires.
    pub fn spawn_ttl_sweeper(self: std::sync::Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        Req: 'static,
        Resp: 'static,
    {
        let mut interval = tokio::time::interval(self.config.ttl_check_interval);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => self.tick().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use router_types::{proto, Cookie, InitFields, KindOptions, SessionFrame as _};
    use tokio::sync::mpsc;

    use super::*;
    use crate::half::{HalfError, RawReceiver, RawSender};

    struct ChanReceiver<F>(mpsc::UnboundedReceiver<F>);
    struct ChanSender<F>(mpsc::UnboundedSender<F>);

    #[async_trait]
    impl<F: Send> RawReceiver<F> for ChanReceiver<F> {
        async fn recv(&mut self) -> Result<Option<F>, HalfError> {
            Ok(self.0.recv().await)
        }
    }

    #[async_trait]
    impl<F: Send> RawSender<F> for ChanSender<F> {
        async fn send(&mut self, frame: F) -> Result<(), HalfError> {
            self.0.send(frame).map_err(|_| HalfError::Transport("peer gone".into()))
        }
    }

    fn memory_half<R: SessionFrame, S: SessionFrame>() -> (Half<R, S>, mpsc::UnboundedReceiver<S>, mpsc::UnboundedSender<R>) {
        let (in_tx, in_rx) = mpsc::unbounded_channel::<R>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<S>();
        let half = Half::new(Box::new(ChanReceiver(in_rx)), Box::new(ChanSender(out_tx)));
        (half, out_rx, in_tx)
    }

    fn init_fields(key: &str, workflow: &str, cookie: &str) -> InitFields {
        InitFields {
            session_key: SessionKey::new(key).unwrap(),
            cookie: Cookie::new(cookie).unwrap(),
            workflow_id: router_types::WorkflowId::new(workflow).unwrap(),
            options: KindOptions::Exec,
        }
    }

    #[derive(Default)]
    struct RecordingSink(parking_lot::Mutex<Vec<TerminalEvent>>);

    impl TerminalEventSink for RecordingSink {
        fn record(&self, event: TerminalEvent) {
            self.0.lock().push(event);
        }
    }

    fn registry() -> SessionRegistry<proto::ExecRequest, proto::ExecResponse> {
        SessionRegistry::new(
            RegistryConfig { capacity: 2, ..RegistryConfig::default() },
            CancellationToken::new(),
            Arc::new(RecordingSink::default()),
        )
    }

    /// Client-first rendezvous parks, then splices once a matching agent
    /// attaches.
    #[tokio::test]
    async fn client_first_then_agent_splices() {
        let reg = registry();
        let (client_half, _client_out, _client_in) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        let key = SessionKey::new("k1").unwrap();
        let init = init_fields("k1", "wf", "c1");

        assert!(matches!(reg.attach_client(key.clone(), client_half, init.clone()), AttachOutcome::Parked));

        let (agent_half, _agent_out, _agent_in) = memory_half::<proto::ExecResponse, proto::ExecRequest>();
        match reg.attach_agent(key, agent_half, init) {
            AttachOutcome::Spliced(_mine, _client, _cancel) => {}
            _ => panic!("expected Spliced"),
        }
    }

    /// Agent-first rendezvous is the symmetric case of client-first: the
    /// agent parks first, and the splice completes once a matching client
    /// attaches.
    #[tokio::test]
    async fn agent_first_then_client_splices() {
        let reg = registry();
        let (agent_half, _agent_out, _agent_in) = memory_half::<proto::ExecResponse, proto::ExecRequest>();
        let key = SessionKey::new("k1-agent-first").unwrap();
        let init = init_fields("k1-agent-first", "wf", "c1");

        assert!(matches!(reg.attach_agent(key.clone(), agent_half, init.clone()), AttachOutcome::Parked));

        let (client_half, _client_out, _client_in) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        match reg.attach_client(key, client_half, init) {
            AttachOutcome::Spliced(_mine, _agent, _cancel) => {}
            _ => panic!("expected Spliced"),
        }
    }

    /// A third attach against an already-`Bound` entry (one that has
    /// spliced but not yet been `finish`ed) must be rejected as a
    /// duplicate, not panic on the now-empty `client`/`agent` slots.
    #[tokio::test]
    async fn third_attach_to_bound_entry_rejected() {
        let reg = registry();
        let key = SessionKey::new("k1-bound").unwrap();
        let init = init_fields("k1-bound", "wf", "c1");

        let (client_half, _client_out, _client_in) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(reg.attach_client(key.clone(), client_half, init.clone()), AttachOutcome::Parked));

        let (agent_half, _agent_out, _agent_in) = memory_half::<proto::ExecResponse, proto::ExecRequest>();
        assert!(matches!(reg.attach_agent(key.clone(), agent_half, init.clone()), AttachOutcome::Spliced(..)));

        let (third_client, _o, _i) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(
            reg.attach_client(key.clone(), third_client, init.clone()),
            AttachOutcome::Error(RegistryError::Duplicate, _)
        ));

        let (third_agent, _o2, _i2) = memory_half::<proto::ExecResponse, proto::ExecRequest>();
        assert!(matches!(
            reg.attach_agent(key, third_agent, init),
            AttachOutcome::Error(RegistryError::Duplicate, _)
        ));
    }

    /// A second client with the same key is rejected while the first
    /// remains parked.
    #[tokio::test]
    async fn duplicate_client_rejected() {
        let reg = registry();
        let key = SessionKey::new("k2").unwrap();
        let init = init_fields("k2", "wf", "c2");

        let (first, _o1, _i1) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(reg.attach_client(key.clone(), first, init.clone()), AttachOutcome::Parked));

        let (second, _o2, _i2) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(
            reg.attach_client(key, second, init),
            AttachOutcome::Error(RegistryError::Duplicate, _)
        ));
    }

    /// A mismatched workflow rejects the second attacher without
    /// disturbing the first.
    #[tokio::test]
    async fn key_mismatch_rejected() {
        let reg = registry();
        let key = SessionKey::new("k3").unwrap();

        let (client_half, _o, _i) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(
            reg.attach_client(key.clone(), client_half, init_fields("k3", "wf-a", "c")),
            AttachOutcome::Parked
        ));

        let (agent_half, _o2, _i2) = memory_half::<proto::ExecResponse, proto::ExecRequest>();
        assert!(matches!(
            reg.attach_agent(key, agent_half, init_fields("k3", "wf-b", "c")),
            AttachOutcome::Error(RegistryError::KeyMismatch, _)
        ));
    }

    /// Once at capacity, the next attach is rejected without disturbing
    /// existing sessions.
    #[tokio::test]
    async fn overloaded_rejects_without_disturbing_existing() {
        let reg = registry(); // capacity: 2
        for i in 0..2 {
            let (half, _o, _i) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
            let key = SessionKey::new(format!("k-{i}")).unwrap();
            assert!(matches!(
                reg.attach_client(key.clone(), half, init_fields(&format!("k-{i}"), "wf", "c")),
                AttachOutcome::Parked
            ));
        }
        let (half, _o, _i) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(
            reg.attach_client(SessionKey::new("k-3").unwrap(), half, init_fields("k-3", "wf", "c")),
            AttachOutcome::Error(RegistryError::Overloaded, _)
        ));
        assert_eq!(reg.len(), 2);
    }

    /// TTL eviction closes the parked half and drops the registry entry.
    #[tokio::test(flavor = "multi_thread")]
    async fn ttl_eviction_closes_parked_half() {
        let sink = Arc::new(RecordingSink::default());
        let reg = SessionRegistry::<proto::ExecRequest, proto::ExecResponse>::new(
            RegistryConfig { session_ttl: Duration::from_millis(10), ..RegistryConfig::default() },
            CancellationToken::new(),
            Arc::clone(&sink) as Arc<dyn TerminalEventSink>,
        );
        let key = SessionKey::new("k4").unwrap();
        let (half, mut client_out, _i) = memory_half::<proto::ExecRequest, proto::ExecResponse>();
        assert!(matches!(reg.attach_client(key.clone(), half, init_fields("k4", "wf", "c")), AttachOutcome::Parked));

        tokio::time::sleep(Duration::from_millis(30)).await;
        reg.tick().await;

        assert_eq!(reg.len(), 0);
        let closed = client_out.recv().await.expect("close frame forwarded");
        assert_eq!(closed.classify(), router_types::Classification::Close);

        let events = sink.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_key, key);
        assert_eq!(events[0].reason, TerminalReason::PeerUnmatched);
    }
}
