//! Session Manager (§4.4): ephemeral per-HTTP-client state, with an SSE
//! replay buffer and periodic idle-TTL eviction.
//!
//! Grounded on `turbomcp-transport::streamable_http_v2::Session` (event
//! buffer + list of SSE senders), adapted to this system's numeric,
//! session-monotonic event ids and explicit idle-TTL sweep.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mcphost_types::SESSION_EVENT_BUFFER_CAP;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One buffered, replayable server-pushed event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredEvent {
    pub id: u64,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// A single session's mutable state. Only ever touched through
/// `SessionManager`, which owns the map it lives in.
pub struct SessionState {
    pub id: String,
    last_activity: std::sync::Mutex<Instant>,
    next_event_id: AtomicU64,
    event_buffer: std::sync::Mutex<VecDeque<StoredEvent>>,
    sse_senders: std::sync::Mutex<Vec<mpsc::UnboundedSender<StoredEvent>>>,
    /// Pending sampling callbacks this session is responsible for firing;
    /// destroying the session fails every one of these with `INTERNAL_ERROR`.
    pending_sampling: std::sync::Mutex<Vec<String>>,
    /// Broadcast topics this session's SSE sink cares about (§4.6
    /// "Subscription topics"). SSE sessions have no subscribe/unsubscribe
    /// message of their own, so they default to the catch-all topic.
    subscriptions: std::sync::Mutex<HashSet<String>>,
}

impl SessionState {
    fn new(id: String) -> Self {
        Self {
            id,
            last_activity: std::sync::Mutex::new(Instant::now()),
            next_event_id: AtomicU64::new(1),
            event_buffer: std::sync::Mutex::new(VecDeque::with_capacity(SESSION_EVENT_BUFFER_CAP)),
            sse_senders: std::sync::Mutex::new(Vec::new()),
            pending_sampling: std::sync::Mutex::new(Vec::new()),
            subscriptions: std::sync::Mutex::new(HashSet::from(["resources".to_string()])),
        }
    }

    /// Whether this session's subscriptions intersect `topics` (§4.6).
    #[must_use]
    pub fn matches_any_topic(&self, topics: &[String]) -> bool {
        let subs = self.subscriptions.lock().unwrap();
        topics.iter().any(|t| subs.contains(t))
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn is_idle_past(&self, ttl: Duration) -> bool {
        self.last_activity.lock().unwrap().elapsed() > ttl
    }

    /// Broadcasts an event to every attached SSE sink and appends it to the
    /// replay buffer, evicting the oldest entry once over capacity.
    pub fn broadcast(&self, event_type: &str, data: serde_json::Value) {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = StoredEvent { id, event_type: event_type.to_string(), data };

        {
            let mut buffer = self.event_buffer.lock().unwrap();
            if buffer.len() >= SESSION_EVENT_BUFFER_CAP {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        self.sse_senders.lock().unwrap().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Registers a new SSE sink, returning events it should replay first
    /// (strictly greater than `last_event_id`, per §4.6). At most one SSE
    /// sink is active at a time: attaching a new one drops the sender side
    /// of any previous sink, which ends its stream once its buffered writes
    /// drain.
    pub fn attach_sse(
        &self,
        last_event_id: Option<u64>,
    ) -> (mpsc::UnboundedReceiver<StoredEvent>, Vec<StoredEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let replay = match last_event_id {
            Some(last) => self
                .event_buffer
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.id > last)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let mut senders = self.sse_senders.lock().unwrap();
        senders.clear();
        senders.push(tx);
        (rx, replay)
    }

    pub fn register_pending_sampling(&self, request_id: String) {
        self.pending_sampling.lock().unwrap().push(request_id);
    }

    pub fn complete_pending_sampling(&self, request_id: &str) {
        self.pending_sampling.lock().unwrap().retain(|id| id != request_id);
    }

    fn take_pending_sampling(&self) -> Vec<String> {
        std::mem::take(&mut self.pending_sampling.lock().unwrap())
    }
}

/// Owns the table of live sessions plus the periodic TTL sweep.
pub struct SessionManager {
    sessions: DashMap<String, std::sync::Arc<SessionState>>,
    idle_ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(idle_ttl: Duration) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self { sessions: DashMap::new(), idle_ttl })
    }

    /// Generates a fresh opaque id, stores initial state, returns it.
    #[must_use]
    pub fn create(&self) -> std::sync::Arc<SessionState> {
        let id = Uuid::new_v4().to_string();
        let state = std::sync::Arc::new(SessionState::new(id.clone()));
        self.sessions.insert(id, state.clone());
        state
    }

    /// Returns the session if present, refreshing `lastActivity`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<std::sync::Arc<SessionState>> {
        let entry = self.sessions.get(id).map(|e| e.clone());
        if let Some(ref state) = entry {
            state.touch();
        }
        entry
    }

    /// Destroys a session: fails every pending sampling callback with
    /// `INTERNAL_ERROR`, then removes it. Returns whether anything was
    /// removed. A destroyed id is never reused (UUIDv4 ids, never reinserted).
    pub fn destroy(
        &self,
        id: &str,
        fail_pending: impl Fn(&str),
    ) -> bool {
        match self.sessions.remove(id) {
            Some((_, state)) => {
                for request_id in state.take_pending_sampling() {
                    fail_pending(&request_id);
                }
                true
            }
            None => false,
        }
    }

    /// Destroys any session idle past the TTL. Intended to run once a minute.
    pub fn sweep(&self, fail_pending: impl Fn(&str)) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().is_idle_past(self.idle_ttl))
            .map(|e| e.key().clone())
            .collect();
        for id in expired {
            self.destroy(&id, &fail_pending);
        }
    }

    /// Invokes `f` for every currently live session; used by the event
    /// fanout task (§4.6).
    pub fn for_each_session(&self, mut f: impl FnMut(&std::sync::Arc<SessionState>)) {
        for entry in self.sessions.iter() {
            f(entry.value());
        }
    }

    /// Clears `request_id` from whichever session's pending-sampling list
    /// holds it. The bridge calls this alongside `SamplingBroker::complete`
    /// regardless of which transport delivered the reply, since only the
    /// SSE sink path populates this bookkeeping.
    pub fn complete_pending_sampling_everywhere(&self, request_id: &str) {
        for entry in self.sessions.iter() {
            entry.value().complete_pending_sampling(request_id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Spawns the once-a-minute idle sweep. Dropping the returned handle stops it.
pub fn spawn_sweep(
    manager: std::sync::Arc<SessionManager>,
    fail_pending: impl Fn(&str) + Send + Sync + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            manager.sweep(&fail_pending);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_refreshes_activity_and_destroy_removes() {
        let manager = SessionManager::new(Duration::from_secs(3600));
        let state = manager.create();
        assert!(manager.get(&state.id).is_some());
        assert!(manager.destroy(&state.id, |_| {}));
        assert!(manager.get(&state.id).is_none());
        assert!(!manager.destroy(&state.id, |_| {}));
    }

    #[test]
    fn destroy_fails_pending_sampling_callbacks() {
        let manager = SessionManager::new(Duration::from_secs(3600));
        let state = manager.create();
        state.register_pending_sampling("req-1".to_string());
        state.register_pending_sampling("req-2".to_string());

        let failed = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let failed_clone = failed.clone();
        manager.destroy(&state.id, move |id| failed_clone.lock().unwrap().push(id.to_string()));

        let failed = failed.lock().unwrap();
        assert_eq!(failed.len(), 2);
    }

    #[test]
    fn replay_buffer_caps_and_filters_by_last_event_id() {
        let manager = SessionManager::new(Duration::from_secs(3600));
        let state = manager.create();
        for i in 0..5 {
            state.broadcast("log", serde_json::json!({ "n": i }));
        }
        let (_rx, replay) = state.attach_sse(Some(2));
        assert_eq!(replay.len(), 3);
        assert_eq!(replay[0].id, 3);
    }
}
