//! Per-request state between button presses

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;
use vidcore::config;
use vidcore::core::Platform;
use vidcore::extraction::MediaProbe;
use vidcore::{DeliveryChoice, Requester};

/// A URL the user submitted and is still choosing options for
#[derive(Debug)]
pub struct Session {
    pub request_id: String,
    pub requester: Requester,
    pub url: Url,
    pub platform: Platform,
    pub probe: MediaProbe,
    /// Row in `interactions`, when logging it succeeded
    pub interaction_id: Option<i64>,
    pub cancel: CancellationToken,
    busy: AtomicBool,
}

impl Session {
    pub fn new(
        request_id: String,
        requester: Requester,
        url: Url,
        platform: Platform,
        probe: MediaProbe,
        interaction_id: Option<i64>,
    ) -> Self {
        Self {
            request_id,
            requester,
            url,
            platform,
            probe,
            interaction_id,
            cancel: CancellationToken::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Marks the session as downloading; false if a download already started
    pub fn try_start(&self) -> bool {
        !self.busy.swap(true, Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Outcome of checking a button press against its session
#[derive(Debug)]
pub enum Access {
    Granted(Arc<Session>),
    /// The request belongs to another user
    Denied,
    /// Unknown request, or its session expired
    Expired,
}

/// Sessions keyed by request id.
///
/// Idle sessions are dropped after a period without access. Once a download
/// starts the session is pinned until the job removes it, however long the
/// download and the delivery prompt take.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<String, Arc<Session>>,
    running: Arc<DashMap<String, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(config::session::ttl(), config::session::MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(ttl: Duration, max_sessions: u64) -> Self {
        Self {
            sessions: Cache::builder().max_capacity(max_sessions).time_to_idle(ttl).build(),
            running: Arc::new(DashMap::new()),
        }
    }

    pub async fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .insert(session.request_id.clone(), Arc::clone(&session))
            .await;
        session
    }

    pub async fn get(&self, request_id: &str) -> Option<Arc<Session>> {
        if let Some(session) = self.running.get(request_id) {
            return Some(Arc::clone(session.value()));
        }
        self.sessions.get(request_id).await
    }

    /// Marks the session as downloading and pins it; false if a download already started
    pub async fn start(&self, session: &Arc<Session>) -> bool {
        if !session.try_start() {
            return false;
        }
        self.running.insert(session.request_id.clone(), Arc::clone(session));
        self.sessions.remove(&session.request_id).await;
        true
    }

    pub async fn remove(&self, request_id: &str) -> Option<Arc<Session>> {
        let running = self.running.remove(request_id).map(|(_, session)| session);
        let idle = self.sessions.remove(request_id).await;
        running.or(idle)
    }

    /// Looks up the session of a button press made by `user_id`
    pub async fn authorize(&self, request_id: &str, user_id: i64) -> Access {
        match self.get(request_id).await {
            Some(session) if session.requester.user_id == user_id => Access::Granted(session),
            Some(_) => Access::Denied,
            None => Access::Expired,
        }
    }

    /// Cancels the session's token and returns whether its download is still running.
    ///
    /// An idle session is dropped right away; a running download removes its
    /// own session when it ends.
    pub async fn cancel(&self, session: &Session) -> bool {
        session.cancel.cancel();
        let running = session.is_busy();
        if !running {
            self.remove(&session.request_id).await;
        }
        running
    }

    /// Approximate, expired entries may still be counted
    pub fn active_count(&self) -> u64 {
        self.sessions.entry_count() + self.running.len() as u64
    }
}

/// Delivery prompts waiting for a button press
#[derive(Debug, Default)]
pub struct PendingChoices {
    waiting: DashMap<String, oneshot::Sender<DeliveryChoice>>,
}

impl PendingChoices {
    /// Registers a prompt; a second prompt for the same request replaces the first
    pub fn register(&self, request_id: &str) -> oneshot::Receiver<DeliveryChoice> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(request_id.to_string(), tx);
        rx
    }

    /// Hands the choice to the waiting delivery; false if nobody waits for it
    pub fn resolve(&self, request_id: &str, choice: DeliveryChoice) -> bool {
        match self.waiting.remove(request_id) {
            Some((_, tx)) => tx.send(choice).is_ok(),
            None => false,
        }
    }

    /// Drops the prompt; the waiting side sees a closed channel
    pub fn abandon(&self, request_id: &str) -> bool {
        self.waiting.remove(request_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
