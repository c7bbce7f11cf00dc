use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::value::SessionValue;

/// Sessions live for twenty minutes of inactivity by default.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(20 * 60);

/// Length of generated session identifiers.
pub const SESSION_ID_LENGTH: usize = 128;

/// Expired sessions are swept opportunistically at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Session {
    attributes: HashMap<String, SessionValue>,
    /// Absolute epoch-seconds deadline; `0` pins the session open.
    expires_at: u64,
}

struct Inner {
    sessions: HashMap<String, Session>,
    rng: StdRng,
    last_sweep: Instant,
}

/// Process-wide session store.
///
/// All operations serialise on one mutex and never hold it across I/O, so
/// they are linearisable and cheap. Identifiers come from a CSPRNG seeded
/// once at store construction.
///
/// # Example
///
/// ```
/// use hestia_session::{SessionStore, SessionValue};
///
/// let store = SessionStore::new();
/// let sid = store.create();
/// store.set_attribute(&sid, "visits", SessionValue::Bytes(vec![1]));
/// assert!(store.touch_if_exists(&sid));
/// store.remove(&sid);
/// assert!(!store.touch_if_exists(&sid));
/// ```
pub struct SessionStore {
    inner: Mutex<Inner>,
    lifetime: Duration,
}

impl SessionStore {
    /// Creates a store with the default lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lifetime(DEFAULT_SESSION_LIFETIME)
    }

    /// Creates a store with a custom sliding-window lifetime.
    #[must_use]
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                rng: StdRng::from_entropy(),
                last_sweep: Instant::now(),
            }),
            lifetime,
        }
    }

    /// The configured sliding-window lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Creates a new session and returns its identifier.
    ///
    /// Candidate identifiers are drawn until one misses every existing
    /// entry. Expired sessions are swept opportunistically on the way in.
    pub fn create(&self) -> String {
        self.create_at(now_epoch())
    }

    fn create_at(&self, now: u64) -> String {
        let mut inner = self.inner.lock();
        if inner.last_sweep.elapsed() >= SWEEP_INTERVAL {
            inner.last_sweep = Instant::now();
            Self::sweep_locked(&mut inner, now);
        }
        let id = loop {
            let candidate = Alphanumeric.sample_string(&mut inner.rng, SESSION_ID_LENGTH);
            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.sessions.insert(
            id.clone(),
            Session {
                attributes: HashMap::new(),
                expires_at: now + self.lifetime.as_secs(),
            },
        );
        tracing::debug!(sessions = inner.sessions.len(), "session created");
        id
    }

    /// Atomically tests whether `id` names a live session and, if so,
    /// refreshes its expiration.
    pub fn touch_if_exists(&self, id: &str) -> bool {
        self.touch_at(id, now_epoch())
    }

    fn touch_at(&self, id: &str, now: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                if session.expires_at != 0 {
                    session.expires_at = now + self.lifetime.as_secs();
                }
                true
            }
            None => false,
        }
    }

    /// Pins a session open: it no longer expires until [`restore`] is
    /// called. Websocket clients pin their session for the duration of the
    /// connection.
    ///
    /// [`restore`]: SessionStore::restore
    pub fn pin(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.expires_at = 0;
        }
    }

    /// Restores normal sliding expiration on a pinned session.
    pub fn restore(&self, id: &str) {
        let now = now_epoch();
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.expires_at = now + self.lifetime.as_secs();
        }
    }

    /// Removes a session, releasing all of its attributes.
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.sessions.remove(id);
    }

    /// Removes every session whose deadline is set, non-zero and in the
    /// past.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner, now_epoch());
    }

    #[cfg(test)]
    fn sweep_at(&self, now: u64) {
        let mut inner = self.inner.lock();
        Self::sweep_locked(&mut inner, now);
    }

    fn sweep_locked(inner: &mut Inner, now: u64) {
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, session| session.expires_at == 0 || session.expires_at > now);
        let removed = before - inner.sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Returns `true` when no sessions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches an attribute, refreshing the session's expiration.
    #[must_use]
    pub fn attribute(&self, id: &str, name: &str) -> Option<SessionValue> {
        let now = now_epoch();
        let mut inner = self.inner.lock();
        let lifetime = self.lifetime.as_secs();
        let session = inner.sessions.get_mut(id)?;
        if session.expires_at != 0 {
            session.expires_at = now + lifetime;
        }
        session.attributes.get(name).cloned()
    }

    /// Stores an attribute under a live session. Returns `false` when the
    /// session does not exist.
    pub fn set_attribute(&self, id: &str, name: &str, value: SessionValue) -> bool {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.attributes.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Drops one attribute, releasing its storage.
    pub fn remove_attribute(&self, id: &str, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.attributes.remove(name);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("lifetime", &self.lifetime)
            .field("sessions", &self.len())
            .finish()
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
