//! Registry of running payment sessions, at most one per user.
//!
//! The registry owns every session handle. Replacing or removing an entry
//! cancels the session's token; whoever removed it may then await the task
//! through [`SessionHandle::wait`].

use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A registered payment session.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: Uuid,
    gateway_id: String,
    order_id: i64,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn new(session_id: Uuid, gateway_id: impl Into<String>, order_id: i64, token: CancellationToken) -> Self {
        Self {
            session_id,
            gateway_id: gateway_id.into(),
            order_id,
            token,
            join: None,
        }
    }

    /// Attaches the polling task.
    #[must_use]
    pub fn with_task(mut self, join: JoinHandle<()>) -> Self {
        self.join = Some(join);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    pub fn order_id(&self) -> i64 {
        self.order_id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the polling task to exit.
    pub async fn wait(mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        if let Err(e) = join.await {
            if e.is_panic() {
                tracing::error!(session_id = %self.session_id, "Payment session panicked: {}", e);
            }
        }
    }
}

/// Per-user payment sessions.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    sessions: DashMap<i64, SessionHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` for `user_id`.
    ///
    /// A session already registered for the user is cancelled and returned
    /// so the caller can wait for it.
    pub fn register(&self, user_id: i64, handle: SessionHandle) -> Option<SessionHandle> {
        let displaced = self.sessions.insert(user_id, handle);
        if let Some(old) = &displaced {
            old.cancel();
            tracing::info!(
                user_id,
                session_id = %old.session_id,
                gateway_id = %old.gateway_id,
                "Payment session displaced by a new checkout"
            );
        }
        displaced
    }

    /// Removes and cancels the user's session, if any.
    pub fn deregister(&self, user_id: i64) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(&user_id)?;
        handle.cancel();
        Some(handle)
    }

    /// Removes and cancels the user's session only if it is tracking `gateway_id`.
    pub fn deregister_payment(&self, user_id: i64, gateway_id: &str) -> Option<SessionHandle> {
        let (_, handle) = self
            .sessions
            .remove_if(&user_id, |_, handle| handle.gateway_id == gateway_id)?;
        handle.cancel();
        Some(handle)
    }

    /// Self-removal of a finishing session.
    ///
    /// Leaves the entry alone when it already belongs to a newer session.
    pub fn release(&self, user_id: i64, session_id: Uuid) -> bool {
        self.sessions
            .remove_if(&user_id, |_, handle| handle.session_id == session_id)
            .is_some()
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.sessions.contains_key(&user_id)
    }

    /// Gateway payment the user's session is tracking.
    pub fn gateway_id_for(&self, user_id: i64) -> Option<String> {
        self.sessions.get(&user_id).map(|h| h.gateway_id.clone())
    }

    /// Users with a registered session.
    pub fn user_ids(&self) -> Vec<i64> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Releases a session's registry entry when the session task ends,
/// whichever way it ends.
pub struct RegistrationGuard {
    registry: Arc<TaskRegistry>,
    user_id: i64,
    session_id: Uuid,
}

impl RegistrationGuard {
    pub fn new(registry: Arc<TaskRegistry>, user_id: i64, session_id: Uuid) -> Self {
        Self {
            registry,
            user_id,
            session_id,
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.registry.release(self.user_id, self.session_id) {
            tracing::debug!(user_id = self.user_id, session_id = %self.session_id, "Payment session released");
        }
    }
}
