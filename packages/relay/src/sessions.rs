use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use assistant_relay_assistants_client::{AssistantsApi, ClientError};
use tokio::sync::OnceCell;

/// One conversation session: the remote thread handle plus the advisory
/// "a run is in flight" flag that admission gates on.
#[derive(Debug)]
pub struct Session {
    id: String,
    thread_id: OnceCell<String>,
    active: AtomicBool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The remote thread handle, if creation has completed for this entry.
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.get().map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Atomic false→true transition. Returns false when another request
    /// already owns the session.
    pub fn try_activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Process-wide map of session id → [`Session`]. Entries live for the
/// process lifetime; there is no eviction.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Arc<Session> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Session {
                    id: id.to_string(),
                    thread_id: OnceCell::new(),
                    active: AtomicBool::new(false),
                })
            })
            .clone()
    }

    /// Return the session for `id`, creating its remote thread on first use.
    ///
    /// Thread creation happens outside the map lock, behind the entry's
    /// `OnceCell`: under N concurrent first requests exactly one caller
    /// invokes the remote service and the rest await its result. A failed
    /// creation leaves the cell empty so a later request can retry.
    pub async fn get_or_create(
        &self,
        id: &str,
        api: &dyn AssistantsApi,
    ) -> Result<Arc<Session>, ClientError> {
        let session = self.entry(id);
        session
            .thread_id
            .get_or_try_init(|| async {
                let thread_id = api.create_thread().await?;
                tracing::info!(session_id = %id, thread_id = %thread_id, "created thread");
                Ok::<_, ClientError>(thread_id)
            })
            .await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;

    #[tokio::test]
    async fn concurrent_first_requests_create_one_thread() {
        let registry = Arc::new(SessionRegistry::new());
        let backend = Arc::new(ScriptedBackend::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let backend = backend.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .get_or_create("abc", backend.as_ref())
                    .await
                    .unwrap()
                    .thread_id()
                    .unwrap()
                    .to_string()
            }));
        }

        let mut thread_ids = Vec::new();
        for task in tasks {
            thread_ids.push(task.await.unwrap());
        }
        thread_ids.dedup();
        assert_eq!(thread_ids.len(), 1);
        assert_eq!(backend.threads_created(), 1);
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_threads() {
        let registry = SessionRegistry::new();
        let backend = ScriptedBackend::new();

        let a = registry.get_or_create("a", &backend).await.unwrap();
        let b = registry.get_or_create("b", &backend).await.unwrap();
        assert_ne!(a.thread_id(), b.thread_id());
        assert_eq!(backend.threads_created(), 2);
    }

    #[tokio::test]
    async fn failed_creation_registers_nothing_and_can_retry() {
        let registry = SessionRegistry::new();
        let backend = ScriptedBackend::new();
        backend.fail_next_create_thread();

        assert!(registry.get_or_create("abc", &backend).await.is_err());

        let session = registry.get_or_create("abc", &backend).await.unwrap();
        assert!(session.thread_id().is_some());
        assert_eq!(backend.threads_created(), 1);
    }

    #[test]
    fn try_activate_is_single_winner() {
        let session = Session {
            id: "abc".to_string(),
            thread_id: OnceCell::new(),
            active: AtomicBool::new(false),
        };
        assert!(session.try_activate());
        assert!(!session.try_activate());
        session.set_active(false);
        assert!(session.try_activate());
    }
}
