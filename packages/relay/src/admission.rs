use std::time::Duration;

use assistant_relay_assistants_client::{AssistantsApi, ClientError};
use tokio::time::sleep;

use crate::sessions::Session;

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted,
    /// Another run still owned the session after retries were exhausted.
    /// The blocking run has been asked to cancel (best effort) and the
    /// local flag force-cleared; the caller must reject the request.
    Conflict,
}

/// Serialize run creation for one session.
///
/// The `active` flag is advisory state re-checked per poll, never a lock
/// held across the waits: each delay and each remote call is a plain
/// suspension point. Clearing the flag on observed run completion is the
/// turn processor's job; this loop only reads it, except for the two
/// reconciliation paths below.
pub async fn acquire(
    session: &Session,
    thread_id: &str,
    api: &dyn AssistantsApi,
    policy: &AdmissionPolicy,
) -> Result<AdmissionOutcome, ClientError> {
    if !session.is_active() {
        return Ok(AdmissionOutcome::Admitted);
    }

    // The local flag can outlive reality (e.g. a turn that died mid-run).
    // The remote run listing is authoritative; when it shows no live run,
    // repair the flag and admit.
    let runs = api.list_runs(thread_id).await?;
    let blocking = runs.iter().find(|run| run.status.is_non_terminal());
    let blocking = match blocking {
        Some(run) => run.id.clone(),
        None => {
            tracing::info!(
                session_id = %session.id(),
                "active flag had drifted, no live remote run; reconciled"
            );
            session.set_active(false);
            return Ok(AdmissionOutcome::Admitted);
        }
    };

    // Fixed-delay linear polling, no jitter. The local flag gates early
    // exit: the turn processor clears it on the terminal event.
    for _ in 0..policy.max_retries {
        sleep(policy.base_delay).await;
        if !session.is_active() {
            return Ok(AdmissionOutcome::Admitted);
        }
    }

    tracing::warn!(
        session_id = %session.id(),
        run_id = %blocking,
        "run still active after retries, cancelling"
    );
    if let Err(err) = api.cancel_run(thread_id, &blocking).await {
        tracing::warn!(
            session_id = %session.id(),
            run_id = %blocking,
            error = %err,
            "best-effort cancel of stale run failed"
        );
    }
    session.set_active(false);
    Ok(AdmissionOutcome::Conflict)
}
