use crate::api::QueueStatusResponse;
use crate::queue::{ConnectionStatus, QueueStateMachine, QueueTicket};
use crate::session::SessionId;
use tracing::debug;

/// Reconciles the local ticket with the server after a genuine reconnect.
///
/// The REST result is an optimization only: failures are dropped and the next
/// `queue_status` push converges the state anyway.
#[derive(Debug, Default)]
pub struct ResyncCoordinator {
    pending: Option<SessionId>,
}

impl ResyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an open should trigger a resync.
    ///
    /// `attempts_before_open` is the reconnect counter immediately before it
    /// was reset by the open.
    pub fn begin(&mut self, session: SessionId, attempts_before_open: u32) -> bool {
        if attempts_before_open == 0 {
            return false;
        }
        self.pending = Some(session);
        true
    }

    /// Apply a completed status call.
    ///
    /// Returns `true` if the ticket was overwritten.
    pub fn complete(
        &mut self,
        session: SessionId,
        response: Option<QueueStatusResponse>,
        queue: &mut QueueStateMachine,
    ) -> bool {
        if self.pending != Some(session) {
            debug!("[SESSION-{}] Dropping stale resync result", session);
            return false;
        }
        self.pending = None;

        let Some(response) = response else {
            return false;
        };
        if queue.status() != ConnectionStatus::Queuing || !response.in_queue {
            return false;
        }
        let Some(position) = response.position else {
            return false;
        };

        let previous = queue.ticket().cloned().unwrap_or_default();
        queue.overwrite_ticket(QueueTicket {
            ticket_id: response.ticket_id.unwrap_or(previous.ticket_id),
            position,
            estimated_wait: response.estimated_wait,
            queue_size: response.queue_size.unwrap_or(previous.queue_size),
        });
        true
    }

    /// Forget any in-flight resync
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
