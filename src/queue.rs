use crate::protocol::{MatchFound, QueueJoined, QueueStatusUpdate};
use serde::Serialize;
use std::fmt;

/// Player-visible queue status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Queuing,
    MatchFound,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Queuing => write!(f, "queuing"),
            ConnectionStatus::MatchFound => write!(f, "match_found"),
        }
    }
}

/// The player's place in the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueTicket {
    pub ticket_id: String,
    pub position: u32,
    pub estimated_wait: Option<u32>,
    pub queue_size: u32,
}

/// Opponent and lobby for a confirmed match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub lobby_code: String,
    pub opponent_id: String,
    pub opponent_name: String,
}

impl From<MatchFound> for MatchResult {
    fn from(m: MatchFound) -> Self {
        Self {
            lobby_code: m.lobby_code,
            opponent_id: m.opponent_id,
            opponent_name: m.opponent_name,
        }
    }
}

/// Owns the queue status and ticket telemetry.
#[derive(Debug, Default)]
pub struct QueueStateMachine {
    status: ConnectionStatus,
    ticket: Option<QueueTicket>,
    match_result: Option<MatchResult>,
}

impl QueueStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn ticket(&self) -> Option<&QueueTicket> {
        self.ticket.as_ref()
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        self.match_result.as_ref()
    }

    /// `queue_joined`: enter queuing with a fresh ticket.
    pub fn on_joined(&mut self, joined: QueueJoined) {
        self.status = ConnectionStatus::Queuing;
        self.ticket = Some(QueueTicket {
            ticket_id: joined.ticket_id,
            position: joined.position,
            estimated_wait: None,
            queue_size: joined.queue_size,
        });
    }

    /// `queue_status`: overwrite ticket fields in place.
    ///
    /// Returns `false` if there is no ticket to update.
    pub fn on_status(&mut self, update: &QueueStatusUpdate) -> bool {
        match self.ticket.as_mut() {
            Some(ticket) => {
                ticket.position = update.position;
                ticket.estimated_wait = update.estimated_wait;
                ticket.queue_size = update.queue_size;
                true
            }
            None => false,
        }
    }

    /// Overwrite the ticket with authoritative values, creating it if needed.
    pub fn overwrite_ticket(&mut self, ticket: QueueTicket) {
        self.ticket = Some(ticket);
    }

    /// `match_found`: record the result once.
    ///
    /// Returns `false` for a duplicate while a handoff is already pending.
    pub fn on_match_found(&mut self, found: MatchFound) -> bool {
        if self.match_result.is_some() {
            return false;
        }
        self.status = ConnectionStatus::MatchFound;
        self.match_result = Some(found.into());
        true
    }

    /// Consume the match result for the navigation handoff and reset.
    pub fn take_match(&mut self) -> Option<MatchResult> {
        let result = self.match_result.take();
        if result.is_some() {
            self.reset();
        }
        result
    }

    /// Back to idle with no ticket and no match.
    pub fn reset(&mut self) {
        self.status = ConnectionStatus::Idle;
        self.ticket = None;
        self.match_result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(position: u32) -> QueueJoined {
        QueueJoined {
            ticket_id: "t1".to_string(),
            position,
            queue_size: 10,
        }
    }

    fn status(position: u32, estimated_wait: Option<u32>, queue_size: u32) -> QueueStatusUpdate {
        QueueStatusUpdate {
            elapsed: Some(12),
            position,
            estimated_wait,
            queue_size,
        }
    }

    fn found() -> MatchFound {
        MatchFound {
            lobby_code: "ABCD".to_string(),
            opponent_id: "u2".to_string(),
            opponent_name: "Bob".to_string(),
        }
    }

    #[test]
    fn test_joined_creates_ticket() {
        let mut queue = QueueStateMachine::new();
        queue.on_joined(joined(5));

        assert_eq!(queue.status(), ConnectionStatus::Queuing);
        let ticket = queue.ticket().expect("ticket");
        assert_eq!(ticket.ticket_id, "t1");
        assert_eq!(ticket.position, 5);
        assert_eq!(ticket.estimated_wait, None);
    }

    #[test]
    fn test_status_last_write_wins() {
        let mut queue = QueueStateMachine::new();
        queue.on_joined(joined(5));

        assert!(queue.on_status(&status(2, Some(30), 8)));
        assert!(queue.on_status(&status(3, None, 9)));

        let ticket = queue.ticket().expect("ticket");
        assert_eq!(ticket.position, 3);
        assert_eq!(ticket.estimated_wait, None);
        assert_eq!(ticket.queue_size, 9);
        assert_eq!(ticket.ticket_id, "t1"); // refreshed, not replaced
        assert_eq!(queue.status(), ConnectionStatus::Queuing);
    }

    #[test]
    fn test_status_without_ticket_is_ignored() {
        let mut queue = QueueStateMachine::new();
        assert!(!queue.on_status(&status(2, None, 8)));
        assert!(queue.ticket().is_none());
        assert_eq!(queue.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn test_match_found_is_immutable() {
        let mut queue = QueueStateMachine::new();
        queue.on_joined(joined(1));

        assert!(queue.on_match_found(found()));
        assert_eq!(queue.status(), ConnectionStatus::MatchFound);

        let mut other = found();
        other.lobby_code = "ZZZZ".to_string();
        assert!(!queue.on_match_found(other));
        assert_eq!(queue.match_result().unwrap().lobby_code, "ABCD");
    }

    #[test]
    fn test_take_match_consumes_once() {
        let mut queue = QueueStateMachine::new();
        queue.on_joined(joined(1));
        queue.on_match_found(found());

        let result = queue.take_match().expect("match");
        assert_eq!(result.lobby_code, "ABCD");
        assert_eq!(queue.status(), ConnectionStatus::Idle);
        assert!(queue.ticket().is_none());
        assert!(queue.take_match().is_none());
    }
}
