//! Retrain session state machine
//!
//! One retrain invocation progresses:
//! Idle → Uploading → Validating → Training → Saving → Completed,
//! with Error reachable from Validating or Training. The session carries a
//! structured log so a failed retrain can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tirta_common::events::{LogLevel, RetrainState};
use uuid::Uuid;

/// One timestamped line in a session's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: RetrainState,
    pub new_state: RetrainState,
    pub transitioned_at: DateTime<Utc>,
}

/// One retrain invocation (in-memory state, persisted at transitions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Upload being retrained
    pub upload_id: Uuid,

    /// Current workflow state
    pub state: RetrainState,

    /// Structured log accumulated during the invocation
    pub log: Vec<SessionLogEntry>,

    /// Session start time
    pub started_at: DateTime<Utc>,

    /// Session end time (terminal states only)
    pub ended_at: Option<DateTime<Utc>>,
}

impl RetrainSession {
    /// Create a new session for one retrain invocation
    pub fn new(upload_id: Uuid) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            upload_id,
            state: RetrainState::Idle,
            log: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state
    pub fn transition_to(&mut self, new_state: RetrainState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Append a log line
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push(SessionLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_idle_with_empty_log() {
        let session = RetrainSession::new(Uuid::new_v4());
        assert_eq!(session.state, RetrainState::Idle);
        assert!(session.log.is_empty());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn transition_records_old_and_new_state() {
        let mut session = RetrainSession::new(Uuid::new_v4());
        let t = session.transition_to(RetrainState::Training);
        assert_eq!(t.old_state, RetrainState::Idle);
        assert_eq!(t.new_state, RetrainState::Training);
        assert_eq!(session.state, RetrainState::Training);
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn terminal_transition_sets_ended_at() {
        let mut session = RetrainSession::new(Uuid::new_v4());
        session.transition_to(RetrainState::Training);
        session.transition_to(RetrainState::Error);
        assert!(session.ended_at.is_some());
    }
}
