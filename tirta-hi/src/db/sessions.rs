//! Retrain session persistence
//!
//! Sessions are saved at every state transition so a status query sees the
//! current state even while the training call is still in flight.

use crate::models::{RetrainSession, SessionLogEntry};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tirta_common::events::RetrainState;
use tirta_common::{Error, Result};
use uuid::Uuid;

/// Insert or replace a session row
pub async fn save_session(pool: &SqlitePool, session: &RetrainSession) -> Result<()> {
    let log_json = serde_json::to_string(&session.log)
        .map_err(|e| Error::Internal(format!("Serialize session log failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO retrain_sessions
            (session_id, upload_id, state, log, started_at, ended_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.session_id.to_string())
    .bind(session.upload_id.to_string())
    .bind(state_to_str(session.state))
    .bind(log_json)
    .bind(session.started_at.to_rfc3339())
    .bind(session.ended_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one session by id
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<RetrainSession>> {
    let row: Option<(String, String, String, String, String, Option<String>)> = sqlx::query_as(
        "SELECT session_id, upload_id, state, log, started_at, ended_at \
         FROM retrain_sessions WHERE session_id = ?",
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some((sid, upload_id, state, log_json, started_at, ended_at)) = row else {
        return Ok(None);
    };

    let log: Vec<SessionLogEntry> = serde_json::from_str(&log_json)
        .map_err(|e| Error::Internal(format!("Corrupt session log JSON: {}", e)))?;

    Ok(Some(RetrainSession {
        session_id: Uuid::parse_str(&sid)
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
        upload_id: Uuid::parse_str(&upload_id)
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
        state: state_from_str(&state)?,
        log,
        started_at: parse_timestamp(&started_at)?,
        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

fn state_to_str(state: RetrainState) -> &'static str {
    match state {
        RetrainState::Idle => "idle",
        RetrainState::Uploading => "uploading",
        RetrainState::Validating => "validating",
        RetrainState::Training => "training",
        RetrainState::Saving => "saving",
        RetrainState::Completed => "completed",
        RetrainState::Error => "error",
    }
}

fn state_from_str(raw: &str) -> Result<RetrainState> {
    match raw {
        "idle" => Ok(RetrainState::Idle),
        "uploading" => Ok(RetrainState::Uploading),
        "validating" => Ok(RetrainState::Validating),
        "training" => Ok(RetrainState::Training),
        "saving" => Ok(RetrainState::Saving),
        "completed" => Ok(RetrainState::Completed),
        "error" => Ok(RetrainState::Error),
        other => Err(Error::Internal(format!("Unknown session state: {}", other))),
    }
}
