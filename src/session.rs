//! Explicit session object plus its durable key-value persistence.
//!
//! The session is the sole gate for which student's records the dashboards
//! may touch. It is created on login or registration, destroyed on logout,
//! and persisted as two string values so a restart preserves the login. A
//! student pair is not re-validated when read back (data operations re-check
//! authorization themselves); the teacher pair is, since the teacher
//! principal carries roster-wide access.

use rusqlite::Connection;
use serde::Serialize;

use crate::auth;
use crate::db;

pub const KEY_AUTH_ID: &str = "custom_auth_id";
pub const KEY_AUTH_CODE: &str = "custom_auth_code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Principal {
    Student { id: String },
    Teacher,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    /// Transformed passcode (passcode scheme) or password digest (federated
    /// and teacher schemes). Stored alongside the id, never shown to callers.
    pub credential_proof: String,
}

impl Session {
    pub fn student(id: impl Into<String>, proof: impl Into<String>) -> Self {
        Self {
            principal: Principal::Student { id: id.into() },
            credential_proof: proof.into(),
        }
    }

    pub fn teacher(proof: impl Into<String>) -> Self {
        Self {
            principal: Principal::Teacher,
            credential_proof: proof.into(),
        }
    }

    pub fn principal_id(&self) -> &str {
        match &self.principal {
            Principal::Student { id } => id,
            Principal::Teacher => auth::TEACHER_USER_NAME,
        }
    }
}

pub fn persist(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    db::store_set(conn, KEY_AUTH_ID, session.principal_id())?;
    db::store_set(conn, KEY_AUTH_CODE, &session.credential_proof)?;
    Ok(())
}

/// Rebuilds a session from the stored pair, if both values are present. A
/// stored id equal to the teacher's user name only comes back as the teacher
/// when the stored proof matches the teacher credential digest; anything else
/// under that id is discarded rather than promoted.
pub fn restore(conn: &Connection) -> anyhow::Result<Option<Session>> {
    let id = db::store_get(conn, KEY_AUTH_ID)?;
    let code = db::store_get(conn, KEY_AUTH_CODE)?;
    let (Some(id), Some(code)) = (id, code) else {
        return Ok(None);
    };
    if id == auth::TEACHER_USER_NAME {
        if code != auth::password_proof(auth::TEACHER_PASSCODE) {
            return Ok(None);
        }
        return Ok(Some(Session::teacher(code)));
    }
    Ok(Some(Session::student(id, code)))
}

pub fn clear(conn: &Connection) -> anyhow::Result<()> {
    db::store_remove(conn, KEY_AUTH_ID)?;
    db::store_remove(conn, KEY_AUTH_CODE)?;
    Ok(())
}
