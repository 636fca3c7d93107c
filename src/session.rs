use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub logged_in_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

impl SessionError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

fn store_err(e: anyhow::Error) -> SessionError {
    SessionError::new("db_query_failed", e.to_string())
}

/// Validate credentials, persist the session and return it. A token is
/// minted when the caller has none.
pub fn login(
    conn: &Connection,
    email: &str,
    token: Option<&str>,
    role: Option<&str>,
) -> Result<Session, SessionError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(SessionError::new("bad_params", "email must be an address"));
    }
    let role = match role {
        None => Role::default(),
        Some(raw) => Role::parse(raw).ok_or_else(|| {
            SessionError::new("bad_params", "role must be one of: teacher, admin")
        })?,
    };
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => Uuid::new_v4().simple().to_string(),
    };
    let session = Session {
        session_id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        role,
        token,
        logged_in_at: chrono::Utc::now().to_rfc3339(),
    };
    db::session_save(conn, &session).map_err(store_err)?;
    info!(email = %session.email, role = session.role.as_str(), "session started");
    Ok(session)
}

pub fn hydrate(conn: &Connection) -> Result<Option<Session>, SessionError> {
    db::session_load(conn).map_err(store_err)
}

pub fn logout(conn: &Connection) -> Result<bool, SessionError> {
    let cleared = db::session_clear(conn).map_err(store_err)?;
    if cleared {
        info!("session cleared");
    }
    Ok(cleared)
}
