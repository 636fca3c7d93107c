use crate::session::{Role, Session};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "gradeview.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    // Single-row table: at most one signed-in user per workspace.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS session(
            slot INTEGER PRIMARY KEY CHECK (slot = 1),
            session_id TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            token TEXT NOT NULL,
            logged_in_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn session_save(conn: &Connection, s: &Session) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO session(slot, session_id, email, role, token, logged_in_at)
         VALUES(1, ?, ?, ?, ?, ?)
         ON CONFLICT(slot) DO UPDATE SET
            session_id = excluded.session_id,
            email = excluded.email,
            role = excluded.role,
            token = excluded.token,
            logged_in_at = excluded.logged_in_at",
        (
            &s.session_id,
            &s.email,
            s.role.as_str(),
            &s.token,
            &s.logged_in_at,
        ),
    )?;
    Ok(())
}

pub fn session_load(conn: &Connection) -> anyhow::Result<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT session_id, email, role, token, logged_in_at FROM session WHERE slot = 1",
            [],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(session_id, email, role, token, logged_in_at)| Session {
        session_id,
        email,
        role: Role::parse(&role).unwrap_or_default(),
        token,
        logged_in_at,
    }))
}

pub fn session_clear(conn: &Connection) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM session", [])?;
    Ok(n > 0)
}
