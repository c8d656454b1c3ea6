use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::model::{Grade, Profile, Subject, Term, TestKind};

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gradebook.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Identity-service accounts. Only equality of the stored digest matters;
    // the service itself is opaque to the rest of the application.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts(
            uid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_profiles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            birthday TEXT,
            gender TEXT,
            passcode_hash TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_name ON user_profiles(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            test TEXT NOT NULL,
            subject TEXT NOT NULL,
            term TEXT NOT NULL,
            score INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES user_profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_created ON grades(student_id, created_at)",
        [],
    )?;

    // Stand-in for the browser's local key-value storage: two string values
    // that survive restarts and gate the protected views.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Write timestamps are RFC 3339 UTC with microsecond precision. Lexicographic
/// order on these strings matches chronological order, which the ordered
/// grade reads rely on.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        birthday: row.get(3)?,
        gender: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const PROFILE_COLS: &str = "id, name, email, birthday, gender, created_at";

pub fn profile_get(conn: &Connection, id: &str) -> anyhow::Result<Option<Profile>> {
    let profile = conn
        .query_row(
            &format!("SELECT {PROFILE_COLS} FROM user_profiles WHERE id = ?"),
            [id],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn profile_insert(
    conn: &Connection,
    profile: &Profile,
    passcode_hash: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO user_profiles(id, name, email, birthday, gender, passcode_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &profile.id,
            &profile.name,
            &profile.email,
            &profile.birthday,
            &profile.gender,
            passcode_hash,
            &profile.created_at,
        ),
    )?;
    Ok(())
}

pub fn profile_passcode_hash(conn: &Connection, id: &str) -> anyhow::Result<Option<String>> {
    let hash: Option<Option<String>> = conn
        .query_row(
            "SELECT passcode_hash FROM user_profiles WHERE id = ?",
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash.flatten())
}

/// Candidates for the federated login scan, in insertion order. The scan
/// tries each in turn, so the order here is the trial order.
pub fn profiles_by_login_details(
    conn: &Connection,
    name: &str,
    birthday: &str,
    gender: &str,
) -> anyhow::Result<Vec<Profile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLS} FROM user_profiles
         WHERE name = ? AND birthday = ? AND gender = ?
         ORDER BY rowid"
    ))?;
    let profiles = stmt
        .query_map([name, birthday, gender], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

pub fn profiles_all(conn: &Connection) -> anyhow::Result<Vec<Profile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLS} FROM user_profiles ORDER BY created_at, rowid"
    ))?;
    let profiles = stmt
        .query_map([], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

type GradeParts = (String, String, String, String, i64, String);

fn grade_parts_from_row(row: &rusqlite::Row) -> rusqlite::Result<GradeParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn grade_from_parts(parts: GradeParts) -> anyhow::Result<Grade> {
    let (id, test, subject, term, score, created_at) = parts;
    let test = TestKind::parse(&test)
        .ok_or_else(|| anyhow::anyhow!("stored grade {id} has unknown test: {test}"))?;
    let subject = Subject::parse(&subject)
        .ok_or_else(|| anyhow::anyhow!("stored grade {id} has unknown subject: {subject}"))?;
    let term = Term::parse(&term)
        .ok_or_else(|| anyhow::anyhow!("stored grade {id} has unknown term: {term}"))?;
    Ok(Grade {
        id,
        test,
        subject,
        term,
        score,
        created_at,
        student_name: None,
    })
}

const GRADE_COLS: &str = "id, test, subject, term, score, created_at";

pub fn grade_insert(
    conn: &Connection,
    student_id: &str,
    test: TestKind,
    subject: Subject,
    term: Term,
    score: i64,
) -> anyhow::Result<Grade> {
    let grade = Grade {
        id: Uuid::new_v4().to_string(),
        test,
        subject,
        term,
        score,
        created_at: now_timestamp(),
        student_name: None,
    };
    conn.execute(
        "INSERT INTO grades(id, student_id, test, subject, term, score, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &grade.id,
            student_id,
            test.as_str(),
            subject.as_str(),
            term.as_str(),
            score,
            &grade.created_at,
        ),
    )?;
    Ok(grade)
}

/// Deletes one record scoped to its owning student. Returns whether a row was
/// actually removed; deleting an unknown id is a no-op.
pub fn grade_delete(conn: &Connection, student_id: &str, grade_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM grades WHERE id = ? AND student_id = ?",
        [grade_id, student_id],
    )?;
    Ok(n > 0)
}

pub fn grades_for_student(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<Grade>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRADE_COLS} FROM grades
         WHERE student_id = ?
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let parts = stmt
        .query_map([student_id], grade_parts_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    parts.into_iter().map(grade_from_parts).collect()
}

/// Most recent record only (ordered by creation time descending, limit 1).
/// The roster derives both its "latest score" and its grade-count figure from
/// this single-row fetch.
pub fn latest_grade(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Grade>> {
    let parts = conn
        .query_row(
            &format!(
                "SELECT {GRADE_COLS} FROM grades
                 WHERE student_id = ?
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1"
            ),
            [student_id],
            grade_parts_from_row,
        )
        .optional()?;
    parts.map(grade_from_parts).transpose()
}

pub fn store_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM session_store WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(value)
}

pub fn store_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO session_store(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

pub fn store_remove(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM session_store WHERE key = ?", [key])?;
    Ok(())
}
