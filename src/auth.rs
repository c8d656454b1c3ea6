use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::model::Profile;

/// Fixed teacher credentials, checked locally before the identity sign-in.
/// There is no registration path for the teacher; the backing account is
/// seeded when a workspace opens.
pub const TEACHER_USER_NAME: &str = "teacher_admin";
pub const TEACHER_PASSCODE: &str = "123456";
pub const TEACHER_EMAIL: &str = "teacher@example.com";

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_PASSCODE_LEN: usize = 4;

/// Passcode "hash" used by the passcode login scheme. Returns the input
/// unchanged to stay compatible with profiles written by earlier versions.
/// WARNING: not a real hash; swapping it out invalidates every stored
/// passcode, so it stays until there is a migration story.
pub fn hash_passcode(passcode: &str) -> String {
    passcode.to_string()
}

/// Proof value persisted with federated and teacher sessions.
pub fn password_proof(password: &str) -> String {
    sha256_hex(password)
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Outcomes of the identity service's credential check. `InvalidCredential`
/// is the only outcome the multi-candidate login scan may skip past; every
/// other failure aborts the scan.
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("no account for that address")]
    UserNotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub fn ensure_teacher_account(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO accounts(uid, email, password_sha256, created_at)
         VALUES(?, ?, ?, ?)",
        (
            TEACHER_USER_NAME,
            TEACHER_EMAIL,
            sha256_hex(TEACHER_PASSCODE),
            db::now_timestamp(),
        ),
    )?;
    Ok(())
}

/// Creates an identity-service account and returns the generated uid.
pub fn create_account(conn: &Connection, email: &str, password: &str) -> anyhow::Result<String> {
    let uid = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO accounts(uid, email, password_sha256, created_at)
         VALUES(?, ?, ?, ?)",
        (&uid, email, sha256_hex(password), db::now_timestamp()),
    )?;
    Ok(uid)
}

pub fn sign_in(conn: &Connection, email: &str, password: &str) -> Result<String, SignInError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT uid, password_sha256 FROM accounts WHERE email = ?",
            [email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| SignInError::Backend(e.into()))?;
    let Some((uid, stored)) = row else {
        return Err(SignInError::UserNotFound);
    };
    if stored != sha256_hex(password) {
        return Err(SignInError::InvalidCredential);
    }
    Ok(uid)
}

/// Synthesizes the unique internal address a federated registration signs up
/// under. Display names are free to collide; this address never does.
pub fn generate_internal_email() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "u{}{}@scoreapp.local",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..6]
    )
}

#[derive(Debug)]
pub enum DetailsLogin {
    /// A candidate accepted the password; the scan stopped there.
    Success { uid: String },
    /// No profile matched the name/birthday/gender details at all.
    NoMatch,
    /// Candidates existed but none accepted the password.
    WrongPassword,
}

/// Federated login: resolves the display-name details to the candidate
/// profiles sharing them, then tries the credential check against each
/// candidate's internal address in query order, stopping at the first
/// success. Only an invalid-credential outcome advances the scan; a missing
/// account or any backend failure aborts immediately.
pub fn sign_in_by_details(
    conn: &Connection,
    name: &str,
    birthday: &str,
    gender: &str,
    password: &str,
) -> anyhow::Result<DetailsLogin> {
    let candidates = db::profiles_by_login_details(conn, name, birthday, gender)?;
    if candidates.is_empty() {
        return Ok(DetailsLogin::NoMatch);
    }
    for profile in &candidates {
        // Passcode-scheme profiles have no internal address to try.
        let Some(email) = profile.email.as_deref() else {
            continue;
        };
        match sign_in(conn, email, password) {
            Ok(uid) => return Ok(DetailsLogin::Success { uid }),
            Err(SignInError::InvalidCredential) => continue,
            Err(SignInError::UserNotFound) => {
                anyhow::bail!("profile {} has no backing account", profile.id)
            }
            Err(SignInError::Backend(e)) => return Err(e),
        }
    }
    Ok(DetailsLogin::WrongPassword)
}

/// Federated registration: a fresh account under a synthesized address plus a
/// profile keyed by the generated uid.
pub fn register_student(
    conn: &Connection,
    name: &str,
    password: &str,
    birthday: &str,
    gender: &str,
) -> anyhow::Result<Profile> {
    let internal_email = generate_internal_email();
    let uid = create_account(conn, &internal_email, password)?;
    let profile = Profile {
        id: uid,
        name: name.to_string(),
        email: Some(internal_email),
        birthday: Some(birthday.to_string()),
        gender: Some(gender.to_string()),
        created_at: db::now_timestamp(),
    };
    db::profile_insert(conn, &profile, None)?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_passcode_is_identity_transform() {
        assert_eq!(hash_passcode("abcd"), "abcd");
        assert_eq!(hash_passcode(""), "");
    }

    #[test]
    fn sha256_hex_is_stable() {
        // Well-known digest of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(sha256_hex("123456"), sha256_hex("123457"));
    }

    #[test]
    fn internal_emails_do_not_collide() {
        let a = generate_internal_email();
        let b = generate_internal_email();
        assert!(a.ends_with("@scoreapp.local"));
        assert_ne!(a, b);
    }
}
