use serde_json::json;

use crate::ipc::error::{self, err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::Profile;
use crate::session::Session;
use crate::{auth, db, session};

/// Federated registration: identity account under a synthesized internal
/// address plus a profile keyed by the generated uid, then a live session.
fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(name), Some(password), Some(birthday), Some(gender)) = (
        helpers::param_str(req, "name"),
        helpers::param_str(req, "password"),
        helpers::param_str(req, "birthday"),
        helpers::param_str(req, "gender"),
    ) else {
        return err(&req.id, "bad_params", "enter every field", None);
    };
    if password.len() < auth::MIN_PASSWORD_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("password must be at least {} characters", auth::MIN_PASSWORD_LEN),
            None,
        );
    }

    let (profile, sess) = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        let profile = match auth::register_student(conn, name, password, birthday, gender) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "federated registration failed");
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        };
        let sess = Session::student(profile.id.clone(), auth::password_proof(password));
        if let Err(e) = session::persist(conn, &sess) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        (profile, sess)
    };

    // A still-active roster watch sees the new profile before the identity
    // change tears the watch down.
    helpers::notify_roster_changed(state);
    state.watches.clear();
    state.session = Some(sess);
    tracing::info!(student = %profile.id, "student registered");

    ok(
        &req.id,
        json!({
            "principal": state.session.as_ref().map(|s| &s.principal),
            "profile": profile,
        }),
    )
}

/// Federated login: ordered multi-candidate credential scan.
fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(name), Some(password), Some(birthday), Some(gender)) = (
        helpers::param_str(req, "name"),
        helpers::param_str(req, "password"),
        helpers::param_str(req, "birthday"),
        helpers::param_str(req, "gender"),
    ) else {
        return err(&req.id, "bad_params", "enter every field", None);
    };

    let sess = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match auth::sign_in_by_details(conn, name, birthday, gender, password) {
            Ok(auth::DetailsLogin::Success { uid }) => {
                let sess = Session::student(uid, auth::password_proof(password));
                if let Err(e) = session::persist(conn, &sess) {
                    return err(&req.id, "db_update_failed", e.to_string(), None);
                }
                sess
            }
            Ok(auth::DetailsLogin::NoMatch) => {
                return err(
                    &req.id,
                    "not_found",
                    "no account matches the provided details",
                    None,
                );
            }
            Ok(auth::DetailsLogin::WrongPassword) => {
                return err(&req.id, "invalid_credential", "password is incorrect", None);
            }
            Err(e) => {
                tracing::error!(error = %e, "federated login failed");
                return err(&req.id, "auth_failed", e.to_string(), None);
            }
        }
    };

    state.watches.clear();
    state.session = Some(sess);
    tracing::info!("student signed in");
    ok(
        &req.id,
        json!({ "principal": state.session.as_ref().map(|s| &s.principal) }),
    )
}

/// Passcode registration: profile keyed directly by a user-chosen id.
fn handle_register_passcode(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(user_id), Some(name), Some(passcode)) = (
        helpers::param_str(req, "userId"),
        helpers::param_str(req, "name"),
        helpers::param_str(req, "passcode"),
    ) else {
        return err(&req.id, "bad_params", "userId, name and passcode are required", None);
    };
    if passcode.len() < auth::MIN_PASSCODE_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("passcode must be at least {} characters", auth::MIN_PASSCODE_LEN),
            None,
        );
    }
    // The teacher's principal id is reserved. It never has a profile row, so
    // the duplicate lookup below would wave it through, and a stored session
    // under that id must never exist for a student.
    if user_id == auth::TEACHER_USER_NAME {
        return err(&req.id, "duplicate_id", "that user id is already taken", None);
    }

    let hashed = auth::hash_passcode(passcode);
    let sess = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match db::profile_get(conn, user_id) {
            Ok(Some(_)) => {
                return err(&req.id, "duplicate_id", "that user id is already taken", None);
            }
            Ok(None) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
        let profile = Profile {
            id: user_id.to_string(),
            name: name.to_string(),
            email: helpers::param_str(req, "email").map(str::to_string),
            birthday: helpers::param_str(req, "birthday").map(str::to_string),
            gender: helpers::param_str(req, "gender").map(str::to_string),
            created_at: db::now_timestamp(),
        };
        if let Err(e) = db::profile_insert(conn, &profile, Some(&hashed)) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        let sess = Session::student(user_id, hashed.clone());
        if let Err(e) = session::persist(conn, &sess) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        sess
    };

    helpers::notify_roster_changed(state);
    state.watches.clear();
    state.session = Some(sess);
    tracing::info!(student = user_id, "passcode student registered");
    ok(
        &req.id,
        json!({ "principal": state.session.as_ref().map(|s| &s.principal) }),
    )
}

/// Passcode login: read-by-key, compare stored value to the transform of the
/// entered passcode. The failure message never says which half was wrong.
fn handle_login_passcode(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(user_id), Some(passcode)) = (
        helpers::param_str(req, "userId"),
        helpers::param_str(req, "passcode"),
    ) else {
        return err(&req.id, "bad_params", "userId and passcode are required", None);
    };

    let hashed = auth::hash_passcode(passcode);
    let sess = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match db::profile_passcode_hash(conn, user_id) {
            Ok(Some(stored)) if stored == hashed => Session::student(user_id, hashed.clone()),
            Ok(_) => return error::invalid_credential(&req.id),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };
    {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        if let Err(e) = session::persist(conn, &sess) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    state.watches.clear();
    state.session = Some(sess);
    tracing::info!(student = user_id, "passcode student signed in");
    ok(
        &req.id,
        json!({ "principal": state.session.as_ref().map(|s| &s.principal) }),
    )
}

/// Teacher login: hardcoded pair checked locally first, then the one fixed
/// identity account.
fn handle_teacher_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(name), Some(passcode)) = (
        helpers::param_str(req, "name"),
        helpers::param_str(req, "passcode"),
    ) else {
        return err(&req.id, "bad_params", "name and passcode are required", None);
    };
    if name != auth::TEACHER_USER_NAME || passcode != auth::TEACHER_PASSCODE {
        return err(&req.id, "invalid_credential", "user name or passcode is incorrect", None);
    }

    let sess = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match auth::sign_in(conn, auth::TEACHER_EMAIL, passcode) {
            Ok(_uid) => {
                let sess = Session::teacher(auth::password_proof(passcode));
                if let Err(e) = session::persist(conn, &sess) {
                    return err(&req.id, "db_update_failed", e.to_string(), None);
                }
                sess
            }
            Err(auth::SignInError::UserNotFound) => {
                return err(
                    &req.id,
                    "teacher_unprovisioned",
                    "the teacher account has not been provisioned",
                    None,
                );
            }
            Err(auth::SignInError::InvalidCredential) => {
                return error::invalid_credential(&req.id);
            }
            Err(auth::SignInError::Backend(e)) => {
                tracing::error!(error = %e, "teacher login failed");
                return err(&req.id, "auth_failed", e.to_string(), None);
            }
        }
    };

    state.watches.clear();
    state.session = Some(sess);
    tracing::info!("teacher signed in");
    ok(
        &req.id,
        json!({ "principal": state.session.as_ref().map(|s| &s.principal) }),
    )
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = session::clear(conn) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    // Watches must not outlive the identity they were opened under.
    state.watches.clear();
    state.session = None;
    ok(&req.id, json!({ "ok": true }))
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "principal": state.session.as_ref().map(|s| &s.principal) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.registerPasscode" => Some(handle_register_passcode(state, req)),
        "auth.loginPasscode" => Some(handle_login_passcode(state, req)),
        "auth.teacherLogin" => Some(handle_teacher_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        _ => None,
    }
}
