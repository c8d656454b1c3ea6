use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{self, err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::session::{self, Principal};
use crate::stats;

/// Every roster method is teacher-only. A student session reaching this
/// surface is forcibly signed out, not merely refused, so the stored session
/// cannot keep steering a client back here.
fn require_teacher(state: &mut AppState, req: &Request) -> Result<(), serde_json::Value> {
    match &state.session {
        Some(s) if s.principal == Principal::Teacher => Ok(()),
        Some(_) => {
            if let Some(conn) = state.db.as_ref() {
                if let Err(e) = session::clear(conn) {
                    tracing::warn!(error = %e, "failed to clear session on forced logout");
                }
            }
            state.watches.clear();
            state.session = None;
            tracing::info!("student session forced out of teacher surface");
            Err(err(
                &req.id,
                "not_authorized",
                "teacher access required; signed out",
                Some(json!({ "forcedLogout": true })),
            ))
        }
        None => Err(error::no_session(&req.id)),
    }
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_teacher(state, req) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return error::no_workspace(&req.id);
    };
    let mut students = match helpers::roster_entries(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(needle) = helpers::param_str(req, "search") {
        let needle = needle.to_lowercase();
        students.retain(|s| {
            s.name.to_lowercase().contains(&needle)
                || s.email
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains(&needle))
        });
    }
    ok(&req.id, json!({ "students": students }))
}

fn handle_roster_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_teacher(state, req) {
        return resp;
    }
    let students = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match helpers::roster_entries(conn) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let sub_id = Uuid::new_v4().to_string();
    let replaced = state.watches.roster.replace(sub_id.clone());
    ok(
        &req.id,
        json!({
            "subscriptionId": sub_id,
            "replaced": replaced,
            "students": students,
        }),
    )
}

fn handle_roster_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_teacher(state, req) {
        return resp;
    }
    let Some(sub_id) = helpers::param_str(req, "subscriptionId") else {
        return err(&req.id, "bad_params", "missing subscriptionId", None);
    };
    let cancelled = match &state.watches.roster {
        Some(current) if current.as_str() == sub_id => {
            state.watches.roster = None;
            true
        }
        _ => false,
    };
    ok(&req.id, json!({ "cancelled": cancelled }))
}

/// Whole-class view: one fetch per student, records tagged with the owner's
/// display name, merged into a single time-ordered list.
fn handle_roster_aggregate(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_teacher(state, req) {
        return resp;
    }
    let filter = match helpers::parse_filter(req) {
        Ok(f) => f,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let Some(conn) = state.db.as_ref() else {
        return error::no_workspace(&req.id);
    };
    let profiles = match db::profiles_all(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut per_student = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let grades = match db::grades_for_student(conn, &profile.id) {
            Ok(g) => g,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        per_student.push((profile.name, grades));
    }

    let combined = stats::combine_student_grades(per_student);
    let records = stats::filter_grades(&combined, &filter);
    ok(
        &req.id,
        json!({
            "count": records.len(),
            "summary": stats::summarize(&records),
            "chart": stats::subject_chart(&records),
            "records": records,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.subscribe" => Some(handle_roster_subscribe(state, req)),
        "roster.unsubscribe" => Some(handle_roster_unsubscribe(state, req)),
        "roster.aggregate" => Some(handle_roster_aggregate(state, req)),
        _ => None,
    }
}
