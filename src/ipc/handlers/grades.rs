use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{self, err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, GradeWatch, Request};
use crate::model::{self, Subject, Term, TestKind};
use crate::session::Principal;
use crate::stats;

/// Resolves which student's records a request may touch. Students are pinned
/// to their own id; the teacher must name a student explicitly.
fn target_student_id(state: &AppState, req: &Request) -> Result<String, serde_json::Value> {
    let requested = helpers::param_str(req, "studentId");
    match &state.session {
        None => Err(error::no_session(&req.id)),
        Some(sess) => match &sess.principal {
            Principal::Student { id } => match requested {
                None => Ok(id.clone()),
                Some(r) if r == id.as_str() => Ok(id.clone()),
                Some(_) => Err(err(
                    &req.id,
                    "not_authorized",
                    "students may only access their own records",
                    None,
                )),
            },
            Principal::Teacher => match requested {
                Some(r) => Ok(r.to_string()),
                None => Err(err(&req.id, "bad_params", "missing studentId", None)),
            },
        },
    }
}

/// Loads the target student's ordered records with the request's filter
/// applied, or a ready error response.
fn load_filtered(
    state: &AppState,
    req: &Request,
) -> Result<Vec<crate::model::Grade>, serde_json::Value> {
    let filter = match helpers::parse_filter(req) {
        Ok(f) => f,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let student_id = target_student_id(state, req)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(error::no_workspace(&req.id));
    };
    let records = match db::grades_for_student(conn, &student_id) {
        Ok(r) => r,
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    Ok(stats::filter_grades(&records, &filter))
}

fn handle_grades_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    // All three selectors must hold one of the fixed options before anything
    // is written.
    let (Some(test), Some(subject), Some(term)) = (
        helpers::param_str(req, "test").and_then(TestKind::parse),
        helpers::param_str(req, "subject").and_then(Subject::parse),
        helpers::param_str(req, "term").and_then(Term::parse),
    ) else {
        return err(&req.id, "bad_params", "select a term, test and subject", None);
    };
    let score = match req.params.get("score") {
        None => return err(&req.id, "bad_params", "missing score", None),
        Some(v) => match v.as_i64() {
            Some(n) => n,
            // A fractional or non-numeric score is a range problem, not a
            // missing field.
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!(
                        "score must be an integer between {} and {}",
                        model::MIN_SCORE,
                        model::MAX_SCORE
                    ),
                    None,
                )
            }
        },
    };
    if !model::score_in_range(score) {
        return err(
            &req.id,
            "bad_params",
            format!("score must be between {} and {}", model::MIN_SCORE, model::MAX_SCORE),
            None,
        );
    }

    let student_id = match target_student_id(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let record = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        // The teacher may name any student, so the id is checked before the
        // insert; a bad id is a lookup failure, not a constraint violation.
        match db::profile_get(conn, &student_id) {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "student not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
        match db::grade_insert(conn, &student_id, test, subject, term, score) {
            Ok(g) => g,
            Err(e) => {
                tracing::error!(error = %e, "grade insert failed");
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    };

    helpers::notify_grades_changed(state, &student_id);
    ok(&req.id, json!({ "record": record }))
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(grade_id) = helpers::param_str(req, "gradeId") else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };
    let student_id = match target_student_id(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match db::grade_delete(conn, &student_id, grade_id) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "grade delete failed");
                return err(&req.id, "db_delete_failed", e.to_string(), None);
            }
        }
    };

    if deleted {
        helpers::notify_grades_changed(state, &student_id);
    }
    // Deleting an id that is already gone is a no-op, not an error.
    ok(&req.id, json!({ "deleted": deleted }))
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_filtered(state, req) {
        Ok(records) => ok(&req.id, json!({ "count": records.len(), "records": records })),
        Err(resp) => resp,
    }
}

fn handle_grades_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_filtered(state, req) {
        Ok(records) => ok(&req.id, json!({ "summary": stats::summarize(&records) })),
        Err(resp) => resp,
    }
}

fn handle_grades_trend_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_filtered(state, req) {
        Ok(records) => ok(&req.id, json!({ "points": stats::trend_series(&records) })),
        Err(resp) => resp,
    }
}

fn handle_grades_subject_chart(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_filtered(state, req) {
        Ok(records) => ok(&req.id, json!({ "chart": stats::subject_chart(&records) })),
        Err(resp) => resp,
    }
}

fn handle_grades_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match target_student_id(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let records = {
        let Some(conn) = state.db.as_ref() else {
            return error::no_workspace(&req.id);
        };
        match db::grades_for_student(conn, &student_id) {
            Ok(r) => r,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    // Cancel-then-replace: the previous watch (if any) stops delivering the
    // moment the new one exists; there is never more than one.
    let sub_id = Uuid::new_v4().to_string();
    let replaced = state
        .watches
        .grades
        .replace(GradeWatch {
            id: sub_id.clone(),
            student_id,
        })
        .map(|w| w.id);

    ok(
        &req.id,
        json!({
            "subscriptionId": sub_id,
            "replaced": replaced,
            "records": records,
        }),
    )
}

fn handle_grades_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(sub_id) = helpers::param_str(req, "subscriptionId") else {
        return err(&req.id, "bad_params", "missing subscriptionId", None);
    };
    let cancelled = match &state.watches.grades {
        Some(w) if w.id == sub_id => {
            state.watches.grades = None;
            true
        }
        // Cancelling a stale or unknown handle is a no-op.
        _ => false,
    };
    ok(&req.id, json!({ "cancelled": cancelled }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.add" => Some(handle_grades_add(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.summary" => Some(handle_grades_summary(state, req)),
        "grades.trendChart" => Some(handle_grades_trend_chart(state, req)),
        "grades.subjectChart" => Some(handle_grades_subject_chart(state, req)),
        "grades.subscribe" => Some(handle_grades_subscribe(state, req)),
        "grades.unsubscribe" => Some(handle_grades_unsubscribe(state, req)),
        _ => None,
    }
}
