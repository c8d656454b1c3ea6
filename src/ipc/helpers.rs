use serde::Serialize;
use serde_json::json;

use super::types::{AppState, Request};
use crate::db;
use crate::model::{Subject, Term, TestKind};
use crate::stats::GradeFilter;

pub fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Parses the three filter selectors. Each is either absent, `"all"`, or one
/// enumerated value; anything else is rejected before any read happens.
pub fn parse_filter(req: &Request) -> Result<GradeFilter, String> {
    let mut filter = GradeFilter::default();
    if let Some(s) = param_str(req, "term") {
        if s != "all" {
            filter.term = Some(Term::parse(s).ok_or_else(|| format!("unknown term: {s}"))?);
        }
    }
    if let Some(s) = param_str(req, "subject") {
        if s != "all" {
            filter.subject =
                Some(Subject::parse(s).ok_or_else(|| format!("unknown subject: {s}"))?);
        }
    }
    if let Some(s) = param_str(req, "test") {
        if s != "all" {
            filter.test = Some(TestKind::parse(s).ok_or_else(|| format!("unknown test: {s}"))?);
        }
    }
    Ok(filter)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub grade_count: i64,
    pub latest_score: Option<i64>,
}

/// One roster row per profile. `grade_count` is the existence of the single
/// most-recent record fetched per student (0 or 1), not the true total; the
/// original reported exactly this and callers have come to rely on the field.
pub fn roster_entries(conn: &rusqlite::Connection) -> anyhow::Result<Vec<RosterEntry>> {
    let mut entries = Vec::new();
    for profile in db::profiles_all(conn)? {
        let latest = db::latest_grade(conn, &profile.id)?;
        entries.push(RosterEntry {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            grade_count: latest.is_some() as i64,
            latest_score: latest.map(|g| g.score),
        });
    }
    Ok(entries)
}

/// Queues a refreshed snapshot for the grade watch, if the mutation touched
/// the watched student.
pub fn notify_grades_changed(state: &mut AppState, student_id: &str) {
    let Some(watch) = state.watches.grades.clone() else {
        return;
    };
    if watch.student_id != student_id {
        return;
    }
    let records = {
        let Some(conn) = state.db.as_ref() else {
            return;
        };
        match db::grades_for_student(conn, student_id) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "failed to refresh grade watch");
                return;
            }
        }
    };
    state.pending_events.push(json!({
        "event": "grades.changed",
        "subscriptionId": watch.id,
        "records": records,
    }));
}

/// Queues a refreshed roster snapshot after a profile-collection change.
/// Grade writes alone do not re-push the roster; only profile changes do.
pub fn notify_roster_changed(state: &mut AppState) {
    let Some(sub_id) = state.watches.roster.clone() else {
        return;
    };
    let students = {
        let Some(conn) = state.db.as_ref() else {
            return;
        };
        match roster_entries(conn) {
            Ok(students) => students,
            Err(e) => {
                tracing::warn!(error = %e, "failed to refresh roster watch");
                return;
            }
        }
    };
    state.pending_events.push(json!({
        "event": "roster.changed",
        "subscriptionId": sub_id,
        "students": students,
    }));
}
