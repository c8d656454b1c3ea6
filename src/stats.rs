use serde::Serialize;
use std::collections::HashMap;

use crate::model::{Grade, Subject, Term, TestKind};

/// Three independent selectors; `None` means "all". A record passes iff it
/// matches every selector that is set, so the order the selectors are applied
/// in never matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeFilter {
    pub term: Option<Term>,
    pub subject: Option<Subject>,
    pub test: Option<TestKind>,
}

impl GradeFilter {
    pub fn matches(&self, grade: &Grade) -> bool {
        self.term.map_or(true, |t| grade.term == t)
            && self.subject.map_or(true, |s| grade.subject == s)
            && self.test.map_or(true, |t| grade.test == t)
    }
}

pub fn filter_grades(grades: &[Grade], filter: &GradeFilter) -> Vec<Grade> {
    grades.iter().filter(|g| filter.matches(g)).cloned().collect()
}

/// 1-decimal rounding, `Int(10*x + 0.5) / 10`. For the non-negative scores
/// handled here this matches the dashboard's one-decimal display.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub count: usize,
    pub average: f64,
    pub max: i64,
    pub min: i64,
}

/// Count, mean, max, min over the filtered set. An empty set yields all
/// zeros, never NaN.
pub fn summarize(grades: &[Grade]) -> Summary {
    if grades.is_empty() {
        return Summary {
            count: 0,
            average: 0.0,
            max: 0,
            min: 0,
        };
    }
    let total: i64 = grades.iter().map(|g| g.score).sum();
    Summary {
        count: grades.len(),
        average: round_off_1_decimal(total as f64 / grades.len() as f64),
        max: grades.iter().map(|g| g.score).max().unwrap_or(0),
        min: grades.iter().map(|g| g.score).min().unwrap_or(0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub label: String,
    pub score: i64,
}

/// Student-view chart: one point per record in filtered-set order, labelled
/// `"<term> <test>"`.
pub fn trend_series(grades: &[Grade]) -> Vec<TrendPoint> {
    grades
        .iter()
        .map(|g| TrendPoint {
            label: format!("{} {}", g.term.as_str(), g.test.as_str()),
            score: g.score,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSeries {
    pub subject: Subject,
    pub scores: Vec<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectChart {
    pub labels: Vec<TestKind>,
    pub series: Vec<SubjectSeries>,
}

/// Teacher-view chart: one series per distinct subject, x-labels the distinct
/// tests in first-occurrence order of the time-sorted filtered set. A cell
/// keeps the score of the first record seen for its (subject, test) pair;
/// later duplicates are dropped rather than aggregated.
pub fn subject_chart(grades: &[Grade]) -> SubjectChart {
    let mut labels: Vec<TestKind> = Vec::new();
    let mut subjects: Vec<Subject> = Vec::new();
    let mut cells: HashMap<(Subject, TestKind), i64> = HashMap::new();

    for g in grades {
        if !labels.contains(&g.test) {
            labels.push(g.test);
        }
        if !subjects.contains(&g.subject) {
            subjects.push(g.subject);
        }
        cells.entry((g.subject, g.test)).or_insert(g.score);
    }

    let series = subjects
        .into_iter()
        .map(|subject| SubjectSeries {
            subject,
            scores: labels
                .iter()
                .map(|test| cells.get(&(subject, *test)).copied())
                .collect(),
        })
        .collect();

    SubjectChart { labels, series }
}

/// Aggregate-view union: tags each student's records with the owner's display
/// name, concatenates, and re-sorts by creation time ascending. The sort is
/// stable, so records sharing a timestamp keep their per-student order.
pub fn combine_student_grades(sets: Vec<(String, Vec<Grade>)>) -> Vec<Grade> {
    let mut combined: Vec<Grade> = Vec::new();
    for (name, grades) in sets {
        for mut grade in grades {
            grade.student_name = Some(name.clone());
            combined.push(grade);
        }
    }
    combined.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    combined
}
