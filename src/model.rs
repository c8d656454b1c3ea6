use serde::Serialize;

/// Test types offered by the add-grade form. Records only ever hold one of
/// these; free-form test names are rejected before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Midterm,
    Final,
    Aptitude,
    Challenge,
}

impl TestKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "midterm" => Some(Self::Midterm),
            "final" => Some(Self::Final),
            "aptitude" => Some(Self::Aptitude),
            "challenge" => Some(Self::Challenge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Midterm => "midterm",
            Self::Final => "final",
            Self::Aptitude => "aptitude",
            Self::Challenge => "challenge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    English,
    Japanese,
    Science,
    SocialStudies,
}

impl Subject {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "math" => Some(Self::Math),
            "english" => Some(Self::English),
            "japanese" => Some(Self::Japanese),
            "science" => Some(Self::Science),
            "social_studies" => Some(Self::SocialStudies),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::English => "english",
            Self::Japanese => "japanese",
            Self::Science => "science",
            Self::SocialStudies => "social_studies",
        }
    }
}

/// School terms. Three fixed terms per year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    T1,
    T2,
    T3,
}

impl Term {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "t1" => Some(Self::T1),
            "t2" => Some(Self::T2),
            "t3" => Some(Self::T3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::T1 => "t1",
            Self::T2 => "t2",
            Self::T3 => "t3",
        }
    }
}

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

pub fn score_in_range(score: i64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

/// One scored test entry owned by a single student. `student_name` is only
/// populated in the teacher's aggregate view, where records from every
/// student are combined into one list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub test: TestKind,
    pub subject: Subject,
    pub term: Term,
    pub score: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
}

/// Durable registration data for a principal. The stored passcode hash (if
/// any) is deliberately not part of this struct; auth reads it separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub birthday: Option<String>,
    pub gender: Option<String>,
    pub created_at: String,
}
