use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DeserializeFromStr, NoneAsEmptyString, SerializeDisplay};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Content languages a package (and a grant) can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub enum Language {
    En,
    Ru,
    Ua,
    Se,
    De,
    Fr,
    It,
    Es,
    Fa,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::En,
        Language::Ru,
        Language::Ua,
        Language::Se,
        Language::De,
        Language::Fr,
        Language::It,
        Language::Es,
        Language::Fa,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Ru => "RU",
            Language::Ua => "UA",
            Language::Se => "SE",
            Language::De => "DE",
            Language::Fr => "FR",
            Language::It => "IT",
            Language::Es => "ES",
            Language::Fa => "FA",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Ru => "Russian",
            Language::Ua => "Ukrainian",
            Language::Se => "Swedish",
            Language::De => "German",
            Language::Fr => "French",
            Language::It => "Italian",
            Language::Es => "Spanish",
            Language::Fa => "Persian",
        }
    }

    /// Flag shown next to course titles; Persian has none.
    pub fn icon(self) -> &'static str {
        match self {
            Language::En => "🇬🇧",
            Language::Ru => "🇷🇺",
            Language::Ua => "🇺🇦",
            Language::Se => "🇸🇪",
            Language::De => "🇩🇪",
            Language::Fr => "🇫🇷",
            Language::It => "🇮🇹",
            Language::Es => "🇪🇸",
            Language::Fa => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language code '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Language::ALL
            .into_iter()
            .find(|l| l.code() == upper)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// `{code, name}` pair as returned by the language lookups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LanguageEntry {
    pub code: Language,
    pub name: String,
}

impl From<Language> for LanguageEntry {
    fn from(l: Language) -> Self {
        Self { code: l, name: l.name().to_string() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub language: Language,
    pub is_marketplace: bool,
    pub time_to_complete: i32,
    pub company_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default = "default_language")]
    pub language: Language,
    #[serde(default = "default_true")]
    pub is_marketplace: bool,
    pub time_to_complete: i32,
    #[serde(default)]
    pub company_id: Option<i64>,
}

fn default_language() -> Language {
    Language::En
}

fn default_true() -> bool {
    true
}

/// Public marketplace view of a course.
#[derive(Serialize, Debug, Clone)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub language: Language,
    pub language_icon: &'static str,
    pub time_to_complete: i32,
}

impl From<&Course> for CourseSummary {
    fn from(c: &Course) -> Self {
        Self {
            id: c.id,
            title: c.title.clone(),
            description: c.description.clone(),
            price: c.price,
            language: c.language,
            language_icon: c.language.icon(),
            time_to_complete: c.time_to_complete,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Package {
    pub id: i64,
    pub course_id: i64,
    pub language: Language,
    pub archive_path: String,
    /// `None` until extraction succeeded, or after it failed.
    pub unpacked_dir: Option<String>,
    pub identifier: Option<String>,
}

impl Package {
    pub fn is_extracted(&self) -> bool {
        self.unpacked_dir.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewPackage {
    pub course_id: i64,
    pub language: Language,
    pub archive_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompanyCourseGrant {
    pub id: i64,
    pub company_id: i64,
    pub course_id: i64,
    pub is_ordered: bool,
    /// Raw codes as entered by operators; unknown codes are tolerated here.
    pub available_languages: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewGrant {
    pub company_id: i64,
    pub course_id: i64,
    #[serde(default)]
    pub is_ordered: bool,
    #[serde(default)]
    pub available_languages: Vec<String>,
}

/// Coarse learner status, mirroring the SCORM vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, SerializeDisplay, DeserializeFromStr)]
pub enum CompletionStatus {
    #[default]
    NotAttempted,
    Browsed,
    Incomplete,
    Completed,
    Passed,
    Failed,
}

impl CompletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::NotAttempted => "not attempted",
            CompletionStatus::Browsed => "browsed",
            CompletionStatus::Incomplete => "incomplete",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Passed => "passed",
            CompletionStatus::Failed => "failed",
        }
    }

    /// Accepts both SCORM 1.2 and 2004 spellings.
    pub fn parse(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "not attempted" | "not_attempted" | "unknown" => Some(CompletionStatus::NotAttempted),
            "browsed" => Some(CompletionStatus::Browsed),
            "incomplete" => Some(CompletionStatus::Incomplete),
            "completed" => Some(CompletionStatus::Completed),
            "passed" => Some(CompletionStatus::Passed),
            "failed" => Some(CompletionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown completion status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for CompletionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompletionStatus::parse(s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: i64,
    pub course_id: i64,
    pub completion_status: CompletionStatus,
    pub score: Option<f64>,
    pub progress_data: serde_json::Map<String, serde_json::Value>,
    pub last_accessed: DateTime<Utc>,
}

/// One content-player write, plus whatever it implies for the coarse columns.
#[derive(Debug, Clone)]
pub struct ProgressWrite {
    pub user_id: i64,
    pub course_id: i64,
    pub key: String,
    pub value: serde_json::Value,
    pub status: Option<CompletionStatus>,
    pub score: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub dashboard_text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_id: Option<i64>,
    pub is_admin: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_id: Option<i64>,
    pub is_admin: bool,
    pub is_superuser: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct TeamMember {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    pub is_current_user: bool,
}

impl TeamMember {
    pub fn from_user(u: &User, current_user_id: i64) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            full_name: format!("{} {}", u.first_name, u.last_name),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            is_admin: u.is_admin,
            is_current_user: u.id == current_user_id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Invitation {
    pub token: Uuid,
    pub email: Option<String>,
    pub company_id: i64,
    pub invited_by: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub email: String,
    pub company_id: i64,
    pub invited_by: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub course_id: i64,
    pub company_id: i64,
    pub languages: Vec<Language>,
    pub note: Option<String>,
    pub order_date: DateTime<Utc>,
    pub is_paid: bool,
    pub invoice_sent: bool,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub course_id: i64,
    pub company_id: i64,
    pub languages: Vec<Language>,
    pub note: Option<String>,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct CreateOrderReq {
    pub course: i64,
    pub languages: Vec<Language>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LanguageOption {
    pub value: String,
    pub label: String,
    pub price: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSetReq {
    pub course_id: i64,
    pub cmi_element: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProgressGetReq {
    pub course_id: i64,
    pub cmi_element: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InviteReq {
    pub email: String,
}

/// Partial update of the company dashboard; an absent field is left alone.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DashboardUpdate {
    pub dashboard_text: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CompanyDashboard {
    pub company_id: i64,
    pub name: String,
    pub dashboard_text: Option<String>,
}

impl From<Company> for CompanyDashboard {
    fn from(c: Company) -> Self {
        CompanyDashboard { company_id: c.id, name: c.name, dashboard_text: c.dashboard_text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_parse_case_insensitively() {
        assert_eq!("se".parse::<Language>().unwrap(), Language::Se);
        assert_eq!(" EN ".parse::<Language>().unwrap(), Language::En);
        assert!("XX".parse::<Language>().is_err());
    }

    #[test]
    fn language_serializes_as_code() {
        let json = serde_json::to_string(&LanguageEntry::from(Language::De)).unwrap();
        assert_eq!(json, r#"{"code":"DE","name":"German"}"#);
    }

    #[test]
    fn completion_status_accepts_both_scorm_vocabularies() {
        assert_eq!(CompletionStatus::parse("passed"), Some(CompletionStatus::Passed));
        assert_eq!(CompletionStatus::parse("not attempted"), Some(CompletionStatus::NotAttempted));
        assert_eq!(CompletionStatus::parse("unknown"), Some(CompletionStatus::NotAttempted));
        assert_eq!(CompletionStatus::parse("nonsense"), None);
    }

    #[test]
    fn order_note_empty_string_is_none() {
        let req: CreateOrderReq =
            serde_json::from_str(r#"{"course":1,"languages":["EN","se"],"note":""}"#).unwrap();
        assert_eq!(req.note, None);
        assert_eq!(req.languages, vec![Language::En, Language::Se]);
    }
}
