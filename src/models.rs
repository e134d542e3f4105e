//! # Data model
//! Subjects (tracked public figures) with their linked accounts and categories,
//! posts fetched from the external source, category keywords, and the result
//! types produced by one pipeline run.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub type SubjectId = i64;
pub type AccountId = i64;
pub type PostId = i64;
pub type CategoryId = u16;
pub type KeywordId = u64;

/// Fixed wire format of `ExternalPost::created_at`.
pub const POST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub id: SubjectId,
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub theme_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Source handle: the trailing path segment of the profile URL.
    /// Empty when the URL ends in `/`.
    pub fn handle(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Read-only snapshot of a subject, built once per pipeline run.
/// Accounts and categories are unique by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectWithDetails {
    pub subject: Subject,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl SubjectWithDetails {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            accounts: Vec::new(),
            categories: Vec::new(),
        }
    }

    /// Adds an account unless one with the same id is already linked.
    pub fn push_account(&mut self, account: Account) -> bool {
        if self.accounts.iter().any(|a| a.id == account.id) {
            return false;
        }
        self.accounts.push(account);
        true
    }

    /// Adds a category unless one with the same id is already linked.
    pub fn push_category(&mut self, category: Category) -> bool {
        if self.categories.iter().any(|c| c.id == category.id) {
            return false;
        }
        self.categories.push(category);
        true
    }

    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories.iter().map(|c| c.id).collect()
    }
}

/// Post as returned by `GET {base}/v1/posts/username/{account}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPost {
    pub id: PostId,
    pub user_id: i64,
    pub content: String,
    /// `YYYY-MM-DD HH:MM:SS`, local to the source system's timezone.
    pub created_at: String,
    pub user: PostAuthor,
}

impl ExternalPost {
    /// Parses `created_at` as wall-clock time in `tz`.
    pub fn created_at_in<Tz: TimeZone>(&self, tz: &Tz) -> anyhow::Result<DateTime<Tz>> {
        let naive = chrono::NaiveDateTime::parse_from_str(&self.created_at, POST_TIMESTAMP_FORMAT)
            .map_err(|e| anyhow::anyhow!("invalid createdAt `{}`: {e}", self.created_at))?;
        tz.from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| anyhow::anyhow!("createdAt `{}` does not exist locally", self.created_at))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: i64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExternalPostsResponse {
    pub posts: Vec<ExternalPost>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CategoryKeyword {
    pub id: KeywordId,
    pub category_id: CategoryId,
    pub keyword: String,
}

/// Start/end inferred from post text, in the reference timestamp's zone.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateWindow<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: Option<DateTime<Tz>>,
}

/// Insert request for an automatically created event. Times are UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAutoEvent {
    pub subject_id: SubjectId,
    pub post_id: PostId,
    pub title: String,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Per-subject outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SubjectOutcome {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub created_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubjectOutcome {
    pub fn new(subject: &Subject) -> Self {
        Self {
            subject_id: subject.id,
            subject_name: subject.name.clone(),
            created_events: 0,
            error: None,
        }
    }

    /// Appends a recorded failure; several failures are joined with `; `.
    pub fn record_error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&msg);
            }
            None => self.error = Some(msg),
        }
    }
}

/// Batch-level aggregate returned to the trigger endpoint and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub processed_subjects: usize,
    pub created_events: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn absorb(&mut self, outcome: SubjectOutcome) {
        self.processed_subjects += 1;
        self.created_events += outcome.created_events;
        if let Some(err) = outcome.error.filter(|e| !e.is_empty()) {
            self.errors.push(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: AccountId, url: &str) -> Account {
        Account {
            id,
            url: url.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn handle_is_trailing_segment() {
        assert_eq!(account(1, "https://x.example/users/mika").handle(), "mika");
        assert_eq!(account(2, "mika").handle(), "mika");
        assert_eq!(account(3, "https://x.example/users/").handle(), "");
    }

    #[test]
    fn accounts_and_categories_dedup_by_id() {
        let mut s = SubjectWithDetails::new(Subject {
            id: 1,
            user_id: 1,
            name: "Mika".into(),
            theme_color: "#ff0000".into(),
        });
        assert!(s.push_account(account(10, "https://x/a")));
        assert!(!s.push_account(account(10, "https://x/b")));
        let cat = Category {
            id: 3,
            slug: "live".into(),
            name: "Live".into(),
            description: None,
        };
        assert!(s.push_category(cat.clone()));
        assert!(!s.push_category(cat));
        assert_eq!(s.accounts.len(), 1);
        assert_eq!(s.category_ids(), vec![3]);
    }

    #[test]
    fn outcome_errors_accumulate_and_report_skips_empty() {
        let subject = Subject {
            id: 7,
            user_id: 1,
            name: "Rin".into(),
            theme_color: String::new(),
        };
        let mut o = SubjectOutcome::new(&subject);
        o.record_error("a failed");
        o.record_error("b failed");
        assert_eq!(o.error.as_deref(), Some("a failed; b failed"));

        let mut report = BatchReport::default();
        report.absorb(o);
        report.absorb(SubjectOutcome {
            created_events: 2,
            ..SubjectOutcome::new(&subject)
        });
        assert_eq!(report.processed_subjects, 2);
        assert_eq!(report.created_events, 2);
        assert_eq!(report.errors, vec!["a failed; b failed".to_string()]);
    }

    #[test]
    fn post_json_uses_camel_case() {
        let raw = r#"{"id": 5, "userId": 9, "content": "hi", "createdAt": "2025-10-03 12:00:00",
            "user": {"id": 9, "username": "mika", "name": "Mika", "email": "m@x", "avatarUrl": "u"}}"#;
        let p: ExternalPost = serde_json::from_str(raw).expect("parse");
        assert_eq!(p.user.avatar_url, "u");
        let at = p.created_at_in(&chrono_tz::Asia::Tokyo).expect("ts");
        assert_eq!(at.to_rfc3339(), "2025-10-03T12:00:00+09:00");
    }
}
