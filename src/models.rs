use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;

/// Number of notices the feed asks for per page.
pub const PAGE_SIZE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(ClientError::validation(format!("unknown priority: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Hod,
}

impl Role {
    /// Faculty and HODs may publish notices.
    pub fn can_publish(&self) -> bool {
        matches!(self, Role::Faculty | Role::Hod)
    }

    /// Analytics and user management are HOD-only.
    pub fn is_hod(&self) -> bool {
        matches!(self, Role::Hod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Hod => "hod",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "hod" => Ok(Role::Hod),
            other => Err(ClientError::validation(format!("unknown role: {}", other))),
        }
    }
}

// The API returns the full `views` / `acknowledgements` arrays; the client only
// ever shows how many there are.
fn count_entries<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(entries.map_or(0, |e| e.len() as u64))
}

/// A notice as it appears in the feed grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        rename(deserialize = "views", serialize = "viewCount"),
        deserialize_with = "count_entries"
    )]
    pub view_count: u64,
    #[serde(
        default,
        rename(deserialize = "acknowledgements", serialize = "acknowledgementCount"),
        deserialize_with = "count_entries"
    )]
    pub acknowledgement_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub original_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The full record behind the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeDetail {
    #[serde(flatten)]
    pub summary: NoticeSummary,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub author_role: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry_days: Option<u32>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// The active feed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub page: u32,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            category: None,
            priority: None,
            tag: None,
            search: None,
            page: 1,
        }
    }
}

impl FilterCriteria {
    /// Merge a patch; any change other than a bare page move goes back to page 1.
    /// Page numbers are taken as given, out-of-range ones included; the server
    /// decides what they mean.
    pub fn apply(&mut self, patch: FilterPatch) {
        let page_only = patch.is_page_only();

        if let Some(category) = patch.category {
            self.category = non_empty(category);
        }
        if let Some(priority) = patch.priority {
            self.priority = non_empty(priority);
        }
        if let Some(tag) = patch.tag {
            self.tag = non_empty(tag);
        }
        if let Some(search) = patch.search {
            self.search = non_empty(search);
        }

        self.page = match (page_only, patch.page) {
            (true, Some(page)) => page,
            _ => 1,
        };
    }

    /// Query string pairs for the list endpoint. Unset filters are left out.
    pub fn to_query(&self, limit: u32) -> Vec<(&'static str, String)> {
        let mut query = vec![("page", self.page.to_string()), ("limit", limit.to_string())];
        let optional = [
            ("category", &self.category),
            ("priority", &self.priority),
            ("tag", &self.tag),
            ("search", &self.search),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                query.push((key, value.clone()));
            }
        }
        query
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A partial update to [`FilterCriteria`]. An empty string clears a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

impl FilterPatch {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn is_page_only(&self) -> bool {
        self.page.is_some()
            && self.category.is_none()
            && self.priority.is_none()
            && self.tag.is_none()
            && self.search.is_none()
    }
}

/// One page of the feed as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub notices: Vec<NoticeSummary>,
    pub total: u64,
    pub total_pages: u32,
    pub current_page: u32,
}

impl Default for FeedPage {
    fn default() -> Self {
        Self {
            notices: Vec::new(),
            total: 0,
            total_pages: 0,
            current_page: 1,
        }
    }
}

impl FeedPage {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    pub department: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountBucket {
    #[serde(rename = "_id")]
    pub label: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentNotice {
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsStats {
    pub total_notices: u64,
    pub active_notices: u64,
    pub expired_notices: u64,
    pub total_users: u64,
    #[serde(default)]
    pub notices_by_category: Vec<CountBucket>,
    #[serde(default)]
    pub notices_by_department: Vec<CountBucket>,
    #[serde(default)]
    pub notices_by_priority: Vec<CountBucket>,
    #[serde(default)]
    pub recent_notices: Vec<RecentNotice>,
}

/// Form contents for creating or editing a notice.
#[derive(Debug, Clone)]
pub struct NoticeDraft {
    pub title: String,
    pub content: String,
    pub target_audience: String,
    pub category: String,
    pub priority: Priority,
    pub expiry_days: u32,
    pub is_pinned: bool,
    pub tags: Vec<String>,
    pub attachments: Vec<PathBuf>,
}

impl Default for NoticeDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            target_audience: "students".to_string(),
            category: "general".to_string(),
            priority: Priority::Normal,
            expiry_days: 7,
            is_pinned: false,
            tags: vec!["all".to_string()],
            attachments: Vec::new(),
        }
    }
}

impl NoticeDraft {
    /// The form as it stands when editing `notice`. Files already attached stay
    /// on the server, so no attachments are carried over.
    pub fn from_notice(notice: &NoticeDetail) -> Self {
        let defaults = Self::default();
        Self {
            title: notice.summary.title.clone(),
            content: notice.summary.content.clone(),
            target_audience: non_empty(notice.target_audience.clone())
                .unwrap_or(defaults.target_audience),
            category: non_empty(notice.summary.category.clone()).unwrap_or(defaults.category),
            priority: notice.summary.priority,
            expiry_days: notice.expiry_days.unwrap_or(defaults.expiry_days),
            is_pinned: notice.summary.is_pinned,
            tags: notice.summary.tags.clone(),
            attachments: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.tags.iter().all(|t| t.trim().is_empty()) {
            return Err(ClientError::validation("Please select at least one tag"));
        }
        Ok(())
    }

    /// Tags travel as a single comma-joined form field.
    pub fn joined_tags(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn new(current: &str, new: &str, confirm: &str) -> Result<Self, ClientError> {
        if new != confirm {
            return Err(ClientError::validation("Passwords do not match!"));
        }
        Ok(Self {
            current_password: current.to_string(),
            new_password: new.to_string(),
        })
    }
}
