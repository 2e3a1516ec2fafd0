//! In-memory stand-in for the REST API used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::oneshot;

use crate::api::NoticeApi;
use crate::error::{ClientError, Result};
use crate::models::{
    Comment, FeedPage, FilterCriteria, NoticeDetail, NoticeSummary, Priority,
};

pub(crate) struct FakeApi {
    notices: Vec<NoticeSummary>,
    list_calls: AtomicUsize,
    fail_auth: AtomicBool,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    bookmarks: Mutex<HashSet<String>>,
    acknowledged: Mutex<HashSet<String>>,
    comments: Mutex<HashMap<String, Vec<Comment>>>,
}

fn notice(id: String, category: &str, priority: Priority, pinned: bool, minutes: i64) -> NoticeSummary {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    NoticeSummary {
        title: format!("{} notice {}", category, id),
        id,
        content: "Details inside".to_string(),
        category: category.to_string(),
        priority,
        is_pinned: pinned,
        tags: vec!["all".to_string()],
        author_name: "Dr. Rao".to_string(),
        created_at: base + Duration::minutes(minutes),
        view_count: 0,
        acknowledgement_count: 0,
    }
}

impl FakeApi {
    /// 11 exam notices, 4 general (one pinned, one urgent) and 2 sports.
    pub(crate) fn with_fixture() -> Self {
        let mut notices = Vec::new();
        for i in 0..11 {
            notices.push(notice(format!("exam-{}", i), "exam", Priority::High, false, i));
        }
        for i in 0..4 {
            let priority = if i == 3 { Priority::Urgent } else { Priority::Normal };
            notices.push(notice(format!("general-{}", i), "general", priority, i == 2, 20 + i));
        }
        for i in 0..2 {
            notices.push(notice(format!("sports-{}", i), "sports", Priority::Low, false, 40 + i));
        }

        Self {
            notices,
            list_calls: AtomicUsize::new(0),
            fail_auth: AtomicBool::new(false),
            gates: Mutex::new(HashMap::new()),
            bookmarks: Mutex::new(HashSet::new()),
            acknowledged: Mutex::new(HashSet::new()),
            comments: Mutex::new(HashMap::new()),
        }
    }

    /// Park list requests for `category` until the sender fires.
    pub(crate) fn hold(&self, category: &str, gate: oneshot::Receiver<()>) {
        self.gates
            .lock()
            .unwrap()
            .insert(category.to_string(), gate);
    }

    pub(crate) fn fail_with_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn matches(notice: &NoticeSummary, criteria: &FilterCriteria) -> bool {
        criteria.category.as_ref().is_none_or(|c| &notice.category == c)
            && criteria
                .priority
                .as_ref()
                .is_none_or(|p| notice.priority.as_str() == p)
            && criteria.tag.as_ref().is_none_or(|t| notice.tags.contains(t))
            && criteria
                .search
                .as_ref()
                .is_none_or(|s| notice.title.to_lowercase().contains(&s.to_lowercase()))
    }
}

#[async_trait]
impl NoticeApi for FakeApi {
    async fn list_notices(&self, criteria: &FilterCriteria, limit: u32) -> Result<FeedPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let gate = criteria
            .category
            .as_ref()
            .and_then(|c| self.gates.lock().unwrap().remove(c));
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ClientError::Auth);
        }

        let mut matching: Vec<NoticeSummary> = self
            .notices
            .iter()
            .filter(|n| Self::matches(n, criteria))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.created_at.cmp(&a.created_at))
        });

        let total = matching.len() as u64;
        let total_pages = total.div_ceil(limit as u64) as u32;
        let skip = ((criteria.page - 1) * limit) as usize;
        let notices = matching.into_iter().skip(skip).take(limit as usize).collect();

        Ok(FeedPage {
            notices,
            total,
            total_pages,
            current_page: criteria.page,
        })
    }

    async fn get_notice(&self, id: &str) -> Result<NoticeDetail> {
        let mut summary = self
            .notices
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| ClientError::validation("Notice not found"))?;
        if self.acknowledged.lock().unwrap().contains(id) {
            summary.acknowledgement_count += 1;
        }
        let comments = self
            .comments
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();

        Ok(NoticeDetail {
            expiry_date: Some(summary.created_at + Duration::days(7)),
            summary,
            target_audience: "students".to_string(),
            author_role: Some("faculty".to_string()),
            expiry_days: Some(7),
            is_expired: false,
            attachments: Vec::new(),
            comments,
        })
    }

    async fn toggle_bookmark(&self, id: &str) -> Result<String> {
        let mut bookmarks = self.bookmarks.lock().unwrap();
        if bookmarks.remove(id) {
            Ok("Bookmark removed".to_string())
        } else {
            bookmarks.insert(id.to_string());
            Ok("Notice bookmarked".to_string())
        }
    }

    async fn acknowledge(&self, id: &str) -> Result<()> {
        self.acknowledged.lock().unwrap().insert(id.to_string());
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ClientError::validation("Comment text is required"));
        }
        self.comments
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(Comment {
                user_name: "Asha".to_string(),
                text: text.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }
}
