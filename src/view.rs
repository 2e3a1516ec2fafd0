//! Pure view-models for the feed, detail and analytics screens.
//!
//! Nothing here talks to the network; every function maps fetched data to
//! something a renderer (the CLI, or any other front end) can draw directly.

use chrono::{DateTime, Utc};

use crate::models::{CountBucket, FeedPage, NoticeDetail, NoticeSummary, Priority};

pub const EMPTY_FEED_MESSAGE: &str = "No notices found";

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeCard {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub priority: Priority,
    pub pinned: bool,
    pub tags: Vec<String>,
    pub author: String,
    pub posted: String,
    pub views: u64,
}

impl NoticeCard {
    pub fn from_summary(notice: &NoticeSummary) -> Self {
        Self {
            id: notice.id.clone(),
            title: notice.title.clone(),
            preview: notice.content.clone(),
            priority: notice.priority,
            pinned: notice.is_pinned,
            tags: notice.tags.iter().map(|t| format!("@{}", t)).collect(),
            author: notice.author_name.clone(),
            posted: format_date(&notice.created_at),
            views: notice.view_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageButton {
    Previous(u32),
    Page { number: u32, active: bool },
    Gap,
    Next(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub count: u64,
    pub cards: Vec<NoticeCard>,
    pub pagination: Vec<PageButton>,
    /// Set when there is nothing to show.
    pub empty_message: Option<&'static str>,
}

pub fn feed_view(page: &FeedPage) -> FeedView {
    FeedView {
        count: page.total,
        cards: page.notices.iter().map(NoticeCard::from_summary).collect(),
        pagination: pagination(page.total_pages, page.current_page),
        empty_message: page.is_empty().then_some(EMPTY_FEED_MESSAGE),
    }
}

/// First, last and two either side of the current page; a gap marker where
/// the run breaks. Nothing at all for a single page.
pub fn pagination(total_pages: u32, current: u32) -> Vec<PageButton> {
    let mut buttons = Vec::new();
    if total_pages <= 1 {
        return buttons;
    }

    if current > 1 {
        buttons.push(PageButton::Previous(current - 1));
    }
    for number in 1..=total_pages {
        let near = number + 2 >= current && number <= current + 2;
        if number == 1 || number == total_pages || near {
            buttons.push(PageButton::Page {
                number,
                active: number == current,
            });
        } else if number + 3 == current || number == current + 3 {
            buttons.push(PageButton::Gap);
        }
    }
    if current < total_pages {
        buttons.push(PageButton::Next(current + 1));
    }
    buttons
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeDetailView {
    pub card: NoticeCard,
    pub category: String,
    pub audience: String,
    pub posted_by: String,
    pub expires: Option<String>,
    pub days_left: Option<i64>,
    pub body: Vec<String>,
    pub attachments: Vec<String>,
    pub acknowledgements: u64,
    pub comments: Vec<String>,
}

pub fn detail_view(notice: &NoticeDetail, now: DateTime<Utc>) -> NoticeDetailView {
    let summary = &notice.summary;
    let posted_by = match &notice.author_role {
        Some(role) => format!("{} ({})", summary.author_name, role),
        None => summary.author_name.clone(),
    };

    NoticeDetailView {
        card: NoticeCard::from_summary(summary),
        category: summary.category.clone(),
        audience: notice.target_audience.clone(),
        posted_by,
        expires: notice.expiry_date.as_ref().map(format_date),
        days_left: notice.expiry_date.map(|d| days_remaining(d, now)),
        body: summary.content.lines().map(str::to_string).collect(),
        attachments: notice
            .attachments
            .iter()
            .map(|a| a.original_name.clone())
            .collect(),
        acknowledgements: summary.acknowledgement_count,
        comments: notice
            .comments
            .iter()
            .map(|c| format!("{} ({}): {}", c.user_name, format_date(&c.created_at), c.text))
            .collect(),
    }
}

/// "Mar 1, 2024, 09:30 AM"
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%b %-d, %Y, %I:%M %p").to_string()
}

/// "Mar 1, 2024"
pub fn format_date_short(date: &DateTime<Utc>) -> String {
    date.format("%b %-d, %Y").to_string()
}

pub fn relative_time(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - date).num_seconds();
    match seconds {
        s if s < 60 => "Just now".to_string(),
        s if s < 3_600 => format!("{} minutes ago", s / 60),
        s if s < 86_400 => format!("{} hours ago", s / 3_600),
        s if s < 604_800 => format!("{} days ago", s / 86_400),
        s if s < 2_592_000 => format!("{} weeks ago", s / 604_800),
        _ => format_date_short(&date),
    }
}

/// Whole days until `expiry`, rounded up; negative once expired.
pub fn days_remaining(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiry - now).num_milliseconds();
    let day = 86_400_000;
    millis.div_euclid(day) + i64::from(millis.rem_euclid(day) != 0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartBar {
    pub label: String,
    pub count: u64,
    /// Relative to the largest bucket, 0..=100
    pub width_percent: f64,
}

pub fn chart_bars(buckets: &[CountBucket]) -> Vec<ChartBar> {
    let max = buckets.iter().map(|b| b.count).max().unwrap_or(0);
    buckets
        .iter()
        .map(|b| ChartBar {
            label: b.label.clone().unwrap_or_else(|| "unknown".to_string()),
            count: b.count,
            width_percent: if max == 0 {
                0.0
            } else {
                b.count as f64 / max as f64 * 100.0
            },
        })
        .collect()
}
