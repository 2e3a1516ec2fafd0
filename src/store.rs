use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::NoticeApi;
use crate::error::{ClientError, Result};
use crate::models::{FeedPage, FilterCriteria, FilterPatch, NoticeDetail, PAGE_SIZE};

/// Outcome of a single-record mutation: the server's message, if any, and the
/// record as it stands afterwards.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub message: Option<String>,
    pub notice: NoticeDetail,
}

struct FeedState {
    criteria: FilterCriteria,
    // Sequence number of the most recently issued fetch.
    issued: u64,
}

/// Owns the active filter and the last fetched page of the feed.
///
/// Pages are replaced wholesale. When fetches overlap only the most recently
/// issued one may replace the stored page; earlier responses that arrive late
/// are returned to their caller and otherwise dropped.
pub struct FeedStore {
    api: Arc<dyn NoticeApi>,
    state: Mutex<FeedState>,
    page: watch::Sender<Arc<FeedPage>>,
    expired: watch::Sender<bool>,
}

impl FeedStore {
    pub fn new(api: Arc<dyn NoticeApi>) -> Self {
        Self::with_criteria(api, FilterCriteria::default())
    }

    /// Start from pre-set criteria instead of the defaults.
    pub fn with_criteria(api: Arc<dyn NoticeApi>, criteria: FilterCriteria) -> Self {
        let (page, _) = watch::channel(Arc::new(FeedPage::default()));
        let (expired, _) = watch::channel(false);
        Self {
            api,
            state: Mutex::new(FeedState {
                criteria,
                issued: 0,
            }),
            page,
            expired,
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.state().criteria.clone()
    }

    /// Last applied page, or an empty one before the first fetch lands.
    pub fn current_page(&self) -> Arc<FeedPage> {
        self.page.borrow().clone()
    }

    /// Receives every page the store applies.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedPage>> {
        self.page.subscribe()
    }

    /// Turns `true` once the server rejects the session on any request made
    /// through this store, including background refreshes nobody awaits.
    /// It never turns back; a new login builds a new store.
    pub fn auth_expired(&self) -> watch::Receiver<bool> {
        self.expired.subscribe()
    }

    fn note(&self, err: ClientError) -> ClientError {
        if err.is_auth() && !self.expired.send_replace(true) {
            warn!("Session rejected by the server");
        }
        err
    }

    /// Merge `patch` into the criteria and start a refresh for them.
    ///
    /// The criteria change is visible immediately; the returned handle
    /// resolves with the refresh result.
    pub fn set_filter(self: &Arc<Self>, patch: FilterPatch) -> JoinHandle<Result<FeedPage>> {
        let (seq, criteria) = {
            let mut state = self.state();
            state.criteria.apply(patch);
            Self::issue(&mut state)
        };
        debug!("Filter changed, fetch #{} for {:?}", seq, criteria);

        let store = Arc::clone(self);
        tokio::spawn(async move { store.fetch(seq, criteria).await })
    }

    /// Fetch the page for the current criteria. Errors are handed back
    /// untouched and the previous page stays in place.
    pub async fn refresh(&self) -> Result<FeedPage> {
        let (seq, criteria) = Self::issue(&mut self.state());
        self.fetch(seq, criteria).await
    }

    fn issue(state: &mut FeedState) -> (u64, FilterCriteria) {
        state.issued += 1;
        (state.issued, state.criteria.clone())
    }

    async fn fetch(&self, seq: u64, criteria: FilterCriteria) -> Result<FeedPage> {
        let page = match self.api.list_notices(&criteria, PAGE_SIZE).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Fetch #{} failed: {}", seq, e);
                return Err(self.note(e));
            }
        };

        let state = self.state();
        if state.issued == seq {
            info!(
                "Applied page {}/{} ({} of {} notices)",
                page.current_page,
                page.total_pages,
                page.notices.len(),
                page.total
            );
            self.page.send_replace(Arc::new(page.clone()));
        } else {
            debug!(
                "Discarding fetch #{}, superseded by #{}",
                seq, state.issued
            );
        }
        Ok(page)
    }

    pub async fn view_notice(&self, id: &str) -> Result<NoticeDetail> {
        self.api.get_notice(id).await.map_err(|e| self.note(e))
    }

    pub async fn toggle_bookmark(&self, id: &str) -> Result<RecordUpdate> {
        let message = self.api.toggle_bookmark(id).await.map_err(|e| self.note(e))?;
        let notice = self.view_notice(id).await?;
        Ok(RecordUpdate {
            message: Some(message),
            notice,
        })
    }

    pub async fn acknowledge(&self, id: &str) -> Result<RecordUpdate> {
        self.api.acknowledge(id).await.map_err(|e| self.note(e))?;
        let notice = self.view_notice(id).await?;
        Ok(RecordUpdate {
            message: None,
            notice,
        })
    }

    pub async fn add_comment(&self, id: &str, text: &str) -> Result<RecordUpdate> {
        self.api.add_comment(id, text).await.map_err(|e| self.note(e))?;
        let notice = self.view_notice(id).await?;
        Ok(RecordUpdate {
            message: None,
            notice,
        })
    }
}

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Holds back free-text search until typing pauses.
pub struct SearchDebouncer {
    store: Arc<FeedStore>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SearchDebouncer {
    pub fn new(store: Arc<FeedStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Register the latest search text. Any earlier pending text is dropped.
    pub fn input(&self, text: impl Into<String>) {
        let text = text.into();
        let store = Arc::clone(&self.store);
        let delay = self.delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(Err(e)) = store.set_filter(FilterPatch::default().search(text)).await {
                warn!("Search refresh failed: {}", e);
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        if let Some(task) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
