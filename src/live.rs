use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::error::Result;
use crate::models::FeedPage;
use crate::notify::{Notification, NotificationCenter, Notifier};
use crate::store::FeedStore;

pub const AUTO_REFRESH_PERIOD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushedNotice {
    pub title: String,
}

/// Messages delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushEvent {
    /// Broadcast to everyone
    NewNotice { notice: PushedNotice },
    /// Scoped to the viewer's department room
    DepartmentNotice {
        #[serde(default)]
        notice: Option<PushedNotice>,
    },
}

impl PushEvent {
    fn announcement(&self) -> String {
        match self {
            PushEvent::NewNotice { notice } => format!("New notice: {}", notice.title),
            PushEvent::DepartmentNotice { .. } => "New notice for your department!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    NotSubscribed,
    Subscribed,
}

pub type EventStream = Pin<Box<dyn Stream<Item = PushEvent> + Send>>;

struct Relay {
    store: Arc<FeedStore>,
    notifier: Arc<dyn Notifier>,
    inbox: Arc<NotificationCenter>,
}

impl Relay {
    fn on_new_notice(&self, event: PushEvent) -> JoinHandle<Result<FeedPage>> {
        debug!("Push event: {:?}", event);
        self.notifier.notify(Notification::info(event.announcement()));
        if matches!(event, PushEvent::NewNotice { .. }) {
            self.inbox.record_new_notice();
        }

        // Every event gets its own refresh; nothing is coalesced.
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = store.refresh().await;
            if let Err(e) = &result {
                warn!("Push-triggered refresh failed: {}", e);
            }
            result
        })
    }
}

/// Bridges the push channel to the feed: every notice event announces itself
/// and reloads the current page.
pub struct LiveUpdateListener {
    relay: Arc<Relay>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveUpdateListener {
    pub fn new(
        store: Arc<FeedStore>,
        notifier: Arc<dyn Notifier>,
        inbox: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            relay: Arc::new(Relay {
                store,
                notifier,
                inbox,
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ListenerState {
        match self.task().as_ref() {
            Some(task) if !task.is_finished() => ListenerState::Subscribed,
            _ => ListenerState::NotSubscribed,
        }
    }

    /// Handle one event. The returned handle resolves with the refresh it started.
    pub fn on_new_notice(&self, event: PushEvent) -> JoinHandle<Result<FeedPage>> {
        self.relay.on_new_notice(event)
    }

    /// Start consuming `events`. A previous subscription is replaced. The
    /// listener drops back to not-subscribed when the stream ends or when the
    /// store reports the session expired.
    pub fn subscribe<S>(&self, events: S)
    where
        S: Stream<Item = PushEvent> + Send + 'static,
    {
        let relay = Arc::clone(&self.relay);
        let mut expired = relay.store.auth_expired();
        let handle = tokio::spawn(async move {
            let mut events = Box::pin(events);
            loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(event) => {
                            relay.on_new_notice(event);
                        }
                        None => {
                            info!("Push channel closed");
                            break;
                        }
                    },
                    _ = expired.wait_for(|expired| *expired) => {
                        warn!("Session expired, leaving push channel");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.task().replace(handle) {
            debug!("Replacing existing push subscription");
            previous.abort();
        }
        info!("Subscribed to push channel");
    }

    /// Stop listening. Refreshes already started run to completion.
    pub fn unsubscribe(&self) {
        if let Some(task) = self.task().take() {
            task.abort();
            info!("Unsubscribed from push channel");
        }
    }
}

impl Drop for LiveUpdateListener {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Periodically reloads the current page.
pub struct AutoRefresh {
    store: Arc<FeedStore>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRefresh {
    pub fn new(store: Arc<FeedStore>, period: Duration) -> Self {
        Self {
            store,
            period,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let store = Arc::clone(&self.store);
        let period = self.period;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                debug!("Auto-refreshing feed");
                if let Err(e) = store.refresh().await {
                    warn!("Auto-refresh failed: {}", e);
                    if e.is_auth() {
                        break;
                    }
                }
            }
        }));
        debug!("Auto-refresh every {:?}", period);
    }

    pub fn pause(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!("Auto-refresh paused");
        }
    }

    /// Restart the timer and catch up on anything missed while paused.
    pub async fn resume(&self) -> Result<FeedPage> {
        self.start();
        self.store.refresh().await
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.pause();
    }
}

/// Read push events as one JSON object per line, e.g. from a bridge process
/// piping into stdin. Unparseable lines are logged and skipped.
pub fn json_lines<R>(reader: R) -> EventStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    Box::pin(stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<PushEvent>(line) {
                        Ok(event) => return Some((event, lines)),
                        Err(e) => warn!("Ignoring push message {:?}: {}", line, e),
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    error!("Push source read error: {}", e);
                    return None;
                }
            }
        }
    }))
}
