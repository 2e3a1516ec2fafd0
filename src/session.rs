use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};

use crate::api::RestClient;
use crate::error::{ClientError, Result};
use crate::live::LiveUpdateListener;
use crate::models::{FilterCriteria, User};
use crate::notify::{NotificationCenter, Notifier};
use crate::storage::{CredentialStore, SAVED_USER_ID_KEY, Scope};
use crate::store::FeedStore;

/// A logged-in user and an authenticated client. Created on login (or by
/// restoring stored credentials) and consumed by [`Session::logout`].
pub struct Session {
    client: Arc<RestClient>,
    user: User,
    credentials: Arc<CredentialStore>,
    // Push listeners built for this session; all are stopped at logout.
    listeners: Mutex<Vec<Arc<LiveUpdateListener>>>,
}

impl Session {
    /// Log in and store the token: persistently when `remember` is set,
    /// otherwise only for this process.
    pub async fn login(
        api_url: &str,
        credentials: Arc<CredentialStore>,
        user_id: &str,
        password: &str,
        remember: bool,
    ) -> Result<Self> {
        let response = RestClient::new(api_url).login(user_id, password).await?;
        let scope = if remember { Scope::Local } else { Scope::Session };
        credentials
            .save_credentials(scope, &response.token, &response.user)
            .await?;
        if remember {
            credentials
                .set(Scope::Local, SAVED_USER_ID_KEY, user_id)
                .await?;
        }
        info!(
            "Logged in as {} ({}, {})",
            response.user.name, response.user.role, response.user.department
        );

        Ok(Self {
            client: Arc::new(RestClient::new(api_url).with_token(response.token)),
            user: response.user,
            credentials,
            listeners: Mutex::default(),
        })
    }

    /// Rebuild a session from a stored token. Returns `None` when nothing is
    /// stored. A token the server no longer accepts is cleared before the
    /// error is returned.
    pub async fn restore(api_url: &str, credentials: Arc<CredentialStore>) -> Result<Option<Self>> {
        let Some(token) = credentials.token().await? else {
            return Ok(None);
        };

        let client = RestClient::new(api_url).with_token(token);
        match client.current_user().await {
            Ok(user) => Ok(Some(Self {
                client: Arc::new(client),
                user,
                credentials,
                listeners: Mutex::default(),
            })),
            Err(e) => {
                warn!("Could not restore session: {}", e);
                if e.is_auth() {
                    credentials.clear_credentials().await?;
                }
                Err(e)
            }
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn client(&self) -> Arc<RestClient> {
        Arc::clone(&self.client)
    }

    pub fn feed(&self, criteria: FilterCriteria) -> Arc<FeedStore> {
        Arc::new(FeedStore::with_criteria(self.client.clone(), criteria))
    }

    /// Build a push listener tied to this session's lifetime.
    pub fn listener(
        &self,
        store: Arc<FeedStore>,
        notifier: Arc<dyn Notifier>,
        inbox: Arc<NotificationCenter>,
    ) -> Arc<LiveUpdateListener> {
        let listener = Arc::new(LiveUpdateListener::new(store, notifier, inbox));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&listener));
        listener
    }

    /// Fetch the profile again, e.g. after editing it.
    pub async fn reload_user(&mut self) -> Result<&User> {
        self.user = self.client.current_user().await?;
        Ok(&self.user)
    }

    pub fn require_publisher(&self) -> Result<()> {
        if self.user.role.can_publish() {
            Ok(())
        } else {
            Err(ClientError::validation("Only faculty and HODs can publish notices"))
        }
    }

    pub fn require_hod(&self) -> Result<()> {
        if self.user.role.is_hod() {
            Ok(())
        } else {
            Err(ClientError::validation("This action is restricted to HODs"))
        }
    }

    pub async fn logout(self) -> Result<()> {
        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener.unsubscribe();
        }
        self.credentials.clear_credentials().await?;
        info!("Logged out {}", self.user.user_id);
        Ok(())
    }
}
