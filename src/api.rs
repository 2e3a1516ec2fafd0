use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};
use crate::models::{
    AnalyticsStats, Attachment, FeedPage, FilterCriteria, LoginResponse, MessageResponse, NewUser,
    NoticeDetail, NoticeDraft, NoticeSummary, PasswordChange, ProfileUpdate, Role, User,
};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// The record operations the feed depends on.
#[async_trait]
pub trait NoticeApi: Send + Sync {
    async fn list_notices(&self, criteria: &FilterCriteria, limit: u32) -> Result<FeedPage>;

    async fn get_notice(&self, id: &str) -> Result<NoticeDetail>;

    /// Returns the server's confirmation message ("Bookmarked", ...).
    async fn toggle_bookmark(&self, id: &str) -> Result<String>;

    async fn acknowledge(&self, id: &str) -> Result<()>;

    async fn add_comment(&self, id: &str, text: &str) -> Result<()>;
}

/// HTTP client for the notice-board REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.authorize(self.client.request(method, self.url(endpoint)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send an authenticated request. A 401 is reported as [`ClientError::Auth`].
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("API rejected credentials: {}", response.url());
            return Err(ClientError::Auth);
        }
        Self::decode(response, "Request failed").await
    }

    /// Decode a success body, or turn a failure into a validation error with
    /// the server's message (`fallback` when the body has none).
    async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        debug!("{} -> {} ({} bytes)", url, status, bytes.len());

        if !status.is_success() {
            let message = serde_json::from_slice::<MessageResponse>(&bytes)
                .map(|body| body.message)
                .unwrap_or_else(|_| fallback.to_string());
            return Err(ClientError::Validation { message });
        }

        serde_json::from_slice(&bytes).map_err(ClientError::malformed)
    }

    async fn send_message(&self, builder: RequestBuilder) -> Result<String> {
        let body: MessageResponse = self.send(builder).await?;
        Ok(body.message)
    }

    async fn send_ignored(&self, builder: RequestBuilder) -> Result<()> {
        let _: serde_json::Value = self.send(builder).await?;
        Ok(())
    }

    /// Exchange credentials for a bearer token. Bad credentials come back as
    /// a validation error carrying the server's message, not as an auth error.
    pub async fn login(&self, user_id: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "userId": user_id, "password": password }))
            .send()
            .await?;
        Self::decode(response, "Login failed").await
    }

    pub async fn current_user(&self) -> Result<User> {
        self.send(self.request(Method::GET, "/auth/me")).await
    }

    pub async fn create_notice(&self, draft: &NoticeDraft) -> Result<()> {
        let form = notice_form(draft).await?;
        self.send_ignored(self.request(Method::POST, "/notices").multipart(form))
            .await
    }

    pub async fn update_notice(&self, id: &str, draft: &NoticeDraft) -> Result<()> {
        let form = notice_form(draft).await?;
        let endpoint = format!("/notices/{}", id);
        self.send_ignored(self.request(Method::PUT, &endpoint).multipart(form))
            .await
    }

    pub async fn delete_notice(&self, id: &str) -> Result<()> {
        let endpoint = format!("/notices/{}", id);
        self.send_ignored(self.request(Method::DELETE, &endpoint))
            .await
    }

    pub async fn archive_notice(&self, id: &str) -> Result<String> {
        let endpoint = format!("/notices/{}/archive", id);
        self.send_message(self.request(Method::POST, &endpoint))
            .await
    }

    pub async fn my_notices(&self) -> Result<Vec<NoticeDetail>> {
        self.send(self.request(Method::GET, "/notices/user/my-notices"))
            .await
    }

    pub async fn bookmarks(&self) -> Result<Vec<NoticeSummary>> {
        self.send(self.request(Method::GET, "/notices/user/bookmarks"))
            .await
    }

    pub async fn analytics(&self) -> Result<AnalyticsStats> {
        self.send(self.request(Method::GET, "/notices/analytics/stats"))
            .await
    }

    pub async fn list_users(&self, role: Option<Role>, department: Option<&str>) -> Result<Vec<User>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(role) = role {
            query.push(("role", role.to_string()));
        }
        if let Some(department) = department.filter(|d| !d.is_empty()) {
            query.push(("department", department.to_string()));
        }
        self.send(self.request(Method::GET, "/auth/users").query(&query))
            .await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<()> {
        self.send_ignored(self.request(Method::POST, "/auth/create-user").json(user))
            .await
    }

    /// Bulk-import users from a spreadsheet. Returns the server's summary line.
    pub async fn upload_users(&self, path: &Path) -> Result<String> {
        let form = Form::new().part("file", file_part(path).await?);
        self.send_message(self.request(Method::POST, "/auth/upload-users").multipart(form))
            .await
    }

    pub async fn update_profile(&self, profile: &ProfileUpdate) -> Result<()> {
        self.send_ignored(self.request(Method::PUT, "/auth/profile").json(profile))
            .await
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        self.send_ignored(self.request(Method::PUT, "/auth/change-password").json(change))
            .await
    }

    /// Save an attachment into `dir` under its original name and return the
    /// path written.
    pub async fn download_attachment(&self, attachment: &Attachment, dir: &Path) -> Result<PathBuf> {
        let url = self.upload_url(&attachment.filename)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Auth);
        }
        if !status.is_success() {
            warn!("Download of {} answered {}", attachment.filename, status);
            return Err(ClientError::validation(format!(
                "Could not download {}",
                attachment.original_name
            )));
        }

        let bytes = response.bytes().await?;
        let name = Path::new(&attachment.original_name)
            .file_name()
            .or_else(|| Path::new(&attachment.filename).file_name())
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "attachment".into());
        let dest = dir.join(name);
        tokio::fs::write(&dest, &bytes).await?;
        info!("Saved {} ({} bytes)", dest.display(), bytes.len());
        Ok(dest)
    }

    // Uploads are served from the site root, outside the API prefix.
    fn upload_url(&self, filename: &str) -> Result<Url> {
        Url::parse(&self.base_url)
            .and_then(|base| base.join(&format!("/uploads/notices/{}", filename)))
            .map_err(|e| ClientError::validation(format!("invalid API URL {}: {}", self.base_url, e)))
    }
}

#[async_trait]
impl NoticeApi for RestClient {
    async fn list_notices(&self, criteria: &FilterCriteria, limit: u32) -> Result<FeedPage> {
        let query = criteria.to_query(limit);
        self.send(self.request(Method::GET, "/notices").query(&query))
            .await
    }

    async fn get_notice(&self, id: &str) -> Result<NoticeDetail> {
        let endpoint = format!("/notices/{}", id);
        self.send(self.request(Method::GET, &endpoint)).await
    }

    async fn toggle_bookmark(&self, id: &str) -> Result<String> {
        let endpoint = format!("/notices/{}/bookmark", id);
        self.send_message(self.request(Method::POST, &endpoint))
            .await
    }

    async fn acknowledge(&self, id: &str) -> Result<()> {
        let endpoint = format!("/notices/{}/acknowledge", id);
        self.send_ignored(self.request(Method::POST, &endpoint))
            .await
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        let endpoint = format!("/notices/{}/comment", id);
        self.send_ignored(
            self.request(Method::POST, &endpoint)
                .json(&serde_json::json!({ "text": text })),
        )
        .await
    }
}

async fn notice_form(draft: &NoticeDraft) -> Result<Form> {
    draft.validate()?;

    let mut form = Form::new()
        .text("title", draft.title.clone())
        .text("content", draft.content.clone())
        .text("targetAudience", draft.target_audience.clone())
        .text("category", draft.category.clone())
        .text("priority", draft.priority.to_string())
        .text("expiryDays", draft.expiry_days.to_string())
        .text("isPinned", draft.is_pinned.to_string())
        .text("tags", draft.joined_tags());

    for path in &draft.attachments {
        form = form.part("attachments", file_part(path).await?);
    }
    Ok(form)
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}
