//! Drives the real HTTP client against a small fake of the notice-board API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use noticeboard::api::{NoticeApi, RestClient};
use noticeboard::live::ListenerState;
use noticeboard::models::{Attachment, FilterCriteria, FilterPatch, NoticeDraft, PasswordChange, Priority, Role};
use noticeboard::notify::{LogNotifier, NotificationCenter};
use noticeboard::session::Session;
use noticeboard::storage::{CredentialStore, SAVED_USER_ID_KEY, Scope};
use noticeboard::store::FeedStore;
use noticeboard::ClientError;

const TOKEN: &str = "good-token";

#[derive(Clone, Default)]
struct FakeServer {
    // Query strings seen by the list endpoint, in arrival order.
    list_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    // Form fields of each notice update, keyed by notice id.
    updates: Arc<Mutex<Vec<(String, HashMap<String, String>)>>>,
}

const ATTACHMENT_BYTES: &[u8] = b"%PDF-1.4 exam timetable";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Not authorized" }))).into_response()
}

fn notice_json(id: usize, category: &str) -> Value {
    json!({
        "_id": format!("n{}", id),
        "title": format!("{} notice {}", category, id),
        "content": "See the department board",
        "category": category,
        "priority": "normal",
        "isPinned": id == 0,
        "tags": ["all"],
        "authorName": "Dr. Rao",
        "createdAt": "2024-03-01T09:30:00.000Z",
        "views": [],
        "acknowledgements": []
    })
}

fn user_json() -> Value {
    json!({
        "userId": "H2001",
        "name": "Prof. Iyer",
        "email": "iyer@college.edu",
        "role": "hod",
        "department": "cse",
        "isActive": true
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["userId"] == "locked" {
        return StatusCode::FORBIDDEN.into_response();
    }
    if body["password"] == "secret" {
        Json(json!({ "token": TOKEN, "user": user_json() })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid credentials" }))).into_response()
    }
}

async fn me(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(user_json()).into_response()
}

async fn list_notices(
    State(server): State<FakeServer>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    server.list_queries.lock().unwrap().push(query.clone());

    let category = query.get("category").cloned().unwrap_or_else(|| "general".to_string());
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
    let total = 11;
    let notices: Vec<Value> = (0..total)
        .skip((page - 1) * limit)
        .take(limit)
        .map(|i| notice_json(i, &category))
        .collect();

    Json(json!({
        "notices": notices,
        "total": total,
        "totalPages": total.div_ceil(limit),
        "currentPage": page
    }))
    .into_response()
}

async fn get_notice(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Notice not found" }))).into_response();
    }
    let mut notice = notice_json(0, "exam");
    notice["_id"] = json!(id);
    notice["priority"] = json!("high");
    notice["tags"] = json!(["cse", "ece"]);
    notice["targetAudience"] = json!("both");
    notice["expiryDays"] = json!(14);
    notice["attachments"] = json!([
        { "filename": "1709285400-timetable.pdf", "originalName": "timetable.pdf" }
    ]);
    notice["comments"] = json!([
        { "userName": "Asha", "text": "Noted", "createdAt": "2024-03-02T10:00:00Z" }
    ]);
    Json(notice).into_response()
}

async fn update_notice(
    State(server): State<FakeServer>,
    headers: HeaderMap,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        fields.insert(name, field.text().await.unwrap());
    }
    server.updates.lock().unwrap().push((id, fields));
    Json(json!({ "message": "Notice updated successfully" })).into_response()
}

async fn upload(Path(filename): Path<String>) -> Response {
    if filename == "1709285400-timetable.pdf" {
        ATTACHMENT_BYTES.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn bookmark(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "message": "Notice bookmarked" })).into_response()
}

async fn comment(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body["text"].as_str().unwrap_or_default().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Comment text is required" })))
            .into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

async fn users(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut user = user_json();
    if let Some(role) = query.get("role") {
        user["role"] = json!(role);
    }
    Json(json!([user])).into_response()
}

async fn change_password(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body["currentPassword"] != "secret" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Current password is incorrect" })))
            .into_response();
    }
    Json(json!({ "message": "Password changed" })).into_response()
}

async fn broken() -> Response {
    (StatusCode::OK, "<html>not json</html>").into_response()
}

struct TestFixture {
    base_url: String,
    server: FakeServer,
}

impl TestFixture {
    async fn new() -> Self {
        let server = FakeServer::default();
        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/me", get(me))
            .route("/api/auth/users", get(users))
            .route("/api/auth/change-password", axum::routing::put(change_password))
            .route("/api/notices", get(list_notices))
            .route("/api/notices/analytics/stats", get(broken))
            .route("/api/notices/{id}", get(get_notice).put(update_notice))
            .route("/api/notices/{id}/bookmark", post(bookmark))
            .route("/api/notices/{id}/comment", post(comment))
            .route("/uploads/notices/{filename}", get(upload))
            .with_state(server.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            base_url: format!("http://{}/api", addr),
            server,
        }
    }

    fn client(&self) -> RestClient {
        RestClient::new(&self.base_url).with_token(TOKEN)
    }

    fn queries(&self) -> Vec<HashMap<String, String>> {
        self.server.list_queries.lock().unwrap().clone()
    }

    fn updates(&self) -> Vec<(String, HashMap<String, String>)> {
        self.server.updates.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_list_sends_only_set_filters() {
    let fixture = TestFixture::new().await;
    let mut criteria = FilterCriteria::default();
    criteria.apply(FilterPatch::default().category("exam"));

    let page = fixture.client().list_notices(&criteria, 9).await.unwrap();
    assert_eq!(page.total, 11);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.current_page, 1);
    assert_eq!(page.notices.len(), 9);
    assert_eq!(page.notices[0].category, "exam");

    let query = &fixture.queries()[0];
    assert_eq!(query.get("category").map(String::as_str), Some("exam"));
    assert_eq!(query.get("limit").map(String::as_str), Some("9"));
    assert!(!query.contains_key("tag"));
    assert!(!query.contains_key("search"));
}

#[tokio::test]
async fn test_missing_token_is_auth_error() {
    let fixture = TestFixture::new().await;
    let client = RestClient::new(&fixture.base_url);
    let err = client
        .list_notices(&FilterCriteria::default(), 9)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Auth));
    assert_eq!(err.to_string(), "Session expired");
}

#[tokio::test]
async fn test_error_body_message_is_surfaced() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    let err = client.get_notice("missing").await.unwrap_err();
    assert_eq!(err.to_string(), "Notice not found");

    let err = client.add_comment("n1", "").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref message } if message == "Comment text is required"));
}

#[tokio::test]
async fn test_malformed_body_is_network_error() {
    let fixture = TestFixture::new().await;
    let err = fixture.client().analytics().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let client = RestClient::new("http://127.0.0.1:9/api").with_token(TOKEN);
    let err = client
        .list_notices(&FilterCriteria::default(), 9)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn test_store_mutation_refetches_record() {
    let fixture = TestFixture::new().await;
    let store = FeedStore::new(Arc::new(fixture.client()));

    let update = store.toggle_bookmark("n4").await.unwrap();
    assert_eq!(update.message.as_deref(), Some("Notice bookmarked"));
    assert_eq!(update.notice.summary.id, "n4");
    assert_eq!(update.notice.comments[0].text, "Noted");
    assert_eq!(store.current_page().total, 0);
}

#[tokio::test]
async fn test_users_filter_and_password_change() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    let users = client.list_users(Some(Role::Faculty), None).await.unwrap();
    assert_eq!(users[0].role, Role::Faculty);

    let change = PasswordChange::new("wrong", "n3w", "n3w").unwrap();
    let err = client.change_password(&change).await.unwrap_err();
    assert_eq!(err.to_string(), "Current password is incorrect");

    let change = PasswordChange::new("secret", "n3w", "n3w").unwrap();
    client.change_password(&change).await.unwrap();
}

#[tokio::test]
async fn test_login_remember_and_restore() {
    let fixture = TestFixture::new().await;
    let dir = TempDir::new().unwrap();
    let credentials = Arc::new(
        CredentialStore::open(&dir.path().join("credentials.sqlite"))
            .await
            .unwrap(),
    );

    let err = Session::login(&fixture.base_url, credentials.clone(), "H2001", "nope", true)
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Invalid credentials");
    assert_eq!(credentials.token().await.unwrap(), None);

    let session = Session::login(&fixture.base_url, credentials.clone(), "H2001", "secret", true)
        .await
        .unwrap();
    assert!(session.user().role.is_hod());
    assert_eq!(credentials.token().await.unwrap().as_deref(), Some(TOKEN));
    assert_eq!(
        credentials
            .get(Scope::Local, SAVED_USER_ID_KEY)
            .await
            .unwrap()
            .as_deref(),
        Some("H2001")
    );

    let restored = Session::restore(&fixture.base_url, credentials.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.user().user_id, "H2001");

    let page = restored.feed(FilterCriteria::default()).refresh().await.unwrap();
    assert_eq!(page.notices.len(), 9);

    restored.logout().await.unwrap();
    assert_eq!(credentials.token().await.unwrap(), None);
    assert!(
        Session::restore(&fixture.base_url, credentials.clone())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_rejected_token_is_cleared_on_restore() {
    let fixture = TestFixture::new().await;
    let credentials = Arc::new(CredentialStore::in_memory().await.unwrap());
    credentials
        .set(Scope::Session, "token", "stale-token")
        .await
        .unwrap();

    let err = Session::restore(&fixture.base_url, credentials.clone())
        .await
        .err()
        .unwrap();
    assert!(err.is_auth());
    assert_eq!(credentials.token().await.unwrap(), None);
}

#[tokio::test]
async fn test_login_without_message_says_login_failed() {
    let fixture = TestFixture::new().await;
    let err = RestClient::new(&fixture.base_url)
        .login("locked", "secret")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref message } if message == "Login failed"));
}

#[tokio::test]
async fn test_edit_keeps_fields_it_does_not_change() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    let current = client.get_notice("n7").await.unwrap();
    let mut draft = NoticeDraft::from_notice(&current);
    draft.title = "Revised timetable".to_string();
    client.update_notice("n7", &draft).await.unwrap();

    let updates = fixture.updates();
    let (id, form) = &updates[0];
    assert_eq!(id, "n7");
    assert_eq!(form["title"], "Revised timetable");
    assert_eq!(form["content"], "See the department board");
    assert_eq!(form["targetAudience"], "both");
    assert_eq!(form["category"], "exam");
    assert_eq!(form["priority"], Priority::High.to_string());
    assert_eq!(form["expiryDays"], "14");
    assert_eq!(form["isPinned"], "true");
    assert_eq!(form["tags"], "cse,ece");
}

#[tokio::test]
async fn test_download_saves_under_original_name() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();
    let dir = TempDir::new().unwrap();

    let notice = client.get_notice("n2").await.unwrap();
    let path = client
        .download_attachment(&notice.attachments[0], dir.path())
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("timetable.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), ATTACHMENT_BYTES);

    let gone = Attachment {
        filename: "deleted.pdf".to_string(),
        original_name: "old.pdf".to_string(),
    };
    let err = client.download_attachment(&gone, dir.path()).await.unwrap_err();
    assert_eq!(err.to_string(), "Could not download old.pdf");
    assert!(!dir.path().join("old.pdf").exists());
}

#[tokio::test]
async fn test_logout_stops_session_listeners() {
    let fixture = TestFixture::new().await;
    let credentials = Arc::new(CredentialStore::in_memory().await.unwrap());
    let session = Session::login(&fixture.base_url, credentials, "H2001", "secret", false)
        .await
        .unwrap();

    let store = session.feed(FilterCriteria::default());
    let listener = session.listener(
        store,
        Arc::new(LogNotifier),
        Arc::new(NotificationCenter::new()),
    );
    listener.subscribe(futures::stream::pending());
    assert_eq!(listener.state(), ListenerState::Subscribed);

    session.logout().await.unwrap();
    assert_eq!(listener.state(), ListenerState::NotSubscribed);
}
