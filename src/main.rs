use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use noticeboard::api::NoticeApi;
use noticeboard::config::Config;
use noticeboard::live::{self, AutoRefresh};
use noticeboard::logger::{self, parse_log_level};
use noticeboard::models::{
    FeedPage, FilterCriteria, FilterPatch, NewUser, NoticeDetail, NoticeDraft, NoticeSummary,
    PasswordChange, Priority, ProfileUpdate, Role,
};
use noticeboard::notify::{LogNotifier, Notification, NotificationCenter, Notifier, Severity};
use noticeboard::session::Session;
use noticeboard::storage::CredentialStore;
use noticeboard::store::SearchDebouncer;
use noticeboard::view;
use noticeboard::ClientError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file
    #[arg(short, long, default_value = "noticeboard.yaml")]
    config: PathBuf,

    /// Overrides the configured console log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log in for this invocation only (nothing is remembered)
    #[arg(long, env = "NOTICEBOARD_USER", requires = "password")]
    user_id: Option<String>,

    #[arg(long, env = "NOTICEBOARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    page: Option<u32>,
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        criteria.apply(FilterPatch {
            category: self.category.clone(),
            priority: self.priority.clone(),
            tag: self.tag.clone(),
            search: self.search.clone(),
            page: None,
        });
        if let Some(page) = self.page {
            criteria.apply(FilterPatch::default().page(page));
        }
        criteria
    }
}

#[derive(ClapArgs, Debug)]
struct DraftArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    /// students, faculty or both
    #[arg(long, default_value = "students")]
    audience: String,
    #[arg(long, default_value = "general")]
    category: String,
    #[arg(long, default_value = "normal")]
    priority: String,
    #[arg(long, default_value_t = 7)]
    expiry_days: u32,
    #[arg(long)]
    pinned: bool,
    /// Repeat for several tags
    #[arg(long = "tag", default_values_t = vec!["all".to_string()])]
    tags: Vec<String>,
    /// Files to attach
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
}

/// Only the flags given are changed; everything else keeps its current value.
#[derive(ClapArgs, Debug)]
struct EditArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    audience: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    expiry_days: Option<u32>,
    #[arg(long)]
    pinned: Option<bool>,
    /// Replaces the current tags; repeat for several
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Files to add
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
}

impl EditArgs {
    fn overlay(self, mut draft: NoticeDraft) -> Result<NoticeDraft> {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(content) = self.content {
            draft.content = content;
        }
        if let Some(audience) = self.audience {
            draft.target_audience = audience;
        }
        if let Some(category) = self.category {
            draft.category = category;
        }
        if let Some(priority) = self.priority {
            draft.priority = priority.parse::<Priority>()?;
        }
        if let Some(days) = self.expiry_days {
            draft.expiry_days = days;
        }
        if let Some(pinned) = self.pinned {
            draft.is_pinned = pinned;
        }
        if !self.tags.is_empty() {
            draft.tags = self.tags;
        }
        draft.attachments = self.attachments;
        Ok(draft)
    }
}

impl DraftArgs {
    fn draft(&self) -> Result<NoticeDraft> {
        Ok(NoticeDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            target_audience: self.audience.clone(),
            category: self.category.clone(),
            priority: self.priority.parse::<Priority>()?,
            expiry_days: self.expiry_days,
            is_pinned: self.pinned,
            tags: self.tags.clone(),
            attachments: self.attachments.clone(),
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the token
    Login {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        password: String,
        /// Keep only for this process instead of storing on disk
        #[arg(long)]
        forget: bool,
    },
    Logout,
    Whoami,
    /// Show one page of the notice feed
    List(FilterArgs),
    Show { id: String },
    Bookmark { id: String },
    Ack { id: String },
    Comment { id: String, text: String },
    Create(DraftArgs),
    Edit {
        id: String,
        #[command(flatten)]
        changes: EditArgs,
    },
    /// Save a notice's attachments
    Download {
        id: String,
        /// Directory to save into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    Delete { id: String },
    Archive { id: String },
    /// Notices you have published
    Mine,
    Bookmarks,
    /// Department analytics (HOD only)
    Stats,
    /// List users (HOD only)
    Users {
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Create a user account (HOD only)
    AddUser {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        department: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Import users from a spreadsheet (HOD only)
    UploadUsers { file: PathBuf },
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    /// Follow the feed live. Reads filter commands from stdin
    /// (`search <text>`, `category <c>`, `priority <p>`, `tag <t>`, `page <n>`,
    /// `refresh`, `quit`) and push events, one JSON object per line, from `--events`.
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
        /// File or FIFO delivering push events
        #[arg(long)]
        events: Option<PathBuf>,
    },
}

struct App {
    config: Config,
    credentials: Arc<CredentialStore>,
    notifier: Arc<dyn Notifier>,
    user_id: Option<String>,
    password: Option<String>,
}

impl App {
    async fn session(&self) -> Result<Session> {
        if let (Some(user_id), Some(password)) = (&self.user_id, &self.password) {
            let session = Session::login(
                &self.config.api_url,
                self.credentials.clone(),
                user_id,
                password,
                false,
            )
            .await?;
            return Ok(session);
        }

        match Session::restore(&self.config.api_url, self.credentials.clone()).await? {
            Some(session) => Ok(session),
            None => bail!("Not logged in. Run `noticeboard login` first."),
        }
    }

    fn toast(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login {
                user_id,
                password,
                forget,
            } => {
                let session = Session::login(
                    &self.config.api_url,
                    self.credentials.clone(),
                    &user_id,
                    &password,
                    !forget,
                )
                .await?;
                self.toast(Notification::success(format!("Welcome, {}", session.user().name)));
            }
            Command::Logout => {
                match Session::restore(&self.config.api_url, self.credentials.clone()).await {
                    Ok(Some(session)) => session.logout().await?,
                    _ => self.credentials.clear_credentials().await?,
                }
                self.toast(Notification::success("Logged out"));
            }
            Command::Whoami => {
                let session = self.session().await?;
                let user = session.user();
                println!("{} ({})", user.name, user.user_id);
                println!("Role: {}", user.role.as_str().to_uppercase());
                println!("Department: {}", user.department.to_uppercase());
                if let Some(phone) = &user.phone {
                    println!("Phone: {}", phone);
                }
            }
            Command::List(filter) => {
                let session = self.session().await?;
                let store = session.feed(filter.criteria());
                let page = store.refresh().await?;
                print_feed(&page);
            }
            Command::Show { id } => {
                let session = self.session().await?;
                let store = session.feed(FilterCriteria::default());
                print_detail(&store.view_notice(&id).await?);
            }
            Command::Bookmark { id } => {
                let session = self.session().await?;
                let update = session.feed(FilterCriteria::default()).toggle_bookmark(&id).await?;
                if let Some(message) = update.message {
                    self.toast(Notification::success(message));
                }
            }
            Command::Ack { id } => {
                let session = self.session().await?;
                let update = session.feed(FilterCriteria::default()).acknowledge(&id).await?;
                self.toast(Notification::success("Notice acknowledged!"));
                print_detail(&update.notice);
            }
            Command::Comment { id, text } => {
                let session = self.session().await?;
                let update = session
                    .feed(FilterCriteria::default())
                    .add_comment(&id, &text)
                    .await?;
                self.toast(Notification::success("Comment added!"));
                print_detail(&update.notice);
            }
            Command::Create(args) => {
                let session = self.session().await?;
                session.require_publisher()?;
                session.client().create_notice(&args.draft()?).await?;
                self.toast(Notification::success("Notice created successfully!"));
            }
            Command::Edit { id, changes } => {
                let session = self.session().await?;
                session.require_publisher()?;
                let client = session.client();
                let current = client.get_notice(&id).await?;
                let draft = changes.overlay(NoticeDraft::from_notice(&current))?;
                client.update_notice(&id, &draft).await?;
                self.toast(Notification::success("Notice updated successfully!"));
            }
            Command::Download { id, dir } => {
                let session = self.session().await?;
                let client = session.client();
                let notice = client.get_notice(&id).await?;
                if notice.attachments.is_empty() {
                    println!("No attachments");
                }
                for attachment in &notice.attachments {
                    let path = client.download_attachment(attachment, &dir).await?;
                    self.toast(Notification::success(format!("Saved {}", path.display())));
                }
            }
            Command::Delete { id } => {
                let session = self.session().await?;
                session.client().delete_notice(&id).await?;
                self.toast(Notification::success("Notice deleted successfully!"));
            }
            Command::Archive { id } => {
                let session = self.session().await?;
                let message = session.client().archive_notice(&id).await?;
                self.toast(Notification::success(message));
            }
            Command::Mine => {
                let session = self.session().await?;
                session.require_publisher()?;
                for notice in session.client().my_notices().await? {
                    let expired = if notice.is_expired { " [expired]" } else { "" };
                    print_summary_line(&notice.summary);
                    println!(
                        "    views {} / acks {}{}",
                        notice.summary.view_count, notice.summary.acknowledgement_count, expired
                    );
                }
            }
            Command::Bookmarks => {
                let session = self.session().await?;
                let bookmarks = session.client().bookmarks().await?;
                if bookmarks.is_empty() {
                    println!("No bookmarks yet");
                }
                for notice in &bookmarks {
                    print_summary_line(notice);
                }
            }
            Command::Stats => {
                let session = self.session().await?;
                session.require_hod()?;
                let stats = session.client().analytics().await?;
                println!(
                    "Total {} | Active {} | Expired {} | Users {}",
                    stats.total_notices,
                    stats.active_notices,
                    stats.expired_notices,
                    stats.total_users
                );
                for (title, buckets) in [
                    ("By category", &stats.notices_by_category),
                    ("By department", &stats.notices_by_department),
                    ("By priority", &stats.notices_by_priority),
                ] {
                    println!("\n{}", title);
                    for bar in view::chart_bars(buckets) {
                        let width = (bar.width_percent / 5.0).round() as usize;
                        println!("  {:<12} {:<20} {}", bar.label, "#".repeat(width), bar.count);
                    }
                }
                println!("\nRecent");
                for notice in &stats.recent_notices {
                    println!("  {} ({})", notice.title, view::format_date(&notice.created_at));
                }
            }
            Command::Users { role, department } => {
                let session = self.session().await?;
                session.require_hod()?;
                let role = role.map(|r| r.parse::<Role>()).transpose()?;
                let users = session
                    .client()
                    .list_users(role, department.as_deref())
                    .await?;
                for user in users {
                    println!(
                        "{:<10} {:<24} {:<28} {:<8} {:<6} {}",
                        user.user_id,
                        user.name,
                        user.email,
                        user.role,
                        user.department.to_uppercase(),
                        if user.is_active { "Active" } else { "Inactive" }
                    );
                }
            }
            Command::AddUser {
                user_id,
                name,
                email,
                password,
                role,
                department,
                phone,
            } => {
                let session = self.session().await?;
                session.require_hod()?;
                let user = NewUser {
                    user_id,
                    name,
                    email,
                    password,
                    role: role.parse()?,
                    department,
                    phone,
                };
                session.client().create_user(&user).await?;
                self.toast(Notification::success("User created successfully!"));
            }
            Command::UploadUsers { file } => {
                let session = self.session().await?;
                session.require_hod()?;
                let message = session.client().upload_users(&file).await?;
                self.toast(Notification::success(message));
            }
            Command::Profile { name, phone } => {
                let mut session = self.session().await?;
                session
                    .client()
                    .update_profile(&ProfileUpdate { name, phone })
                    .await?;
                let user = session.reload_user().await?;
                self.toast(Notification::success(format!("Profile updated! ({})", user.name)));
            }
            Command::Password {
                current,
                new,
                confirm,
            } => {
                let change = PasswordChange::new(&current, &new, &confirm)?;
                let session = self.session().await?;
                session.client().change_password(&change).await?;
                self.toast(Notification::success("Password changed successfully!"));
            }
            Command::Watch { filter, events } => {
                let session = self.session().await?;
                self.watch(session, filter, events).await?;
            }
        }
        Ok(())
    }

    async fn watch(&self, session: Session, filter: FilterArgs, events: Option<PathBuf>) -> Result<()> {
        let store = session.feed(filter.criteria());
        let inbox = Arc::new(NotificationCenter::new());
        let listener = session.listener(store.clone(), self.notifier.clone(), inbox.clone());
        let auto = AutoRefresh::new(store.clone(), self.config.auto_refresh());
        let debouncer = SearchDebouncer::new(store.clone(), self.config.search_debounce());

        if let Some(path) = events {
            let file = tokio::fs::File::open(&path).await?;
            listener.subscribe(live::json_lines(BufReader::new(file)));
        }
        auto.start();

        let mut pages = store.subscribe();
        let mut expired = store.auth_expired();
        let mut commands = BufReader::new(tokio::io::stdin()).lines();
        if let Err(e) = store.refresh().await {
            self.report(e)?;
        }

        loop {
            tokio::select! {
                // Covers refreshes nobody awaits: push events, timer ticks, searches.
                _ = expired.wait_for(|expired| *expired) => {
                    return Err(ClientError::Auth.into());
                }
                changed = pages.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let page = pages.borrow_and_update().clone();
                    print_feed(&page);
                    if inbox.unread_count() > 0 {
                        println!("({} new since you started watching)", inbox.unread_count());
                    }
                }
                line = commands.next_line() => {
                    let Some(line) = line? else { break };
                    let (verb, rest) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
                    let rest = rest.trim().to_string();
                    debug!("watch command {:?} {:?}", verb, rest);
                    let task = match verb {
                        "search" => {
                            debouncer.input(rest);
                            None
                        }
                        "category" => Some(store.set_filter(FilterPatch::default().category(rest))),
                        "priority" => Some(store.set_filter(FilterPatch::default().priority(rest))),
                        "tag" => Some(store.set_filter(FilterPatch::default().tag(rest))),
                        "page" => match rest.parse::<u32>() {
                            Ok(page) => Some(store.set_filter(FilterPatch::default().page(page))),
                            Err(_) => {
                                self.toast(Notification::new("page needs a number", Severity::Warning));
                                None
                            }
                        },
                        "refresh" => {
                            if let Err(e) = store.refresh().await {
                                self.report(e)?;
                            }
                            None
                        }
                        "quit" | "exit" => break,
                        "" => None,
                        other => {
                            self.toast(Notification::new(format!("unknown command: {}", other), Severity::Warning));
                            None
                        }
                    };
                    if let Some(task) = task {
                        if let Ok(Err(e)) = task.await {
                            self.report(e)?;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        listener.unsubscribe();
        auto.pause();
        info!("Stopped watching");
        Ok(())
    }

    /// Toast a failed refresh. An auth failure ends the session instead.
    fn report(&self, error: ClientError) -> Result<()> {
        if error.is_auth() {
            return Err(error.into());
        }
        self.toast(Notification::error(error.to_string()));
        Ok(())
    }
}

fn print_summary_line(notice: &NoticeSummary) {
    let pin = if notice.is_pinned { "📌 " } else { "" };
    println!(
        "{}[{}] {} ({}) by {}",
        pin, notice.priority, notice.title, notice.id, notice.author_name
    );
}

fn print_feed(page: &FeedPage) {
    let feed = view::feed_view(page);
    println!("{} notices", feed.count);
    if let Some(message) = feed.empty_message {
        println!("{}", message);
        return;
    }
    for card in &feed.cards {
        let pin = if card.pinned { "📌 " } else { "" };
        println!("\n{}[{}] {}  ({})", pin, card.priority, card.title, card.id);
        println!("    {}", card.preview);
        if !card.tags.is_empty() {
            println!("    {}", card.tags.join(" "));
        }
        println!("    {} · {} · {} views", card.author, card.posted, card.views);
    }

    if !feed.pagination.is_empty() {
        let buttons: Vec<String> = feed
            .pagination
            .iter()
            .map(|b| match b {
                view::PageButton::Previous(_) => "‹".to_string(),
                view::PageButton::Next(_) => "›".to_string(),
                view::PageButton::Gap => "…".to_string(),
                view::PageButton::Page { number, active: true } => format!("[{}]", number),
                view::PageButton::Page { number, .. } => number.to_string(),
            })
            .collect();
        println!("\n{}", buttons.join(" "));
    }
}

fn print_detail(notice: &NoticeDetail) {
    let detail = view::detail_view(notice, Utc::now());
    println!("{}", detail.card.title);
    println!(
        "[{}] {}{}",
        detail.card.priority,
        detail.category,
        if detail.card.pinned { " · pinned" } else { "" }
    );
    println!("Posted by: {}", detail.posted_by);
    println!("Posted on: {}", detail.card.posted);
    if let (Some(expires), Some(days)) = (&detail.expires, detail.days_left) {
        println!("Expires:   {} ({} days left)", expires, days);
    }
    println!("Target:    {}", detail.audience);
    println!("{}", detail.card.tags.join(" "));
    println!();
    for line in &detail.body {
        println!("{}", line);
    }
    if !detail.attachments.is_empty() {
        println!("\nAttachments: {}", detail.attachments.join(", "));
    }
    println!(
        "\n{} views · {} acknowledgements",
        detail.card.views, detail.acknowledgements
    );
    println!("Comments ({})", detail.comments.len());
    for comment in &detail.comments {
        println!("  {}", comment);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::read(&args.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();
    let mut log_config = config.log_config();
    if let Some(level) = &args.log_level {
        log_config.console_level = parse_log_level(level);
    }
    logger::init(log_config)?;
    if found {
        debug!("Loaded config from {}: {:?}", args.config.display(), config);
    } else {
        info!("Config file {} not found, using defaults", args.config.display());
    }

    let credentials = Arc::new(CredentialStore::open(&config.storage_path).await?);
    let app = App {
        config,
        credentials: credentials.clone(),
        notifier: Arc::new(LogNotifier),
        user_id: args.user_id,
        password: args.password,
    };

    let result = app.run(args.command).await;
    if let Err(e) = &result {
        // An expired token is useless; drop it so the next run asks for a login.
        if e.downcast_ref::<ClientError>().is_some_and(ClientError::is_auth) {
            credentials.clear_credentials().await?;
        }
        app.toast(Notification::error(e.to_string()));
    }
    result
}
