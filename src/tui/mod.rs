pub mod command;
pub mod detail;
pub mod message_list;
pub mod status_bar;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEvent, KeyEventKind},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    text::Line,
    Frame, Terminal,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error;
use crate::keymap::{self, Action, ViewMode};
use crate::message::{Message, MessageItem};
use crate::source::Mailbox;
use crate::watch::Watcher;

use self::command::{Collaborators, Command, Dispatcher};
use self::detail::DetailView;
use self::message_list::MessageList;
use self::status_bar::{BottomBar, TopBar};

// ── Messages ────────────────────────────────────────────────────────

/// Everything the UI loop reacts to. Listeners and commands only ever
/// produce these; the loop is the single consumer.
#[derive(Debug)]
pub enum Msg {
    MessageReceived(MessageItem),
    ConnectionError(error::Error),
    Connected,
    MessageDeleted {
        id: String,
        result: error::Result<()>,
    },
    AttachmentSaved(error::Result<PathBuf>),
    MailboxCreated(error::Result<Mailbox>),
    /// Follow-up of opening a link or an HTML preview.
    BrowserOpened(error::Result<()>),
    Key(KeyEvent),
    Resize { height: u16 },
}

// ── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailTab {
    #[default]
    Content,
    Security,
    Links,
    Attachments,
    Raw,
}

/// Which selection cursor a tab owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Link,
    Attachment,
}

pub struct TabInfo {
    pub tab: DetailTab,
    pub title: &'static str,
    pub cursor: Option<Cursor>,
    pub render: fn(&App, &Message) -> Vec<Line<'static>>,
}

/// The tab bar, in order. The number key for a tab is its position + 1.
pub static TABS: [TabInfo; 5] = [
    TabInfo {
        tab: DetailTab::Content,
        title: "Content",
        cursor: None,
        render: detail::content_lines,
    },
    TabInfo {
        tab: DetailTab::Security,
        title: "Security",
        cursor: None,
        render: detail::security_lines,
    },
    TabInfo {
        tab: DetailTab::Links,
        title: "Links",
        cursor: Some(Cursor::Link),
        render: detail::link_lines,
    },
    TabInfo {
        tab: DetailTab::Attachments,
        title: "Attachments",
        cursor: Some(Cursor::Attachment),
        render: detail::attachment_lines,
    },
    TabInfo {
        tab: DetailTab::Raw,
        title: "Raw",
        cursor: None,
        render: detail::raw_lines,
    },
];

impl DetailTab {
    pub fn index(self) -> usize {
        TABS.iter().position(|t| t.tab == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        TABS.get(index).map(|t| t.tab)
    }

    pub fn info(self) -> &'static TabInfo {
        &TABS[self.index()]
    }
}

/// Move a cursor by `delta` with wrap-around. Always 0 for an empty list.
pub fn wrap(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (current as isize + delta).rem_euclid(len as isize) as usize
}

pub struct App {
    /// Newest first, unique by message id.
    pub messages: Vec<MessageItem>,
    pub mailboxes: Vec<Mailbox>,
    /// `None` (or out of range) shows every mailbox.
    pub current_mailbox: Option<usize>,
    pub view: ViewMode,
    /// Cursor in the filtered list.
    pub selected: usize,
    pub selected_message: Option<MessageItem>,
    pub detail_tab: DetailTab,
    pub selected_link: usize,
    pub selected_attachment: usize,
    pub detail_scroll: u16,
    pub last_saved_attachment: Option<PathBuf>,
    pub connection: ConnectionState,
    pub last_error: Option<String>,
    /// Progress note for an in-flight command.
    pub status: Option<String>,
    pub download_dir: PathBuf,
    pub viewport_height: u16,
    pub should_quit: bool,
}

impl App {
    pub fn new(mailboxes: Vec<Mailbox>, download_dir: PathBuf) -> Self {
        let current_mailbox = if mailboxes.is_empty() { None } else { Some(0) };
        Self {
            messages: Vec::new(),
            mailboxes,
            current_mailbox,
            view: ViewMode::List,
            selected: 0,
            selected_message: None,
            detail_tab: DetailTab::Content,
            selected_link: 0,
            selected_attachment: 0,
            detail_scroll: 0,
            last_saved_attachment: None,
            connection: ConnectionState::Connecting,
            last_error: None,
            status: None,
            download_dir,
            viewport_height: 24,
            should_quit: false,
        }
    }

    pub fn selected_mailbox(&self) -> Option<&Mailbox> {
        self.current_mailbox.and_then(|i| self.mailboxes.get(i))
    }

    fn is_visible(&self, item: &MessageItem) -> bool {
        match self.selected_mailbox() {
            Some(mailbox) => item.mailbox == mailbox.address,
            None => true,
        }
    }

    /// The visible list: messages of the selected mailbox, or all of them.
    pub fn filtered(&self) -> Vec<&MessageItem> {
        self.messages.iter().filter(|m| self.is_visible(m)).collect()
    }

    /// The highlighted row in the list view.
    pub fn current_item(&self) -> Option<&MessageItem> {
        self.filtered().get(self.selected).copied()
    }

    pub fn title(&self) -> String {
        if self.mailboxes.is_empty() {
            return "No mailboxes".to_string();
        }
        match self.connection {
            ConnectionState::Connecting => return "Connecting\u{2026}".to_string(),
            ConnectionState::Disconnected => return "Disconnected".to_string(),
            ConnectionState::Connected => {}
        }
        if let Some(err) = &self.last_error {
            return err.clone();
        }
        let count = self.filtered().len();
        if self.mailboxes.len() == 1 {
            return format!("{} \u{2022} {} messages", self.mailboxes[0].address, count);
        }
        match (self.current_mailbox, self.selected_mailbox()) {
            (Some(i), Some(mailbox)) => format!(
                "[{}/{}] {} \u{2022} {} messages",
                i + 1,
                self.mailboxes.len(),
                mailbox.address,
                count
            ),
            _ => format!("All mailboxes \u{2022} {} messages", count),
        }
    }

    fn page(&self) -> usize {
        (self.viewport_height.saturating_sub(4) as usize).max(1)
    }

    /// The mailbox a message should be deleted from.
    fn mailbox_of(&self, item: &MessageItem) -> Option<Mailbox> {
        if item.mailbox.is_empty() {
            self.mailboxes.first().cloned()
        } else {
            Some(Mailbox::new(item.mailbox.clone()))
        }
    }

    // ── Reducer ─────────────────────────────────────────────────────

    /// Apply one message. Returns the side effect to run, if any.
    pub fn update(&mut self, msg: Msg) -> Option<Command> {
        match msg {
            Msg::MessageReceived(item) => {
                self.ingest(item);
                None
            }
            Msg::ConnectionError(err) => {
                self.connection = ConnectionState::Disconnected;
                self.last_error = Some(err.to_string());
                None
            }
            Msg::Connected => {
                self.connection = ConnectionState::Connected;
                self.last_error = None;
                None
            }
            Msg::MessageDeleted { id, result } => {
                self.status = None;
                match result {
                    Ok(()) => self.remove_message(&id),
                    Err(err) => self.last_error = Some(err.to_string()),
                }
                None
            }
            Msg::AttachmentSaved(result) => {
                self.status = None;
                match result {
                    Ok(path) => self.last_saved_attachment = Some(path),
                    Err(err) => self.last_error = Some(err.to_string()),
                }
                None
            }
            Msg::MailboxCreated(result) => {
                self.status = None;
                match result {
                    Ok(mailbox) => {
                        info!("mailbox {} created", mailbox);
                        self.mailboxes.push(mailbox.clone());
                        self.current_mailbox = Some(self.mailboxes.len() - 1);
                        self.selected = 0;
                        Some(Command::Watch(mailbox))
                    }
                    Err(err) => {
                        self.last_error = Some(err.to_string());
                        None
                    }
                }
            }
            Msg::BrowserOpened(result) => {
                self.status = None;
                if let Err(err) = result {
                    self.last_error = Some(err.to_string());
                }
                None
            }
            Msg::Key(key) => self.handle_action(keymap::handle(key, self.view)),
            Msg::Resize { height } => {
                self.viewport_height = height;
                None
            }
        }
    }

    fn ingest(&mut self, item: MessageItem) {
        if self.messages.iter().any(|m| m.id() == item.id()) {
            return;
        }
        debug!("ingest {} ({})", item.id(), item.mailbox);
        let shifts_rows = self.view == ViewMode::List
            && self.is_visible(&item)
            && self.selected > 0
            && !self.filtered().is_empty();
        self.messages.insert(0, item);
        // Keep the highlighted row on the same message unless it is the top one.
        if shifts_rows {
            self.selected += 1;
        }
        self.clamp_selection();
    }

    fn remove_message(&mut self, id: &str) {
        self.messages.retain(|m| m.id() != id);
        if self.selected_message.as_ref().is_some_and(|m| m.id() == id) {
            self.leave_detail();
        }
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.filtered().len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    /// Enter the detail view for row `index` of the filtered list.
    pub fn open_message(&mut self, index: usize) {
        let Some(item) = self.filtered().get(index).map(|m| (*m).clone()) else {
            return;
        };
        self.selected = index;
        self.selected_message = Some(item);
        self.view = ViewMode::Detail;
        self.detail_tab = DetailTab::Content;
        self.selected_link = 0;
        self.selected_attachment = 0;
        self.detail_scroll = 0;
    }

    fn leave_detail(&mut self) {
        self.view = ViewMode::List;
        self.selected_message = None;
        self.detail_tab = DetailTab::Content;
        self.detail_scroll = 0;
    }

    pub fn select_tab(&mut self, tab: DetailTab) {
        self.detail_tab = tab;
        self.detail_scroll = 0;
        match tab.info().cursor {
            Some(Cursor::Link) => self.selected_link = 0,
            Some(Cursor::Attachment) => self.selected_attachment = 0,
            None => {}
        }
    }

    fn cycle_mailbox(&mut self, delta: isize) {
        let len = self.mailboxes.len();
        if len == 0 {
            return;
        }
        let next = match self.current_mailbox.filter(|&i| i < len) {
            Some(i) => wrap(i, delta, len),
            None if delta >= 0 => 0,
            None => len - 1,
        };
        self.current_mailbox = Some(next);
        self.selected = 0;
        self.clamp_selection();
    }

    /// Move the Links/Attachments cursor, or scroll the other tabs.
    fn move_in_detail(&mut self, delta: isize) {
        let Some(message) = self.selected_message.as_ref().map(|m| m.message.clone()) else {
            return;
        };
        match self.detail_tab.info().cursor {
            Some(Cursor::Link) => {
                self.selected_link = wrap(self.selected_link, delta, message.links.len());
            }
            Some(Cursor::Attachment) => {
                self.selected_attachment =
                    wrap(self.selected_attachment, delta, message.attachments.len());
            }
            None => self.scroll_detail(delta),
        }
    }

    fn scroll_detail(&mut self, delta: isize) {
        let scroll = self.detail_scroll as isize + delta;
        self.detail_scroll = scroll.clamp(0, u16::MAX as isize) as u16;
    }

    /// Hand a command to the dispatcher, showing `status` while it runs.
    /// A command without a valid target is dropped here, so the status
    /// line never waits for a follow-up that will not come.
    fn request(&mut self, command: Command, status: impl Into<String>) -> Option<Command> {
        if !command.has_target() {
            return None;
        }
        self.status = Some(status.into());
        Some(command)
    }

    fn delete_command(&mut self, item: &MessageItem) -> Option<Command> {
        let mailbox = self.mailbox_of(item)?;
        let command = Command::DeleteMessage {
            mailbox,
            id: item.id().to_string(),
        };
        self.request(command, "Deleting\u{2026}")
    }

    // ── Action dispatch ─────────────────────────────────────────────

    pub fn handle_action(&mut self, action: Action) -> Option<Command> {
        match (self.view, action) {
            (_, Action::Quit) => {
                self.should_quit = true;
                None
            }

            // List view
            (ViewMode::List, Action::MoveDown) => {
                self.selected += 1;
                self.clamp_selection();
                None
            }
            (ViewMode::List, Action::MoveUp) => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            (ViewMode::List, Action::PageDown) => {
                self.selected += self.page();
                self.clamp_selection();
                None
            }
            (ViewMode::List, Action::PageUp) => {
                self.selected = self.selected.saturating_sub(self.page());
                None
            }
            (ViewMode::List, Action::OpenMessage) => {
                self.open_message(self.selected);
                None
            }
            (ViewMode::List, Action::NextMailbox) => {
                self.cycle_mailbox(1);
                None
            }
            (ViewMode::List, Action::PrevMailbox) => {
                self.cycle_mailbox(-1);
                None
            }
            (ViewMode::List, Action::AllMailboxes) => {
                self.current_mailbox = None;
                self.selected = 0;
                None
            }
            (ViewMode::List, Action::NewMailbox) => {
                self.status = Some("Creating mailbox\u{2026}".to_string());
                Some(Command::CreateMailbox)
            }
            (ViewMode::List, Action::Delete) => {
                let item = self.current_item()?.clone();
                self.delete_command(&item)
            }

            // Detail view
            (ViewMode::Detail, Action::Back) => {
                self.leave_detail();
                self.clamp_selection();
                None
            }
            (ViewMode::Detail, Action::SelectTab(index)) => {
                if let Some(tab) = DetailTab::from_index(index) {
                    self.select_tab(tab);
                }
                None
            }
            (ViewMode::Detail, Action::NextTab) => {
                let next = wrap(self.detail_tab.index(), 1, TABS.len());
                self.select_tab(TABS[next].tab);
                None
            }
            (ViewMode::Detail, Action::PrevTab) => {
                let prev = wrap(self.detail_tab.index(), -1, TABS.len());
                self.select_tab(TABS[prev].tab);
                None
            }
            (ViewMode::Detail, Action::MoveDown) => {
                self.move_in_detail(1);
                None
            }
            (ViewMode::Detail, Action::MoveUp) => {
                self.move_in_detail(-1);
                None
            }
            (ViewMode::Detail, Action::PageDown) => {
                self.scroll_detail(self.page() as isize);
                None
            }
            (ViewMode::Detail, Action::PageUp) => {
                self.scroll_detail(-(self.page() as isize));
                None
            }
            (ViewMode::Detail, Action::Confirm) => {
                let message = self.selected_message.as_ref()?.message.clone();
                match self.detail_tab.info().cursor {
                    Some(Cursor::Link) => {
                        let url = message.links.get(self.selected_link)?.clone();
                        let status = format!("Opening {}\u{2026}", url);
                        self.request(Command::OpenUrl(url), status)
                    }
                    Some(Cursor::Attachment) => {
                        let command = Command::SaveAttachment {
                            message,
                            index: self.selected_attachment,
                            dir: self.download_dir.clone(),
                        };
                        self.request(command, "Saving\u{2026}")
                    }
                    None => None,
                }
            }
            (ViewMode::Detail, Action::ViewHtml) => {
                let message = self.selected_message.as_ref()?.message.clone();
                self.request(Command::ViewHtml(message), "Opening HTML preview\u{2026}")
            }
            (ViewMode::Detail, Action::Delete) => {
                let item = self.selected_message.clone()?;
                self.delete_command(&item)
            }

            _ => None,
        }
    }
}

// ── View ────────────────────────────────────────────────────────────

const LIST_HINTS: &str =
    "j/k move  Enter open  Tab/[ ] mailbox  a all  n new mailbox  d delete  q quit";
const DETAIL_HINTS: &str =
    "1-5 tabs  j/k select  Enter open/save  v html  d delete  Esc back";

/// Draw the whole screen from the current state.
pub fn render(frame: &mut Frame, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let title = app.title();
    frame.render_widget(
        TopBar {
            title: &title,
            connection: app.connection,
        },
        outer[0],
    );

    match app.view {
        ViewMode::List => {
            let items = app.filtered();
            frame.render_widget(
                MessageList {
                    items: &items,
                    selected: app.selected,
                    show_mailbox: app.mailboxes.len() > 1,
                },
                outer[1],
            );
        }
        ViewMode::Detail => frame.render_widget(DetailView { app }, outer[1]),
    }

    let hints = match app.view {
        ViewMode::List => LIST_HINTS,
        ViewMode::Detail => DETAIL_HINTS,
    };
    frame.render_widget(
        BottomBar {
            hints,
            status: app.status.as_deref(),
            error: app.last_error.as_deref(),
        },
        outer[2],
    );
}

// ── Run loop ────────────────────────────────────────────────────────

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Own the terminal, start watching, and run until the user quits.
pub async fn run(mut app: App, collaborators: Collaborators) -> Result<()> {
    let (tx, mut rx) = unbounded_channel();
    let token = CancellationToken::new();
    let watcher = Watcher::new(collaborators.source.clone(), tx.clone(), token.clone());
    let dispatcher = Dispatcher::new(collaborators, watcher.clone(), tx, token);

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, &mut app, &watcher, &dispatcher, &mut rx).await;

    if tokio::time::timeout(Duration::from_secs(2), watcher.shutdown())
        .await
        .is_err()
    {
        warn!("listeners did not stop within 2s");
    }
    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}

async fn event_loop(
    terminal: &mut Term,
    app: &mut App,
    watcher: &Watcher,
    dispatcher: &Dispatcher,
    rx: &mut UnboundedReceiver<Msg>,
) -> Result<()> {
    app.viewport_height = terminal.size()?.height;
    watcher.start(&app.mailboxes);
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| render(frame, app))?;

        if app.should_quit {
            info!("quit requested");
            return Ok(());
        }

        let msg = tokio::select! {
            ev = events.next() => match ev {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => Msg::Key(key),
                Some(Ok(Event::Resize(_, height))) => Msg::Resize { height },
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            Some(msg) = rx.recv() => msg,
        };

        if let Some(command) = app.update(msg) {
            dispatcher.dispatch(command);
        }
        // Apply whatever else is already queued before the next redraw.
        while let Ok(msg) = rx.try_recv() {
            if let Some(command) = app.update(msg) {
                dispatcher.dispatch(command);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
