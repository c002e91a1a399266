use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, info};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::{
    io,
    time::{Duration, Instant},
};
use textwrap::wrap;
use tui_input::{backend::crossterm::EventHandler, Input};

use aurachat::chat::{self, events, payments, polls, status, theme, ThemeMode, ThemeSettings};
use aurachat::gemini::MagicReply;
use aurachat::models::{Contact, Message, MessageAuthor, MessageBody, PaymentStatus, UserStatus};

pub use ratatui::backend::CrosstermBackend;
pub use ratatui::Terminal;

/// How long the summary banner and notices stay up
pub const BANNER_DURATION: Duration = Duration::from_secs(5);

/// What the main loop should do in response to a key press
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Quit,
    Logout,
    SelectContact(String),
    SendText { contact_id: String, text: String },
    SendPayment { contact_id: String, amount: String, note: String },
    CreatePoll { contact_id: String, question: String, options: Vec<String> },
    Vote { contact_id: String, message_id: String, option_id: String },
    AttachImage { contact_id: String, path: PathBuf },
    AttachDocument { contact_id: String, path: PathBuf },
    AttachVoice { contact_id: String, path: PathBuf, duration_secs: u32 },
    MagicReply { contact_id: String },
    CreateEvent { name: String },
    SetStatus { image: String },
    SaveTheme(ThemeSettings),
}

/// Slash commands typed into the composer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Image(PathBuf),
    Document(PathBuf),
    Voice(PathBuf, u32),
    Vote(usize),
    Status(String),
    Color(String),
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let mut parts = input.trim().splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    let require = |what: &str| {
        if rest.is_empty() {
            Err(format!("Usage: {} {}", name, what))
        } else {
            Ok(rest.to_string())
        }
    };

    match name {
        "/image" => require("PATH").map(|p| Command::Image(PathBuf::from(p))),
        "/doc" => require("PATH").map(|p| Command::Document(PathBuf::from(p))),
        "/voice" => {
            let usage = || "Usage: /voice PATH SECONDS".to_string();
            let (path, secs) = rest.rsplit_once(char::is_whitespace).ok_or_else(usage)?;
            let secs: u32 = secs.parse().map_err(|_| usage())?;
            if path.trim().is_empty() {
                return Err(usage());
            }
            Ok(Command::Voice(PathBuf::from(path.trim()), secs))
        }
        "/vote" => {
            let n: usize = rest.parse().map_err(|_| "Usage: /vote N".to_string())?;
            if n == 0 {
                return Err("Options are numbered from 1".to_string());
            }
            Ok(Command::Vote(n))
        }
        "/status" => require("IMAGE").map(Command::Status),
        "/color" => require("#RRGGBB").map(Command::Color),
        _ => Err(format!("Unknown command {}", name)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Sidebar,
    Composer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarTab {
    Chats,
    Status,
}

struct PaymentDialog {
    amount: Input,
    note: Input,
    field: usize,
}

struct PollDialog {
    question: Input,
    options: Vec<Input>,
    // 0 is the question, 1.. the options
    field: usize,
}

struct EventDialog {
    input: Input,
}

struct ThemePanel {
    row: usize,
}

struct HelpDialog {}

struct StatusViewer {
    name: String,
    image: String,
    posted: String,
    opened_at: Instant,
}

struct Banner {
    text: String,
    shown_at: Instant,
}

pub struct ChatUI {
    username: String,
    pub contacts: Vec<Contact>,
    current_contact_index: usize,
    status_index: usize,
    pub messages: Vec<Message>,
    input: Input,
    focus: Focus,
    sidebar_tab: SidebarTab,
    theme: ThemeSettings,
    user_status: Option<UserStatus>,
    replying: HashSet<String>,
    // Contacts opened this session; their unread badge stays cleared
    seen: HashSet<String>,
    suggestions: Vec<String>,
    summary: Option<Banner>,
    notice: Option<Banner>,
    payment_dialog: Option<PaymentDialog>,
    poll_dialog: Option<PollDialog>,
    event_dialog: Option<EventDialog>,
    theme_panel: Option<ThemePanel>,
    help_dialog: Option<HelpDialog>,
    status_viewer: Option<StatusViewer>,
}

impl ChatUI {
    pub fn new(username: &str, contacts: Vec<Contact>, theme: ThemeSettings, user_status: Option<UserStatus>) -> Self {
        let seen = contacts.first().map(|c| c.id.clone()).into_iter().collect();
        let mut contacts = contacts;
        if let Some(first) = contacts.first_mut() {
            first.unread_count = 0;
        }
        ChatUI {
            username: username.to_string(),
            contacts,
            current_contact_index: 0,
            status_index: 0,
            messages: Vec::new(),
            input: Input::default(),
            focus: Focus::Composer,
            sidebar_tab: SidebarTab::Chats,
            theme,
            user_status,
            replying: HashSet::new(),
            seen,
            suggestions: Vec::new(),
            summary: None,
            notice: None,
            payment_dialog: None,
            poll_dialog: None,
            event_dialog: None,
            theme_panel: None,
            help_dialog: None,
            status_viewer: None,
        }
    }

    pub fn active_contact(&self) -> Option<&Contact> {
        self.contacts.get(self.current_contact_index)
    }

    pub fn active_contact_id(&self) -> Option<String> {
        self.active_contact().map(|c| c.id.clone())
    }

    /// Replace the contact list, keeping the current selection when it survives
    pub fn set_contacts(&mut self, contacts: Vec<Contact>) {
        let selected = self.active_contact_id();
        self.contacts = contacts;
        let seen = &self.seen;
        for contact in self.contacts.iter_mut() {
            if seen.contains(&contact.id) {
                contact.unread_count = 0;
            }
        }
        self.current_contact_index = selected
            .and_then(|id| self.contacts.iter().position(|c| c.id == id))
            .unwrap_or(0);
        self.status_index = self.status_index.min(self.status_entries().len().saturating_sub(1));
    }

    pub fn select_contact(&mut self, contact_id: &str) -> bool {
        match self.contacts.iter().position(|c| c.id == contact_id) {
            Some(index) => {
                self.current_contact_index = index;
                self.contacts[index].unread_count = 0;
                self.seen.insert(contact_id.to_string());
                self.suggestions.clear();
                self.summary = None;
                true
            }
            None => false,
        }
    }

    /// Show `messages` if they belong to the selected contact
    pub fn set_messages(&mut self, contact_id: &str, messages: Vec<Message>) {
        if self.active_contact_id().as_deref() == Some(contact_id) {
            self.messages = messages;
        }
    }

    /// Show a message before the session has stored it
    pub fn push_local(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn set_replying(&mut self, contact_id: &str, replying: bool) {
        if replying {
            self.replying.insert(contact_id.to_string());
        } else {
            self.replying.remove(contact_id);
        }
    }

    pub fn is_replying(&self, contact_id: &str) -> bool {
        self.replying.contains(contact_id)
    }

    pub fn show_magic_reply(&mut self, contact_id: &str, reply: MagicReply) {
        if self.active_contact_id().as_deref() != Some(contact_id) {
            return;
        }
        self.summary = Some(Banner {
            text: reply.summary,
            shown_at: Instant::now(),
        });
        self.suggestions = reply.suggestions;
    }

    pub fn show_notice(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("UI notice: {}", text);
        self.notice = Some(Banner {
            text,
            shown_at: Instant::now(),
        });
    }

    pub fn set_user_status(&mut self, status: Option<UserStatus>) {
        self.user_status = status;
    }

    /// Dismiss banners and the status viewer once their time is up
    pub fn tick(&mut self, now: Instant) {
        if matches!(&self.summary, Some(b) if now.duration_since(b.shown_at) >= BANNER_DURATION) {
            self.summary = None;
        }
        if matches!(&self.notice, Some(b) if now.duration_since(b.shown_at) >= BANNER_DURATION) {
            self.notice = None;
        }
        if matches!(&self.status_viewer, Some(v) if now.duration_since(v.opened_at) >= status::STATUS_VIEW_DURATION) {
            debug!("UI: Auto-closing status viewer");
            self.status_viewer = None;
        }
    }

    /// `My status` first, then every contact with a status
    fn status_entries(&self) -> Vec<(String, Option<UserStatus>)> {
        let mut entries = vec![("My status".to_string(), self.user_status.clone())];
        entries.extend(
            self.contacts
                .iter()
                .filter(|c| c.status.is_some())
                .map(|c| (c.name.clone(), c.status.clone())),
        );
        entries
    }

    pub fn handle_input(&mut self) -> Result<Option<UiAction>> {
        if event::poll(Duration::from_millis(10))? {
            if let Event::Key(key) = event::read()? {
                return Ok(self.handle_key(key));
            }
        }
        Ok(None)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<UiAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        // Any key closes the status viewer and the help dialog
        if self.status_viewer.is_some() {
            self.status_viewer = None;
            return None;
        }
        if self.help_dialog.is_some() {
            self.help_dialog = None;
            return None;
        }
        if self.payment_dialog.is_some() {
            return self.handle_payment_key(key);
        }
        if self.poll_dialog.is_some() {
            return self.handle_poll_key(key);
        }
        if self.event_dialog.is_some() {
            return self.handle_event_key(key);
        }
        if self.theme_panel.is_some() {
            return self.handle_theme_key(key);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Some(UiAction::Quit),
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Sidebar => Focus::Composer,
                    Focus::Composer => Focus::Sidebar,
                };
            }
            KeyCode::Char('s') if ctrl => {
                self.sidebar_tab = match self.sidebar_tab {
                    SidebarTab::Chats => SidebarTab::Status,
                    SidebarTab::Status => SidebarTab::Chats,
                };
            }
            KeyCode::Char('g') if ctrl => {
                let contact_id = self.active_contact_id()?;
                return Some(UiAction::MagicReply { contact_id });
            }
            KeyCode::Char('p') if ctrl => {
                if self.active_contact().is_some() {
                    self.payment_dialog = Some(PaymentDialog {
                        amount: Input::default(),
                        note: Input::default(),
                        field: 0,
                    });
                }
            }
            KeyCode::Char('o') if ctrl => {
                if self.active_contact().is_some() {
                    self.poll_dialog = Some(PollDialog {
                        question: Input::default(),
                        options: vec![Input::default(), Input::default()],
                        field: 0,
                    });
                }
            }
            KeyCode::Char('e') if ctrl => {
                self.event_dialog = Some(EventDialog { input: Input::default() });
            }
            KeyCode::Char('t') if ctrl => {
                self.theme_panel = Some(ThemePanel { row: 0 });
            }
            KeyCode::Char('l') if ctrl => return Some(UiAction::Logout),
            KeyCode::Char('h') | KeyCode::Char('H') if ctrl => {
                self.help_dialog = Some(HelpDialog {});
            }
            KeyCode::F(n) if (1..=3).contains(&n) => {
                let text = self.suggestions.get(n as usize - 1)?.clone();
                let contact_id = self.active_contact_id()?;
                self.suggestions.clear();
                return Some(UiAction::SendText { contact_id, text });
            }
            KeyCode::Up if self.focus == Focus::Sidebar => return self.move_selection(-1),
            KeyCode::Down if self.focus == Focus::Sidebar => return self.move_selection(1),
            KeyCode::Enter => match (self.focus, self.sidebar_tab) {
                (Focus::Sidebar, SidebarTab::Status) => self.open_status_viewer(),
                (Focus::Sidebar, SidebarTab::Chats) => self.focus = Focus::Composer,
                (Focus::Composer, _) => return self.submit_composer(),
            },
            _ => {
                if self.focus == Focus::Composer {
                    self.input.handle_event(&Event::Key(key));
                }
            }
        }
        None
    }

    fn move_selection(&mut self, delta: isize) -> Option<UiAction> {
        match self.sidebar_tab {
            SidebarTab::Chats => {
                if self.contacts.is_empty() {
                    return None;
                }
                let len = self.contacts.len() as isize;
                let next = (self.current_contact_index as isize + delta).rem_euclid(len) as usize;
                let id = self.contacts[next].id.clone();
                if next != self.current_contact_index && self.select_contact(&id) {
                    return Some(UiAction::SelectContact(id));
                }
                None
            }
            SidebarTab::Status => {
                let len = self.status_entries().len() as isize;
                self.status_index = (self.status_index as isize + delta).rem_euclid(len) as usize;
                None
            }
        }
    }

    fn open_status_viewer(&mut self) {
        let entries = self.status_entries();
        let Some((name, status)) = entries.get(self.status_index) else {
            return;
        };
        match status {
            Some(status) => {
                self.status_viewer = Some(StatusViewer {
                    name: name.clone(),
                    image: status.image.clone(),
                    posted: status::posted_ago(status.timestamp, chrono::Utc::now()),
                    opened_at: Instant::now(),
                });
            }
            None => self.show_notice("No status yet. Post one with /status IMAGE"),
        }
    }

    fn submit_composer(&mut self) -> Option<UiAction> {
        let raw = self.input.value().trim().to_string();
        if raw.is_empty() {
            return None;
        }
        let contact_id = self.active_contact_id()?;
        self.input = Input::default();

        if raw.starts_with('/') {
            return match parse_command(&raw) {
                Ok(command) => self.run_command(contact_id, command),
                Err(message) => {
                    self.show_notice(message);
                    None
                }
            };
        }

        self.suggestions.clear();
        Some(UiAction::SendText { contact_id, text: raw })
    }

    fn run_command(&mut self, contact_id: String, command: Command) -> Option<UiAction> {
        match command {
            Command::Image(path) => Some(UiAction::AttachImage { contact_id, path }),
            Command::Document(path) => Some(UiAction::AttachDocument { contact_id, path }),
            Command::Voice(path, duration_secs) => Some(UiAction::AttachVoice { contact_id, path, duration_secs }),
            Command::Status(image) => Some(UiAction::SetStatus { image }),
            Command::Color(color) => {
                if self.theme.set_custom_color(&color) {
                    Some(UiAction::SaveTheme(self.theme.clone()))
                } else {
                    self.show_notice("Colours are written as #RRGGBB");
                    None
                }
            }
            Command::Vote(n) => {
                let Some((message, poll)) = chat::latest_poll(&self.messages) else {
                    self.show_notice("There is no poll in this chat");
                    return None;
                };
                if poll.has_voted(MessageAuthor::User) {
                    self.show_notice("You already voted on this poll");
                    return None;
                }
                match poll.options.get(n - 1) {
                    Some(option) => Some(UiAction::Vote {
                        contact_id,
                        message_id: message.id.clone(),
                        option_id: option.id.clone(),
                    }),
                    None => {
                        let count = poll.options.len();
                        self.show_notice(format!("Pick an option between 1 and {}", count));
                        None
                    }
                }
            }
        }
    }

    fn handle_payment_key(&mut self, key: KeyEvent) -> Option<UiAction> {
        let dialog = self.payment_dialog.as_mut()?;
        match key.code {
            KeyCode::Esc => self.payment_dialog = None,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => dialog.field = 1 - dialog.field,
            KeyCode::Enter => {
                let amount = dialog.amount.value().trim().to_string();
                let note = dialog.note.value().trim().to_string();
                if payments::parse_amount(&amount).is_none() {
                    self.show_notice("Enter an amount greater than zero");
                    return None;
                }
                self.payment_dialog = None;
                let contact_id = self.active_contact_id()?;
                return Some(UiAction::SendPayment { contact_id, amount, note });
            }
            _ => {
                let input = if dialog.field == 0 { &mut dialog.amount } else { &mut dialog.note };
                input.handle_event(&Event::Key(key));
            }
        }
        None
    }

    fn handle_poll_key(&mut self, key: KeyEvent) -> Option<UiAction> {
        let dialog = self.poll_dialog.as_mut()?;
        let fields = dialog.options.len() + 1;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.poll_dialog = None,
            KeyCode::Tab | KeyCode::Down => dialog.field = (dialog.field + 1) % fields,
            KeyCode::BackTab | KeyCode::Up => dialog.field = (dialog.field + fields - 1) % fields,
            KeyCode::Char('n') if ctrl => {
                if dialog.options.len() < polls::MAX_POLL_OPTIONS {
                    dialog.options.push(Input::default());
                    dialog.field = dialog.options.len();
                }
            }
            KeyCode::Char('d') if ctrl => {
                if dialog.field > 0 && dialog.options.len() > polls::MIN_POLL_OPTIONS {
                    dialog.options.remove(dialog.field - 1);
                    dialog.field = dialog.field.min(dialog.options.len());
                }
            }
            KeyCode::Enter => {
                let question = dialog.question.value().to_string();
                let options: Vec<String> = dialog.options.iter().map(|o| o.value().to_string()).collect();
                let Some((question, options)) = polls::validate_poll(&question, &options) else {
                    self.show_notice("A poll needs a question and at least 2 options");
                    return None;
                };
                self.poll_dialog = None;
                let contact_id = self.active_contact_id()?;
                return Some(UiAction::CreatePoll { contact_id, question, options });
            }
            _ => {
                let input = match dialog.field {
                    0 => &mut dialog.question,
                    n => &mut dialog.options[n - 1],
                };
                input.handle_event(&Event::Key(key));
            }
        }
        None
    }

    fn handle_event_key(&mut self, key: KeyEvent) -> Option<UiAction> {
        let dialog = self.event_dialog.as_mut()?;
        match key.code {
            KeyCode::Esc => self.event_dialog = None,
            KeyCode::Enter => {
                let name = dialog.input.value().trim().to_string();
                if !name.is_empty() {
                    self.event_dialog = None;
                    return Some(UiAction::CreateEvent { name });
                }
            }
            _ => {
                dialog.input.handle_event(&Event::Key(key));
            }
        }
        None
    }

    fn handle_theme_key(&mut self, key: KeyEvent) -> Option<UiAction> {
        let panel = self.theme_panel.as_mut()?;
        match key.code {
            KeyCode::Esc => {
                self.theme_panel = None;
                None
            }
            KeyCode::Up => {
                panel.row = (panel.row + THEME_ROWS - 1) % THEME_ROWS;
                None
            }
            KeyCode::Down | KeyCode::Tab => {
                panel.row = (panel.row + 1) % THEME_ROWS;
                None
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Enter | KeyCode::Char(' ') => {
                match panel.row {
                    0 => self.theme.mode = self.theme.mode.toggled(),
                    1 => self.theme.cycle_palette(),
                    2 => self.theme.cycle_font(),
                    _ => self.theme.cycle_background(),
                }
                Some(UiAction::SaveTheme(self.theme.clone()))
            }
            _ => None,
        }
    }

    pub fn draw<B: Backend>(&self, frame: &mut Frame<B>) {
        let size = frame.size();
        let palette = Palette::from_theme(&self.theme);

        frame.render_widget(Block::default().style(palette.base), size);

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(25), // Sidebar
                Constraint::Percentage(75), // Chat panel
            ])
            .split(size);

        let chat_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Messages area
                Constraint::Length(1), // Typing indicator / suggestions
                Constraint::Length(3), // Input box
                Constraint::Length(1), // Help line
            ])
            .split(chunks[1]);

        self.draw_sidebar(frame, chunks[0], &palette);
        draw_messages(frame, chat_chunks[0], self, &palette);

        if let Some(summary) = &self.summary {
            draw_summary_banner(frame, &summary.text, chat_chunks[0], &palette);
        }

        frame.render_widget(Paragraph::new(self.activity_line(&palette)), chat_chunks[1]);

        let input_block = Block::default()
            .title("Message (/image /doc /voice /vote /status /color)")
            .borders(Borders::ALL)
            .border_style(if self.focus == Focus::Composer {
                Style::default().fg(palette.primary)
            } else {
                Style::default()
            });
        frame.render_widget(Paragraph::new(self.input.value()).block(input_block), chat_chunks[2]);

        let help = match &self.notice {
            Some(notice) => Paragraph::new(Line::from(Span::styled(
                notice.text.as_str(),
                Style::default().fg(Color::Yellow),
            ))),
            None => Paragraph::new(Line::from(Span::styled(
                "ESC quit | TAB focus | Ctrl+S chats/status | Ctrl+G magic | Ctrl+P pay | Ctrl+O poll | Ctrl+E event | Ctrl+T theme | Ctrl+H help",
                Style::default().fg(Color::Gray),
            ))),
        };
        frame.render_widget(help, chat_chunks[3]);

        let has_dialog = self.payment_dialog.is_some()
            || self.poll_dialog.is_some()
            || self.event_dialog.is_some()
            || self.theme_panel.is_some()
            || self.help_dialog.is_some()
            || self.status_viewer.is_some();
        if self.focus == Focus::Composer && !has_dialog {
            frame.set_cursor(chat_chunks[2].x + self.input.cursor() as u16 + 1, chat_chunks[2].y + 1);
        }

        if let Some(dialog) = &self.payment_dialog {
            let name = self.active_contact().map(|c| c.name.as_str()).unwrap_or_default();
            draw_payment_dialog(frame, dialog, name, size, &palette);
        }
        if let Some(dialog) = &self.poll_dialog {
            draw_poll_dialog(frame, dialog, size, &palette);
        }
        if let Some(dialog) = &self.event_dialog {
            draw_event_dialog(frame, dialog, size, &palette);
        }
        if let Some(panel) = &self.theme_panel {
            draw_theme_panel(frame, panel, &self.theme, size, &palette);
        }
        if self.help_dialog.is_some() {
            draw_help_dialog(frame, size);
        }
        if let Some(viewer) = &self.status_viewer {
            draw_status_viewer(frame, viewer, size);
        }
    }

    fn draw_sidebar<B: Backend>(&self, frame: &mut Frame<B>, area: Rect, palette: &Palette) {
        let now = events::now_ms();
        let (title, items, selected) = match self.sidebar_tab {
            SidebarTab::Chats => {
                let items: Vec<ListItem> = self
                    .contacts
                    .iter()
                    .map(|c| {
                        let marker = if c.is_event { "# " } else { "" };
                        let unread = if c.unread_count > 0 { format!(" ({})", c.unread_count) } else { String::new() };
                        let preview = match (c.is_event, c.expiry) {
                            (true, Some(expiry)) => events::format_time_left(expiry, now),
                            _ => format!("{} · {}", c.last_message_time, c.last_message),
                        };
                        ListItem::new(vec![
                            Line::from(Span::styled(
                                format!("{}{}{}", marker, c.name, unread),
                                Style::default().add_modifier(Modifier::BOLD),
                            )),
                            Line::from(Span::styled(preview, Style::default().fg(Color::Gray))),
                        ])
                    })
                    .collect();
                ("[Chats] Status", items, self.current_contact_index)
            }
            SidebarTab::Status => {
                let items: Vec<ListItem> = self
                    .status_entries()
                    .into_iter()
                    .map(|(name, status)| {
                        let posted = match status {
                            Some(s) => status::posted_ago(s.timestamp, chrono::Utc::now()),
                            None => "No status yet".to_string(),
                        };
                        ListItem::new(vec![
                            Line::from(Span::styled(name, Style::default().add_modifier(Modifier::BOLD))),
                            Line::from(Span::styled(posted, Style::default().fg(Color::Gray))),
                        ])
                    })
                    .collect();
                ("Chats [Status]", items, self.status_index)
            }
        };

        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(selected));
        }
        let list = List::new(items)
            .block(
                Block::default()
                    .title(format!("{} · {}", title, self.username))
                    .borders(Borders::ALL)
                    .border_style(if self.focus == Focus::Sidebar {
                        Style::default().fg(palette.primary)
                    } else {
                        Style::default()
                    }),
            )
            .highlight_style(Style::default().fg(palette.primary))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn activity_line(&self, palette: &Palette) -> Line<'_> {
        let Some(contact) = self.active_contact() else {
            return Line::from("");
        };
        if self.is_replying(&contact.id) {
            return Line::from(Span::styled(
                format!("{} is typing...", contact.name),
                Style::default().fg(palette.primary).add_modifier(Modifier::ITALIC),
            ));
        }
        if !self.suggestions.is_empty() {
            let spans: Vec<Span> = self
                .suggestions
                .iter()
                .enumerate()
                .flat_map(|(i, s)| {
                    vec![
                        Span::styled(format!(" F{} ", i + 1), Style::default().fg(palette.primary)),
                        Span::raw(format!("{}  ", s)),
                    ]
                })
                .collect();
            return Line::from(spans);
        }
        Line::from("")
    }
}

const THEME_ROWS: usize = 4;

/// Colours derived from the theme settings
struct Palette {
    base: Style,
    primary: Color,
    chat_bg: Option<Color>,
}

impl Palette {
    fn from_theme(settings: &ThemeSettings) -> Self {
        let primary = theme::parse_hex_color(settings.primary_color())
            .map(|(r, g, b)| Color::Rgb(r, g, b))
            .unwrap_or(Color::Green);
        let base = match settings.mode {
            ThemeMode::Dark => Style::default().fg(Color::White).bg(Color::Black),
            ThemeMode::Light => Style::default().fg(Color::Black).bg(Color::White),
        };
        let chat_bg = match (settings.chat_background.as_str(), settings.mode) {
            ("Doodles", ThemeMode::Dark) => Some(Color::Rgb(24, 28, 38)),
            ("Doodles", ThemeMode::Light) => Some(Color::Rgb(240, 236, 228)),
            ("Polka", ThemeMode::Dark) => Some(Color::Rgb(34, 24, 34)),
            ("Polka", ThemeMode::Light) => Some(Color::Rgb(250, 236, 244)),
            ("Geometry", ThemeMode::Dark) => Some(Color::Rgb(20, 34, 30)),
            ("Geometry", ThemeMode::Light) => Some(Color::Rgb(230, 244, 238)),
            _ => None,
        };
        Palette { base, primary, chat_bg }
    }
}

/// Display lines for one message, before wrapping
pub fn message_lines(message: &Message, contact_name: &str) -> Vec<String> {
    let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    let who = if message.is_from_user() { "You" } else { contact_name };
    let prefix = format!("[{}] {}: ", time, who);

    match &message.body {
        MessageBody::Text { text } => vec![format!("{}{}", prefix, text)],
        MessageBody::Image { data_url } => {
            vec![format!("{}📷 Photo ({} KB)", prefix, data_url.len() * 3 / 4 / 1024)]
        }
        MessageBody::Document { file_name } => vec![format!("{}📄 {}", prefix, file_name)],
        MessageBody::Voice { .. } => vec![format!("{}{}", prefix, message.content())],
        MessageBody::Payment(payment) => {
            let status = match payment.status {
                PaymentStatus::Completed => "✓ Completed",
                PaymentStatus::Pending => "… Pending",
                PaymentStatus::Failed => "✗ Failed",
            };
            let mut lines = vec![format!("{}₹{} paid · {}", prefix, payment.amount, status)];
            if !payment.note.is_empty() {
                lines.push(format!("    \"{}\"", payment.note));
            }
            lines.push(format!("    Txn {}", payment.transaction_id));
            lines
        }
        MessageBody::Poll(poll) => {
            let mut lines = vec![format!("{}📊 {}", prefix, poll.question)];
            for (i, option) in poll.options.iter().enumerate() {
                let pct = poll.percentage(option);
                let bar = "█".repeat((pct / 10) as usize);
                lines.push(format!("    {}. {} {} {}% ({})", i + 1, option.text, bar, pct, option.votes));
            }
            let footer = if poll.has_voted(MessageAuthor::User) {
                "    You voted".to_string()
            } else {
                "    Vote with /vote N".to_string()
            };
            lines.push(footer);
            lines
        }
    }
}

fn draw_messages<B: Backend>(f: &mut Frame<B>, area: Rect, ui: &ChatUI, palette: &Palette) {
    let wrap_width = area.width.saturating_sub(2).max(1) as usize; // Account for borders
    let contact = ui.active_contact();
    let contact_name = contact.map(|c| c.name.as_str()).unwrap_or("Contact");

    let items: Vec<ListItem> = ui
        .messages
        .iter()
        .flat_map(|m| {
            let style = if m.is_from_user() {
                Style::default().fg(palette.primary)
            } else {
                Style::default()
            };
            message_lines(m, contact_name)
                .into_iter()
                .flat_map(|line| {
                    wrap(&line, wrap_width)
                        .into_iter()
                        .map(|l| l.into_owned())
                        .collect::<Vec<_>>()
                })
                .map(move |line| ListItem::new(Text::from(line)).style(style))
                .collect::<Vec<_>>()
        })
        .collect();

    let title = match contact {
        Some(c) if c.is_event => format!(
            "{} · {}",
            c.name,
            c.expiry.map(|e| events::format_time_left(e, events::now_ms())).unwrap_or_default()
        ),
        Some(c) => c.name.clone(),
        None => "No chat selected".to_string(),
    };

    let mut list_state = ListState::default();
    if !items.is_empty() {
        list_state.select(Some(items.len() - 1));
    }

    let mut block = Block::default().borders(Borders::ALL).title(title);
    if let Some(bg) = palette.chat_bg {
        block = block.style(Style::default().bg(bg));
    }
    let list = List::new(items).block(block).highlight_style(Style::default());
    f.render_stateful_widget(list, area, &mut list_state);
}

/// Centered rectangle clamped to `area`
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(4)).max(1);
    let height = height.min(area.height.saturating_sub(2)).max(1);
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn popup<B: Backend>(f: &mut Frame<B>, title: &str, width: u16, height: u16, area: Rect, color: Color) -> Rect {
    let popup_area = centered_rect(width, height, area);
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));
    f.render_widget(Clear, popup_area);
    f.render_widget(block, popup_area);
    popup_area.inner(&Margin {
        vertical: 1,
        horizontal: 2,
    })
}

fn draw_input_field<B: Backend>(f: &mut Frame<B>, label: &str, input: &Input, active: bool, area: Rect, palette: &Palette) {
    let block = Block::default()
        .title(label.to_string())
        .borders(Borders::ALL)
        .border_style(if active { Style::default().fg(palette.primary) } else { Style::default() });
    f.render_widget(Paragraph::new(input.value()).block(block), area);
    if active {
        f.set_cursor(area.x + input.cursor() as u16 + 1, area.y + 1);
    }
}

fn draw_summary_banner<B: Backend>(f: &mut Frame<B>, summary: &str, area: Rect, palette: &Palette) {
    let banner_area = Rect::new(
        area.x + 1,
        area.y + 1,
        area.width.saturating_sub(2),
        3.min(area.height.saturating_sub(2)),
    );
    let banner = Paragraph::new(summary.to_string())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("✨ Summary")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.primary)),
        );
    f.render_widget(Clear, banner_area);
    f.render_widget(banner, banner_area);
}

fn draw_payment_dialog<B: Backend>(f: &mut Frame<B>, dialog: &PaymentDialog, name: &str, area: Rect, palette: &Palette) {
    let inner = popup(f, &format!("Pay {}", name), 50, 11, area, palette.primary);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Length(1)])
        .split(inner);
    draw_input_field(f, "Amount (₹)", &dialog.amount, dialog.field == 0, chunks[0], palette);
    draw_input_field(f, "Note", &dialog.note, dialog.field == 1, chunks[1], palette);
    f.render_widget(
        Paragraph::new("Enter pay | Tab switch | Esc cancel").style(Style::default().fg(Color::Gray)),
        chunks[2],
    );
}

fn draw_poll_dialog<B: Backend>(f: &mut Frame<B>, dialog: &PollDialog, area: Rect, palette: &Palette) {
    let height = 3 * (dialog.options.len() as u16 + 1) + 3;
    let inner = popup(f, "Create Poll", 60, height, area, palette.primary);

    let mut constraints = vec![Constraint::Length(3); dialog.options.len() + 1];
    constraints.push(Constraint::Length(1));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    draw_input_field(f, "Question", &dialog.question, dialog.field == 0, chunks[0], palette);
    for (i, option) in dialog.options.iter().enumerate() {
        let label = format!("Option {}", i + 1);
        draw_input_field(f, &label, option, dialog.field == i + 1, chunks[i + 1], palette);
    }
    f.render_widget(
        Paragraph::new("Enter create | Ctrl+N add | Ctrl+D remove | Esc cancel").style(Style::default().fg(Color::Gray)),
        chunks[dialog.options.len() + 1],
    );
}

fn draw_event_dialog<B: Backend>(f: &mut Frame<B>, dialog: &EventDialog, area: Rect, palette: &Palette) {
    let inner = popup(f, "New Event Chat (24h)", 50, 7, area, palette.primary);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(1)])
        .split(inner);
    draw_input_field(f, "Event name", &dialog.input, true, chunks[0], palette);
    f.render_widget(
        Paragraph::new("Enter create | Esc cancel").style(Style::default().fg(Color::Gray)),
        chunks[1],
    );
}

fn draw_theme_panel<B: Backend>(f: &mut Frame<B>, panel: &ThemePanel, settings: &ThemeSettings, area: Rect, palette: &Palette) {
    let inner = popup(f, "Theme", 50, 10, area, palette.primary);
    let mode = match settings.mode {
        ThemeMode::Dark => "Dark",
        ThemeMode::Light => "Light",
    };
    let palette_label = if settings.is_custom() {
        format!("Custom {}", settings.custom_primary_color)
    } else {
        settings.theme_name.clone()
    };
    let rows = [
        ("Mode", mode.to_string()),
        ("Palette", palette_label),
        ("Font", settings.font_family.clone()),
        ("Background", settings.chat_background.clone()),
    ];

    let mut items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let marker = if i == panel.row { "> " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{}{:<12}", marker, label)),
                Span::styled(value.clone(), Style::default().fg(palette.primary)),
            ]))
        })
        .collect();
    items.push(ListItem::new(""));
    items.push(ListItem::new(Span::styled(
        "←/→ change | /color #RRGGBB custom | Esc close",
        Style::default().fg(Color::Gray),
    )));
    f.render_widget(List::new(items), inner);
}

fn draw_help_dialog<B: Backend>(f: &mut Frame<B>, area: Rect) {
    let inner = popup(f, "Keyboard Shortcuts", 72, 30, area, Color::Cyan);

    let shortcuts = vec![
        ("General", ""),
        ("ESC", "Quit application"),
        ("Tab", "Switch focus between sidebar and composer"),
        ("Ctrl+S", "Toggle Chats / Status"),
        ("↑/↓", "Navigate the sidebar"),
        ("Ctrl+L", "Log out"),
        ("", ""),
        ("Messages", ""),
        ("Enter", "Send message, or open a status in the Status tab"),
        ("Ctrl+G", "Magic reply: summary and suggestions"),
        ("F1-F3", "Send a suggestion"),
        ("Ctrl+P", "Send a payment"),
        ("Ctrl+O", "Create a poll"),
        ("Ctrl+E", "New event chat"),
        ("Ctrl+T", "Theme settings"),
        ("", ""),
        ("Commands", ""),
        ("/image", "PATH        attach a photo"),
        ("/doc", "PATH          attach a document"),
        ("/voice", "PATH SECS   attach a voice note"),
        ("/vote", "N            vote on the latest poll"),
        ("/status", "IMAGE     post your status"),
        ("/color", "#RRGGBB     custom theme colour"),
        ("", ""),
        ("Press any key to close this dialog", ""),
    ];

    let items: Vec<ListItem> = shortcuts
        .iter()
        .map(|(key, desc)| {
            if desc.is_empty() {
                if key.is_empty() {
                    ListItem::new("")
                } else {
                    ListItem::new(Text::styled(
                        key.to_string(),
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ))
                }
            } else {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<10}", key), Style::default().fg(Color::Green)),
                    Span::raw(desc.to_string()),
                ]))
            }
        })
        .collect();
    f.render_widget(List::new(items), inner);
}

fn draw_status_viewer<B: Backend>(f: &mut Frame<B>, viewer: &StatusViewer, area: Rect) {
    let inner = popup(f, &format!("{} · {}", viewer.name, viewer.posted), 70, 9, area, Color::White);
    let elapsed = viewer.opened_at.elapsed().as_millis() as f64;
    let progress = (elapsed / status::STATUS_VIEW_DURATION.as_millis() as f64).min(1.0);
    let bar_width = (inner.width as f64 * progress) as usize;

    let lines = vec![
        Line::from(Span::raw("━".repeat(bar_width))),
        Line::from(""),
        Line::from(Span::styled(viewer.image.clone(), Style::default().add_modifier(Modifier::UNDERLINED))),
        Line::from(""),
        Line::from(Span::styled("Any key closes", Style::default().fg(Color::Gray))),
    ];
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

pub fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurachat::chat::contacts::predefined_contacts;
    use aurachat::models::PollDetails;
    use ratatui::backend::TestBackend;

    fn ui() -> ChatUI {
        ChatUI::new("asha", predefined_contacts(), ThemeSettings::default(), None)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(ui: &mut ChatUI, text: &str) {
        for c in text.chars() {
            ui.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn render(ui: &ChatUI) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| ui.draw(f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol.as_str())
            .collect()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/image ~/pics/cat.png"), Ok(Command::Image(PathBuf::from("~/pics/cat.png"))));
        assert_eq!(parse_command("/doc report.pdf"), Ok(Command::Document(PathBuf::from("report.pdf"))));
        assert_eq!(
            parse_command("/voice my note.ogg 12"),
            Ok(Command::Voice(PathBuf::from("my note.ogg"), 12))
        );
        assert_eq!(parse_command("/vote 2"), Ok(Command::Vote(2)));
        assert_eq!(parse_command("/color #ff0000"), Ok(Command::Color("#ff0000".to_string())));
        assert!(parse_command("/vote zero").is_err());
        assert!(parse_command("/vote 0").is_err());
        assert!(parse_command("/voice note.ogg").is_err());
        assert!(parse_command("/image").is_err());
        assert!(parse_command("/dance").is_err());
    }

    #[test]
    fn test_enter_sends_text() {
        let mut ui = ui();
        type_text(&mut ui, "hello there");
        let action = ui.handle_key(key(KeyCode::Enter));
        assert_eq!(
            action,
            Some(UiAction::SendText {
                contact_id: "contact-1".to_string(),
                text: "hello there".to_string()
            })
        );
        assert_eq!(ui.input.value(), "");

        // Blank input sends nothing
        type_text(&mut ui, "   ");
        assert_eq!(ui.handle_key(key(KeyCode::Enter)), None);
    }

    #[test]
    fn test_sidebar_navigation_selects_contact() {
        let mut ui = ui();
        ui.handle_key(key(KeyCode::Tab));
        assert_eq!(ui.handle_key(key(KeyCode::Down)), Some(UiAction::SelectContact("contact-2".to_string())));
        assert_eq!(ui.handle_key(key(KeyCode::Up)), Some(UiAction::SelectContact("contact-1".to_string())));
        assert_eq!(ui.handle_key(key(KeyCode::Up)), Some(UiAction::SelectContact("contact-10".to_string())));
    }

    #[test]
    fn test_payment_dialog_validates_amount() {
        let mut ui = ui();
        ui.handle_key(ctrl('p'));
        type_text(&mut ui, "0");
        assert_eq!(ui.handle_key(key(KeyCode::Enter)), None);
        assert!(ui.payment_dialog.is_some());
        assert!(ui.notice.is_some());

        ui.handle_key(key(KeyCode::Backspace));
        type_text(&mut ui, "250");
        ui.handle_key(key(KeyCode::Tab));
        type_text(&mut ui, "dinner");
        assert_eq!(
            ui.handle_key(key(KeyCode::Enter)),
            Some(UiAction::SendPayment {
                contact_id: "contact-1".to_string(),
                amount: "250".to_string(),
                note: "dinner".to_string()
            })
        );
        assert!(ui.payment_dialog.is_none());
    }

    #[test]
    fn test_poll_dialog() {
        let mut ui = ui();
        ui.handle_key(ctrl('o'));
        type_text(&mut ui, "Lunch?");
        ui.handle_key(key(KeyCode::Tab));
        type_text(&mut ui, "Pizza");
        assert_eq!(ui.handle_key(key(KeyCode::Enter)), None);

        ui.handle_key(key(KeyCode::Tab));
        type_text(&mut ui, "Dosa");
        assert_eq!(
            ui.handle_key(key(KeyCode::Enter)),
            Some(UiAction::CreatePoll {
                contact_id: "contact-1".to_string(),
                question: "Lunch?".to_string(),
                options: vec!["Pizza".to_string(), "Dosa".to_string()],
            })
        );
    }

    #[test]
    fn test_vote_command_targets_latest_poll() {
        let mut ui = ui();
        let options = vec!["Pizza".to_string(), "Dosa".to_string()];
        let poll = Message::new(MessageAuthor::User, MessageBody::Poll(PollDetails::new("Lunch?", &options)));
        let poll_id = poll.id.clone();
        ui.set_messages("contact-1", vec![poll]);

        type_text(&mut ui, "/vote 2");
        assert_eq!(
            ui.handle_key(key(KeyCode::Enter)),
            Some(UiAction::Vote {
                contact_id: "contact-1".to_string(),
                message_id: poll_id,
                option_id: "opt-1".to_string(),
            })
        );

        type_text(&mut ui, "/vote 7");
        assert_eq!(ui.handle_key(key(KeyCode::Enter)), None);
        assert!(ui.notice.is_some());
    }

    #[test]
    fn test_suggestions_and_banner() {
        let mut ui = ui();
        ui.show_magic_reply(
            "contact-1",
            MagicReply {
                summary: "You planned lunch.".to_string(),
                suggestions: vec!["Sure!".to_string(), "Maybe later".to_string()],
            },
        );
        assert!(render(&ui).contains("You planned lunch."));

        assert_eq!(ui.handle_key(key(KeyCode::F(3))), None);
        assert_eq!(
            ui.handle_key(key(KeyCode::F(2))),
            Some(UiAction::SendText {
                contact_id: "contact-1".to_string(),
                text: "Maybe later".to_string()
            })
        );
        assert!(ui.suggestions.is_empty());

        ui.tick(Instant::now() + BANNER_DURATION);
        assert!(ui.summary.is_none());
    }

    #[test]
    fn test_theme_panel_and_color_command() {
        let mut ui = ui();
        ui.handle_key(ctrl('t'));
        let action = ui.handle_key(key(KeyCode::Right));
        assert!(matches!(action, Some(UiAction::SaveTheme(ref t)) if t.mode == ThemeMode::Light));
        ui.handle_key(key(KeyCode::Esc));

        type_text(&mut ui, "/color #112233");
        let action = ui.handle_key(key(KeyCode::Enter));
        assert!(matches!(action, Some(UiAction::SaveTheme(ref t)) if t.is_custom()));
        assert_eq!(ui.theme.primary_color(), "#112233");
    }

    #[test]
    fn test_status_viewer_auto_closes() {
        let mut ui = ui();
        ui.handle_key(ctrl('s'));
        ui.handle_key(key(KeyCode::Tab));
        ui.handle_key(key(KeyCode::Down)); // Priya
        ui.handle_key(key(KeyCode::Enter));
        assert!(ui.status_viewer.is_some());
        assert!(render(&ui).contains("Priya"));

        ui.tick(Instant::now() + status::STATUS_VIEW_DURATION);
        assert!(ui.status_viewer.is_none());
    }

    #[test]
    fn test_typing_indicator_and_draw() {
        let mut ui = ui();
        ui.set_replying("contact-1", true);
        let screen = render(&ui);
        assert!(screen.contains("Priya is typing..."));
        assert!(screen.contains("Zara"));

        ui.set_replying("contact-1", false);
        assert!(!render(&ui).contains("is typing"));
    }

    #[test]
    fn test_message_lines() {
        let options = vec!["Pizza".to_string(), "Dosa".to_string()];
        let mut poll = PollDetails::new("Lunch?", &options);
        poll.vote("opt-0", MessageAuthor::User).unwrap();
        let message = Message::new(MessageAuthor::User, MessageBody::Poll(poll));

        let lines = message_lines(&message, "Priya");
        assert!(lines[0].ends_with("You: 📊 Lunch?"));
        assert!(lines[1].contains("1. Pizza"));
        assert!(lines[1].contains("100% (1)"));
        assert_eq!(lines.last().map(String::as_str), Some("    You voted"));

        let reply = Message::text(MessageAuthor::Contact, "hey");
        assert!(message_lines(&reply, "Priya")[0].ends_with("Priya: hey"));
    }
}
