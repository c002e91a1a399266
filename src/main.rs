use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

mod ui;
mod utils;

use crate::ui::{ChatUI, UiAction};
use aurachat::chat::{events, payments, ChatError, ChatSession};
use aurachat::config::{self, Config};
use aurachat::credentials;
use aurachat::gemini::{CompletionBackend, GeminiClient, MagicReply};
use aurachat::models::{Message, MessageAuthor, MessageBody};
use aurachat::storage::{FileStore, KeyValueStore};

/// Delay before a contact answers the user's poll vote with its own
const CONTACT_VOTE_DELAY: Duration = Duration::from_secs(1);

/// Command line arguments for AuraChat
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "AuraChat: a terminal chat client whose contacts reply through Gemini.",
    long_about = "AuraChat is a terminal chat client. Every contact is simulated by the Gemini API.\n\n\
    The API key is read from API_KEY (or GEMINI_API_KEY). AURACHAT_DATA_DIR and\n\
    AURACHAT_MODEL stand in for --data-dir and --model.\n\
    Use -h or --help to see all options."
)]
struct Args {
    /// Directory for chat history, settings and the remembered username
    #[arg(long, value_name = "PATH", env = "AURACHAT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log file; the terminal UI owns stdout
    #[arg(long, value_name = "PATH", default_value = "aurachat.log")]
    log_file: PathBuf,

    /// Gemini model name
    #[arg(long, value_name = "NAME", env = "AURACHAT_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,

    /// Base URL of the Gemini REST API
    #[arg(long, value_name = "URL", default_value = config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Request timeout for completion calls
    #[arg(long, value_name = "N", default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

/// Results coming back from spawned tasks
enum AppEvent {
    History {
        contact_id: String,
        result: Result<Vec<Message>, String>,
    },
    MagicReady {
        contact_id: String,
        reply: MagicReply,
    },
}

enum LoopExit {
    Quit,
    Logout,
}

/// Remembered username, or one prompted from stdin
fn login(store: &dyn KeyValueStore) -> Result<String> {
    if let Some(username) = credentials::remembered_username(store) {
        info!("Using remembered username {}", username);
        return Ok(username);
    }

    loop {
        eprintln!("Enter your name to start chatting:");
        let input = utils::read_line()?;
        match credentials::normalize_username(&input) {
            Some(username) => {
                credentials::remember_username(store, &username)?;
                return Ok(username);
            }
            None => eprintln!("Name cannot be empty."),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = &args.data_dir {
        config::set_data_dir_override(dir.clone());
    }

    utils::setup_logging(Some(args.log_file.as_path()), LevelFilter::Debug)?;
    info!("AuraChat starting up");
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    info!("Logging to file: {}", args.log_file.display());

    let config = match Config::from_env() {
        Ok(config) => config
            .with_model(args.model)
            .with_base_url(args.base_url)
            .with_timeout(Duration::from_secs(args.timeout_secs)),
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("{}", e);
            return Err(e.into());
        }
    };
    info!("Using model {} with data in {}", config.model, config.data_dir.display());

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config.data_dir.clone())?);
    let backend: Arc<dyn CompletionBackend> = Arc::new(GeminiClient::new(&config)?);

    loop {
        let username = login(store.as_ref())?;
        let session = Arc::new(ChatSession::new(&username, store.clone(), backend.clone()));
        if let Err(e) = session.sweep_event_chats() {
            warn!("Initial event sweep failed: {}", e);
        }

        let mut chat_ui = ChatUI::new(&username, session.contacts(), session.theme(), session.user_status());
        if let Some(contact_id) = chat_ui.active_contact_id() {
            chat_ui.set_messages(&contact_id, session.history(&contact_id));
        }

        let mut terminal = ui::setup_terminal()?;
        let result = run_main_loop(&mut chat_ui, &mut terminal, &session).await;
        ui::restore_terminal(terminal)?;

        match result? {
            LoopExit::Quit => break,
            LoopExit::Logout => {
                session.logout()?;
                eprintln!("Logged out {}.", username);
            }
        }
    }

    info!("AuraChat shutting down");
    Ok(())
}

/// Replace the contact list, reloading messages if the selection moved
fn refresh_contacts(chat_ui: &mut ChatUI, session: &ChatSession) {
    let before = chat_ui.active_contact_id();
    chat_ui.set_contacts(session.contacts());
    let after = chat_ui.active_contact_id();
    if before != after {
        if let Some(contact_id) = after {
            chat_ui.set_messages(&contact_id, session.history(&contact_id));
        }
    }
}

fn apply_history(chat_ui: &mut ChatUI, session: &ChatSession, contact_id: &str, result: Result<Vec<Message>, ChatError>) {
    match result {
        Ok(messages) => {
            chat_ui.set_messages(contact_id, messages);
            refresh_contacts(chat_ui, session);
        }
        Err(e) => {
            warn!("Action for {} failed: {}", contact_id, e);
            chat_ui.show_notice(e.to_string());
        }
    }
}

fn handle_app_event(chat_ui: &mut ChatUI, session: &ChatSession, event: AppEvent) {
    match event {
        AppEvent::History { contact_id, result } => {
            chat_ui.set_replying(&contact_id, session.is_replying(&contact_id));
            match result {
                Ok(messages) => chat_ui.set_messages(&contact_id, messages),
                Err(e) => {
                    chat_ui.show_notice(e);
                    // Drop the optimistic echo
                    chat_ui.set_messages(&contact_id, session.history(&contact_id));
                }
            }
            refresh_contacts(chat_ui, session);
        }
        AppEvent::MagicReady { contact_id, reply } => {
            debug!("Magic reply ready for {}", contact_id);
            chat_ui.show_magic_reply(&contact_id, reply);
        }
    }
}

/// Run the main event loop
async fn run_main_loop(
    chat_ui: &mut ChatUI,
    terminal: &mut ui::Terminal<ui::CrosstermBackend<io::Stdout>>,
    session: &Arc<ChatSession>,
) -> Result<LoopExit> {
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(100);
    let mut last_sweep = Instant::now();

    loop {
        terminal.draw(|f| chat_ui.draw(f))?;

        // Auto-dismiss banners and the status viewer
        chat_ui.tick(Instant::now());

        let input_result = chat_ui.handle_input()?;

        while let Ok(event) = event_rx.try_recv() {
            handle_app_event(chat_ui, session, event);
        }

        if last_sweep.elapsed() >= events::SWEEP_INTERVAL {
            last_sweep = Instant::now();
            match session.sweep_event_chats() {
                Ok(active) => {
                    debug!("Event sweep: {} active", active.len());
                    refresh_contacts(chat_ui, session);
                }
                Err(e) => warn!("Event sweep failed: {}", e),
            }
        }

        let Some(action) = input_result else {
            continue;
        };
        debug!("UI action: {:?}", action);

        match action {
            UiAction::Quit => return Ok(LoopExit::Quit),
            UiAction::Logout => return Ok(LoopExit::Logout),
            UiAction::SelectContact(contact_id) => {
                chat_ui.set_messages(&contact_id, session.history(&contact_id));
                chat_ui.set_replying(&contact_id, session.is_replying(&contact_id));
            }
            UiAction::SendText { contact_id, text } => {
                if session.is_replying(&contact_id) {
                    chat_ui.show_notice(ChatError::ReplyInFlight(contact_id).to_string());
                    continue;
                }
                chat_ui.push_local(Message::text(MessageAuthor::User, text.clone()));
                chat_ui.set_replying(&contact_id, true);

                let session = Arc::clone(session);
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = session.send_text(&contact_id, &text).await.map_err(|e| e.to_string());
                    if tx.send(AppEvent::History { contact_id, result }).await.is_err() {
                        debug!("UI gone before reply arrived");
                    }
                });
            }
            UiAction::SendPayment { contact_id, amount, note } => {
                if session.is_replying(&contact_id) {
                    chat_ui.show_notice(ChatError::ReplyInFlight(contact_id).to_string());
                    continue;
                }
                chat_ui.push_local(Message::new(
                    MessageAuthor::User,
                    MessageBody::Payment(payments::completed_payment(&amount, &note)),
                ));
                chat_ui.set_replying(&contact_id, true);

                let session = Arc::clone(session);
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    let result = session
                        .send_payment(&contact_id, &amount, &note)
                        .await
                        .map_err(|e| e.to_string());
                    if tx.send(AppEvent::History { contact_id, result }).await.is_err() {
                        debug!("UI gone before payment was acknowledged");
                    }
                });
            }
            UiAction::CreatePoll { contact_id, question, options } => {
                let result = session.create_poll(&contact_id, &question, &options);
                apply_history(chat_ui, session, &contact_id, result);
            }
            UiAction::Vote { contact_id, message_id, option_id } => {
                let result = session.vote(&contact_id, &message_id, &option_id, MessageAuthor::User);
                let accepted = result.is_ok();
                apply_history(chat_ui, session, &contact_id, result);

                if accepted {
                    let session = Arc::clone(session);
                    let tx = event_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(CONTACT_VOTE_DELAY).await;
                        let result = session.contact_vote(&contact_id, &message_id).map_err(|e| e.to_string());
                        if tx.send(AppEvent::History { contact_id, result }).await.is_err() {
                            debug!("UI gone before contact voted");
                        }
                    });
                }
            }
            UiAction::AttachImage { contact_id, path } => {
                let result = session.send_image(&contact_id, &path);
                apply_history(chat_ui, session, &contact_id, result);
            }
            UiAction::AttachDocument { contact_id, path } => {
                let result = session.send_document(&contact_id, &path);
                apply_history(chat_ui, session, &contact_id, result);
            }
            UiAction::AttachVoice { contact_id, path, duration_secs } => {
                let result = session.send_voice(&contact_id, &path, duration_secs);
                apply_history(chat_ui, session, &contact_id, result);
            }
            UiAction::MagicReply { contact_id } => {
                chat_ui.show_notice("Reading the conversation...");
                let session = Arc::clone(session);
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    let reply = session.magic_reply(&contact_id).await;
                    if tx.send(AppEvent::MagicReady { contact_id, reply }).await.is_err() {
                        debug!("UI gone before magic reply arrived");
                    }
                });
            }
            UiAction::CreateEvent { name } => match session.create_event_chat(&name) {
                Ok(event) => {
                    refresh_contacts(chat_ui, session);
                    if chat_ui.select_contact(&event.id) {
                        chat_ui.set_messages(&event.id, session.history(&event.id));
                    }
                    chat_ui.show_notice(format!("Event chat {} open for 24 hours", event.name));
                }
                Err(e) => chat_ui.show_notice(e.to_string()),
            },
            UiAction::SetStatus { image } => match session.set_user_status(&image) {
                Ok(status) => {
                    chat_ui.set_user_status(Some(status));
                    chat_ui.show_notice("Status posted");
                }
                Err(e) => chat_ui.show_notice(e.to_string()),
            },
            UiAction::SaveTheme(settings) => {
                if let Err(e) = session.save_theme(&settings) {
                    error!("Failed to save theme: {}", e);
                    chat_ui.show_notice(e.to_string());
                }
            }
        }
    }
}
