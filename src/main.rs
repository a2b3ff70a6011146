use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use log::{error, info, warn, LevelFilter};
use ratatui::{backend::CrosstermBackend, Terminal};
use tui_input::backend::crossterm::EventHandler;

mod ui;
mod utils;

use parley::api::{ApiClient, ApiError};
use parley::credentials::{self, Credentials};
use parley::models::User;
use parley::sync::{ChatSession, ConnectionManager, InboxAggregator, InboxUpdate, PresenceTracker, SyncSession};
use ui::ChatUI;

/// Command line arguments for Parley.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Parley: a terminal one-to-one chat client.",
    long_about = "Parley is a terminal client for one-to-one chat with live \
    message sync, presence, typing indicators, read receipts and deletion.\n\n\
    The server endpoint can also be set via the PARLEY_SERVER environment \
    variable."
)]
struct Args {
    /// Chat server base URL (e.g. http://192.168.0.107:5000)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Log file path
    #[arg(long, value_name = "PATH", default_value = "parley.log")]
    log_file: PathBuf,
}

/// Resolve the server endpoint: flag, then environment, then prompt.
fn resolve_server(args: &Args) -> Result<String> {
    if let Some(server) = &args.server {
        return Ok(server.clone());
    }
    if let Ok(server) = env::var("PARLEY_SERVER") {
        return Ok(server);
    }
    eprintln!("Enter server URL (e.g. http://192.168.0.107:5000):");
    Ok(utils::read_line()?)
}

/// Sign in: reuse a saved session for this server if there is one, otherwise
/// prompt for login or registration until the server accepts.
async fn sign_in(api: &mut ApiClient, server: &str) -> Result<Credentials> {
    if let Some(saved) = credentials::load_credentials()? {
        if saved.server == server {
            info!("using saved session for {}", saved.username);
            api.set_token(&saved.token);
            return Ok(saved);
        }
    }

    loop {
        eprintln!("Login or register? [l/r]:");
        let choice = utils::read_line()?.to_lowercase();
        eprintln!("Username:");
        let username = utils::read_line()?;
        eprintln!("Password:");
        let password = utils::read_line()?;

        let result = if choice.starts_with('r') {
            api.register(&username, &password).await
        } else {
            api.login(&username, &password).await
        };

        match result {
            Ok(auth) => {
                api.set_token(&auth.token);
                let creds = Credentials {
                    server: server.to_string(),
                    user_id: auth.user.id,
                    username: auth.user.username,
                    token: auth.token,
                };
                if let Err(e) = credentials::save_credentials(&creds) {
                    eprintln!("Warning: failed to save credentials: {}", e);
                }
                return Ok(creds);
            }
            Err(ApiError::Auth(message)) => {
                eprintln!("Authentication failed: {}. Try again.", message);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.log_file.to_str(), LevelFilter::Info)?;

    let server = resolve_server(&args)?;
    let mut api = ApiClient::new(&server);
    let creds = sign_in(&mut api, &server).await?;
    let me = User {
        id: creds.user_id.clone(),
        username: creds.username.clone(),
    };

    let mut connection = ConnectionManager::new(&server);
    let session = connection.connect(&me.id).await?;

    let mut inbox = InboxAggregator::new(me.id.clone(), session.subscribe());
    match inbox.resync(&api).await {
        Ok(()) => {}
        Err(ApiError::Auth(message)) => {
            // The saved token was rejected; drop it so the next run prompts.
            credentials::clear_credentials()?;
            connection.disconnect().await;
            eprintln!("Session expired ({}). Run parley again to sign in.", message);
            return Ok(());
        }
        Err(e) => {
            connection.disconnect().await;
            return Err(e.into());
        }
    }
    let presence = PresenceTracker::new(session.subscribe());

    let mut terminal = ui::setup_terminal()?;
    let result = run_app(&mut terminal, &api, &session, &me, inbox, presence).await;
    ui::restore_terminal(&mut terminal)?;
    connection.disconnect().await;
    info!("shut down cleanly");
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    api: &ApiClient,
    sync: &SyncSession,
    me: &User,
    mut inbox: InboxAggregator,
    mut presence: PresenceTracker,
) -> Result<()> {
    let mut ui = ChatUI::new();
    let mut chat: Option<ChatSession> = None;

    loop {
        if inbox.pump() == InboxUpdate::ResyncNeeded {
            if let Err(e) = inbox.resync(api).await {
                warn!("inbox resync failed: {}", e);
                ui.status = Some("request failed".to_string());
            }
        }
        presence.pump();
        if let Some(session) = chat.as_mut() {
            session.pump().await;
        }

        terminal.draw(|f| match chat.as_ref() {
            Some(session) => {
                let online = presence.is_online(&session.peer().id);
                ui.draw_chat(f, session, online)
            }
            None => ui.draw_inbox(f, inbox.peers(), &presence),
        })?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let key = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => key,
            _ => continue,
        };

        let mut close_chat = false;
        match chat.as_mut() {
            None => match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('O') => {
                    // Sign out: forget the session, like the logout button.
                    credentials::clear_credentials()?;
                    return Ok(());
                }
                KeyCode::Down => ui.inbox_next(inbox.peers().len()),
                KeyCode::Up => ui.inbox_prev(inbox.peers().len()),
                KeyCode::Enter => {
                    if let Some(peer) = ui.selected_peer(inbox.peers()) {
                        let peer = User {
                            id: peer.id.clone(),
                            username: peer.username.clone(),
                        };
                        match ChatSession::open(api.clone(), sync.clone(), me.clone(), peer).await
                        {
                            Ok(session) => {
                                chat = Some(session);
                                ui.enter_chat();
                            }
                            Err(e) => {
                                error!("failed to open conversation: {}", e);
                                ui.status = Some("request failed".to_string());
                            }
                        }
                    }
                }
                _ => {}
            },
            Some(session) => match key.code {
                KeyCode::Esc => {
                    if ui.selected_message.is_some() {
                        ui.selected_message = None;
                    } else {
                        // Make sure the peer is not left seeing a stale
                        // typing indicator.
                        session.input_changed("").await;
                        close_chat = true;
                    }
                }
                KeyCode::Enter => {
                    let text = ui.input.value().to_string();
                    ui.input.reset();
                    session.input_changed("").await;
                    if let Err(e) = session.send(&text).await {
                        error!("send failed: {}", e);
                        ui.status = Some("request failed".to_string());
                    }
                }
                KeyCode::Up => ui.message_older(session.messages().len()),
                KeyCode::Down => ui.message_newer(),
                KeyCode::Delete => {
                    if let Some(idx) = ui.selected_message {
                        let target = session
                            .messages()
                            .get(idx)
                            // Only the author may delete; others never get
                            // the control.
                            .filter(|m| m.sender.id == me.id)
                            .map(|m| m.id.clone());
                        if let Some(id) = target {
                            session.delete(&id).await;
                        }
                        ui.selected_message = None;
                    }
                }
                _ => {
                    let before = ui.input.value().to_string();
                    ui.input.handle_event(&Event::Key(key));
                    if ui.input.value() != before {
                        let value = ui.input.value().to_string();
                        session.input_changed(&value).await;
                    }
                }
            },
        }

        if close_chat {
            // Dropping the session unregisters its event listeners before
            // any successor conversation installs new ones.
            if let Some(session) = chat.take() {
                session.close();
            }
            ui.leave_chat();
        }
    }
}
