// Terminal view glue. Rendering only: every fact drawn here lives in the
// sync core (message store, inbox aggregator, presence tracker, typing
// controller); this module never mutates any of it.

use std::io;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use tui_input::Input;

use parley::models::{MessageStatus, Peer};
use parley::sync::{ChatSession, PresenceTracker};

pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// View-only state: list selections, the input buffer, and a one-line status.
pub struct ChatUI {
    pub input: Input,
    pub inbox_state: ListState,
    /// Index into the render-ordered message list (0 = newest); used to pick
    /// a message for deletion.
    pub selected_message: Option<usize>,
    pub status: Option<String>,
}

impl ChatUI {
    pub fn new() -> Self {
        let mut inbox_state = ListState::default();
        inbox_state.select(Some(0));
        Self {
            input: Input::default(),
            inbox_state,
            selected_message: None,
            status: None,
        }
    }

    pub fn inbox_next(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let next = match self.inbox_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.inbox_state.select(Some(next));
    }

    pub fn inbox_prev(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let prev = match self.inbox_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.inbox_state.select(Some(prev));
    }

    pub fn selected_peer<'a>(&self, peers: &'a [Peer]) -> Option<&'a Peer> {
        peers.get(self.inbox_state.selected()?)
    }

    /// Move the message selection toward older messages.
    pub fn message_older(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.selected_message = Some(match self.selected_message {
            Some(i) if i + 1 < len => i + 1,
            Some(i) => i,
            None => 0,
        });
    }

    /// Move the message selection toward newer messages; past the newest it
    /// clears.
    pub fn message_newer(&mut self) {
        self.selected_message = match self.selected_message {
            Some(0) | None => None,
            Some(i) => Some(i - 1),
        };
    }

    pub fn enter_chat(&mut self) {
        self.input.reset();
        self.selected_message = None;
        self.status = None;
    }

    pub fn leave_chat(&mut self) {
        self.input.reset();
        self.selected_message = None;
    }

    pub fn draw_inbox<B: Backend>(
        &mut self,
        f: &mut Frame<B>,
        peers: &[Peer],
        presence: &PresenceTracker,
    ) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(f.size());

        let items: Vec<ListItem> = peers
            .iter()
            .map(|peer| {
                let mut spans = vec![Span::styled(
                    peer.username.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )];
                if presence.is_online(&peer.id) {
                    spans.push(Span::styled(" ●", Style::default().fg(Color::Green)));
                }
                if let Some(last) = &peer.last_message {
                    spans.push(Span::raw("  "));
                    spans.push(Span::styled(
                        truncate(&last.text, 40),
                        Style::default().fg(Color::Gray),
                    ));
                    spans.push(Span::styled(
                        format!("  {}", format_time(last.created_at)),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Chats"))
            .highlight_style(Style::default().bg(Color::DarkGray));
        f.render_stateful_widget(list, chunks[0], &mut self.inbox_state);

        let help = self
            .status
            .clone()
            .unwrap_or_else(|| "Up/Down select | Enter open | O sign out | q quit".to_string());
        f.render_widget(
            Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
            chunks[1],
        );
    }

    pub fn draw_chat<B: Backend>(
        &mut self,
        f: &mut Frame<B>,
        session: &ChatSession,
        peer_online: bool,
    ) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(f.size());

        let me = session.me();
        let peer = session.peer();
        let messages = session.messages();

        // Chronological top-to-bottom with the newest pinned to the bottom:
        // the window holds the newest messages, oldest of them first.
        let height = chunks[0].height.saturating_sub(2).max(1) as usize;
        let window: Vec<_> = messages.iter().take(height).collect();
        let count = window.len();
        let items: Vec<ListItem> = window
            .iter()
            .rev()
            .enumerate()
            .map(|(row, message)| {
                let render_idx = count - 1 - row;
                let mine = message.sender.id == me.id;
                let mut spans = vec![
                    Span::styled(
                        format!("[{}] ", format_time(message.created_at)),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(
                        format!("{}: ", message.sender.username),
                        if mine {
                            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                        } else {
                            Style::default().add_modifier(Modifier::BOLD)
                        },
                    ),
                    Span::raw(message.text.clone()),
                ];
                if mine {
                    spans.push(ticks(message.status));
                }
                let item = ListItem::new(Line::from(spans));
                if self.selected_message == Some(render_idx) {
                    item.style(Style::default().bg(Color::DarkGray))
                } else {
                    item
                }
            })
            .collect();

        let title = format!(
            "{}{}",
            peer.username,
            if peer_online { " (online)" } else { "" }
        );
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(list, chunks[0]);

        let typing = if session.peer_typing() {
            format!("{} is typing...", peer.username)
        } else {
            String::new()
        };
        f.render_widget(
            Paragraph::new(typing).style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            ),
            chunks[1],
        );

        let input = Paragraph::new(self.input.value())
            .block(Block::default().borders(Borders::ALL).title("Message"));
        f.render_widget(input, chunks[2]);
        f.set_cursor(
            chunks[2].x + self.input.cursor() as u16 + 1,
            chunks[2].y + 1,
        );

        let help = self
            .status
            .clone()
            .unwrap_or_else(|| "Enter send | Up/Down select | Del delete | Esc back".to_string());
        f.render_widget(
            Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
            chunks[3],
        );
    }
}

/// Status ticks on own messages, WhatsApp style: one for sent, two once it
/// reached the peer, highlighted once read.
fn ticks(status: MessageStatus) -> Span<'static> {
    match status {
        MessageStatus::Sent => Span::styled(" ✓", Style::default().fg(Color::DarkGray)),
        MessageStatus::Delivered => Span::styled(" ✓✓", Style::default().fg(Color::DarkGray)),
        MessageStatus::Read => Span::styled(" ✓✓", Style::default().fg(Color::Cyan)),
    }
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
