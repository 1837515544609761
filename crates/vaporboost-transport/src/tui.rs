//! Status panel and channel bridge for ratatui applications.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use futures::StreamExt;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget},
};
use tokio::sync::mpsc;
use vaporboost_core::{
    ManagerSnapshot, SessionEvent, SessionEventKind, SessionSnapshot, SessionState,
    VisibilityMode,
};

use crate::{
    control::SessionControl,
    protocol::{ClientMessage, ServerMessage, dispatch},
};

/// Recent feed events kept for the panel footer.
const RECENT_EVENTS: usize = 5;

/// Format a duration as `HH:MM:SS`; hours are not capped at 24.
#[must_use]
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// What the operator asked for from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Menu,
    Stats,
    Quit,
}

impl PanelAction {
    /// Map a key press to an action.
    #[must_use]
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Quit),
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'q' => Some(Self::Quit),
                's' => Some(Self::Stats),
                'm' => Some(Self::Menu),
                _ => None,
            },
            _ => None,
        }
    }

    /// Map a terminal event to an action.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Key(key) => Self::from_key(key),
            _ => None,
        }
    }
}

/// Live status panel: one row per session plus run counters.
#[derive(Debug, Default)]
pub struct StatusPanel {
    report: Option<ManagerSnapshot>,
    recent: VecDeque<String>,
}

impl StatusPanel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_report(&mut self, report: ManagerSnapshot) {
        self.report = Some(report);
    }

    /// Latest report received, if any.
    #[must_use]
    pub const fn report(&self) -> Option<&ManagerSnapshot> {
        self.report.as_ref()
    }

    /// Fold a server message into the panel.
    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Snapshot { report } => self.set_report(report),
            ServerMessage::Event { event } => self.push_event(&event),
            ServerMessage::Error { message } => self.push_line(format!("Error: {message}")),
            ServerMessage::Stopped { account_id } => self.push_line(format!("{account_id} stopped")),
            ServerMessage::Pong | ServerMessage::ActivityUpdated { .. } => {}
        }
    }

    fn push_event(&mut self, event: &SessionEvent) {
        let line = match &event.kind {
            SessionEventKind::StateChanged { to, .. } => format!("{} {to}", event.account_id),
            SessionEventKind::MessageReceived { from, .. } => {
                format!("{} message from {from}", event.account_id)
            }
            SessionEventKind::Wallet {
                currency,
                balance_cents,
            } => format!(
                "{} wallet {}.{:02} {currency}",
                event.account_id,
                balance_cents / 100,
                balance_cents % 100
            ),
            SessionEventKind::Restriction { vac_bans } => {
                format!("{} VAC bans: {vac_bans}", event.account_id)
            }
            SessionEventKind::Error { error } => format!("{} {error}", event.account_id),
        };
        self.push_line(line);
    }

    fn push_line(&mut self, line: String) {
        if self.recent.len() == RECENT_EVENTS {
            self.recent.pop_front();
        }
        self.recent.push_back(line);
    }

    #[must_use]
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    fn row(session: &SessionSnapshot) -> Row<'static> {
        let status_style = match session.state {
            SessionState::Online => Style::default().fg(Color::Green),
            SessionState::Terminated if session.failed() => Style::default().fg(Color::Red),
            SessionState::AwaitingChallenge => Style::default().fg(Color::Yellow),
            _ => Style::default().fg(Color::DarkGray),
        };
        let mode = match session.visibility {
            VisibilityMode::Invisible => "invisible",
            VisibilityMode::Visible => "",
        };
        let error = session
            .last_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        Row::new(vec![
            Cell::from(session.account_id.to_string()).style(Style::default().fg(Color::Yellow)),
            Cell::from(session.state.label().to_uppercase()).style(status_style),
            Cell::from(format_hms(session.online_duration)),
            Cell::from(session.active_app_count.to_string()),
            Cell::from(mode),
            Cell::from(error),
        ])
    }
}

impl Widget for &StatusPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title(" BOOSTING ");
        let inner = block.inner(area);
        block.render(area, buf);

        let [table_area, recent_area, footer_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(u16::try_from(self.recent.len()).unwrap_or(0)),
            Constraint::Length(2),
        ])
        .areas(inner);

        match &self.report {
            Some(report) if !report.sessions.is_empty() => {
                let header = Row::new(["Account", "Status", "Time", "Games", "Mode", "Last error"])
                    .style(Style::default().add_modifier(Modifier::BOLD));
                let widths = [
                    Constraint::Length(20),
                    Constraint::Length(18),
                    Constraint::Length(10),
                    Constraint::Length(6),
                    Constraint::Length(10),
                    Constraint::Fill(1),
                ];
                Table::new(report.sessions.iter().map(StatusPanel::row), widths)
                    .header(header)
                    .render(table_area, buf);
            }
            _ => Paragraph::new("No active sessions. Press [M] for menu.")
                .style(Style::default().fg(Color::DarkGray))
                .render(table_area, buf),
        }

        Paragraph::new(self.recent.iter().map(|l| Line::from(l.as_str())).collect::<Vec<_>>())
            .style(Style::default().fg(Color::DarkGray))
            .render(recent_area, buf);

        let counters = self.report.as_ref().map_or_else(String::new, |r| {
            format!(
                "Online {}/{}  Messages {}  Reconnects {}  Errors {}",
                r.online_count(),
                r.sessions.len(),
                r.counters.messages_received,
                r.counters.reconnections,
                r.counters.errors
            )
        });
        Paragraph::new(vec![
            Line::from(counters),
            Line::from("[M] Menu  [S] Stats  [Q] Quit"),
        ])
        .render(footer_area, buf);
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Panel side of an in-process connection to a session manager.
pub struct PanelBridge {
    client_tx: mpsc::UnboundedSender<ClientMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl PanelBridge {
    /// Create a bridge and the endpoint that serves it.
    #[must_use]
    pub fn new() -> (Self, PanelEndpoint) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        (
            Self {
                client_tx,
                server_rx,
            },
            PanelEndpoint {
                client_rx,
                server_tx,
            },
        )
    }

    /// Send a request to the endpoint.
    ///
    /// # Errors
    /// Returns error if the endpoint has stopped.
    pub fn send(&self, message: ClientMessage) -> Result<(), SendError> {
        self.client_tx
            .send(message)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Receive a server message (non-blocking).
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.server_rx.try_recv().ok()
    }

    /// Receive the next server message.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.server_rx.recv().await
    }

    /// Apply every pending server message to `panel`.
    pub fn drain_into(&mut self, panel: &mut StatusPanel) {
        while let Some(message) = self.try_recv() {
            panel.apply(message);
        }
    }
}

/// Manager side of a `PanelBridge`.
pub struct PanelEndpoint {
    client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl PanelEndpoint {
    /// Answer requests and forward feed events until the bridge is dropped.
    pub async fn serve(mut self, control: Arc<dyn SessionControl>) {
        let mut events = control.feed().subscribe_stream();
        loop {
            let message = tokio::select! {
                request = self.client_rx.recv() => match request {
                    Some(request) => dispatch(control.as_ref(), request).await,
                    None => break,
                },
                Some(event) = events.next() => ServerMessage::Event { event },
            };
            if self.server_tx.send(message).is_err() {
                break;
            }
        }
    }
}
