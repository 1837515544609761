//! Boosting status panel in the terminal.
//!
//! Run with: cargo run -p vaporboost-demo --bin tui-panel [CONFIG_DIR]
//!
//! Challenges wait for app approval since the terminal is in raw mode.

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use crossterm::{
    event, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    widgets::{Block, Borders, Paragraph},
};
use vaporboost_core::RunSummary;
use vaporboost_demo::{OfflineFactory, load, open_store};
use vaporboost_guard::DeferResolver;
use vaporboost_session::{FileMessageLog, SessionManager};
use vaporboost_transport::{
    ClientMessage,
    tui::{PanelAction, PanelBridge, StatusPanel, format_hms},
};

#[tokio::main]
async fn main() -> Result<()> {
    let store = open_store(std::env::args_os().nth(1).map(PathBuf::from))?;
    let (settings, accounts) = load(&store).await?;

    let manager = Arc::new(
        SessionManager::new(OfflineFactory, settings)
            .with_resolver(Arc::new(DeferResolver))
            .with_message_sink(Arc::new(FileMessageLog::new(store.root()))),
    );

    let (mut bridge, endpoint) = PanelBridge::new();
    tokio::spawn(endpoint.serve(manager.clone()));
    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager.start_accounts(accounts).await;
        })
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_panel(&mut terminal, &mut bridge);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    starter.abort();
    manager.stop_all().await;
    println!("{}", summary_line(&manager.report().summary()));
    result
}

#[derive(Default)]
struct View {
    panel: StatusPanel,
    stats: Option<RunSummary>,
    menu: bool,
}

fn run_panel(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    bridge: &mut PanelBridge,
) -> Result<()> {
    let mut view = View::default();

    loop {
        bridge.send(ClientMessage::Snapshot)?;
        bridge.drain_into(&mut view.panel);
        terminal.draw(|f| draw(f, &view))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        match PanelAction::from_event(&event::read()?) {
            Some(PanelAction::Quit) => return Ok(()),
            Some(PanelAction::Stats) => {
                view.stats = match view.stats {
                    Some(_) => None,
                    None => view.panel.report().map(|r| r.summary()),
                };
            }
            Some(PanelAction::Menu) => view.menu = !view.menu,
            None => {}
        }
    }
}

fn draw(f: &mut Frame, view: &View) {
    let extra = u16::from(view.stats.is_some()) * 3 + u16::from(view.menu) * 4;
    let [main, side] =
        Layout::vertical([Constraint::Min(6), Constraint::Length(extra)]).areas(f.area());
    f.render_widget(&view.panel, main);

    let mut lines = Vec::new();
    if let Some(summary) = &view.stats {
        lines.push(summary_line(summary));
    }
    if view.menu {
        lines.push("[S] toggle run statistics".to_owned());
        lines.push("[Q] stop every session and exit".to_owned());
    }
    if !lines.is_empty() {
        f.render_widget(
            Paragraph::new(lines.join("\n")).block(Block::default().borders(Borders::ALL)),
            side,
        );
    }
}

fn summary_line(summary: &RunSummary) -> String {
    format!(
        "Ran {} for {} account(s): {:.2} hours, {} message(s), {} error(s)",
        format_hms(summary.duration),
        summary.accounts,
        summary.hours_gained,
        summary.messages,
        summary.errors
    )
}
