pub mod render;
pub mod state;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures_util::StreamExt;
use microblog_feed::engine::model::{FeedSnapshot, PostId, Sort};
use ratatui::prelude::*;
use state::{Notice, ViewState};
use std::io::stdout;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

/// Intents the UI sends back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Quit,
    Refresh,
    NextPage,
    PreviousPage,
    SetSort(Sort),
    CycleLimit,
    /// `liked` is the state the post showed when the key was pressed.
    ToggleLike { post_id: PostId, liked: bool },
    /// Sent only after the user confirmed.
    Delete { post_id: PostId },
    Compose { text: String, attachment: Option<PathBuf> },
    SetApiKey(String),
}

/// Run the TUI. Renders every snapshot from `snapshot_rx`, sends commands on `cmd_tx`.
pub async fn run_tui(
    snapshot_rx: watch::Receiver<FeedSnapshot>,
    notice_rx: watch::Receiver<Option<Notice>>,
    cmd_tx: mpsc::Sender<UiCommand>,
    likers_preview: usize,
) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = tui_loop(&mut terminal, snapshot_rx, notice_rx, cmd_tx, likers_preview).await;

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut snapshot_rx: watch::Receiver<FeedSnapshot>,
    mut notice_rx: watch::Receiver<Option<Notice>>,
    cmd_tx: mpsc::Sender<UiCommand>,
    likers_preview: usize,
) -> Result<()> {
    let mut view = ViewState::new(likers_preview);
    let mut events = EventStream::new();

    loop {
        // Full re-render from the latest snapshot every time
        let snapshot = snapshot_rx.borrow_and_update().clone();
        let notice = notice_rx.borrow_and_update().clone();
        view.clamp(&snapshot);
        terminal.draw(|f| render::draw(f, &snapshot, &view, notice.as_ref()))?;

        tokio::select! {
            maybe_event = events.next() => {
                let event = match maybe_event {
                    Some(event) => event?,
                    None => return Ok(()),
                };
                if let Event::Key(key) = event {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if let Some(cmd) = view.handle_key(key.code, &snapshot) {
                        let quit = cmd == UiCommand::Quit;
                        let _ = cmd_tx.send(cmd).await;
                        if quit {
                            return Ok(());
                        }
                    }
                }
            }
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            changed = notice_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
