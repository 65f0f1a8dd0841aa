use crossterm::event::KeyCode;
use microblog_feed::engine::model::{FeedSnapshot, PostId, Sort};
use std::path::PathBuf;

use super::UiCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient status line, the terminal counterpart of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub time: String,
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeField {
    Text,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeDraft {
    pub text: String,
    pub attachment: String,
    pub field: ComposeField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Compose(ComposeDraft),
    ConfirmDelete(PostId),
    ApiKey(String),
}

/// UI-local state: selection and modal input. Everything else comes from
/// the engine's snapshot.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub selected: usize,
    pub mode: InputMode,
    pub likers_preview: usize,
}

impl ViewState {
    pub fn new(likers_preview: usize) -> Self {
        Self {
            selected: 0,
            mode: InputMode::Normal,
            likers_preview,
        }
    }

    /// Keep the selection on a post after the list changes size.
    pub fn clamp(&mut self, snapshot: &FeedSnapshot) {
        if snapshot.posts.is_empty() {
            self.selected = 0;
        } else if self.selected >= snapshot.posts.len() {
            self.selected = snapshot.posts.len() - 1;
        }
    }

    /// Map a key press to a command for the engine, updating local state.
    pub fn handle_key(&mut self, code: KeyCode, snapshot: &FeedSnapshot) -> Option<UiCommand> {
        self.clamp(snapshot);
        match std::mem::replace(&mut self.mode, InputMode::Normal) {
            InputMode::Normal => self.handle_normal(code, snapshot),
            InputMode::ConfirmDelete(post_id) => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UiCommand::Delete { post_id }),
                _ => None,
            },
            InputMode::ApiKey(mut buffer) => match code {
                KeyCode::Enter => Some(UiCommand::SetApiKey(buffer)),
                KeyCode::Esc => None,
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = InputMode::ApiKey(buffer);
                    None
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::ApiKey(buffer);
                    None
                }
                _ => {
                    self.mode = InputMode::ApiKey(buffer);
                    None
                }
            },
            InputMode::Compose(mut draft) => match code {
                KeyCode::Esc => None,
                KeyCode::Enter => {
                    let attachment = draft.attachment.trim();
                    Some(UiCommand::Compose {
                        text: draft.text,
                        attachment: (!attachment.is_empty()).then(|| PathBuf::from(attachment)),
                    })
                }
                KeyCode::Tab => {
                    draft.field = match draft.field {
                        ComposeField::Text => ComposeField::Attachment,
                        ComposeField::Attachment => ComposeField::Text,
                    };
                    self.mode = InputMode::Compose(draft);
                    None
                }
                KeyCode::Backspace => {
                    match draft.field {
                        ComposeField::Text => draft.text.pop(),
                        ComposeField::Attachment => draft.attachment.pop(),
                    };
                    self.mode = InputMode::Compose(draft);
                    None
                }
                KeyCode::Char(c) => {
                    match draft.field {
                        ComposeField::Text => draft.text.push(c),
                        ComposeField::Attachment => draft.attachment.push(c),
                    }
                    self.mode = InputMode::Compose(draft);
                    None
                }
                _ => {
                    self.mode = InputMode::Compose(draft);
                    None
                }
            },
        }
    }

    fn handle_normal(&mut self, code: KeyCode, snapshot: &FeedSnapshot) -> Option<UiCommand> {
        let selected = snapshot.posts.get(self.selected);
        match code {
            KeyCode::Char('q') => Some(UiCommand::Quit),
            KeyCode::Char('r') => Some(UiCommand::Refresh),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < snapshot.posts.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            // Navigation follows the server's flags only
            KeyCode::Right | KeyCode::Char('n') if snapshot.has_next() => {
                self.selected = 0;
                Some(UiCommand::NextPage)
            }
            KeyCode::Left | KeyCode::Char('p') if snapshot.has_previous() => {
                self.selected = 0;
                Some(UiCommand::PreviousPage)
            }
            KeyCode::Char('s') => {
                self.selected = 0;
                Some(UiCommand::SetSort(snapshot.query.sort.next()))
            }
            KeyCode::Char('L') => {
                self.selected = 0;
                Some(UiCommand::CycleLimit)
            }
            KeyCode::Char('l') | KeyCode::Char(' ') => selected.map(|post| UiCommand::ToggleLike {
                post_id: post.id,
                liked: post.liked_by_viewer,
            }),
            KeyCode::Char('d') => {
                if let Some(post) = selected {
                    if snapshot.can_delete(post) {
                        self.mode = InputMode::ConfirmDelete(post.id);
                    }
                }
                None
            }
            KeyCode::Char('c') => {
                self.mode = InputMode::Compose(ComposeDraft {
                    text: String::new(),
                    attachment: String::new(),
                    field: ComposeField::Text,
                });
                None
            }
            KeyCode::Char('a') => {
                self.mode = InputMode::ApiKey(String::new());
                None
            }
            _ => None,
        }
    }
}

/// Label for the sort selector.
pub fn sort_label(sort: Sort) -> &'static str {
    match sort {
        Sort::Popular => "Popular",
        Sort::Recent => "Recent",
    }
}
