use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::domain::{DashConfig, DashError, Message};
use crate::model::{Modus, Model};
use crate::source::Clock;
use crate::ui::TABLE_HEADER_ROW;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event<C: Clock>(&self, model: &Model<C>) -> Result<Option<Message>, DashError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                Self::handle_key(model.modus(), key)
            }
            Event::Mouse(mouse) => Self::handle_mouse(mouse),
            Event::Resize(width, height) => Some(Message::Resize(width, height)),
            _ => None,
        };
        Ok(message)
    }

    fn handle_key(modus: Modus, key: KeyEvent) -> Option<Message> {
        let message = match modus {
            Modus::TABLE => match key.code {
                KeyCode::Char('q') => Some(Message::Quit),
                KeyCode::Up | KeyCode::Char('k') => Some(Message::MoveUp),
                KeyCode::Down | KeyCode::Char('j') => Some(Message::MoveDown),
                KeyCode::Left | KeyCode::Char('h') => Some(Message::MoveLeft),
                KeyCode::Right | KeyCode::Char('l') => Some(Message::MoveRight),
                KeyCode::Char('s') => Some(Message::ToggleSort),
                KeyCode::Char('<') => Some(Message::MoveColumnLeft),
                KeyCode::Char('>') => Some(Message::MoveColumnRight),
                KeyCode::Tab => Some(Message::NextView),
                KeyCode::Char(c @ '1'..='9') => {
                    c.to_digit(10).map(|d| Message::SelectView(d as usize - 1))
                }
                KeyCode::Char('r') => Some(Message::Refresh),
                KeyCode::Char('y') => Some(Message::CopyCell),
                KeyCode::Char('Y') => Some(Message::CopyRow),
                KeyCode::Char('c') => Some(Message::OpenCustomize),
                _ => None,
            },
            Modus::CUSTOMIZE => match (key.code, key.modifiers) {
                (KeyCode::Up, KeyModifiers::SHIFT) | (KeyCode::Char('K'), _) => {
                    Some(Message::MoveEntryUp)
                }
                (KeyCode::Down, KeyModifiers::SHIFT) | (KeyCode::Char('J'), _) => {
                    Some(Message::MoveEntryDown)
                }
                (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
                (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
                (KeyCode::Char('<'), _) => Some(Message::MoveColumnLeft),
                (KeyCode::Char('>'), _) => Some(Message::MoveColumnRight),
                (KeyCode::Char(' '), _) => Some(Message::ToggleColumn),
                (KeyCode::Tab, _) => Some(Message::FocusNameInput),
                (KeyCode::Enter, _) => Some(Message::Commit),
                (KeyCode::Esc, _) => Some(Message::Cancel),
                _ => None,
            },
            Modus::NAMEINPUT => match key.code {
                KeyCode::Tab => Some(Message::FocusNameInput),
                _ => Some(Message::RawKey(key)),
            },
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }

    /// Header presses start a drag, any left button release ends it. The
    /// release row is passed along but does not pick the target column.
    fn handle_mouse(mouse: MouseEvent) -> Option<Message> {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if mouse.row == TABLE_HEADER_ROW => {
                Some(Message::HeaderPress(mouse.column))
            }
            MouseEventKind::Up(MouseButton::Left) => {
                Some(Message::HeaderRelease(mouse.column, mouse.row))
            }
            _ => None,
        }
    }
}
