use std::time::Duration;
use tracing::trace;

use crate::config::UTConfig;
use crate::domain::{Message, UTError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &UTConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, UTError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(self.handle_key(key, model.raw_keyevents()));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent, raw: bool) -> Option<Message> {
        if raw {
            return Some(Message::RawKey(key));
        }
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('s'), _) => Some(Message::ToggleSort),
            (KeyCode::Char('n'), _) | (KeyCode::Right, _) | (KeyCode::PageDown, _) => {
                Some(Message::NextPage)
            }
            (KeyCode::Char('p'), _) | (KeyCode::Left, _) | (KeyCode::PageUp, _) => {
                Some(Message::PrevPage)
            }
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::Char('c'), _) => Some(Message::CopyRow),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
