use std::io::Error;

use ratatui::crossterm::event::KeyEvent;

pub const HELP_TEXT: &str = "\
q          Quit
?          Show this help
/          Search by name (Enter keeps, Esc restores)
s          Toggle sort (ascending / descending)
n, →       Next page
p, ←       Previous page
g / G      First / last page
j/k, ↓/↑   Move selection
Enter      Show record details
Esc        Back / close
c          Copy row to clipboard
r          Reload records";

#[derive(Debug, thiserror::Error)]
pub enum UTError {
    #[error("I/O error: {0}")]
    IoError(#[from] Error),

    /// Network or response failure while loading the record set.
    #[error("{0}")]
    FetchFailure(String),

    /// A record lacks a field the view depends on.
    #[error("Record #{record} is missing field '{field}'")]
    MissingField { record: usize, field: String },

    #[error("Invalid record data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl UTError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        UTError::FetchFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        UTError::Config(msg.into())
    }
}

impl From<reqwest::Error> for UTError {
    fn from(err: reqwest::Error) -> Self {
        UTError::FetchFailure(err.to_string())
    }
}

impl From<serde_json::Error> for UTError {
    fn from(err: serde_json::Error) -> Self {
        UTError::InvalidData(err.to_string())
    }
}

impl From<toml::de::Error> for UTError {
    fn from(err: toml::de::Error) -> Self {
        UTError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    ToggleSort,
    Search,
    Enter,
    Exit,
    Help,
    CopyRow,
    Reload,
    RawKey(KeyEvent),
}
