use std::env::VarError;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;
use std::time::Duration;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

use crate::source::COINGECKO_API_URL;

/// Name of the reserved view that shows the registry as declared.
pub const DEFAULT_VIEW_NAME: &str = "Trending";

/// Storage key holding every saved view.
pub const SAVED_VIEWS_KEY: &str = "savedViews";

/// Upstream data is considered stale after this long.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(600);

pub const HELP_TEXT: &str =
    "q quit | s sort | c customize | Tab next view | </> move column | r refresh | y/Y copy";
pub const CUSTOMIZE_HELP_TEXT: &str =
    "Space toggle | K/J move | Tab name | Enter save | Esc cancel";

#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    JsonError(serde_json::Error),
    HttpError(reqwest::Error),
    InvalidPath(String),
    InvalidUrl(String),
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "io error: {e}"),
            DashError::JsonError(e) => write!(f, "json error: {e}"),
            DashError::HttpError(e) => write!(f, "http error: {e}"),
            DashError::InvalidPath(p) => write!(f, "invalid path: {p}"),
            DashError::InvalidUrl(u) => write!(f, "invalid url: {u}"),
        }
    }
}

impl std::error::Error for DashError {}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<serde_json::Error> for DashError {
    fn from(err: serde_json::Error) -> Self {
        DashError::JsonError(err)
    }
}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        DashError::HttpError(err)
    }
}

impl From<shellexpand::LookupError<VarError>> for DashError {
    fn from(err: shellexpand::LookupError<VarError>) -> Self {
        DashError::InvalidPath(err.to_string())
    }
}

#[derive(Debug, Clone, Setters)]
pub struct DashConfig {
    pub event_poll_time: u64,
    pub refresh_interval: Duration,
    /// Base url of the CoinGecko compatible market API.
    pub api_url: String,
    /// Snapshot file read instead of the API.
    pub data_path: Option<PathBuf>,
    /// Directory for saved views, `None` keeps them in memory only.
    pub views_dir: Option<PathBuf>,
    pub max_column_width: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        DashConfig {
            event_poll_time: 100,
            refresh_interval: REFRESH_INTERVAL,
            api_url: COINGECKO_API_URL.to_string(),
            data_path: None,
            views_dir: None,
            max_column_width: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    ToggleSort,
    MoveColumnLeft,
    MoveColumnRight,
    NextView,
    SelectView(usize),
    Refresh,
    CopyCell,
    CopyRow,
    OpenCustomize,
    ToggleColumn,
    MoveEntryUp,
    MoveEntryDown,
    FocusNameInput,
    Commit,
    Cancel,
    RawKey(KeyEvent),
    HeaderPress(u16),
    HeaderRelease(u16, u16),
    Resize(u16, u16),
}
