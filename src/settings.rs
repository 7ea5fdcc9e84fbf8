// settings.rs
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "settings.txt";
pub const DEFAULT_START_PAGE: &str = "https://search.yahoo.co.jp/";

const KEY_DARK_MODE: &str = "darkmode";
const KEY_START_PAGE: &str = "start_page";
const KEY_SEARCH_ENGINE: &str = "search_engine";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where bare address bar input gets sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    #[default]
    YahooJapan,
    Bing,
    /// A template read from the file that matches none of the known engines.
    Custom(String),
}

impl SearchEngine {
    pub const KNOWN: [SearchEngine; 3] =
        [SearchEngine::Google, SearchEngine::YahooJapan, SearchEngine::Bing];

    pub fn name(&self) -> &str {
        match self {
            SearchEngine::Google => "Google",
            SearchEngine::YahooJapan => "Yahoo Japan",
            SearchEngine::Bing => "Bing",
            SearchEngine::Custom(template) => template,
        }
    }

    /// URL prefix the encoded query is appended to.
    pub fn template(&self) -> &str {
        match self {
            SearchEngine::Google => "https://www.google.com/search?q=",
            SearchEngine::YahooJapan => "https://search.yahoo.co.jp/search?p=",
            SearchEngine::Bing => "https://www.bing.com/search?q=",
            SearchEngine::Custom(template) => template,
        }
    }

    /// Accepts either an engine name or a URL template.
    pub fn parse(value: &str) -> Option<SearchEngine> {
        if value.is_empty() {
            return None;
        }
        Self::KNOWN
            .into_iter()
            .find(|engine| engine.name() == value || engine.template() == value)
            .or_else(|| {
                if value.starts_with("http") {
                    Some(SearchEngine::Custom(value.to_string()))
                } else {
                    None
                }
            })
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    pub dark_mode: bool,
    pub start_page: String,
    pub search_engine: SearchEngine,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            dark_mode: false,
            start_page: DEFAULT_START_PAGE.to_string(),
            search_engine: SearchEngine::default(),
        }
    }
}

impl Preferences {
    /// Parses `key=value` lines on top of the defaults.
    pub fn parse(contents: &str) -> Self {
        let mut prefs = Preferences::default();
        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                if !line.trim().is_empty() {
                    debug!("Skipping malformed settings line: {}", line);
                }
                continue;
            };
            let value = value.trim();
            match key.trim() {
                KEY_DARK_MODE => prefs.dark_mode = value == "on",
                KEY_START_PAGE => prefs.start_page = value.to_string(),
                KEY_SEARCH_ENGINE => match SearchEngine::parse(value) {
                    Some(engine) => prefs.search_engine = engine,
                    None => debug!("Unknown search engine in settings: {}", value),
                },
                other => debug!("Ignoring unknown settings key: {}", other),
            }
        }
        prefs
    }

    pub fn serialize(&self) -> String {
        format!(
            "{}={}\n{}={}\n{}={}\n",
            KEY_DARK_MODE,
            if self.dark_mode { "on" } else { "off" },
            KEY_START_PAGE,
            self.start_page,
            KEY_SEARCH_ENGINE,
            self.search_engine.name(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl Default for SettingsStore {
    fn default() -> Self {
        SettingsStore::new(SETTINGS_FILE)
    }
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load(&self) -> Preferences {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Preferences::parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                Preferences::default()
            }
        }
    }

    pub fn save(&self, prefs: &Preferences) -> Result<(), SettingsError> {
        fs::write(&self.path, prefs.serialize()).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
