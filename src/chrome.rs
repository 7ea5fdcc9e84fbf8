// chrome.rs
use crate::engine::{DownloadId, DownloadRequest, Engine, EngineEvent};
use crate::settings::{Preferences, SettingsStore};
use crate::settings_dialog::SettingsForm;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Address bar text that jumps to the start page.
pub const START_PAGE_COMMAND: &str = "settings://start";
/// Address bar text that opens the settings dialog.
pub const SETTINGS_COMMAND: &str = "settings://now";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressBarMode {
    /// Read-only, showing where we are.
    Display,
    /// Editable after a click.
    Input,
}

#[derive(Clone, Debug)]
pub struct AddressBar {
    pub text: String,
    pub mode: AddressBarMode,
}

#[derive(Clone, Debug, Default)]
pub struct NavigationState {
    pub current_url: String,
    pub started_at: Option<Instant>,
    pub progress: u8,
    /// Shown inside the progress bar once a load finishes.
    pub status: String,
}

/// Everything a GUI loop can feed into the shell.
#[derive(Clone, Debug, PartialEq)]
pub enum ShellEvent {
    Back,
    Forward,
    Reload,
    Home,
    ToggleFullscreen,
    AddressBarClicked,
    AddressSubmitted(String),
    DarkModeToggled(bool),
    SettingsSaved(SettingsForm),
    DownloadPathChosen {
        id: DownloadId,
        path: Option<PathBuf>,
    },
    Engine(EngineEvent),
}

/// Work only the toolkit can do.
#[derive(Clone, Debug, PartialEq)]
pub enum UiCommand {
    SetTitle(String),
    SetFullscreen(bool),
    OpenSettings,
    ApplyTheme { dark: bool },
    PromptSavePath(DownloadRequest),
}

pub struct Shell<E: Engine> {
    engine: E,
    store: SettingsStore,
    prefs: Preferences,
    nav: NavigationState,
    address_bar: AddressBar,
    fullscreen: bool,
}

impl<E: Engine> Shell<E> {
    pub fn new(engine: E, store: SettingsStore) -> Self {
        let prefs = store.load();
        Shell {
            engine,
            store,
            prefs,
            nav: NavigationState::default(),
            address_bar: AddressBar {
                text: String::new(),
                mode: AddressBarMode::Display,
            },
            fullscreen: false,
        }
    }

    /// Applies the saved theme and makes the first navigation.
    pub fn start(&mut self, initial: Option<String>) -> Vec<UiCommand> {
        let mut commands = vec![UiCommand::ApplyTheme {
            dark: self.prefs.dark_mode,
        }];
        match initial {
            Some(text) if !text.is_empty() => {
                // The settings command alone would leave the view empty.
                if text == SETTINGS_COMMAND {
                    self.go_home();
                }
                commands.extend(self.on_address_submitted(text));
            }
            _ => self.go_home(),
        }
        commands
    }

    /// Drains the engine and reacts to each event in order.
    pub fn pump(&mut self) -> Vec<UiCommand> {
        self.engine
            .poll_events()
            .into_iter()
            .flat_map(|event| self.dispatch(ShellEvent::Engine(event)))
            .collect()
    }

    pub fn dispatch(&mut self, event: ShellEvent) -> Vec<UiCommand> {
        match event {
            ShellEvent::Back => {
                self.engine.back();
                Vec::new()
            }
            ShellEvent::Forward => {
                self.engine.forward();
                Vec::new()
            }
            ShellEvent::Reload => {
                self.engine.reload();
                Vec::new()
            }
            ShellEvent::Home => {
                self.go_home();
                Vec::new()
            }
            ShellEvent::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                vec![UiCommand::SetFullscreen(self.fullscreen)]
            }
            ShellEvent::AddressBarClicked => {
                self.on_address_bar_clicked();
                Vec::new()
            }
            ShellEvent::AddressSubmitted(text) => self.on_address_submitted(text),
            ShellEvent::DarkModeToggled(dark) => {
                self.prefs.dark_mode = dark;
                self.save();
                vec![UiCommand::ApplyTheme { dark }]
            }
            ShellEvent::SettingsSaved(form) => {
                form.apply_to(&mut self.prefs);
                self.save();
                vec![UiCommand::ApplyTheme {
                    dark: self.prefs.dark_mode,
                }]
            }
            ShellEvent::DownloadPathChosen { id, path } => {
                self.engine.resolve_download(id, path);
                Vec::new()
            }
            ShellEvent::Engine(event) => self.on_engine_event(event),
        }
    }

    fn go_home(&mut self) {
        self.engine.load(&self.prefs.start_page);
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&self.prefs) {
            warn!("{}", e);
        }
    }

    fn on_address_bar_clicked(&mut self) {
        if self.address_bar.mode == AddressBarMode::Input {
            return;
        }
        self.address_bar.text = self.nav.current_url.clone();
        self.address_bar.mode = AddressBarMode::Input;
    }

    fn on_address_submitted(&mut self, text: String) -> Vec<UiCommand> {
        match text.as_str() {
            START_PAGE_COMMAND => self.go_home(),
            SETTINGS_COMMAND => return vec![UiCommand::OpenSettings],
            _ if !text.starts_with("http") => {
                let target = search_url(self.prefs.search_engine.template(), &text);
                self.engine.load(&target);
            }
            _ => self.engine.load(&text),
        }
        Vec::new()
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<UiCommand> {
        match event {
            EngineEvent::LoadStarted => {
                self.nav.started_at = Some(Instant::now());
                self.nav.progress = 0;
                self.nav.status.clear();
            }
            EngineEvent::UrlChanged(url) => self.nav.current_url = url,
            EngineEvent::LoadProgress(progress) => self.nav.progress = progress.min(100),
            EngineEvent::LoadFinished { ok, title } => {
                self.address_bar.text = self.display_text();
                self.address_bar.mode = AddressBarMode::Display;
                if let Some(started) = self.nav.started_at {
                    self.nav.status = format!(
                        "{} - Loaded in {:.2} seconds",
                        self.nav.current_url,
                        started.elapsed().as_secs_f64()
                    );
                }
                if !ok {
                    info!("Navigation to {} failed", self.nav.current_url);
                }
                return vec![UiCommand::SetTitle(title)];
            }
            EngineEvent::DownloadRequested(request) => {
                return vec![UiCommand::PromptSavePath(request)];
            }
            EngineEvent::DownloadFinished { path, .. } => {
                self.nav.status = format!("Saved {}", path.display());
            }
            EngineEvent::DownloadFailed { error, .. } => {
                self.nav.status = format!("Download failed: {}", error);
            }
        }
        Vec::new()
    }

    fn display_text(&self) -> String {
        if self.nav.current_url == self.prefs.start_page {
            START_PAGE_COMMAND.to_string()
        } else {
            self.nav.current_url.clone()
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.nav
    }

    pub fn address_bar(&self) -> &AddressBar {
        &self.address_bar
    }

    /// Only meaningful while the bar is in input mode.
    pub fn address_text_mut(&mut self) -> &mut String {
        &mut self.address_bar.text
    }
}

/// Appends the form-encoded query to the engine's template.
pub fn search_url(template: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{}{}", template, encoded)
}
