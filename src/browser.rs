// browser.rs
use crate::chrome::{AddressBarMode, Shell, ShellEvent, UiCommand};
use crate::engine::Engine;
use crate::fetch_engine::FetchEngine;
use crate::settings::SettingsStore;
use crate::settings_dialog::SettingsDialog;
use eframe::egui::{self, Color32};
use log::info;

const ADDRESS_BAR_ID: &str = "address_bar";
const FULLSCREEN_BUTTON_WIDTH: f32 = 90.0;

pub struct BrowserApp {
    shell: Shell<FetchEngine>,
    settings_dialog: SettingsDialog,
    dark_mode: bool,
    focus_address_bar: bool,
}

impl BrowserApp {
    pub fn new(cc: &eframe::CreationContext<'_>, initial_url: Option<String>) -> anyhow::Result<Self> {
        let repaint_ctx = cc.egui_ctx.clone();
        let engine = FetchEngine::new()?.with_waker(move || repaint_ctx.request_repaint());
        let store = SettingsStore::default();
        info!("Using settings file {}", store.path().display());

        let mut app = Self {
            shell: Shell::new(engine, store),
            settings_dialog: SettingsDialog::default(),
            dark_mode: false,
            focus_address_bar: false,
        };
        let commands = app.shell.start(initial_url);
        app.run_commands(&cc.egui_ctx, commands);
        Ok(app)
    }

    fn dispatch(&mut self, ctx: &egui::Context, event: ShellEvent) {
        let commands = self.shell.dispatch(event);
        self.run_commands(ctx, commands);
    }

    fn run_commands(&mut self, ctx: &egui::Context, commands: Vec<UiCommand>) {
        for command in commands {
            match command {
                UiCommand::SetTitle(title) => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));
                }
                UiCommand::SetFullscreen(on) => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(on));
                }
                UiCommand::OpenSettings => self.settings_dialog.open(self.shell.prefs()),
                UiCommand::ApplyTheme { dark } => {
                    self.dark_mode = dark;
                    ctx.set_visuals(if dark {
                        egui::Visuals::dark()
                    } else {
                        egui::Visuals::light()
                    });
                }
                UiCommand::PromptSavePath(request) => {
                    // Blocks the UI thread like any modal save dialog.
                    let path = rfd::FileDialog::new()
                        .set_title("Save As")
                        .set_file_name(&request.suggested_filename)
                        .save_file();
                    if path.is_none() {
                        info!("Download of {} cancelled", request.url);
                    }
                    self.dispatch(ctx, ShellEvent::DownloadPathChosen {
                        id: request.id,
                        path,
                    });
                }
            }
        }
    }

    fn address_bar(&mut self, ui: &mut egui::Ui, width: f32, events: &mut Vec<ShellEvent>) {
        let id = egui::Id::new(ADDRESS_BAR_ID);
        match self.shell.address_bar().mode {
            AddressBarMode::Display => {
                let color = if self.dark_mode {
                    Color32::WHITE
                } else {
                    Color32::GRAY
                };
                let mut text = self.shell.address_bar().text.clone();
                let response = ui.add(
                    egui::TextEdit::singleline(&mut text)
                        .interactive(false)
                        .text_color(color)
                        .desired_width(width),
                );
                let click = ui.interact(response.rect, id.with("click"), egui::Sense::click());
                if click.on_hover_cursor(egui::CursorIcon::Text).clicked() {
                    events.push(ShellEvent::AddressBarClicked);
                    self.focus_address_bar = true;
                }
            }
            AddressBarMode::Input => {
                let response = ui.add(
                    egui::TextEdit::singleline(self.shell.address_text_mut())
                        .id(id)
                        .desired_width(width),
                );
                if std::mem::take(&mut self.focus_address_bar) {
                    response.request_focus();
                }
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    events.push(ShellEvent::AddressSubmitted(
                        self.shell.address_bar().text.clone(),
                    ));
                }
            }
        }
    }
}

impl eframe::App for BrowserApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let commands = self.shell.pump();
        self.run_commands(ctx, commands);

        let mut events = Vec::new();

        // --- Top Panel: navigation toolbar ---
        egui::TopBottomPanel::top("navbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Back").clicked() {
                    events.push(ShellEvent::Back);
                }
                if ui.button("Forward").clicked() {
                    events.push(ShellEvent::Forward);
                }
                if ui.button("Reload").clicked() {
                    events.push(ShellEvent::Reload);
                }
                if ui.button("Home").clicked() {
                    events.push(ShellEvent::Home);
                }

                let width = (ui.available_width() - FULLSCREEN_BUTTON_WIDTH).max(100.0);
                self.address_bar(ui, width, &mut events);

                if ui.button("Full Screen").clicked() {
                    events.push(ShellEvent::ToggleFullscreen);
                }
            });
        });

        // --- Bottom Panel: load progress ---
        egui::TopBottomPanel::bottom("progress").show(ctx, |ui| {
            let nav = self.shell.navigation();
            let mut bar = egui::ProgressBar::new(f32::from(nav.progress) / 100.0);
            if !nav.status.is_empty() {
                bar = bar.text(nav.status.clone());
            }
            ui.add(bar);
        });

        // --- Central Panel: the engine's view ---
        egui::CentralPanel::default().show(ctx, |ui| match self.shell.engine().page() {
            Some(page) => {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.add(egui::Label::new(page.text.as_str()).wrap());
                    ui.allocate_space(ui.available_size());
                });
            }
            None if self.shell.navigation().progress < 100 => {
                ui.spinner();
            }
            None => {}
        });

        if self.settings_dialog.is_open() {
            events.extend(self.settings_dialog.show(ctx));
        }

        for event in events {
            self.dispatch(ctx, event);
        }
    }
}
