// settings_dialog.rs
use crate::chrome::ShellEvent;
use crate::settings::{Preferences, SearchEngine};
use eframe::egui;

/// Draft values edited by the dialog.
#[derive(Clone, Debug, PartialEq)]
pub struct SettingsForm {
    pub start_page: String,
    pub search_engine: SearchEngine,
    pub dark_mode: bool,
}

impl SettingsForm {
    pub fn from_prefs(prefs: &Preferences) -> Self {
        SettingsForm {
            start_page: prefs.start_page.clone(),
            search_engine: prefs.search_engine.clone(),
            dark_mode: prefs.dark_mode,
        }
    }

    pub fn apply_to(self, prefs: &mut Preferences) {
        prefs.start_page = self.start_page.trim().to_string();
        prefs.search_engine = self.search_engine;
        prefs.dark_mode = self.dark_mode;
    }

    /// Known engines, plus the current one when it is a custom template.
    fn engine_choices(&self) -> Vec<SearchEngine> {
        let mut choices = SearchEngine::KNOWN.to_vec();
        if !choices.contains(&self.search_engine) {
            choices.push(self.search_engine.clone());
        }
        choices
    }
}

/// Modal dialog; `None` while closed.
#[derive(Default)]
pub struct SettingsDialog {
    form: Option<SettingsForm>,
}

impl SettingsDialog {
    pub fn open(&mut self, prefs: &Preferences) {
        self.form = Some(SettingsForm::from_prefs(prefs));
    }

    pub fn is_open(&self) -> bool {
        self.form.is_some()
    }

    /// Draws the dialog and returns what the user did this frame.
    pub fn show(&mut self, ctx: &egui::Context) -> Vec<ShellEvent> {
        let mut events = Vec::new();
        let Some(form) = self.form.as_mut() else {
            return events;
        };
        let mut close = false;

        let response = egui::Modal::new(egui::Id::new("settings_dialog")).show(ctx, |ui| {
            ui.set_width(400.0);
            ui.heading("Settings");
            ui.separator();

            ui.label("Start Page URL:");
            ui.add(egui::TextEdit::singleline(&mut form.start_page).desired_width(f32::INFINITY));

            ui.label("Select Search Engine:");
            let choices = form.engine_choices();
            egui::ComboBox::from_id_salt("search_engine")
                .selected_text(form.search_engine.name())
                .width(380.0)
                .show_ui(ui, |ui| {
                    for engine in choices {
                        let label = engine.name().to_string();
                        ui.selectable_value(&mut form.search_engine, engine, label);
                    }
                });

            ui.label("Dark Mode:");
            if ui.checkbox(&mut form.dark_mode, "Enable").changed() {
                events.push(ShellEvent::DarkModeToggled(form.dark_mode));
            }

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Save Settings").clicked() {
                    events.push(ShellEvent::SettingsSaved(form.clone()));
                }
                if ui.button("Close").clicked() {
                    close = true;
                }
            });
        });

        if close || response.should_close() {
            self.form = None;
        }
        events
    }
}
