// main.rs
mod browser;
mod chrome;
mod engine;
mod fetch_engine;
mod page;
mod settings;
mod settings_dialog;

use browser::BrowserApp;
use eframe::egui;
use std::env;

fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional first argument: a URL or search text for the first navigation
    let initial_url = env::args().nth(1);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Custom Browser")
            .with_inner_size([1200.0, 800.0])
            .with_position([100.0, 100.0]),
        ..Default::default()
    };

    eframe::run_native(
        "CustomBrowser", // App name used by OS
        options,
        Box::new(move |cc| Ok(Box::new(BrowserApp::new(cc, initial_url)?))),
    )
}
