//! Price Tracker - Main Application Entry Point
//!
//! Ticker selector, live price chart and stream status in one egui window.

use std::error::Error;
use std::sync::Arc;

use eframe::egui;
use egui::Color32;
use tracing::info;

use price_tracker::chart::EguiChartBackend;
use price_tracker::feed::PriceRestClient;
use price_tracker::tracker::logger::init_logger;
use price_tracker::tracker::{FeedEngine, FeedError, FeedSetting, FeedState, SETTINGS};

/// Application state holding the feed engine and the selector state
struct TrackerApp {
    engine: FeedEngine<EguiChartBackend>,
    /// Ticker shown in the selector
    selected: Option<String>,
}

impl TrackerApp {
    fn new(setting: &FeedSetting) -> Result<Self, FeedError> {
        let runtime = tokio::runtime::Handle::current();
        let datafeed = Arc::new(PriceRestClient::new(setting)?);

        let mut engine = FeedEngine::new(EguiChartBackend::new(), setting, datafeed, runtime)?;
        engine.start();
        info!("Feed engine started against {}", setting.host);

        Ok(Self {
            engine,
            selected: None,
        })
    }

    fn select(&mut self, ticker: String) {
        self.engine.select(&ticker);
        self.selected = Some(ticker);
    }

    fn show_selector(&mut self, ui: &mut egui::Ui) {
        let tickers = self.engine.tickers().to_vec();
        let mut choice = self.selected.clone();

        ui.horizontal(|ui| {
            ui.label("Ticker:");
            egui::ComboBox::from_id_salt("ticker_select")
                .selected_text(choice.clone().unwrap_or_default())
                .show_ui(ui, |ui| {
                    for ticker in &tickers {
                        ui.selectable_value(&mut choice, Some(ticker.clone()), ticker.as_str());
                    }
                });
        });

        if choice != self.selected {
            if let Some(ticker) = choice {
                self.select(ticker);
            }
        }
    }

    fn show_status(&self, ui: &mut egui::Ui) {
        let controller = self.engine.controller();
        ui.horizontal(|ui| {
            ui.label(format!("State: {:?}", controller.state()));
            ui.separator();

            let connection = controller.connection_state();
            let color = if connection.is_open() {
                Color32::from_rgb(80, 200, 120)
            } else {
                Color32::from_rgb(230, 80, 80)
            };
            ui.colored_label(color, format!("Stream: {}", connection.label()));

            ui.separator();
            ui.label(format!("Points: {}", controller.window().len()));

            if let Some(error) = controller.last_error() {
                ui.separator();
                ui.colored_label(Color32::YELLOW, error);
            }
        });
    }

    fn show_chart(&self, ui: &mut egui::Ui) {
        let controller = self.engine.controller();
        if let Some(chart) = controller.chart() {
            chart.show(ui);
            return;
        }

        ui.centered_and_justified(|ui| match controller.state() {
            FeedState::Loading => {
                ui.label(format!("Loading {}...", controller.ticker().unwrap_or_default()));
            }
            _ => {
                ui.label("Select a ticker");
            }
        });
    }
}

impl eframe::App for TrackerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.engine.process_events();

        // Select the first ticker once the list is known
        if let Some(ticker) = self.engine.initial_selection(self.selected.as_deref()) {
            self.select(ticker);
        }

        egui::TopBottomPanel::top("selector").show(ctx, |ui| {
            self.show_selector(ui);
        });
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.show_status(ui);
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_chart(ui);
        });

        // Keep draining stream events while idle
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Shutting down Price Tracker...");
        self.engine.dispose();
    }
}

/// Create native window options
fn create_native_options() -> eframe::NativeOptions {
    eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Price Tracker")
            .with_inner_size([1000.0, 640.0])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Create tokio runtime
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    init_logger(&SETTINGS)?;
    let setting = FeedSetting::from_settings(&SETTINGS)?;

    info!("Starting Price Tracker {}", price_tracker::VERSION);
    info!("Rust version: {}", rustc_version_runtime::version());

    eframe::run_native(
        "Price Tracker",
        create_native_options(),
        Box::new(move |_cc| Ok(Box::new(TrackerApp::new(&setting)?))),
    )
    .map_err(|e| format!("Failed to run application: {}", e))?;

    Ok(())
}
