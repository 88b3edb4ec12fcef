mod app;
mod cli;
mod controller;
mod conversation;
mod document;
mod events;
mod llm;
mod logging;
mod prompt;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use eframe::egui;
use tracing::info;

use crate::app::ChatApp;
use crate::controller::GenerationController;
use crate::document::PdfiumExtractor;
use crate::events::EventSink;
use crate::llm::{InferenceRuntime, Llm};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init_tracing();

    // Only load the model once, every generation reuses it
    let runtime: Arc<dyn InferenceRuntime> = Arc::new(Llm::new(args.model_settings())?);
    let request = args.generation_request();
    let extractor = PdfiumExtractor::new(args.pdfium_lib.clone());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(app::WINDOW_TITLE)
            .with_inner_size([1500.0, 900.0]),
        ..Default::default()
    };

    eframe::run_native(
        app::WINDOW_TITLE,
        options,
        Box::new(move |cc| {
            app::apply_style(&cc.egui_ctx);

            let ctx = cc.egui_ctx.clone();
            let (events, rx) = EventSink::channel(move || ctx.request_repaint());
            let controller = GenerationController::new(runtime, request, events);

            Box::new(ChatApp::new(controller, Box::new(extractor), rx))
        }),
    )
    .map_err(|e| anyhow::anyhow!("ui event loop failed: {e}"))?;

    info!("cleaning up resources and exiting");
    Ok(())
}
