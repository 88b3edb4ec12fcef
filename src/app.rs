use std::path::Path;
use std::sync::mpsc::Receiver;

use eframe::egui;
use egui::{Align, Layout, RichText};
use tracing::{debug, info, warn};

use crate::controller::{GenerationController, GenerationState, Submission};
use crate::conversation::ChatState;
use crate::document::DocumentExtractor;
use crate::events::{Speaker, TranscriptEntry, UiEvent};

pub const WINDOW_TITLE: &str = "Local AI Assistant";
const FONT_SIZE: f32 = 22.0;
const HISTORY_WIDTH: f32 = 300.0;

pub struct ChatApp {
    controller: GenerationController,
    extractor: Box<dyn DocumentExtractor>,
    events: Receiver<UiEvent>,
    state: ChatState,
    input: String,
}

impl ChatApp {
    pub fn new(
        controller: GenerationController,
        extractor: Box<dyn DocumentExtractor>,
        events: Receiver<UiEvent>,
    ) -> Self {
        Self {
            controller,
            extractor,
            events,
            state: ChatState::default(),
            input: String::new(),
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.state.apply(event);
        }
    }

    fn on_send(&mut self) -> Submission {
        let submission = self.controller.submit(&self.input);
        match &submission {
            Submission::Accepted(_) => self.input.clear(),
            Submission::Ignored(reason) => debug!(?reason, "send ignored"),
        }
        submission
    }

    fn on_upload(&mut self, path: &Path) {
        match self.extractor.extract_text(path) {
            Ok(text) => {
                info!(
                    "[PDF] extracted {} characters from {}",
                    text.chars().count(),
                    path.display()
                );
                self.controller.attach(text);
            }
            Err(e) => warn!("[PDF] could not extract text from {}: {e}", path.display()),
        }
    }

    fn on_close(&self, ctx: &egui::Context) {
        if self.controller.state() == GenerationState::Busy {
            warn!("closing while a generation is still running");
        }
        info!("closing window");
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn pick_pdf(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .set_title("Select PDF file")
            .add_filter("PDF Files", &["pdf"])
            .pick_file()
        {
            self.on_upload(&path);
        }
    }
}

pub fn apply_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    for font in style.text_styles.values_mut() {
        font.size = FONT_SIZE;
    }
    ctx.set_style(style);
}

fn render_entry(ui: &mut egui::Ui, entry: &TranscriptEntry) {
    match entry.speaker {
        Speaker::User => {
            ui.with_layout(Layout::top_down(Align::Max), |ui| {
                ui.label(entry.text.as_str());
            });
        }
        Speaker::Bot => {
            if let Some(elapsed) = entry.elapsed {
                ui.label(RichText::new(format!("({:.2} seconds)", elapsed.as_secs_f64())).weak());
            }
            ui.label(entry.text.as_str());
        }
        Speaker::System => {
            ui.label(RichText::new(entry.text.as_str()).italics().weak());
        }
    }
    ui.add_space(8.0);
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::SidePanel::left("history")
            .exact_width(HISTORY_WIDTH)
            .resizable(false)
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.heading("Chat History");
                });
                ui.with_layout(Layout::bottom_up(Align::Min), |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("Close").clicked() {
                            self.on_close(ctx);
                        }
                        ui.add_enabled(false, egui::Button::new("New Chat"))
                            .on_disabled_hover_text(
                                "Will be used with implementation of chat history",
                            );
                    });
                });
            });

        egui::TopBottomPanel::bottom("entry").show(ctx, |ui| {
            let enabled = self.state.inputs_enabled;
            let attached = self.controller.has_pending_document();

            ui.horizontal(|ui| {
                let upload_label = if attached { "Uploaded" } else { "Upload" };
                if ui
                    .add_enabled(!attached, egui::Button::new(upload_label))
                    .on_hover_text("Upload a .pdf document for text extraction")
                    .clicked()
                {
                    self.pick_pdf();
                }

                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    let send_label = if enabled { "Send" } else { "Sent" };
                    let send = ui.add_enabled(enabled, egui::Button::new(send_label));
                    let entry = ui.add_enabled(
                        enabled,
                        egui::TextEdit::singleline(&mut self.input).desired_width(f32::INFINITY),
                    );
                    let entered =
                        entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if send.clicked() || entered {
                        self.on_send();
                    }
                });
            });
            ui.label(self.state.timer_text.as_str());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for entry in self.state.log.entries() {
                        render_entry(ui, entry);
                    }
                    if self.state.is_waiting() {
                        ui.label(RichText::new("Thinking...").italics());
                    }
                });
        });
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::document::ExtractError;
    use crate::events::EventSink;
    use crate::llm::{GenerationError, GenerationRequest, InferenceRuntime};
    use crate::prompt;

    struct Canned;

    impl InferenceRuntime for Canned {
        fn generate(&self, _: &str, _: &GenerationRequest) -> Result<String, GenerationError> {
            Ok("Hello".to_string())
        }
    }

    struct FakeExtractor(Option<&'static str>);

    impl DocumentExtractor for FakeExtractor {
        fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
            self.0.map(str::to_string).ok_or_else(|| ExtractError::Load {
                path: path.to_path_buf(),
                reason: "not a pdf".to_string(),
            })
        }
    }

    fn app(extractor: FakeExtractor) -> ChatApp {
        let (events, rx) = EventSink::channel(|| {});
        let request = GenerationRequest {
            max_tokens: 16,
            stop: prompt::stop_sequences(),
            echo: false,
        };
        let controller = GenerationController::new(Arc::new(Canned), request, events);
        ChatApp::new(controller, Box::new(extractor), rx)
    }

    #[test]
    fn test_send_round_trip_updates_state() {
        let mut app = app(FakeExtractor(None));
        app.input = "Hi".to_string();

        match app.on_send() {
            Submission::Accepted(handle) => handle.join(),
            Submission::Ignored(reason) => panic!("ignored: {reason:?}"),
        }
        app.drain_events();

        assert!(app.input.is_empty());
        assert!(app.state.inputs_enabled);
        let entries = app.state.log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], TranscriptEntry::user("Hi"));
        assert_eq!(entries[1].speaker, Speaker::Bot);
        assert_eq!(entries[1].text, "Hello");
    }

    #[test]
    fn test_blank_input_is_kept_and_ignored() {
        let mut app = app(FakeExtractor(None));
        app.input = "   ".to_string();

        assert!(!app.on_send().is_accepted());
        app.drain_events();

        assert_eq!(app.input, "   ");
        assert!(app.state.log.is_empty());
    }

    #[test]
    fn test_upload_failure_leaves_no_trace() {
        let mut app = app(FakeExtractor(None));

        app.on_upload(&PathBuf::from("broken.pdf"));
        app.drain_events();

        assert!(!app.controller.has_pending_document());
        assert!(app.state.log.is_empty());
    }

    #[test]
    fn test_upload_success_attaches_document() {
        let mut app = app(FakeExtractor(Some("page text\n")));

        app.on_upload(&PathBuf::from("report.pdf"));

        assert!(app.controller.has_pending_document());
        assert!(app.state.log.is_empty());
    }
}
