use crate::{
    error::SessionError,
    session::{GenerationRequest, GenerationSession, UploadedFile},
    types::SAMPLE_INPUTS,
};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_STATUS_LINES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Prompt,
    ImagePath,
    Samples,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Self::Prompt => Self::ImagePath,
            Self::ImagePath => Self::Samples,
            Self::Samples => Self::Prompt,
        }
    }
}

/// Blocking-style message shown until the next key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub is_error: bool,
}

#[derive(Debug)]
pub struct AppState {
    pub session: GenerationSession,
    pub focus: Focus,
    pub path_input: String,
    pub sample_cursor: usize,
    pub status_lines: Vec<String>,
    pub notice: Option<Notice>,
    service_base: String,
}

impl AppState {
    pub fn new(service_base: impl Into<String>) -> Self {
        Self {
            session: GenerationSession::new(),
            focus: Focus::Prompt,
            path_input: String::new(),
            sample_cursor: 0,
            status_lines: Vec::new(),
            notice: None,
            service_base: service_base.into(),
        }
    }

    pub fn service_base(&self) -> &str {
        &self.service_base
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Error(message) => {
                self.push_status_line(format!("Error: {message}"));
                self.notify(message, true);
            }
            AppEvent::ClockTick => {
                self.session.tick();
            }
            AppEvent::GenerationSucceeded { display_url } => {
                let elapsed = self.session.elapsed_seconds();
                if self.session.resolve_success(display_url.clone()) {
                    self.push_status_line(format!("Generated in {elapsed}s → {display_url}"));
                }
            }
            AppEvent::GenerationFailed { message } => {
                if self.session.resolve_failure() {
                    let err = SessionError::GenerationService(message);
                    self.report(&err);
                }
            }
            AppEvent::Downloaded { path } => {
                self.push_status_line(format!("Saved {}", path.display()));
                self.notify(format!("Image saved to {}", path.display()), false);
            }
        }
    }

    pub fn upload_from_input(&mut self) {
        let raw = self.path_input.trim().to_string();
        if raw.is_empty() {
            return;
        }
        self.upload(Path::new(&raw));
    }

    pub fn upload(&mut self, path: &Path) {
        let file = match UploadedFile::inspect(path) {
            Ok(file) => file,
            Err(err) => {
                warn!("failed to inspect upload: {err:#}");
                self.push_status_line(format!("Error: {err:#}"));
                self.notify(format!("{err:#}"), true);
                return;
            }
        };
        let name = file.file_name.clone();
        match self.session.select_uploaded_image(file) {
            Ok(()) => self.push_status_line(format!("Selected {name}")),
            Err(err) => self.report(&err),
        }
    }

    pub fn choose_sample(&mut self, index: usize) -> bool {
        let Some(sample) = SAMPLE_INPUTS.get(index) else {
            return false;
        };
        self.sample_cursor = index;
        self.session.select_sample(sample.image, sample.prompt);
        self.push_status_line(format!("Sample {} selected ({})", index + 1, sample.label()));
        true
    }

    pub fn move_sample_cursor(&mut self, forward: bool) {
        let len = SAMPLE_INPUTS.len();
        self.sample_cursor = if forward {
            (self.sample_cursor + 1) % len
        } else if self.sample_cursor == 0 {
            len - 1
        } else {
            self.sample_cursor - 1
        };
    }

    pub fn push_prompt_char(&mut self, c: char) {
        let mut text = self.session.prompt().to_string();
        text.push(c);
        self.session.update_prompt(text);
    }

    pub fn pop_prompt_char(&mut self) {
        let mut text = self.session.prompt().to_string();
        text.pop();
        self.session.update_prompt(text);
    }

    pub fn submit(&mut self) -> Option<AppCommand> {
        match self.session.begin_submission() {
            Ok(request) => {
                info!("generation submitted");
                self.push_status_line("Generating your image...".to_string());
                Some(AppCommand::Generate(request))
            }
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// No command and no notice when there is nothing to save.
    pub fn request_download(&mut self) -> Option<AppCommand> {
        let result = self.session.download_target()?;
        Some(AppCommand::Download { display_url: result.display_url.clone() })
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn push_status_line(&mut self, line: String) {
        let stamp: DateTime<Local> = Local::now();
        self.status_lines.push(format!("{} {line}", stamp.format("%H:%M:%S")));
        if self.status_lines.len() > MAX_STATUS_LINES {
            let overflow = self.status_lines.len() - MAX_STATUS_LINES;
            self.status_lines.drain(0..overflow);
        }
    }

    fn report(&mut self, err: &SessionError) {
        let line = match err.detail() {
            Some(detail) => format!("{err} ({detail})"),
            None => err.to_string(),
        };
        warn!("{line}");
        self.push_status_line(format!("Error: {line}"));
        self.notify(err.to_string(), true);
    }

    fn notify(&mut self, message: String, is_error: bool) {
        self.notice = Some(Notice { message, is_error });
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Error(String),
    ClockTick,
    GenerationSucceeded { display_url: String },
    GenerationFailed { message: String },
    Downloaded { path: PathBuf },
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Generate(GenerationRequest),
    Download { display_url: String },
}
