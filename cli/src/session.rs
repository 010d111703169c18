use crate::error::SessionError;
use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// A local file picked by the user, inspected but not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl UploadedFile {
    pub fn inspect(path: &Path) -> Result<Self> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        let metadata =
            fs::metadata(&path).with_context(|| format!("failed to stat {}", path.display()))?;
        if !metadata.is_file() {
            return Err(anyhow!("{} is not a file", path.display()));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.png".to_string());
        Ok(Self { path, file_name, size: metadata.len() })
    }

    fn preview(&self) -> String {
        Url::from_file_path(&self.path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputImage {
    Uploaded { file: UploadedFile, preview: String },
    Sample { preview: String },
}

impl InputImage {
    pub fn preview(&self) -> &str {
        match self {
            Self::Uploaded { preview, .. } | Self::Sample { preview } => preview,
        }
    }
}

/// Where the `product_image` bytes come from for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(UploadedFile),
    Sample(String),
}

/// Built once per submit and handed to the controller; not kept afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub source: ImageSource,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub display_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    InFlight,
    Resolved,
    Failed,
}

impl SessionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::InFlight => "Generating",
            Self::Resolved => "Done",
            Self::Failed => "Failed",
        }
    }
}

/// State of one generation session: the chosen image, the prompt, the last
/// result and the elapsed clock of the current submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSession {
    input: Option<InputImage>,
    prompt: String,
    result: Option<GenerationResult>,
    in_flight: bool,
    clock: u64,
    phase: SessionPhase,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_uploaded_image(&mut self, file: UploadedFile) -> Result<(), SessionError> {
        if file.size > MAX_UPLOAD_BYTES {
            return Err(SessionError::Validation { size: file.size, limit: MAX_UPLOAD_BYTES });
        }
        let preview = file.preview();
        self.input = Some(InputImage::Uploaded { file, preview });
        self.settle();
        Ok(())
    }

    pub fn select_sample(&mut self, image: &str, text: &str) {
        self.input = Some(InputImage::Sample { preview: image.to_string() });
        self.prompt = text.to_string();
        self.result = None;
        self.settle();
    }

    pub fn update_prompt(&mut self, text: impl Into<String>) {
        self.prompt = text.into();
        self.settle();
    }

    /// Validates the inputs and moves into the in-flight state.
    ///
    /// Clears the previous result before the call goes out, so a failed
    /// attempt leaves the output empty.
    pub fn begin_submission(&mut self) -> Result<GenerationRequest, SessionError> {
        if self.in_flight {
            return Err(SessionError::Busy);
        }
        let source = match &self.input {
            None => return Err(SessionError::MissingInput),
            Some(InputImage::Uploaded { file, .. }) => ImageSource::File(file.clone()),
            Some(InputImage::Sample { preview }) => ImageSource::Sample(preview.clone()),
        };
        if self.prompt.is_empty() {
            return Err(SessionError::MissingPrompt);
        }

        self.in_flight = true;
        self.clock = 0;
        self.result = None;
        self.phase = SessionPhase::InFlight;
        Ok(GenerationRequest { source, prompt: self.prompt.clone() })
    }

    /// Advances the clock by one second. Ignored once the submission settled.
    pub fn tick(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        self.clock += 1;
        true
    }

    pub fn resolve_success(&mut self, display_url: String) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        self.result = Some(GenerationResult { display_url });
        self.phase = SessionPhase::Resolved;
        true
    }

    pub fn resolve_failure(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        self.phase = SessionPhase::Failed;
        true
    }

    pub fn download_target(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn input(&self) -> Option<&InputImage> {
        self.input.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.clock
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    // A finished cycle returns to idle on the next user action.
    fn settle(&mut self) {
        if !self.in_flight {
            self.phase = SessionPhase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&vec![7u8; len]).unwrap();
        path
    }

    fn ready_session() -> GenerationSession {
        let mut session = GenerationSession::new();
        session.select_sample("/cat_subject.png", "A photo of a cat.");
        session
    }

    #[test]
    fn accepts_upload_at_the_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "chair.png", MAX_UPLOAD_BYTES as usize);
        let file = UploadedFile::inspect(&path).unwrap();

        let mut session = GenerationSession::new();
        session.select_uploaded_image(file.clone()).unwrap();

        let Some(InputImage::Uploaded { file: stored, preview }) = session.input() else {
            panic!("expected uploaded input");
        };
        assert_eq!(stored, &file);
        let preview_path = Url::parse(preview).unwrap().to_file_path().unwrap();
        assert_eq!(fs::read(preview_path).unwrap().len(), MAX_UPLOAD_BYTES as usize);
    }

    #[test]
    fn rejects_oversized_upload_and_keeps_previous_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "huge.png", MAX_UPLOAD_BYTES as usize + 1);
        let file = UploadedFile::inspect(&path).unwrap();

        let mut session = ready_session();
        let before = session.clone();
        let err = session.select_uploaded_image(file).unwrap_err();

        assert_eq!(
            err,
            SessionError::Validation { size: MAX_UPLOAD_BYTES + 1, limit: MAX_UPLOAD_BYTES }
        );
        assert_eq!(session, before);
    }

    #[test]
    fn upload_keeps_prompt_and_previous_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "small.jpg", 16);
        let mut session = ready_session();
        session.begin_submission().unwrap();
        session.resolve_success("http://localhost:8000/a.png?t=1".into());

        session.select_uploaded_image(UploadedFile::inspect(&path).unwrap()).unwrap();

        assert_eq!(session.prompt(), "A photo of a cat.");
        assert!(session.result().is_some());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn inspect_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UploadedFile::inspect(dir.path()).is_err());
    }

    #[test]
    fn select_sample_is_idempotent() {
        let mut once = GenerationSession::new();
        once.select_sample("/alpaca.jpg", "An alpaca.");

        let mut many = GenerationSession::new();
        for _ in 0..5 {
            many.select_sample("/alpaca.jpg", "An alpaca.");
        }
        assert_eq!(once, many);
    }

    #[test]
    fn select_sample_replaces_prompt_and_clears_result() {
        let mut session = ready_session();
        session.begin_submission().unwrap();
        session.resolve_success("http://localhost:8000/x.png?t=2".into());

        session.select_sample("/alpaca.jpg", "An alpaca.");

        assert_eq!(session.prompt(), "An alpaca.");
        assert_eq!(session.input().map(InputImage::preview), Some("/alpaca.jpg"));
        assert!(session.result().is_none());
    }

    #[test]
    fn submit_without_input_fails_regardless_of_prompt() {
        for prompt in ["", "A photo of a lamp."] {
            let mut session = GenerationSession::new();
            session.update_prompt(prompt);
            assert_eq!(session.begin_submission(), Err(SessionError::MissingInput));
            assert!(!session.is_in_flight());
        }
    }

    #[test]
    fn submit_with_empty_prompt_fails() {
        let mut session = ready_session();
        session.update_prompt("");
        assert_eq!(session.begin_submission(), Err(SessionError::MissingPrompt));
        assert!(!session.is_in_flight());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn submit_builds_request_and_resets_clock() {
        let mut session = ready_session();
        session.begin_submission().unwrap();
        session.tick();
        session.tick();
        session.resolve_failure();

        let request = session.begin_submission().unwrap();
        assert_eq!(request.source, ImageSource::Sample("/cat_subject.png".into()));
        assert_eq!(request.prompt, "A photo of a cat.");
        assert_eq!(session.elapsed_seconds(), 0);
        assert_eq!(session.phase(), SessionPhase::InFlight);
    }

    #[test]
    fn rejects_reentrant_submission() {
        let mut session = ready_session();
        session.begin_submission().unwrap();
        assert_eq!(session.begin_submission(), Err(SessionError::Busy));
        assert!(session.is_in_flight());
    }

    #[test]
    fn clock_stops_once_resolved() {
        let mut session = ready_session();
        session.begin_submission().unwrap();
        for expected in 1..=3 {
            assert!(session.tick());
            assert_eq!(session.elapsed_seconds(), expected);
        }
        session.resolve_success("http://localhost:8000/r.png?t=3".into());

        assert!(!session.tick());
        assert_eq!(session.elapsed_seconds(), 3);
    }

    #[test]
    fn failure_leaves_result_absent() {
        let mut session = ready_session();
        session.begin_submission().unwrap();
        session.resolve_success("http://localhost:8000/first.png?t=1".into());

        session.begin_submission().unwrap();
        assert!(session.result().is_none());
        session.resolve_failure();

        assert!(session.result().is_none());
        assert!(!session.is_in_flight());
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert!(session.download_target().is_none());
    }

    #[test]
    fn late_resolution_is_ignored() {
        let mut session = ready_session();
        assert!(!session.resolve_success("http://localhost:8000/stale.png".into()));
        assert!(session.result().is_none());
    }
}
