use thiserror::Error;

/// Failures surfaced to the user for a single submission attempt.
///
/// The display strings double as the notification text shown in the UI. None
/// of these are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("The uploaded image exceeds the 5MB size limit. Please upload a smaller image.")]
    Validation { size: u64, limit: u64 },
    #[error("Please upload an image or select a sample.")]
    MissingInput,
    #[error("Please enter a prompt.")]
    MissingPrompt,
    #[error("A generation is already in progress.")]
    Busy,
    #[error("An error occurred while generating the image. Please try again.")]
    GenerationService(String),
}

impl SessionError {
    /// Extra context for logs; the display string stays user-facing.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Validation { size, limit } => Some(format!("{size} bytes > {limit} bytes")),
            Self::GenerationService(cause) => Some(cause.clone()),
            _ => None,
        }
    }
}
