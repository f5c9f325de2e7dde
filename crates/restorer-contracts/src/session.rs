use serde::Serialize;

use crate::image::{EncodedImage, StagedImage};
use crate::outcome::{RestorationOutcome, RestoreFailure};

pub const FALLBACK_DOWNLOAD_NAME: &str = "restored-photo.png";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Please upload an image first.")]
    NothingStaged,
    #[error("A restoration is already in progress.")]
    RestoreInFlight,
    #[error("There is no restored image to save yet.")]
    NothingRestored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Previewing {
        staged: StagedImage,
    },
    Restoring {
        staged: StagedImage,
        attempt: u64,
    },
    Restored {
        staged: StagedImage,
        restored: EncodedImage,
    },
}

/// Coarse view of the session used for rendering and the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Empty,
    Previewing,
    PreviewingWithError,
    Restoring,
    Restored,
}

/// Handed out when a restore begins; the attempt number ties the eventual
/// outcome back to the image it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreTicket {
    pub attempt: u64,
    pub image: EncodedImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The image was replaced while the request was in flight.
    Stale,
}

/// UI state for one user session.
///
/// Only the owning controller mutates it; renderers borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    error: Option<String>,
    attempts: u64,
    /// Attempt whose request has not settled yet. Survives `stage`, so a
    /// replaced image cannot start a second request alongside it.
    in_flight: Option<u64>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            error: None,
            attempts: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.state {
            SessionState::Empty => SessionPhase::Empty,
            SessionState::Previewing { .. } if self.error.is_some() => {
                SessionPhase::PreviewingWithError
            }
            SessionState::Previewing { .. } => SessionPhase::Previewing,
            SessionState::Restoring { .. } => SessionPhase::Restoring,
            SessionState::Restored { .. } => SessionPhase::Restored,
        }
    }

    pub fn staged(&self) -> Option<&StagedImage> {
        match &self.state {
            SessionState::Empty => None,
            SessionState::Previewing { staged }
            | SessionState::Restoring { staged, .. }
            | SessionState::Restored { staged, .. } => Some(staged),
        }
    }

    pub fn restored(&self) -> Option<&EncodedImage> {
        match &self.state {
            SessionState::Restored { restored, .. } => Some(restored),
            _ => None,
        }
    }

    pub fn is_restoring(&self) -> bool {
        matches!(self.state, SessionState::Restoring { .. })
    }

    /// The attempt still awaiting its outcome, including one abandoned by
    /// replacing the image.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Stages a new image from any state, dropping any restored result and
    /// error. An in-flight attempt is abandoned, not cancelled, and keeps
    /// blocking new restores until its outcome arrives.
    pub fn stage(&mut self, staged: StagedImage) {
        self.state = SessionState::Previewing { staged };
        self.error = None;
    }

    /// Surfaces a failed file selection without touching the current state.
    pub fn record_acquisition_failure(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn begin_restore(&mut self) -> Result<RestoreTicket, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::RestoreInFlight);
        }
        let staged = match &self.state {
            SessionState::Empty => {
                self.error = Some(SessionError::NothingStaged.to_string());
                return Err(SessionError::NothingStaged);
            }
            SessionState::Restoring { .. } => return Err(SessionError::RestoreInFlight),
            SessionState::Previewing { staged } | SessionState::Restored { staged, .. } => {
                staged.clone()
            }
        };

        self.attempts += 1;
        self.in_flight = Some(self.attempts);
        let ticket = RestoreTicket {
            attempt: self.attempts,
            image: staged.image.clone(),
        };
        self.state = SessionState::Restoring {
            staged,
            attempt: self.attempts,
        };
        self.error = None;
        Ok(ticket)
    }

    pub fn complete_restore(&mut self, attempt: u64, outcome: RestorationOutcome) -> Completion {
        if self.in_flight == Some(attempt) {
            self.in_flight = None;
        }
        let staged = match &self.state {
            SessionState::Restoring {
                staged,
                attempt: current,
            } if *current == attempt => staged.clone(),
            _ => return Completion::Stale,
        };

        match outcome.into_result() {
            Ok(restored) => {
                self.state = SessionState::Restored { staged, restored };
                self.error = None;
            }
            Err(failure) => {
                self.state = SessionState::Previewing { staged };
                self.error = Some(failure_banner(&failure));
            }
        }
        Completion::Applied
    }

    /// Suggested file name for saving the restored image.
    pub fn download_file_name(&self) -> String {
        match &self.state {
            SessionState::Restored { staged, restored } => {
                restored_file_name(&staged.file_name, Some(restored.mime_type()))
            }
            _ => FALLBACK_DOWNLOAD_NAME.to_string(),
        }
    }
}

pub fn failure_banner(failure: &RestoreFailure) -> String {
    format!("Restoration failed: {failure}")
}

/// `<base>-restored.<ext>`, where `base` drops the original's last extension
/// and `ext` follows the restored MIME subtype (`png` when unreported).
pub fn restored_file_name(original: &str, restored_mime: Option<&str>) -> String {
    let base = match original.rfind('.') {
        Some(idx) => &original[..idx],
        None => original,
    };
    let extension = crate::image::extension_for_mime(restored_mime);
    format!("{base}-restored.{extension}")
}
