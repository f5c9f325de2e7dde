use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use restorer_contracts::events::{EventWriter, SessionEvent};
use restorer_contracts::image::{acquire, AcquisitionError, EncodedImage, ADVISORY_MAX_BYTES};
use restorer_contracts::outcome::RestorationOutcome;
use restorer_contracts::session::{Completion, RestoreTicket, Session, SessionError};

pub mod config;
pub mod gemini;

pub use config::{ConfigError, RestorerConfig};
pub use gemini::GeminiRestorer;

/// Performs exactly one restoration request per call.
pub trait RestorationClient: Send + Sync {
    fn name(&self) -> &str;
    fn restore(&self, image: &EncodedImage) -> RestorationOutcome;
}

/// Owns the session state, the restoration client and the event log.
///
/// Every transition goes through here so the event log mirrors what the user
/// saw. Rendering borrows [`Session`] through [`RestorationController::session`].
pub struct RestorationController {
    session: Session,
    client: Arc<dyn RestorationClient>,
    events: EventWriter,
}

impl RestorationController {
    pub fn new(client: Arc<dyn RestorationClient>, events: EventWriter) -> Result<Self> {
        events.record(&SessionEvent::SessionStarted {
            client: client.name().to_string(),
        })?;
        Ok(Self {
            session: Session::new(),
            client,
            events,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reads and stages a user-selected file. Non-image files are rejected;
    /// on any failure the current state is kept and the error banner set.
    pub fn select_file(&mut self, path: &Path) -> Result<(), AcquisitionError> {
        let acquired = acquire(path).and_then(|staged| {
            if staged.image.is_image() {
                Ok(staged)
            } else {
                Err(AcquisitionError::UnsupportedType {
                    file_name: staged.file_name,
                    mime_type: staged.image.mime_type().to_string(),
                })
            }
        });

        let staged = match acquired {
            Ok(staged) => staged,
            Err(err) => {
                log::error!("{err}");
                self.session.record_acquisition_failure(err.to_string());
                self.emit(SessionEvent::ImageRejected {
                    path: path.to_string_lossy().into_owned(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let size_bytes = staged.image.len() as u64;
        let oversized = size_bytes > ADVISORY_MAX_BYTES;
        if oversized {
            log::warn!(
                "{} is {size_bytes} bytes, above the advisory {ADVISORY_MAX_BYTES} byte limit",
                staged.file_name
            );
        }
        let dimensions = staged.image.dimensions();
        self.emit(SessionEvent::ImageStaged {
            path: path.to_string_lossy().into_owned(),
            file_name: staged.file_name.clone(),
            mime_type: staged.image.mime_type().to_string(),
            size_bytes,
            width: dimensions.map(|(width, _)| width),
            height: dimensions.map(|(_, height)| height),
            oversized,
            abandoned_in_flight: self.session.in_flight().is_some(),
        });
        self.session.stage(staged);
        Ok(())
    }

    /// Moves the session into `Restoring` and returns the work to perform.
    pub fn begin_restore(&mut self) -> Result<RestoreTicket, SessionError> {
        match self.session.begin_restore() {
            Ok(ticket) => {
                self.emit(SessionEvent::RestoreStarted {
                    attempt: ticket.attempt,
                    client: self.client.name().to_string(),
                    mime_type: ticket.image.mime_type().to_string(),
                    size_bytes: ticket.image.len() as u64,
                });
                Ok(ticket)
            }
            Err(err) => {
                self.emit(SessionEvent::RestoreRejected {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Applies an outcome. Outcomes for an image that has since been
    /// replaced come back as [`Completion::Stale`] and change nothing
    /// except releasing the in-flight slot.
    pub fn finish_restore(&mut self, attempt: u64, outcome: RestorationOutcome) -> Completion {
        let kind = outcome.kind();
        let completion = self.session.complete_restore(attempt, outcome);
        let event = match completion {
            Completion::Stale => SessionEvent::RestoreDiscarded {
                attempt,
                outcome: kind,
            },
            Completion::Applied => match self.session.restored() {
                Some(restored) => {
                    let dimensions = restored.dimensions();
                    SessionEvent::RestoreSucceeded {
                        attempt,
                        mime_type: restored.mime_type().to_string(),
                        size_bytes: restored.len() as u64,
                        width: dimensions.map(|(width, _)| width),
                        height: dimensions.map(|(_, height)| height),
                        download_name: self.session.download_file_name(),
                    }
                }
                None => SessionEvent::RestoreFailed {
                    attempt,
                    outcome: kind,
                    error: self.session.error().map(str::to_string),
                },
            },
        };
        self.emit(event);
        completion
    }

    /// Runs the request on a worker thread and hands the outcome to
    /// `on_done`; the caller feeds it back through [`Self::finish_restore`].
    pub fn spawn_restore<F>(&mut self, on_done: F) -> Result<u64, SessionError>
    where
        F: FnOnce(u64, RestorationOutcome) + Send + 'static,
    {
        let ticket = self.begin_restore()?;
        let client = Arc::clone(&self.client);
        let attempt = ticket.attempt;
        thread::spawn(move || {
            let outcome = client.restore(&ticket.image);
            on_done(ticket.attempt, outcome);
        });
        Ok(attempt)
    }

    /// Issues the request on the calling thread.
    pub fn restore_blocking(&mut self) -> Result<Completion, SessionError> {
        let ticket = self.begin_restore()?;
        let outcome = self.client.restore(&ticket.image);
        Ok(self.finish_restore(ticket.attempt, outcome))
    }

    /// Writes the restored image. A directory target, existing or spelled
    /// with a trailing separator, receives the suggested download name;
    /// anything else is used as the file path.
    pub fn save_restored(&mut self, target: &Path) -> Result<PathBuf> {
        let restored = self
            .session
            .restored()
            .ok_or(SessionError::NothingRestored)?;
        let path = if target.is_dir() || names_directory(target) {
            target.join(self.session.download_file_name())
        } else {
            target.to_path_buf()
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, restored.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.emit(SessionEvent::RestoredImageSaved {
            path: path.to_string_lossy().into_owned(),
            mime_type: restored.mime_type().to_string(),
            size_bytes: restored.len() as u64,
        });
        Ok(path)
    }

    pub fn finish(&self) -> Result<()> {
        self.events.record(&SessionEvent::SessionFinished {
            attempts: self.session.attempts(),
            phase: self.session.phase(),
            abandoned_in_flight: self.session.in_flight().is_some(),
        })?;
        Ok(())
    }

    /// The event log is best effort for UI transitions; a write failure is
    /// logged and the transition still happens.
    fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.events.record(&event) {
            log::warn!("failed to record session event: {err:#}");
        }
    }
}

fn names_directory(target: &Path) -> bool {
    target
        .as_os_str()
        .to_string_lossy()
        .chars()
        .last()
        .is_some_and(std::path::is_separator)
}
