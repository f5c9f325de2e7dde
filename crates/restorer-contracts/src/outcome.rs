use crate::image::EncodedImage;

pub const GENERIC_RESTORE_FAILURE: &str = "Failed to restore photo. The API call returned an error.";

/// Result of one restoration attempt, decoded once at the network boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorationOutcome {
    Restored(EncodedImage),
    /// The model answered with text instead of an image.
    Declined(String),
    /// Neither image nor text came back.
    Empty,
    TransportError(String),
}

impl RestorationOutcome {
    /// Builds a transport outcome, substituting a generic message when the
    /// underlying failure carries no description.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::TransportError(GENERIC_RESTORE_FAILURE.to_string())
        } else {
            Self::TransportError(message.trim().to_string())
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Restored(_) => "restored",
            Self::Declined(_) => "declined",
            Self::Empty => "empty",
            Self::TransportError(_) => "transport_error",
        }
    }

    pub fn into_result(self) -> Result<EncodedImage, RestoreFailure> {
        match self {
            Self::Restored(image) => Ok(image),
            Self::Declined(text) => Err(RestoreFailure::Declined(text)),
            Self::Empty => Err(RestoreFailure::NoUsableResponse),
            Self::TransportError(message) => Err(RestoreFailure::Transport(message)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestoreFailure {
    #[error("The model couldn't restore the photo and responded with: \"{0}\"")]
    Declined(String),
    #[error("No image data found in the API response. The model may have failed to process the request.")]
    NoUsableResponse,
    #[error("{0}")]
    Transport(String),
}
