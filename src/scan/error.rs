//! Error kinds surfaced by the scanner

use thiserror::Error;

use super::session::OutputKind;

/// The camera pipeline could not be set up. Capture stays disabled for the
/// lifetime of the window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No video capture device is available
    #[error("No camera was found")]
    NoDevice,

    /// The session refused the camera as an input
    #[error("The camera could not be attached: {0}")]
    InputRejected(String),

    /// The session refused one of its outputs
    #[error("The {output} output could not be attached: {reason}")]
    OutputRejected { output: OutputKind, reason: String },

    /// The capture pipeline itself is unusable
    #[error("The capture pipeline could not be created: {0}")]
    Pipeline(String),

    /// The camera stopped working after it was configured
    #[error("The camera is not available: {0}")]
    DeviceUnavailable(String),
}

/// One payload could not be recognized. The payload is dropped and scanning
/// carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The payload could not be turned into an image
    #[error("Image conversion failed: {0}")]
    ImageConversion(String),

    /// The recognizer is still working on an earlier frame
    #[error("The text recognizer is busy")]
    Busy,

    /// The recognizer rejected or failed the request
    #[error("Text recognition failed: {0}")]
    RequestFailed(String),

    /// The recognizer worker is gone
    #[error("The text recognizer is not running")]
    WorkerUnavailable,
}
