//! Contracts for the camera and recognizer services the coordinator drives

use std::fmt;

use super::error::{ConfigurationError, RecognitionError};
use super::event::RecognitionRequest;
use super::payload::Symbology;

/// Outputs a capture session can feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Machine-readable code detection limited to the given symbologies
    Metadata(Vec<Symbology>),
    /// Single still photos on request
    Photo,
    /// Continuous raw video frames
    Frames,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Metadata(symbologies) => {
                let names: Vec<&str> = symbologies.iter().map(Symbology::name).collect();
                write!(f, "code detection ({})", names.join(", "))
            }
            OutputKind::Photo => f.write_str("photo"),
            OutputKind::Frames => f.write_str("video frame"),
        }
    }
}

/// Source of video capture devices
pub trait DeviceProvider {
    type Device;

    fn default_video_device(&self) -> Option<Self::Device>;
}

/// A live camera pipeline.
///
/// `start`, `stop` and `capture_photo` return immediately; the session
/// reports back through its event channel.
pub trait CaptureSession {
    type Device;

    fn can_attach_input(&self, device: &Self::Device) -> bool;
    fn attach_input(&mut self, device: Self::Device) -> Result<(), ConfigurationError>;

    fn can_attach_output(&self, output: &OutputKind) -> bool;
    fn attach_output(&mut self, output: OutputKind) -> Result<(), ConfigurationError>;

    fn start(&self);
    fn stop(&self);
    fn capture_photo(&self);
}

/// Asynchronous text recognition service. Results come back as
/// [`ScanEvent::TextRecognized`](super::event::ScanEvent::TextRecognized).
pub trait TextRecognizer {
    fn submit(&self, request: RecognitionRequest) -> Result<(), RecognitionError>;
}
