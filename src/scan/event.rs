//! Events flowing from the capture and recognizer threads to the UI

use image::RgbaImage;

use super::coordinator::Mode;
use super::error::{ConfigurationError, RecognitionError};
use super::payload::{MetadataObject, PhotoData, VideoFrame};

/// Channel used by background threads to reach the UI
pub type EventSender = tokio::sync::mpsc::Sender<ScanEvent>;

/// Identifies the scan a recognition request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    pub mode: Mode,
    pub epoch: u64,
}

/// Where an image handed to the recognizer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Frame,
    Photo,
}

/// An image queued for text recognition
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub ticket: ScanTicket,
    pub source: PayloadSource,
    pub image: RgbaImage,
}

/// The recognizer's answer to a [`RecognitionRequest`]
#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub ticket: ScanTicket,
    pub source: PayloadSource,
    /// Best candidate string per detected text region
    pub result: Result<Vec<String>, RecognitionError>,
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Decoded codes from the metadata output
    Metadata(Vec<MetadataObject>),
    /// A frame from the continuous frame output
    Frame(VideoFrame),
    /// A still photo requested with `capture_photo`
    Photo(PhotoData),
    /// Text recognition finished
    TextRecognized(RecognitionOutcome),
    /// The pipeline started or stopped
    SessionRunning(bool),
    /// The pipeline could not start or broke down while running
    SessionFailed(ConfigurationError),
}
