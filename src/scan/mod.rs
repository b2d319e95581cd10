//! Scan coordination
//!
//! This module contains:
//! - The scan coordinator state machine (coordinator.rs)
//! - Contracts for the capture session and recognizers (session.rs)
//! - Payloads, events and error kinds shared with the capture backend

pub mod coordinator;
pub mod error;
pub mod event;
pub mod payload;
pub mod session;

pub use coordinator::{Mode, ScanCoordinator, ScanOptions, ScanState};
pub use error::{ConfigurationError, RecognitionError};
pub use event::{
    EventSender, PayloadSource, RecognitionOutcome, RecognitionRequest, ScanEvent, ScanTicket,
};
pub use payload::{MetadataObject, PhotoData, Symbology, VideoFrame};
pub use session::{CaptureSession, DeviceProvider, OutputKind, TextRecognizer};
