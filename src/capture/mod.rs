//! Camera capture and recognition backends
//!
//! This module consolidates:
//! - GStreamer capture session (pipeline.rs)
//! - Camera discovery (device.rs)
//! - Machine-readable code detection (codes.rs)
//! - OCR text recognition (ocr.rs)
//! - Preview image type (image.rs)

pub mod codes;
pub mod device;
pub mod image;
pub mod ocr;
pub mod pipeline;

pub use device::GstDeviceProvider;
pub use image::PreviewImage;
pub use ocr::{OcrSettings, OcrWorker};
pub use pipeline::{GstCaptureSession, PipelineSettings};
