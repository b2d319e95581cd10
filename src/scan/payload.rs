//! Payloads delivered by the capture session

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::error::RecognitionError;

/// Machine-readable code symbologies the metadata output can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbology {
    Qr,
    Ean8,
    Ean13,
    Pdf417,
}

impl Symbology {
    pub const ALL: [Symbology; 4] = [
        Symbology::Qr,
        Symbology::Ean8,
        Symbology::Ean13,
        Symbology::Pdf417,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Symbology::Qr => "QR",
            Symbology::Ean8 => "EAN-8",
            Symbology::Ean13 => "EAN-13",
            Symbology::Pdf417 => "PDF417",
        }
    }
}

/// A decoded machine-readable code reported by the metadata output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataObject {
    pub symbology: Symbology,
    /// Decoded string value, if the payload could be represented as text
    pub value: Option<String>,
}

impl MetadataObject {
    pub fn new(symbology: Symbology, value: impl Into<String>) -> Self {
        Self {
            symbology,
            value: Some(value.into()),
        }
    }
}

/// A raw RGBA video frame from the continuous frame output
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may be larger than `width * 4` when rows are padded
    pub stride: usize,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    /// Convert the frame into a tightly packed still image
    pub fn to_image(&self) -> Result<RgbaImage, RecognitionError> {
        let row_len = self.width as usize * 4;
        if self.width == 0 || self.height == 0 {
            return Err(RecognitionError::ImageConversion(
                "frame has no pixels".to_string(),
            ));
        }
        if self.stride < row_len {
            return Err(RecognitionError::ImageConversion(format!(
                "stride {} is smaller than row length {}",
                self.stride, row_len
            )));
        }

        let needed = self.stride * (self.height as usize - 1) + row_len;
        if self.data.len() < needed {
            return Err(RecognitionError::ImageConversion(format!(
                "frame holds {} bytes, {}x{} needs {}",
                self.data.len(),
                self.width,
                self.height,
                needed
            )));
        }

        let mut packed = Vec::with_capacity(row_len * self.height as usize);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            packed.extend_from_slice(&row[..row_len]);
        }

        RgbaImage::from_raw(self.width, self.height, packed).ok_or_else(|| {
            RecognitionError::ImageConversion("frame buffer size mismatch".to_string())
        })
    }
}

/// An encoded still photo from the photo output
#[derive(Debug, Clone)]
pub struct PhotoData {
    pub bytes: Arc<[u8]>,
}

impl PhotoData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Decode the photo into an image
    pub fn to_image(&self) -> Result<RgbaImage, RecognitionError> {
        image::load_from_memory(&self.bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| RecognitionError::ImageConversion(e.to_string()))
    }
}
