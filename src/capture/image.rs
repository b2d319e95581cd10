//! Preview image type for the camera view

use image::RgbaImage;

use crate::scan::{RecognitionError, VideoFrame};

/// A preview picture with a display handle for the image widget
#[derive(Clone, Debug)]
pub struct PreviewImage {
    pub handle: cosmic::widget::image::Handle,
}

impl PreviewImage {
    /// Create a preview from a decoded image
    pub fn from_rgba(rgba: RgbaImage) -> Self {
        let (width, height) = rgba.dimensions();
        Self {
            handle: cosmic::widget::image::Handle::from_rgba(width, height, rgba.into_vec()),
        }
    }

    /// Create a preview from a live video frame
    pub fn from_frame(frame: &VideoFrame) -> Result<Self, RecognitionError> {
        frame.to_image().map(Self::from_rgba)
    }
}
