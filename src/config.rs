//! Configuration persistence for snapscan settings

use cosmic::cosmic_config::{self, CosmicConfigEntry, cosmic_config_derive::CosmicConfigEntry};
use serde::{Deserialize, Serialize};

use crate::capture::{OcrSettings, PipelineSettings};
use crate::scan::{ScanOptions, Symbology};

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, CosmicConfigEntry)]
#[version = 1]
pub struct ScannerConfig {
    /// Start scanning barcodes as soon as the camera is ready
    pub scan_on_launch: bool,
    /// Keep scanning after the first barcode (each new code replaces the result)
    pub continuous_barcode: bool,
    /// Code symbologies reported by the detector
    pub symbologies: Vec<Symbology>,
    /// Recognize text continuously from the live video while scanning text
    pub text_from_video: bool,
    /// Only every Nth live frame is sent to the text recognizer
    #[serde(default = "default_text_frame_interval")]
    pub text_frame_interval: u32,
    /// Tesseract language code(s)
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    /// Frames are downsampled to this size before QR detection (0 = full size)
    #[serde(default = "default_qr_max_dimension")]
    pub qr_max_dimension: u32,
    /// Camera display name to use instead of the first camera found
    #[serde(default)]
    pub preferred_camera: Option<String>,
}

fn default_text_frame_interval() -> u32 {
    15 // about two attempts per second at 30 fps
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_qr_max_dimension() -> u32 {
    800
}

impl ScannerConfig {
    /// Configuration ID for cosmic-config
    pub const ID: &'static str = "io.github.hojjatabdollahi.snapscan";

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        match cosmic_config::Config::new(Self::ID, Self::VERSION) {
            Ok(config) => match Self::get_entry(&config) {
                Ok(entry) => entry,
                Err((errs, entry)) => {
                    log::warn!("Error loading config, using defaults: {:?}", errs);
                    entry
                }
            },
            Err(err) => {
                log::warn!("Could not create config handler: {:?}", err);
                Self::default()
            }
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            continuous_barcode: self.continuous_barcode,
            symbologies: self.symbologies.clone(),
            text_from_video: self.text_from_video,
            text_frame_interval: self.text_frame_interval.max(1),
        }
    }

    pub fn ocr_settings(&self) -> OcrSettings {
        let language = self.ocr_language.trim();
        OcrSettings {
            language: if language.is_empty() {
                default_ocr_language()
            } else {
                language.to_string()
            },
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            qr_max_dimension: self.qr_max_dimension,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            // Barcode is the default mode, start right away
            scan_on_launch: true,
            // Stop after the first barcode
            continuous_barcode: false,
            symbologies: Symbology::ALL.to_vec(),
            text_from_video: true,
            text_frame_interval: default_text_frame_interval(),
            ocr_language: default_ocr_language(),
            qr_max_dimension: default_qr_max_dimension(),
            preferred_camera: None,
        }
    }
}
