//! OCR (Optical Character Recognition) using rusty-tesseract
//!
//! Recognition runs on a dedicated worker thread. Live frames are dropped while
//! another frame is in flight; photos are always queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use image::RgbaImage;

use crate::scan::{
    EventSender, PayloadSource, RecognitionError, RecognitionOutcome, RecognitionRequest,
    ScanEvent, TextRecognizer,
};

/// Tesseract settings
#[derive(Debug, Clone)]
pub struct OcrSettings {
    /// Tesseract language code(s), e.g. "eng" or "eng+deu"
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
        }
    }
}

/// A single word reported by tesseract
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub block_num: i32,
    pub line_num: i32,
    pub word_num: i32,
    pub conf: f32,
    pub text: String,
}

/// Background text recognizer
pub struct OcrWorker {
    jobs: crossbeam_channel::Sender<RecognitionRequest>,
    frame_pending: Arc<AtomicBool>,
}

impl OcrWorker {
    pub fn spawn(settings: OcrSettings, events: EventSender) -> Self {
        match rusty_tesseract::get_tesseract_version() {
            Ok(version) => log::info!("Using tesseract {}", version.trim()),
            Err(e) => log::warn!("Tesseract is not available, text recognition will fail: {}", e),
        }

        let (jobs, rx) = crossbeam_channel::unbounded::<RecognitionRequest>();
        let frame_pending = Arc::new(AtomicBool::new(false));
        let pending = frame_pending.clone();

        // If the thread cannot start, `rx` is dropped and submissions report
        // the worker as unavailable.
        if let Err(e) = std::thread::Builder::new()
            .name("snapscan-ocr".to_string())
            .spawn(move || run_worker(rx, settings, events, pending))
        {
            log::error!("Failed to start OCR worker: {}", e);
        }

        Self {
            jobs,
            frame_pending,
        }
    }
}

impl TextRecognizer for OcrWorker {
    fn submit(&self, request: RecognitionRequest) -> Result<(), RecognitionError> {
        let is_frame = request.source == PayloadSource::Frame;
        if is_frame && self.frame_pending.swap(true, Ordering::AcqRel) {
            return Err(RecognitionError::Busy);
        }

        self.jobs.send(request).map_err(|_| {
            if is_frame {
                self.frame_pending.store(false, Ordering::Release);
            }
            RecognitionError::WorkerUnavailable
        })
    }
}

fn run_worker(
    rx: crossbeam_channel::Receiver<RecognitionRequest>,
    settings: OcrSettings,
    events: EventSender,
    frame_pending: Arc<AtomicBool>,
) {
    for request in rx.iter() {
        let result = recognize_text(&request.image, &settings)
            .map_err(|e| RecognitionError::RequestFailed(format!("{:#}", e)));
        if request.source == PayloadSource::Frame {
            frame_pending.store(false, Ordering::Release);
        }

        let outcome = RecognitionOutcome {
            ticket: request.ticket,
            source: request.source,
            result,
        };
        if events
            .blocking_send(ScanEvent::TextRecognized(outcome))
            .is_err()
        {
            log::debug!("Event channel closed, stopping OCR worker");
            break;
        }
    }
}

/// Recognize text and return the best candidate string per text block
pub fn recognize_text(img: &RgbaImage, settings: &OcrSettings) -> Result<Vec<String>> {
    use rusty_tesseract::{Args, Image};

    log::debug!(
        "Running OCR with rusty-tesseract on {}x{} image...",
        img.width(),
        img.height()
    );

    let dynamic_img = image::DynamicImage::ImageRgba8(img.clone());

    // Tesseract works best with text that's at least 10-12 pixels tall
    let min_dimension = img.width().min(img.height());
    let processed_img = match upscale_factor(min_dimension) {
        1 => dynamic_img,
        factor => {
            let new_width = img.width() * factor;
            let new_height = img.height() * factor;
            log::debug!("Upscaling small image {}x to {}x{}", factor, new_width, new_height);
            dynamic_img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
        }
    };

    let tess_img = Image::from_dynamic_image(&processed_img)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to create tesseract image")?;

    let dpi = if min_dimension < 200 { 300 } else { 150 };
    let args = Args {
        lang: settings.language.clone(),
        config_variables: HashMap::new(),
        dpi: Some(dpi),
        psm: Some(11), // Fully automatic page segmentation
        oem: Some(3),  // Default OCR Engine Mode
    };

    let data_output = rusty_tesseract::image_to_data(&tess_img, &args)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Tesseract OCR failed")?;
    log::debug!("Tesseract returned {} data entries", data_output.data.len());

    let words = data_output
        .data
        .into_iter()
        .map(|d| OcrWord {
            block_num: d.block_num,
            line_num: d.line_num,
            word_num: d.word_num,
            conf: d.conf,
            text: d.text,
        })
        .collect();

    Ok(group_blocks(words))
}

/// Upscale factor for small images: 4x under 100px, 2x under 200px
fn upscale_factor(min_dimension: u32) -> u32 {
    if min_dimension < 100 {
        4
    } else if min_dimension < 200 {
        2
    } else {
        1
    }
}

/// Join the words of each block in reading order, one string per block
pub fn group_blocks(words: Vec<OcrWord>) -> Vec<String> {
    let mut blocks: BTreeMap<i32, Vec<OcrWord>> = BTreeMap::new();
    for word in words
        .into_iter()
        .filter(|w| !w.text.trim().is_empty() && w.conf > 0.0)
    {
        blocks.entry(word.block_num).or_default().push(word);
    }

    blocks
        .into_values()
        .filter_map(|mut words| {
            words.sort_by(|a, b| {
                a.line_num
                    .cmp(&b.line_num)
                    .then(a.word_num.cmp(&b.word_num))
            });
            let text = words
                .iter()
                .map(|w| w.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            (!text.is_empty()).then_some(text)
        })
        .collect()
}
