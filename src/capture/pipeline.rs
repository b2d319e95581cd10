//! GStreamer camera pipeline
//!
//! The camera source feeds a `tee`; each attached output is one branch:
//!
//! ```text
//! camera ─ videoconvert ─ tee ─┬─ queue ─ videoconvert ─ zbar ─ fakesink   (metadata, zbar)
//!                              │          └─ appsink (rqrr)               (metadata, fallback)
//!                              ├─ queue ─ videoconvert ─ appsink          (photo)
//!                              └─ queue ─ videoconvert ─ appsink          (frames)
//! ```
//!
//! Start, stop and photo requests are executed in order on a dedicated
//! control thread so the caller never blocks on a state change.
//!
//! Live frames are best effort and dropped when the UI is behind. Detections,
//! photos and session state changes wait for room in the event channel.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::codes::{detect_codes, retain_enabled, symbology_from_zbar};
use crate::scan::{
    CaptureSession, ConfigurationError, EventSender, MetadataObject, OutputKind, PhotoData,
    ScanEvent, Symbology, VideoFrame,
};

/// Only every Nth frame is scanned for QR codes on the rqrr path
const QR_SCAN_INTERVAL: u64 = 5;

/// How long a photo request waits for a frame
const PHOTO_TIMEOUT_SECS: u64 = 2;

/// Tuning for the pipeline branches
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Frames are downsampled to this size before QR detection (0 = full size)
    pub qr_max_dimension: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            qr_max_dimension: 800,
        }
    }
}

enum SessionCommand {
    Start,
    Stop,
    CapturePhoto(gst_app::AppSink),
    Shutdown,
}

/// Capture session backed by a GStreamer pipeline
pub struct GstCaptureSession {
    pipeline: gst::Pipeline,
    tee: gst::Element,
    source: Option<gst::Element>,
    photo_sink: Option<gst_app::AppSink>,
    attached: Vec<OutputKind>,
    events: EventSender,
    settings: PipelineSettings,
    control: crossbeam_channel::Sender<SessionCommand>,
}

impl GstCaptureSession {
    /// Create an empty, stopped pipeline
    pub fn new(events: EventSender, settings: PipelineSettings) -> Result<Self, ConfigurationError> {
        Self::build(events, settings).map_err(|e| ConfigurationError::Pipeline(format!("{:#}", e)))
    }

    fn build(events: EventSender, settings: PipelineSettings) -> Result<Self> {
        gst::init().context("Failed to initialize GStreamer")?;

        let pipeline = gst::Pipeline::with_name("snapscan-capture");
        let tee = gst::ElementFactory::make("tee")
            .name("capture-tee")
            .build()
            .context("Failed to create tee element")?;
        pipeline.add(&tee)?;

        let (control, commands) = crossbeam_channel::unbounded();
        let control_pipeline = pipeline.clone();
        let control_events = events.clone();
        std::thread::Builder::new()
            .name("snapscan-session".to_string())
            .spawn(move || run_control(control_pipeline, commands, control_events))
            .context("Failed to start session control thread")?;

        Ok(Self {
            pipeline,
            tee,
            source: None,
            photo_sink: None,
            attached: Vec::new(),
            events,
            settings,
            control,
        })
    }

    fn send(&self, command: SessionCommand) {
        if self.control.send(command).is_err() {
            log::error!("Session control thread is gone");
        }
    }

    /// queue ! videoconvert, linked to the tee. Returns the converter.
    fn branch_head(&self, name: &str) -> Result<gst::Element> {
        let queue = gst::ElementFactory::make("queue")
            .name(format!("{name}-queue"))
            .property_from_str("leaky", "downstream")
            .property("max-size-buffers", 1u32)
            .build()
            .context("Failed to create queue element")?;
        let convert = gst::ElementFactory::make("videoconvert")
            .name(format!("{name}-convert"))
            .build()
            .context("Failed to create videoconvert element")?;

        self.pipeline.add_many([&queue, &convert])?;
        gst::Element::link_many([&self.tee, &queue, &convert])?;
        Ok(convert)
    }

    fn rgba_sink(&self, name: &str) -> Result<gst_app::AppSink> {
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .build();
        let sink = gst_app::AppSink::builder()
            .name(format!("{name}-sink"))
            .caps(&caps)
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .build();
        self.pipeline.add(&sink)?;
        Ok(sink)
    }

    fn attach_metadata(&mut self, symbologies: Vec<Symbology>) -> Result<()> {
        let convert = self.branch_head("metadata")?;

        if zbar_available() {
            log::info!("Detecting codes with zbar");
            let zbar = gst::ElementFactory::make("zbar")
                .name("metadata-zbar")
                .property("message", true)
                .build()
                .context("Failed to create zbar element")?;
            let sink = gst::ElementFactory::make("fakesink")
                .name("metadata-sink")
                .property("sync", false)
                .build()
                .context("Failed to create fakesink element")?;
            self.pipeline.add_many([&zbar, &sink])?;
            gst::Element::link_many([&convert, &zbar, &sink])?;
            self.watch_bus(symbologies)?;
            return Ok(());
        }

        log::info!("zbar not available, detecting QR codes with rqrr");
        self.watch_bus(symbologies.clone())?;
        let sink = self.rgba_sink("metadata")?;
        convert.link(&sink)?;

        let events = self.events.clone();
        let max_dim = self.settings.qr_max_dimension;
        let mut seen = 0u64;
        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    seen += 1;
                    if seen % QR_SCAN_INTERVAL != 0 {
                        return Ok(gst::FlowSuccess::Ok);
                    }

                    let image = match frame_from_sample(&sample)
                        .and_then(|frame| frame.to_image().map_err(anyhow::Error::from))
                    {
                        Ok(image) => image,
                        Err(e) => {
                            log::debug!("Skipping frame for QR detection: {:#}", e);
                            return Ok(gst::FlowSuccess::Ok);
                        }
                    };

                    let mut codes = detect_codes(&image, max_dim);
                    retain_enabled(&mut codes, &symbologies);
                    if !codes.is_empty() {
                        deliver(&events, ScanEvent::Metadata(codes));
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        Ok(())
    }

    /// Forward zbar detections and pipeline failures
    fn watch_bus(&self, symbologies: Vec<Symbology>) -> Result<()> {
        let bus = self.pipeline.bus().context("Pipeline has no bus")?;
        let events = self.events.clone();
        bus.set_sync_handler(move |_, msg| {
            if let Some(event) = event_from_message(msg, &symbologies) {
                deliver(&events, event);
            }
            gst::BusSyncReply::Drop
        });
        Ok(())
    }

    fn attach_photo(&mut self) -> Result<()> {
        let convert = self.branch_head("photo")?;
        let sink = self.rgba_sink("photo")?;
        convert.link(&sink)?;
        self.photo_sink = Some(sink);
        Ok(())
    }

    fn attach_frames(&mut self) -> Result<()> {
        let convert = self.branch_head("frames")?;
        let sink = self.rgba_sink("frames")?;
        convert.link(&sink)?;

        let events = self.events.clone();
        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    match frame_from_sample(&sample) {
                        Ok(frame) => {
                            if events.try_send(ScanEvent::Frame(frame)).is_err() {
                                log::trace!("UI is behind, frame dropped");
                            }
                        }
                        Err(e) => log::debug!("Dropping unreadable frame: {:#}", e),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        Ok(())
    }
}

impl CaptureSession for GstCaptureSession {
    type Device = gst::Device;

    fn can_attach_input(&self, _device: &gst::Device) -> bool {
        self.source.is_none() && gst::ElementFactory::find("videoconvert").is_some()
    }

    fn attach_input(&mut self, device: gst::Device) -> Result<(), ConfigurationError> {
        let name = device.display_name().to_string();
        let attach = || -> Result<gst::Element> {
            let source = device
                .create_element(Some("camera-source"))
                .context("Failed to create camera source")?;
            let convert = gst::ElementFactory::make("videoconvert")
                .name("camera-convert")
                .build()
                .context("Failed to create videoconvert element")?;
            self.pipeline.add_many([&source, &convert])?;
            gst::Element::link_many([&source, &convert, &self.tee])?;
            Ok(source)
        };

        let source = attach().map_err(|e| ConfigurationError::InputRejected(format!("{:#}", e)))?;
        log::info!("Attached camera: {}", name);
        self.source = Some(source);
        Ok(())
    }

    fn can_attach_output(&self, output: &OutputKind) -> bool {
        let already = self
            .attached
            .iter()
            .any(|o| std::mem::discriminant(o) == std::mem::discriminant(output));
        if self.source.is_none() || already {
            return false;
        }
        match output {
            // The rqrr fallback only knows QR codes
            OutputKind::Metadata(symbologies) => {
                zbar_available() || symbologies.contains(&Symbology::Qr)
            }
            OutputKind::Photo | OutputKind::Frames => true,
        }
    }

    fn attach_output(&mut self, output: OutputKind) -> Result<(), ConfigurationError> {
        let result = match &output {
            OutputKind::Metadata(symbologies) => self.attach_metadata(symbologies.clone()),
            OutputKind::Photo => self.attach_photo(),
            OutputKind::Frames => self.attach_frames(),
        };

        match result {
            Ok(()) => {
                log::debug!("Attached {} output", output);
                self.attached.push(output);
                Ok(())
            }
            Err(e) => Err(ConfigurationError::OutputRejected {
                output,
                reason: format!("{:#}", e),
            }),
        }
    }

    fn start(&self) {
        self.send(SessionCommand::Start);
    }

    fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    fn capture_photo(&self) {
        match &self.photo_sink {
            Some(sink) => self.send(SessionCommand::CapturePhoto(sink.clone())),
            None => log::warn!("Photo requested but no photo output is attached"),
        }
    }
}

impl Drop for GstCaptureSession {
    fn drop(&mut self) {
        self.send(SessionCommand::Shutdown);
    }
}

fn run_control(
    pipeline: gst::Pipeline,
    commands: crossbeam_channel::Receiver<SessionCommand>,
    events: EventSender,
) {
    for command in commands.iter() {
        match command {
            SessionCommand::Start => match pipeline.set_state(gst::State::Playing) {
                Ok(_) => {
                    log::info!("Capture session started");
                    deliver(&events, ScanEvent::SessionRunning(true));
                }
                Err(e) => {
                    log::error!("Failed to start capture session: {}", e);
                    deliver(
                        &events,
                        ScanEvent::SessionFailed(ConfigurationError::DeviceUnavailable(
                            e.to_string(),
                        )),
                    );
                }
            },
            SessionCommand::Stop => match pipeline.set_state(gst::State::Null) {
                Ok(_) => {
                    log::info!("Capture session stopped");
                    deliver(&events, ScanEvent::SessionRunning(false));
                }
                Err(e) => log::error!("Failed to stop capture session: {}", e),
            },
            SessionCommand::CapturePhoto(sink) => match capture_photo(&sink) {
                Ok(photo) => deliver(&events, ScanEvent::Photo(photo)),
                Err(e) => log::warn!("Photo capture failed: {:#}", e),
            },
            SessionCommand::Shutdown => break,
        }
    }

    if let Err(e) = pipeline.set_state(gst::State::Null) {
        log::error!("Failed to shut down capture pipeline: {}", e);
    }
    log::debug!("Session control thread finished");
}

/// Grab the most recent frame from the photo branch and encode it as PNG
fn capture_photo(sink: &gst_app::AppSink) -> Result<PhotoData> {
    let sample = sink
        .try_pull_sample(gst::ClockTime::from_seconds(PHOTO_TIMEOUT_SECS))
        .context("No frame available for the photo")?;
    let image = frame_from_sample(&sample)?.to_image()?;

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("Failed to encode photo")?;
    log::info!("Captured {}x{} photo", image.width(), image.height());
    Ok(PhotoData::new(bytes))
}

fn frame_from_sample(sample: &gst::Sample) -> Result<VideoFrame> {
    let caps = sample.caps().context("Sample has no caps")?;
    let info = gst_video::VideoInfo::from_caps(caps).context("Sample caps are not raw video")?;
    let buffer = sample.buffer().context("Sample has no buffer")?;
    let map = buffer
        .map_readable()
        .context("Failed to map buffer for reading")?;

    Ok(VideoFrame {
        width: info.width(),
        height: info.height(),
        stride: info.stride()[0] as usize,
        data: Arc::from(map.as_slice()),
    })
}

fn metadata_from_zbar(
    structure: &gst::StructureRef,
    enabled: &[Symbology],
) -> Option<MetadataObject> {
    let kind = structure.get::<String>("type").ok()?;
    let symbology = symbology_from_zbar(&kind)?;
    if !enabled.contains(&symbology) {
        return None;
    }
    Some(MetadataObject {
        symbology,
        value: structure.get::<String>("symbol").ok(),
    })
}

/// Map a bus message to the event it should raise, logging the rest
fn event_from_message(msg: &gst::MessageRef, symbologies: &[Symbology]) -> Option<ScanEvent> {
    use gst::MessageView;
    match msg.view() {
        MessageView::Element(element) => element
            .structure()
            .filter(|s| s.has_name("barcode"))
            .and_then(|s| metadata_from_zbar(s, symbologies))
            .map(|object| ScanEvent::Metadata(vec![object])),
        MessageView::Error(err) => {
            log::error!(
                "Pipeline error: {} ({})",
                err.error(),
                err.debug().unwrap_or_default()
            );
            Some(ScanEvent::SessionFailed(
                ConfigurationError::DeviceUnavailable(err.error().to_string()),
            ))
        }
        MessageView::Warning(warning) => {
            log::warn!("Pipeline warning: {}", warning.error());
            None
        }
        _ => None,
    }
}

/// Send an event that must not be lost, waiting for room behind queued frames
fn deliver(events: &EventSender, event: ScanEvent) {
    if events.blocking_send(event).is_err() {
        log::debug!("Event channel closed, event dropped");
    }
}

fn zbar_available() -> bool {
    gst::ElementFactory::find("zbar").is_some()
}
