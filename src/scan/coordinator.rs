//! Scan coordinator: owns the capture session and the scan mode, routes
//! payloads to the right recognizer and publishes results.
//!
//! All methods run on the UI thread. Background threads never touch the
//! coordinator directly; they post [`ScanEvent`]s which the UI feeds back in
//! through [`ScanCoordinator::handle_event`].

use image::RgbaImage;

use super::error::{ConfigurationError, RecognitionError};
use super::event::{PayloadSource, RecognitionOutcome, RecognitionRequest, ScanEvent, ScanTicket};
use super::payload::{MetadataObject, PhotoData, Symbology, VideoFrame};
use super::session::{CaptureSession, DeviceProvider, OutputKind, TextRecognizer};

/// Separator placed between recognized text regions
pub const TEXT_SEPARATOR: &str = ", ";

/// Active detection discipline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Barcode,
    Text,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    ScanningBarcode,
    ScanningText,
    /// The camera could not be configured; capture is disabled for good
    Failed,
}

/// Behavior switches for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Keep scanning after the first barcode instead of returning to idle
    pub continuous_barcode: bool,
    /// Symbologies the metadata output is configured for
    pub symbologies: Vec<Symbology>,
    /// Recognize text from live frames while scanning text
    pub text_from_video: bool,
    /// Only every Nth live frame is sent to the recognizer
    pub text_frame_interval: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            continuous_barcode: false,
            symbologies: Symbology::ALL.to_vec(),
            text_from_video: true,
            text_frame_interval: 15,
        }
    }
}

pub struct ScanCoordinator<S, R> {
    session: Option<S>,
    recognizer: R,
    options: ScanOptions,
    state: ScanState,
    mode: Mode,
    /// Bumped on every mode action so in-flight recognition can be told apart
    epoch: u64,
    configured: bool,
    session_running: bool,
    frames_seen: u64,
    result: String,
    still_preview: Option<RgbaImage>,
    failure: Option<ConfigurationError>,
    alert: Option<ConfigurationError>,
}

impl<S, R> ScanCoordinator<S, R>
where
    S: CaptureSession,
    R: TextRecognizer,
{
    pub fn new(session: S, recognizer: R, options: ScanOptions) -> Self {
        Self::with_session(Some(session), recognizer, options)
    }

    /// A coordinator whose session could not even be created
    pub fn unavailable(recognizer: R, options: ScanOptions, error: ConfigurationError) -> Self {
        let mut coordinator = Self::with_session(None, recognizer, options);
        coordinator.fail(error);
        coordinator
    }

    fn with_session(session: Option<S>, recognizer: R, options: ScanOptions) -> Self {
        Self {
            session,
            recognizer,
            options,
            state: ScanState::Idle,
            mode: Mode::default(),
            epoch: 0,
            configured: false,
            session_running: false,
            frames_seen: 0,
            result: String::new(),
            still_preview: None,
            failure: None,
            alert: None,
        }
    }

    /// Attach the default camera and all outputs. The session is left stopped.
    pub fn configure_session<P>(&mut self, devices: &P) -> Result<(), ConfigurationError>
    where
        P: DeviceProvider<Device = S::Device>,
    {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.configured {
            return Ok(());
        }

        match self.attach_all(devices) {
            Ok(()) => {
                self.configured = true;
                log::info!("Capture session configured");
                Ok(())
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    fn attach_all<P>(&mut self, devices: &P) -> Result<(), ConfigurationError>
    where
        P: DeviceProvider<Device = S::Device>,
    {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ConfigurationError::Pipeline("no capture session".to_string()))?;

        let device = devices
            .default_video_device()
            .ok_or(ConfigurationError::NoDevice)?;
        if !session.can_attach_input(&device) {
            return Err(ConfigurationError::InputRejected(
                "session cannot accept the device".to_string(),
            ));
        }
        session.attach_input(device)?;

        let outputs = [
            OutputKind::Metadata(self.options.symbologies.clone()),
            OutputKind::Photo,
            OutputKind::Frames,
        ];
        for output in outputs {
            if !session.can_attach_output(&output) {
                return Err(ConfigurationError::OutputRejected {
                    reason: "session cannot accept the output".to_string(),
                    output,
                });
            }
            session.attach_output(output)?;
        }
        Ok(())
    }

    fn fail(&mut self, error: ConfigurationError) {
        if self.state == ScanState::Failed {
            log::debug!("Already failed, ignoring: {}", error);
            return;
        }
        log::error!("Scanning not supported: {}", error);
        // Tear the session down so nothing can start it again
        self.session = None;
        self.session_running = false;
        self.state = ScanState::Failed;
        self.epoch += 1;
        self.failure = Some(error.clone());
        self.alert = Some(error);
    }

    /// "Scan barcode" action
    pub fn scan_barcode(&mut self) {
        self.enter(Mode::Barcode);
    }

    /// "Capture text" action
    pub fn capture_text(&mut self) {
        self.enter(Mode::Text);
    }

    fn enter(&mut self, mode: Mode) {
        if self.state == ScanState::Failed {
            log::warn!("Ignoring {:?} scan request, capture is unavailable", mode);
            return;
        }
        if !self.configured {
            log::warn!("Ignoring {:?} scan request, session is not configured", mode);
            return;
        }

        self.result.clear();
        self.still_preview = None;
        self.mode = mode;
        self.epoch += 1;
        self.frames_seen = 0;
        self.state = match mode {
            Mode::Barcode => ScanState::ScanningBarcode,
            Mode::Text => ScanState::ScanningText,
        };
        log::debug!("Entered {:?} (epoch {})", self.state, self.epoch);
        self.start_scanning();
    }

    /// Request a still photo for text recognition
    pub fn capture_photo(&mut self) {
        if self.state != ScanState::ScanningText {
            log::debug!("Photo requested in {:?}, ignoring", self.state);
            return;
        }
        if let Some(session) = &self.session {
            session.capture_photo();
        }
    }

    pub fn start_scanning(&self) {
        if let Some(session) = &self.session {
            session.start();
        }
    }

    pub fn stop_scanning(&self) {
        if let Some(session) = &self.session {
            session.stop();
        }
    }

    /// Route an event from the background threads
    pub fn handle_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Metadata(objects) => self.on_metadata_detected(objects),
            ScanEvent::Frame(frame) => self.on_frames_available(&frame),
            ScanEvent::Photo(photo) => self.on_photo_captured(&photo),
            ScanEvent::TextRecognized(outcome) => self.on_text_recognized(outcome),
            ScanEvent::SessionRunning(running) => self.on_session_running(running),
            ScanEvent::SessionFailed(error) => self.on_session_failed(error),
        }
    }

    pub fn on_metadata_detected(&mut self, objects: Vec<MetadataObject>) {
        if self.state != ScanState::ScanningBarcode {
            log::debug!("Dropping {} code(s) outside barcode scanning", objects.len());
            return;
        }

        let Some(value) = objects.into_iter().next().and_then(|o| o.value) else {
            return;
        };

        log::info!("Barcode detected: {}", value);
        self.result = value;

        if !self.options.continuous_barcode {
            self.state = ScanState::Idle;
            self.stop_scanning();
        }
    }

    pub fn on_frames_available(&mut self, frame: &VideoFrame) {
        if self.state != ScanState::ScanningText || !self.options.text_from_video {
            return;
        }

        let interval = u64::from(self.options.text_frame_interval.max(1));
        let eligible = self.frames_seen % interval == 0;
        self.frames_seen += 1;
        if !eligible {
            return;
        }

        let image = match frame.to_image() {
            Ok(image) => image,
            Err(err) => {
                log::warn!("Dropping frame: {}", err);
                return;
            }
        };

        let request = RecognitionRequest {
            ticket: self.ticket(),
            source: PayloadSource::Frame,
            image,
        };
        match self.recognizer.submit(request) {
            Ok(()) => {}
            Err(RecognitionError::Busy) => log::debug!("Recognizer busy, frame dropped"),
            Err(err) => log::warn!("Failed to perform text detection: {}", err),
        }
    }

    pub fn on_photo_captured(&mut self, photo: &PhotoData) {
        if self.state != ScanState::ScanningText {
            log::debug!("Dropping photo delivered in {:?}", self.state);
            return;
        }

        match photo.to_image() {
            Ok(image) => {
                self.still_preview = Some(image.clone());
                let request = RecognitionRequest {
                    ticket: self.ticket(),
                    source: PayloadSource::Photo,
                    image,
                };
                if let Err(err) = self.recognizer.submit(request) {
                    log::warn!("Failed to perform text detection: {}", err);
                }
            }
            Err(err) => log::warn!("Dropping photo: {}", err),
        }

        self.state = ScanState::Idle;
        self.stop_scanning();
    }

    pub fn on_text_recognized(&mut self, outcome: RecognitionOutcome) {
        if self.state == ScanState::Failed
            || outcome.ticket.mode != Mode::Text
            || outcome.ticket != self.ticket()
        {
            log::debug!("Discarding stale recognition result {:?}", outcome.ticket);
            return;
        }

        let candidates = match outcome.result {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("Failed to perform text detection: {}", err);
                return;
            }
        };

        if outcome.source == PayloadSource::Frame
            && (candidates.is_empty() || self.state != ScanState::ScanningText)
        {
            return;
        }

        self.result = candidates.join(TEXT_SEPARATOR);
        log::info!("Recognized text: {}", self.result);
    }

    pub fn on_session_running(&mut self, running: bool) {
        self.session_running = running && self.session.is_some();
    }

    /// The running session broke down. Capture is disabled like a failed
    /// configuration.
    pub fn on_session_failed(&mut self, error: ConfigurationError) {
        self.fail(error);
    }

    /// User edits to the result field
    pub fn edit_result(&mut self, text: String) {
        self.result = text;
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    fn ticket(&self) -> ScanTicket {
        ScanTicket {
            mode: self.mode,
            epoch: self.epoch,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn still_preview(&self) -> Option<&RgbaImage> {
        self.still_preview.as_ref()
    }

    pub fn alert(&self) -> Option<&ConfigurationError> {
        self.alert.as_ref()
    }

    pub fn is_session_running(&self) -> bool {
        self.session_running
    }

    /// Whether the scan actions can be used
    pub fn can_scan(&self) -> bool {
        self.configured && self.state != ScanState::Failed
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use assert_matches2::assert_matches;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        AttachInput,
        AttachOutput(OutputKind),
        Start,
        Stop,
        CapturePhoto,
        Submit(PayloadSource),
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    struct FakeSession {
        log: Log,
        reject_input: bool,
        reject_output: Option<OutputKind>,
    }

    impl CaptureSession for FakeSession {
        type Device = &'static str;

        fn can_attach_input(&self, _device: &Self::Device) -> bool {
            !self.reject_input
        }

        fn attach_input(&mut self, _device: Self::Device) -> Result<(), ConfigurationError> {
            self.log.borrow_mut().push(Call::AttachInput);
            Ok(())
        }

        fn can_attach_output(&self, output: &OutputKind) -> bool {
            self.reject_output.as_ref() != Some(output)
        }

        fn attach_output(&mut self, output: OutputKind) -> Result<(), ConfigurationError> {
            self.log.borrow_mut().push(Call::AttachOutput(output));
            Ok(())
        }

        fn start(&self) {
            self.log.borrow_mut().push(Call::Start);
        }

        fn stop(&self) {
            self.log.borrow_mut().push(Call::Stop);
        }

        fn capture_photo(&self) {
            self.log.borrow_mut().push(Call::CapturePhoto);
        }
    }

    struct FakeDevices(Option<&'static str>);

    impl DeviceProvider for FakeDevices {
        type Device = &'static str;

        fn default_video_device(&self) -> Option<Self::Device> {
            self.0
        }
    }

    struct FakeRecognizer {
        log: Log,
        requests: Rc<RefCell<Vec<RecognitionRequest>>>,
        fail_with: Option<RecognitionError>,
    }

    impl TextRecognizer for FakeRecognizer {
        fn submit(&self, request: RecognitionRequest) -> Result<(), RecognitionError> {
            self.log.borrow_mut().push(Call::Submit(request.source));
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.requests.borrow_mut().push(request);
            Ok(())
        }
    }

    struct Harness {
        log: Log,
        requests: Rc<RefCell<Vec<RecognitionRequest>>>,
        coordinator: ScanCoordinator<FakeSession, FakeRecognizer>,
    }

    impl Harness {
        fn build(options: ScanOptions, fail_with: Option<RecognitionError>) -> Self {
            let log: Log = Rc::default();
            let requests = Rc::default();
            let session = FakeSession {
                log: log.clone(),
                reject_input: false,
                reject_output: None,
            };
            let recognizer = FakeRecognizer {
                log: log.clone(),
                requests: Rc::clone(&requests),
                fail_with,
            };
            Self {
                log,
                requests,
                coordinator: ScanCoordinator::new(session, recognizer, options),
            }
        }

        fn configured(options: ScanOptions) -> Self {
            let mut harness = Self::build(options, None);
            harness
                .coordinator
                .configure_session(&FakeDevices(Some("cam0")))
                .unwrap();
            harness.log.borrow_mut().clear();
            harness
        }

        fn calls(&self) -> Vec<Call> {
            self.log.borrow().clone()
        }

        fn last_ticket(&self) -> ScanTicket {
            self.requests.borrow().last().unwrap().ticket
        }
    }

    fn every_frame() -> ScanOptions {
        ScanOptions {
            text_frame_interval: 1,
            ..ScanOptions::default()
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 2,
            height: 2,
            stride: 8,
            data: Arc::from(vec![255u8; 16]),
        }
    }

    fn photo() -> PhotoData {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        PhotoData::new(bytes)
    }

    fn recognized(ticket: ScanTicket, source: PayloadSource, texts: &[&str]) -> RecognitionOutcome {
        RecognitionOutcome {
            ticket,
            source,
            result: Ok(texts.iter().map(|t| t.to_string()).collect()),
        }
    }

    #[test]
    fn test_configure_attaches_input_then_outputs_and_leaves_session_stopped() {
        let mut harness = Harness::build(ScanOptions::default(), None);
        harness
            .coordinator
            .configure_session(&FakeDevices(Some("cam0")))
            .unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::AttachInput,
                Call::AttachOutput(OutputKind::Metadata(Symbology::ALL.to_vec())),
                Call::AttachOutput(OutputKind::Photo),
                Call::AttachOutput(OutputKind::Frames),
            ]
        );
        assert_eq!(harness.coordinator.state(), ScanState::Idle);
        assert!(harness.coordinator.can_scan());
    }

    #[test]
    fn test_missing_device_fails_with_alert_and_never_starts() {
        let mut harness = Harness::build(ScanOptions::default(), None);
        let err = harness
            .coordinator
            .configure_session(&FakeDevices(None))
            .unwrap_err();

        assert_eq!(err, ConfigurationError::NoDevice);
        assert_eq!(harness.coordinator.state(), ScanState::Failed);
        assert_eq!(harness.coordinator.alert(), Some(&ConfigurationError::NoDevice));

        harness.coordinator.scan_barcode();
        harness.coordinator.capture_text();
        assert!(!harness.calls().contains(&Call::Start));
        assert_eq!(harness.coordinator.state(), ScanState::Failed);
    }

    #[test]
    fn test_rejected_output_fails_configuration() {
        let log: Log = Rc::default();
        let session = FakeSession {
            log: log.clone(),
            reject_input: false,
            reject_output: Some(OutputKind::Photo),
        };
        let recognizer = FakeRecognizer {
            log: log.clone(),
            requests: Rc::default(),
            fail_with: None,
        };
        let mut coordinator = ScanCoordinator::new(session, recognizer, ScanOptions::default());

        let err = coordinator
            .configure_session(&FakeDevices(Some("cam0")))
            .unwrap_err();
        assert_matches!(
            err,
            ConfigurationError::OutputRejected {
                output: OutputKind::Photo,
                ..
            }
        );
        assert!(coordinator.alert().is_some());

        coordinator.scan_barcode();
        assert!(!log.borrow().contains(&Call::Start));
        assert!(!log.borrow().contains(&Call::AttachOutput(OutputKind::Frames)));
    }

    #[test]
    fn test_rejected_input_fails_configuration() {
        let log: Log = Rc::default();
        let session = FakeSession {
            log: log.clone(),
            reject_input: true,
            reject_output: None,
        };
        let recognizer = FakeRecognizer {
            log: log.clone(),
            requests: Rc::default(),
            fail_with: None,
        };
        let mut coordinator = ScanCoordinator::new(session, recognizer, ScanOptions::default());

        let err = coordinator
            .configure_session(&FakeDevices(Some("cam0")))
            .unwrap_err();
        assert_matches!(err, ConfigurationError::InputRejected(_));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_dismissing_alert_keeps_capture_disabled() {
        let mut harness = Harness::build(ScanOptions::default(), None);
        let _ = harness.coordinator.configure_session(&FakeDevices(None));
        harness.coordinator.dismiss_alert();

        assert!(harness.coordinator.alert().is_none());
        assert!(!harness.coordinator.can_scan());
        assert!(
            harness
                .coordinator
                .configure_session(&FakeDevices(Some("cam0")))
                .is_err()
        );
    }

    #[test]
    fn test_unavailable_coordinator_starts_failed() {
        let recognizer = FakeRecognizer {
            log: Rc::default(),
            requests: Rc::default(),
            fail_with: None,
        };
        let coordinator: ScanCoordinator<FakeSession, _> = ScanCoordinator::unavailable(
            recognizer,
            ScanOptions::default(),
            ConfigurationError::Pipeline("no gstreamer".to_string()),
        );
        assert_eq!(coordinator.state(), ScanState::Failed);
        assert!(coordinator.alert().is_some());
    }

    #[test]
    fn test_scan_actions_before_configuration_are_ignored() {
        let mut harness = Harness::build(ScanOptions::default(), None);
        harness.coordinator.scan_barcode();
        assert_eq!(harness.coordinator.state(), ScanState::Idle);
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn test_mode_switch_clears_result_and_starts_session() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.edit_result("old".to_string());

        harness.coordinator.scan_barcode();
        assert_eq!(harness.coordinator.result(), "");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningBarcode);

        harness.coordinator.edit_result("typed".to_string());
        harness.coordinator.capture_text();
        assert_eq!(harness.coordinator.result(), "");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningText);
        assert_eq!(harness.calls(), vec![Call::Start, Call::Start]);
    }

    #[test]
    fn test_first_barcode_is_published_and_scanning_stops() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.scan_barcode();

        harness.coordinator.on_metadata_detected(vec![
            MetadataObject::new(Symbology::Ean13, "4006381333931"),
            MetadataObject::new(Symbology::Qr, "https://example.org"),
        ]);

        assert_eq!(harness.coordinator.result(), "4006381333931");
        assert_eq!(harness.coordinator.state(), ScanState::Idle);
        assert_eq!(harness.calls(), vec![Call::Start, Call::Stop]);

        // Late detection after the stop
        harness
            .coordinator
            .on_metadata_detected(vec![MetadataObject::new(Symbology::Qr, "late")]);
        assert_eq!(harness.coordinator.result(), "4006381333931");
    }

    #[test]
    fn test_continuous_barcode_keeps_overwriting() {
        let mut harness = Harness::configured(ScanOptions {
            continuous_barcode: true,
            ..ScanOptions::default()
        });
        harness.coordinator.scan_barcode();

        harness
            .coordinator
            .on_metadata_detected(vec![MetadataObject::new(Symbology::Qr, "one")]);
        harness
            .coordinator
            .on_metadata_detected(vec![MetadataObject::new(Symbology::Ean8, "96385074")]);

        assert_eq!(harness.coordinator.result(), "96385074");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningBarcode);
        assert!(!harness.calls().contains(&Call::Stop));
    }

    #[test]
    fn test_first_object_without_value_publishes_nothing() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.scan_barcode();
        harness.coordinator.on_metadata_detected(vec![
            MetadataObject {
                symbology: Symbology::Pdf417,
                value: None,
            },
            MetadataObject::new(Symbology::Qr, "second"),
        ]);

        assert_eq!(harness.coordinator.result(), "");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningBarcode);
    }

    #[test]
    fn test_metadata_ignored_in_text_mode() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.capture_text();
        harness
            .coordinator
            .on_metadata_detected(vec![MetadataObject::new(Symbology::Qr, "nope")]);
        assert_eq!(harness.coordinator.result(), "");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningText);
    }

    #[test]
    fn test_frames_ignored_in_barcode_mode() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.scan_barcode();
        harness.coordinator.on_frames_available(&frame());
        assert!(harness.requests.borrow().is_empty());
    }

    #[test]
    fn test_frames_are_submitted_at_the_configured_interval() {
        let mut harness = Harness::configured(ScanOptions {
            text_frame_interval: 3,
            ..ScanOptions::default()
        });
        harness.coordinator.capture_text();
        for _ in 0..7 {
            harness.coordinator.on_frames_available(&frame());
        }

        // frames 0, 3 and 6
        assert_eq!(harness.requests.borrow().len(), 3);
        assert!(
            harness
                .requests
                .borrow()
                .iter()
                .all(|r| r.source == PayloadSource::Frame)
        );
    }

    #[test]
    fn test_frames_ignored_when_text_from_video_is_off() {
        let mut harness = Harness::configured(ScanOptions {
            text_from_video: false,
            text_frame_interval: 1,
            ..ScanOptions::default()
        });
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        assert!(harness.requests.borrow().is_empty());
    }

    #[test]
    fn test_unconvertible_frame_is_dropped() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&VideoFrame {
            width: 8,
            height: 8,
            stride: 32,
            data: Arc::from(vec![0u8; 4]),
        });
        assert!(harness.requests.borrow().is_empty());
        assert_eq!(harness.coordinator.state(), ScanState::ScanningText);
    }

    #[test]
    fn test_recognized_text_is_joined_with_comma() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let ticket = harness.last_ticket();

        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Frame, &["ABC", "123"]));
        assert_eq!(harness.coordinator.result(), "ABC, 123");
    }

    #[test]
    fn test_empty_frame_result_keeps_previous_text() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let ticket = harness.last_ticket();

        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Frame, &["HELLO"]));
        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Frame, &[]));
        assert_eq!(harness.coordinator.result(), "HELLO");
    }

    #[test]
    fn test_result_from_previous_mode_is_discarded() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let stale = harness.last_ticket();

        harness.coordinator.scan_barcode();
        harness
            .coordinator
            .on_text_recognized(recognized(stale, PayloadSource::Frame, &["stale"]));
        assert_eq!(harness.coordinator.result(), "");

        // Re-entering text mode does not revive the old ticket either
        harness.coordinator.capture_text();
        harness
            .coordinator
            .on_text_recognized(recognized(stale, PayloadSource::Frame, &["stale"]));
        assert_eq!(harness.coordinator.result(), "");
    }

    #[test]
    fn test_recognition_error_changes_nothing() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let ticket = harness.last_ticket();

        harness.coordinator.on_text_recognized(RecognitionOutcome {
            ticket,
            source: PayloadSource::Frame,
            result: Err(RecognitionError::RequestFailed("tesseract".to_string())),
        });
        assert_eq!(harness.coordinator.result(), "");
        assert_eq!(harness.coordinator.state(), ScanState::ScanningText);
    }

    #[test]
    fn test_busy_recognizer_drops_frame_without_state_change() {
        let mut harness = Harness::build(every_frame(), Some(RecognitionError::Busy));
        harness
            .coordinator
            .configure_session(&FakeDevices(Some("cam0")))
            .unwrap();
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());

        assert_eq!(harness.coordinator.state(), ScanState::ScanningText);
        assert!(harness.requests.borrow().is_empty());
    }

    #[test]
    fn test_photo_flow_order() {
        let mut harness = Harness::configured(ScanOptions {
            text_from_video: false,
            ..ScanOptions::default()
        });
        harness.coordinator.capture_text();
        harness.coordinator.capture_photo();
        harness.coordinator.on_photo_captured(&photo());

        assert_eq!(
            harness.calls(),
            vec![
                Call::Start,
                Call::CapturePhoto,
                Call::Submit(PayloadSource::Photo),
                Call::Stop,
            ]
        );
        assert_eq!(harness.coordinator.state(), ScanState::Idle);
        assert_eq!(
            harness.coordinator.still_preview().map(|img| img.dimensions()),
            Some((4, 4))
        );

        // The result arrives after the session stopped and is still accepted
        let ticket = harness.last_ticket();
        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Photo, &["INVOICE", "42"]));
        assert_eq!(harness.coordinator.result(), "INVOICE, 42");
    }

    #[test]
    fn test_late_frame_result_does_not_replace_photo_text() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let ticket = harness.last_ticket();
        harness.coordinator.on_photo_captured(&photo());

        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Photo, &["PHOTO"]));
        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Frame, &["frame"]));
        assert_eq!(harness.coordinator.result(), "PHOTO");
    }

    #[test]
    fn test_photo_flow_stops_even_when_recognizer_fails() {
        let mut harness = Harness::build(
            ScanOptions::default(),
            Some(RecognitionError::RequestFailed("rejected".to_string())),
        );
        harness
            .coordinator
            .configure_session(&FakeDevices(Some("cam0")))
            .unwrap();
        harness.log.borrow_mut().clear();

        harness.coordinator.capture_text();
        harness.coordinator.capture_photo();
        harness.coordinator.on_photo_captured(&photo());

        assert_eq!(
            harness.calls(),
            vec![
                Call::Start,
                Call::CapturePhoto,
                Call::Submit(PayloadSource::Photo),
                Call::Stop,
            ]
        );
        assert!(harness.coordinator.still_preview().is_some());
        assert_eq!(harness.coordinator.state(), ScanState::Idle);
    }

    #[test]
    fn test_undecodable_photo_still_stops_session() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.capture_text();
        harness
            .coordinator
            .on_photo_captured(&PhotoData::new(vec![0, 1, 2]));

        assert_eq!(harness.calls(), vec![Call::Start, Call::Stop]);
        assert!(harness.coordinator.still_preview().is_none());
    }

    #[test]
    fn test_photo_after_mode_switch_is_discarded() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.capture_text();
        harness.coordinator.capture_photo();
        harness.coordinator.scan_barcode();
        harness.coordinator.on_photo_captured(&photo());

        assert!(harness.coordinator.still_preview().is_none());
        assert_eq!(harness.coordinator.state(), ScanState::ScanningBarcode);
        assert!(!harness.calls().contains(&Call::Stop));
    }

    #[test]
    fn test_photo_request_outside_text_scanning_is_ignored() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.scan_barcode();
        harness.coordinator.capture_photo();
        assert!(!harness.calls().contains(&Call::CapturePhoto));
    }

    #[test]
    fn test_mode_switch_clears_still_preview() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.capture_text();
        harness.coordinator.on_photo_captured(&photo());
        assert!(harness.coordinator.still_preview().is_some());

        harness.coordinator.scan_barcode();
        assert!(harness.coordinator.still_preview().is_none());
    }

    #[test]
    fn test_handle_event_routes_payloads() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.scan_barcode();
        harness
            .coordinator
            .handle_event(ScanEvent::Metadata(vec![MetadataObject::new(
                Symbology::Qr,
                "routed",
            )]));
        assert_eq!(harness.coordinator.result(), "routed");

        harness.coordinator.handle_event(ScanEvent::SessionRunning(true));
        assert!(harness.coordinator.is_session_running());
    }

    #[test]
    fn test_session_failure_while_scanning_raises_alert_and_disables_capture() {
        let mut harness = Harness::configured(ScanOptions::default());
        harness.coordinator.scan_barcode();

        let error = ConfigurationError::DeviceUnavailable("Device busy".to_string());
        harness
            .coordinator
            .handle_event(ScanEvent::SessionFailed(error.clone()));

        assert_eq!(harness.coordinator.state(), ScanState::Failed);
        assert_eq!(harness.coordinator.alert(), Some(&error));
        assert!(!harness.coordinator.can_scan());
        assert!(!harness.coordinator.is_session_running());

        harness.coordinator.scan_barcode();
        harness.coordinator.capture_text();
        harness.coordinator.start_scanning();
        assert_eq!(harness.calls(), vec![Call::Start]);
    }

    #[test]
    fn test_repeated_session_failures_keep_first_alert() {
        let mut harness = Harness::configured(every_frame());
        harness.coordinator.capture_text();
        harness.coordinator.on_frames_available(&frame());
        let ticket = harness.last_ticket();

        let first = ConfigurationError::DeviceUnavailable("unplugged".to_string());
        harness.coordinator.on_session_failed(first.clone());
        harness
            .coordinator
            .on_session_failed(ConfigurationError::DeviceUnavailable("again".to_string()));
        assert_eq!(harness.coordinator.alert(), Some(&first));

        // Text that was in flight when the camera failed is dropped
        harness
            .coordinator
            .on_text_recognized(recognized(ticket, PayloadSource::Frame, &["late"]));
        assert_eq!(harness.coordinator.result(), "");
    }
}
