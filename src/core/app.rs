use std::any::TypeId;

use cosmic::app;
use cosmic::{ApplicationExt, Task};
use cosmic::iced_futures::Subscription;
use futures::SinkExt;

use crate::capture::{GstCaptureSession, GstDeviceProvider, OcrWorker, PreviewImage};
use crate::config::ScannerConfig;
use crate::fl;
use crate::scan::{EventSender, ScanCoordinator, ScanEvent};
use crate::widget::scanner::{ScannerView, build_scanner_view};

/// Queue depth between the capture threads and the UI
const EVENT_QUEUE: usize = 8;

pub type Coordinator = ScanCoordinator<GstCaptureSession, OcrWorker>;

pub(crate) fn run() -> cosmic::iced::Result {
    let settings =
        cosmic::app::Settings::default().size(cosmic::iced::Size::new(480.0, 720.0));
    cosmic::app::run::<App>(settings, ())
}

pub struct App {
    pub core: app::Core,
    pub config: ScannerConfig,
    /// Created once the event subscription is up
    pub coordinator: Option<Coordinator>,
    /// Latest frame from the camera
    pub live_preview: Option<PreviewImage>,
    /// Display copy of the coordinator's captured photo
    pub still_preview: Option<PreviewImage>,
}

#[derive(Debug, Clone)]
pub enum Msg {
    /// The event subscription is running and hands out its sender
    EventsReady(EventSender),
    /// Event from the capture or recognizer threads
    Scan(ScanEvent),
    ScanBarcode,
    CaptureText,
    TakePhoto,
    ResultEdited(String),
    DismissAlert,
}

impl App {
    /// Build the capture session and recognizer, then configure the camera
    fn start_capture(&mut self, events: EventSender) {
        if self.coordinator.is_some() {
            log::warn!("Event channel restarted, keeping the existing capture session");
            return;
        }

        let recognizer = OcrWorker::spawn(self.config.ocr_settings(), events.clone());
        let options = self.config.scan_options();
        let mut coordinator =
            match GstCaptureSession::new(events, self.config.pipeline_settings()) {
                Ok(session) => ScanCoordinator::new(session, recognizer, options),
                Err(err) => ScanCoordinator::unavailable(recognizer, options, err),
            };

        let devices = GstDeviceProvider::new(self.config.preferred_camera.clone());
        if coordinator.configure_session(&devices).is_ok() && self.config.scan_on_launch {
            coordinator.scan_barcode();
        }
        self.coordinator = Some(coordinator);
    }

    /// Keep the photo preview in step with the coordinator
    fn sync_still_preview(&mut self) {
        match self.coordinator.as_ref().and_then(|c| c.still_preview()) {
            Some(photo) if self.still_preview.is_none() => {
                self.still_preview = Some(PreviewImage::from_rgba(photo.clone()));
            }
            Some(_) => {}
            None => self.still_preview = None,
        }
    }
}

impl cosmic::Application for App {
    type Executor = cosmic::executor::Default;

    type Flags = ();

    type Message = Msg;

    const APP_ID: &'static str = ScannerConfig::ID;

    fn core(&self) -> &app::Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut app::Core {
        &mut self.core
    }

    fn init(
        core: app::Core,
        _flags: Self::Flags,
    ) -> (Self, cosmic::iced::Task<cosmic::Action<Self::Message>>) {
        let config = ScannerConfig::load();
        log::debug!("Loaded config: {:?}", config);

        let mut app = Self {
            core,
            config,
            coordinator: None,
            live_preview: None,
            still_preview: None,
        };
        app.set_header_title(fl!("app-title"));

        (app, Task::none())
    }

    fn view(&self) -> cosmic::Element<'_, Self::Message> {
        let coordinator = self.coordinator.as_ref();
        let view = ScannerView {
            state: coordinator.map(|c| c.state()).unwrap_or_default(),
            result: coordinator.map(|c| c.result()).unwrap_or_default(),
            still_preview: self.still_preview.as_ref(),
            live_preview: self.live_preview.as_ref(),
            camera_running: coordinator.is_some_and(|c| c.is_session_running()),
            can_scan: coordinator.is_some_and(|c| c.can_scan()),
        };

        build_scanner_view(
            view,
            Msg::ScanBarcode,
            Msg::CaptureText,
            Msg::TakePhoto,
            Msg::ResultEdited,
        )
    }

    fn dialog(&self) -> Option<cosmic::Element<'_, Self::Message>> {
        let error = self.coordinator.as_ref()?.alert()?;

        Some(
            cosmic::widget::dialog()
                .title(fl!("scanning-unsupported"))
                .body(fl!("scanning-unsupported-body", reason = error.to_string()))
                .primary_action(
                    cosmic::widget::button::suggested(fl!("ok")).on_press(Msg::DismissAlert),
                )
                .into(),
        )
    }

    fn update(
        &mut self,
        message: Self::Message,
    ) -> cosmic::iced::Task<cosmic::Action<Self::Message>> {
        match message {
            Msg::EventsReady(events) => self.start_capture(events),
            Msg::Scan(event) => {
                if let ScanEvent::Frame(frame) = &event {
                    match PreviewImage::from_frame(frame) {
                        Ok(preview) => self.live_preview = Some(preview),
                        Err(err) => log::debug!("Preview frame skipped: {}", err),
                    }
                }
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.handle_event(event);
                }
            }
            Msg::ScanBarcode => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.scan_barcode();
                }
            }
            Msg::CaptureText => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.capture_text();
                }
            }
            Msg::TakePhoto => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.capture_photo();
                }
            }
            Msg::ResultEdited(text) => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.edit_result(text);
                }
            }
            Msg::DismissAlert => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.dismiss_alert();
                }
            }
        }

        self.sync_still_preview();
        Task::none()
    }

    fn subscription(&self) -> Subscription<Self::Message> {
        scan_event_subscription()
    }
}

/// Bridge events from the capture and recognizer threads into the UI
fn scan_event_subscription() -> Subscription<Msg> {
    struct ScanEvents;

    Subscription::run_with_id(
        TypeId::of::<ScanEvents>(),
        cosmic::iced::stream::channel(EVENT_QUEUE, |mut output| async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(EVENT_QUEUE);
            if output.send(Msg::EventsReady(tx)).await.is_err() {
                return;
            }

            while let Some(event) = rx.recv().await {
                if output.send(Msg::Scan(event)).await.is_err() {
                    break;
                }
            }
            log::debug!("Scan event channel closed");
        }),
    )
}
