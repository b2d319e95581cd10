//! The scanner screen: camera preview, result field and the scan actions

use cosmic::Element;
use cosmic::iced::Length;
use cosmic::iced_core::{Alignment, ContentFit};
use cosmic::iced_widget::{column, row};
use cosmic::widget::{button, container, image, text, text_input};

use crate::capture::PreviewImage;
use crate::fl;
use crate::scan::ScanState;

/// What the scanner screen shows
pub struct ScannerView<'a> {
    pub state: ScanState,
    pub result: &'a str,
    /// Captured photo, shown instead of the live feed when present
    pub still_preview: Option<&'a PreviewImage>,
    pub live_preview: Option<&'a PreviewImage>,
    /// The camera is delivering frames
    pub camera_running: bool,
    pub can_scan: bool,
}

/// Build the scanner screen
pub fn build_scanner_view<'a, Msg: Clone + 'static>(
    view: ScannerView<'a>,
    on_scan_barcode: Msg,
    on_capture_text: Msg,
    on_take_photo: Msg,
    on_result_edited: impl Fn(String) -> Msg + 'a,
) -> Element<'a, Msg> {
    let cosmic::cosmic_theme::Spacing {
        space_s, space_xs, ..
    } = cosmic::theme::active().cosmic().spacing;

    let preview: Element<'a, Msg> = match view.still_preview.or(view.live_preview) {
        Some(picture) => image::Image::new(picture.handle.clone())
            .content_fit(ContentFit::Cover)
            .width(Length::Fill)
            .height(Length::Fill)
            .into(),
        None => {
            let placeholder = if view.state == ScanState::Failed {
                fl!("preview-unavailable")
            } else {
                fl!("preview-waiting")
            };
            container(text::body(placeholder))
                .center(Length::Fill)
                .into()
        }
    };

    let status = match view.state {
        ScanState::ScanningBarcode | ScanState::ScanningText if !view.camera_running => {
            fl!("status-starting")
        }
        ScanState::Idle => fl!("status-idle"),
        ScanState::ScanningBarcode => fl!("status-scanning-barcode"),
        ScanState::ScanningText => fl!("status-scanning-text"),
        ScanState::Failed => fl!("status-failed"),
    };

    let result_field = text_input(fl!("result-placeholder"), view.result)
        .on_input(on_result_edited)
        .width(Length::Fill);

    let photo_enabled = view.state == ScanState::ScanningText;
    let actions = row![
        button::standard(fl!("scan-barcode"))
            .on_press_maybe(view.can_scan.then_some(on_scan_barcode)),
        button::standard(fl!("capture-text"))
            .on_press_maybe(view.can_scan.then_some(on_capture_text)),
        cosmic::widget::horizontal_space(),
        button::suggested(fl!("take-photo"))
            .on_press_maybe(photo_enabled.then_some(on_take_photo)),
    ]
    .spacing(space_xs)
    .align_y(Alignment::Center)
    .width(Length::Fill);

    column![
        container(preview)
            .width(Length::Fill)
            .height(Length::Fill)
            .class(cosmic::theme::Container::Card),
        text::caption(status),
        result_field,
        actions,
    ]
    .spacing(space_s)
    .padding(space_s)
    .width(Length::Fill)
    .height(Length::Fill)
    .into()
}
