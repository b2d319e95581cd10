//! Camera discovery through the GStreamer device monitor

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::scan::DeviceProvider;

/// Finds video capture devices, preferring a configured camera by name
pub struct GstDeviceProvider {
    preferred: Option<String>,
}

impl GstDeviceProvider {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }

    /// List all video sources currently known to GStreamer
    pub fn video_devices() -> Vec<gst::Device> {
        if let Err(e) = gst::init() {
            log::error!("Failed to initialize GStreamer: {}", e);
            return Vec::new();
        }

        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Video/Source"), None);
        if let Err(e) = monitor.start() {
            log::warn!("Failed to start device monitor: {}", e);
            return Vec::new();
        }
        let devices: Vec<gst::Device> = monitor.devices().into_iter().collect();
        monitor.stop();

        log::info!(
            "Video devices: {:?}",
            devices
                .iter()
                .map(|d| d.display_name().to_string())
                .collect::<Vec<_>>()
        );
        devices
    }
}

impl DeviceProvider for GstDeviceProvider {
    type Device = gst::Device;

    fn default_video_device(&self) -> Option<gst::Device> {
        let mut devices = Self::video_devices();
        let names: Vec<String> = devices
            .iter()
            .map(|d| d.display_name().to_string())
            .collect();
        let index = pick_device(&names, self.preferred.as_deref())?;
        Some(devices.swap_remove(index))
    }
}

/// Index of the preferred device if present, otherwise the first one
fn pick_device(names: &[String], preferred: Option<&str>) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let chosen = preferred
        .and_then(|wanted| names.iter().position(|name| name == wanted))
        .unwrap_or(0);
    if let Some(wanted) = preferred {
        if names[chosen] != wanted {
            log::warn!("Preferred camera '{}' not found, using '{}'", wanted, names[chosen]);
        }
    }
    Some(chosen)
}
