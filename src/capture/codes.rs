//! Machine-readable code detection
//!
//! QR codes are decoded in-process with rqrr. When GStreamer's zbar element is
//! installed it handles every supported symbology and reports through bus
//! messages, which are mapped here.

use image::RgbaImage;

use crate::scan::{MetadataObject, Symbology};

/// Detect QR codes in a frame.
/// max_dim: maximum dimension to downsample to (0 = no downsampling)
pub fn detect_codes(img: &RgbaImage, max_dim: u32) -> Vec<MetadataObject> {
    use rqrr::PreparedImage;

    let (orig_w, orig_h) = (img.width(), img.height());
    let downsample_factor = if max_dim > 0 && (orig_w > max_dim || orig_h > max_dim) {
        orig_w.max(orig_h) as f32 / max_dim as f32
    } else {
        1.0
    };

    let gray = if downsample_factor > 1.0 {
        let new_w = (orig_w as f32 / downsample_factor) as u32;
        let new_h = (orig_h as f32 / downsample_factor) as u32;
        let resized =
            image::imageops::resize(img, new_w, new_h, image::imageops::FilterType::Nearest);
        image::DynamicImage::ImageRgba8(resized).to_luma8()
    } else {
        image::DynamicImage::ImageRgba8(img.clone()).to_luma8()
    };

    let mut prepared = PreparedImage::prepare(gray);
    prepared
        .detect_grids()
        .into_iter()
        .filter_map(|grid| match grid.decode() {
            Ok((_, content)) => Some(MetadataObject::new(Symbology::Qr, content)),
            Err(e) => {
                log::debug!("QR grid found but not decodable: {:?}", e);
                None
            }
        })
        .collect()
}

/// Map a zbar symbol type name to a supported symbology
pub fn symbology_from_zbar(kind: &str) -> Option<Symbology> {
    match kind {
        "QR-Code" => Some(Symbology::Qr),
        "EAN-8" => Some(Symbology::Ean8),
        "EAN-13" => Some(Symbology::Ean13),
        "PDF417" => Some(Symbology::Pdf417),
        _ => None,
    }
}

/// Keep only codes of the enabled symbologies
pub fn retain_enabled(objects: &mut Vec<MetadataObject>, enabled: &[Symbology]) {
    objects.retain(|o| enabled.contains(&o.symbology));
}
