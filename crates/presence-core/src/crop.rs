//! Face crop extraction from detector output.

use crate::types::{BoundingBox, Detection};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Side length of the square crop handed to the scorers and the embedder.
pub const FACE_CROP_SIZE: u32 = 160;

#[derive(Error, Debug, PartialEq)]
pub enum CropError {
    #[error("face box ({x1}, {y1})-({x2}, {y2}) encloses no pixels")]
    EmptyBox { x1: i64, y1: i64, x2: i64, y2: i64 },
    #[error("face box lies outside the {width}x{height} frame")]
    OutsideFrame { width: u32, height: u32 },
}

/// Crop `bbox` out of `frame` and resize it to `FACE_CROP_SIZE` square.
///
/// Coordinates are truncated to integers and clamped to the frame. Boxes that
/// are empty before or after clamping are rejected.
pub fn extract_face(frame: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, CropError> {
    let (x1, y1, x2, y2) = (
        bbox.x1 as i64,
        bbox.y1 as i64,
        bbox.x2 as i64,
        bbox.y2 as i64,
    );
    if x2 <= x1 || y2 <= y1 {
        return Err(CropError::EmptyBox { x1, y1, x2, y2 });
    }

    let (width, height) = frame.dimensions();
    let cx1 = x1.clamp(0, i64::from(width));
    let cy1 = y1.clamp(0, i64::from(height));
    let cx2 = x2.clamp(0, i64::from(width));
    let cy2 = y2.clamp(0, i64::from(height));
    if cx2 <= cx1 || cy2 <= cy1 {
        return Err(CropError::OutsideFrame { width, height });
    }

    let (cw, ch) = ((cx2 - cx1) as u32, (cy2 - cy1) as u32);
    if (cx1, cy1) != (x1, y1) || (cx2, cy2) != (x2, y2) {
        tracing::debug!(x1, y1, x2, y2, width, height, "face box clamped to frame");
    }

    let region = imageops::crop_imm(frame, cx1 as u32, cy1 as u32, cw, ch).to_image();
    Ok(imageops::resize(
        &region,
        FACE_CROP_SIZE,
        FACE_CROP_SIZE,
        FilterType::Triangle,
    ))
}

/// Detections confident enough to score, in detector order.
///
/// Keeps faces with confidence strictly above `min_confidence` whose box is
/// not empty.
pub fn select_detections(detections: &[Detection], min_confidence: f32) -> Vec<&Detection> {
    detections
        .iter()
        .filter(|d| d.confidence > min_confidence && !d.bbox.is_empty())
        .collect()
}
