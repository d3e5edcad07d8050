//! QR code extraction from uploaded images

use thiserror::Error;
use tracing::debug;

/// Errors that can occur when extracting a QR payload from an image
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QrError {
    #[error("Invalid image")]
    InvalidImage,

    #[error("QR code not found")]
    NotFound,
}

/// Turns encoded image bytes into the payload of the first readable QR code.
///
/// Decoding is CPU-bound; async callers should run it on a blocking thread.
pub trait QrDecoder: Send + Sync {
    fn decode(&self, image: &[u8]) -> Result<String, QrError>;
}

/// Decoder for PNG/JPEG uploads
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageQrDecoder;

impl QrDecoder for ImageQrDecoder {
    fn decode(&self, image: &[u8]) -> Result<String, QrError> {
        let decoded = image::load_from_memory(image).map_err(|e| {
            debug!("Rejected upload: {}", e);
            QrError::InvalidImage
        })?;

        let luma = decoded.to_luma8();
        let (width, height) = luma.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                luma.get_pixel(x as u32, y as u32)[0]
            });

        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
            .ok_or(QrError::NotFound)
    }
}
