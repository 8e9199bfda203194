use bytes::Bytes;
use image::{ImageError, ImageFormat, ImageReader};
use std::io::Cursor;

/// Formats the model accepts as-is. Anything else decodable is re-encoded to PNG.
const PASSTHROUGH_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Failed to decode image: {0}")]
    Corrupt(#[source] ImageError),
    #[error("Failed to re-encode image as PNG: {0}")]
    Encode(#[source] ImageError),
    #[error("Image decoding was interrupted")]
    Interrupted,
}

/// An uploaded image that decoded successfully, ready to forward to the model.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

pub fn decode_image(image_data: Bytes) -> Result<DecodedImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(&image_data))
        .with_guessed_format()
        .map_err(|_| DecodeError::UnknownFormat)?;

    let format = reader.format().ok_or(DecodeError::UnknownFormat)?;
    let image = reader.decode().map_err(DecodeError::Corrupt)?;

    if PASSTHROUGH_FORMATS.contains(&format) {
        return Ok(DecodedImage {
            mime_type: format.to_mime_type(),
            width: image.width(),
            height: image.height(),
            data: image_data,
        });
    }

    tracing::debug!("Re-encoding {:?} upload as PNG", format);
    let mut buffered = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffered), ImageFormat::Png)
        .map_err(DecodeError::Encode)?;

    Ok(DecodedImage {
        mime_type: ImageFormat::Png.to_mime_type(),
        width: image.width(),
        height: image.height(),
        data: Bytes::from(buffered),
    })
}

/// Runs [`decode_image`] on the blocking pool so large uploads don't stall the runtime.
pub async fn decode_image_blocking(image_data: Bytes) -> Result<DecodedImage, DecodeError> {
    tokio::task::spawn_blocking(move || decode_image(image_data))
        .await
        .map_err(|e| {
            tracing::error!("Image decode task failed: {}", e);
            DecodeError::Interrupted
        })?
}

#[cfg(test)]
pub(crate) fn encode_sample(format: ImageFormat) -> Bytes {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    Bytes::from(buf)
}
