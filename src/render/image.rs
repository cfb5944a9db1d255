//! Image presenter.

use std::io::Write;

use image::{DynamicImage, GenericImageView, ImageFormat};

use super::graphics::{is_paletted_source, write_image, GraphicsProtocol};
use crate::error_handling::RenderError;
use crate::trace::TraceLog;
use crate::utils::bytes_si;

/// A decoded image and what the terminal writers need to know about its source.
#[derive(Debug)]
pub struct DecodedImage {
    /// Decoded pixels
    pub image: DynamicImage,
    /// Detected container format
    pub format: ImageFormat,
    /// Whether the source stored palette indexes
    pub paletted: bool,
}

impl DecodedImage {
    /// Decodes a PNG, JPEG or GIF image.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Image` when the format is not recognized or the
    /// data is corrupt.
    pub fn decode(bytes: &[u8]) -> Result<Self, RenderError> {
        let format = image::guess_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self {
            image,
            format,
            paletted: is_paletted_source(bytes),
        })
    }

    fn format_name(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            other => other.extensions_str().first().copied().unwrap_or("unknown"),
        }
    }
}

/// Describes an image body on the trace log then draws it on the terminal.
///
/// # Arguments
///
/// * `body` - Encoded image
/// * `content_type` - Response `content-type` header
/// * `content_length` - Response `content-length` header, when it parses
/// * `log` - Trace printer
/// * `protocol` - Terminal graphics protocol
/// * `out` - Output sink
///
/// # Errors
///
/// Returns a `RenderError` if the image cannot be decoded or the terminal
/// cannot display it.
pub fn render_image(
    body: &[u8],
    content_type: &str,
    content_length: Option<u64>,
    log: &TraceLog,
    protocol: Option<GraphicsProtocol>,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    let decoded = DecodedImage::decode(body)?;
    let (width, height) = decoded.image.dimensions();

    log.info("Content-Type : ");
    log.valueln(content_type);
    log.info("Format : ");
    log.valueln(decoded.format_name());
    log.info("Dimensions : ");
    log.valueln(format!("{width}x{height}"));
    if let Some(size) = content_length {
        log.info("Size : ");
        log.valueln(format!("{size} ({})", bytes_si(size)));
    }
    log.flush();

    write_image(&decoded.image, decoded.paletted, protocol, out)
}
