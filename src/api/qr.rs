//! QR code rendering of client configurations

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::{Error, Result};

/// Smallest edge of the rendered image in pixels
const MIN_SIZE: u32 = 256;

/// Light modules around the symbol
const QUIET_ZONE: u32 = 4;

/// Encode `text` as a PNG QR code with medium error correction
pub fn render_png(text: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
        .map_err(|e| Error::QrRender(e.to_string()))?;

    let width = code.width() as u32;
    let colors = code.to_colors();
    let modules = width + 2 * QUIET_ZONE;
    let scale = MIN_SIZE.div_ceil(modules);
    let edge = modules * scale;

    let image = GrayImage::from_fn(edge, edge, |x, y| {
        let (mx, my) = (x / scale, y / scale);
        let dark = mx >= QUIET_ZONE
            && my >= QUIET_ZONE
            && mx < QUIET_ZONE + width
            && my < QUIET_ZONE + width
            && colors[((my - QUIET_ZONE) * width + (mx - QUIET_ZONE)) as usize] == Color::Dark;
        if dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| Error::QrRender(e.to_string()))?;
    Ok(png.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_png() {
        let png = render_png("[Interface]\nPrivateKey = abc=\n").unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        let decoded = image::load_from_memory(&png).unwrap();
        assert!(decoded.width() >= MIN_SIZE);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[test]
    fn test_oversized_input_fails() {
        let text = "x".repeat(8000);
        assert!(matches!(render_png(&text), Err(Error::QrRender(_))));
    }
}
