//! QR-code rendering for TOTP enrollment
//!
//! Rendering a provisioning URI into an image is pure computation, so the
//! trait is synchronous. The setup flow base64-encodes the PNG bytes into a
//! data URL for enrollment screens.

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("Failed to encode QR code")]
    Encode,
    #[error("Failed to render QR image")]
    Render,
}

pub trait QrRenderer: Send + Sync {
    fn render(&self, uri: &str) -> Result<Vec<u8>, QrError>;
}

/// [`QrRenderer`] producing PNG bytes via the `qrcode` and `image` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngQrRenderer;

impl QrRenderer for PngQrRenderer {
    fn render(&self, uri: &str) -> Result<Vec<u8>, QrError> {
        let qr = qrcode::QrCode::new(uri.as_bytes()).map_err(|_| QrError::Encode)?;
        let qr_image = qr.render::<image::Luma<u8>>().build();

        let dynamic_image = image::DynamicImage::ImageLuma8(qr_image);
        let mut png_data = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut png_data);
        dynamic_image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|_| QrError::Render)?;

        Ok(png_data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn test_renders_png() {
        let png = PngQrRenderer
            .render("otpauth://totp/Workforce:worker%40example.com?secret=JBSWY3DPEHPK3PXP")
            .unwrap();

        // PNG magic bytes
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']));
    }
}
