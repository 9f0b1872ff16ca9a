//! QR backend built on `qrcode`, encoded to PNG with `image`.

use image::{DynamicImage, ImageOutputFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

use super::QrRenderer;
use crate::{CertError, CertResult};

/// Pixel size of one QR module in the PNG.
const MODULE_PX: u32 = 8;

#[derive(Debug, Clone, Copy)]
pub struct QrCodeRenderer {
    ec_level: EcLevel,
}

impl Default for QrCodeRenderer {
    fn default() -> Self {
        Self {
            ec_level: EcLevel::M,
        }
    }
}

impl QrCodeRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QrRenderer for QrCodeRenderer {
    fn render_png(&self, data: &str) -> CertResult<Vec<u8>> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), self.ec_level)
            .map_err(|e| CertError::RenderFailed(format!("QR encoding error: {e}")))?;

        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(MODULE_PX, MODULE_PX)
            .quiet_zone(true)
            .build();

        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(|e| CertError::RenderFailed(format!("QR PNG encoding error: {e}")))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialcert_files::{sniff_image, ImageMediaType};

    #[test]
    fn renders_png() {
        let png = QrCodeRenderer::new()
            .render_png("https://trials.example.org/verify/0123456789abcdef0123456789abcdef")
            .unwrap();
        assert_eq!(sniff_image(&png), Some(ImageMediaType::Png));

        let decoded = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(decoded.width(), decoded.height());
        assert_eq!(decoded.width() % MODULE_PX, 0);
    }

    #[test]
    fn oversized_payload_is_a_render_failure() {
        let data = "x".repeat(5_000);
        let err = QrCodeRenderer::new().render_png(&data).unwrap_err();
        assert!(matches!(err, CertError::RenderFailed(_)));
    }
}
