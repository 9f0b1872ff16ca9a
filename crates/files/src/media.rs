//! Best-effort media type detection for uploaded images.

/// Image formats the certificate renderer can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMediaType {
    Png,
    Jpeg,
}

impl ImageMediaType {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageMediaType::Png => "image/png",
            ImageMediaType::Jpeg => "image/jpeg",
        }
    }
}

/// Detects whether `bytes` look like an embeddable image, based on magic numbers.
///
/// Returns `None` for anything else (including other image formats such as GIF or WebP). This
/// is not a guarantee that the image decodes; callers must still handle decode failures.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageMediaType> {
    match infer::get(bytes).map(|kind| kind.mime_type()) {
        Some("image/png") => Some(ImageMediaType::Png),
        Some("image/jpeg") => Some(ImageMediaType::Jpeg),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png_signature() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d];
        assert_eq!(sniff_image(&png), Some(ImageMediaType::Png));
    }

    #[test]
    fn detects_jpeg_signature() {
        let jpeg = [0xff, 0xd8, 0xff, 0xe0, 0, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(sniff_image(&jpeg), Some(ImageMediaType::Jpeg));
    }

    #[test]
    fn rejects_text_and_pdf() {
        assert_eq!(sniff_image(b"hello world"), None);
        assert_eq!(sniff_image(b"%PDF-1.4\n"), None);
        assert_eq!(sniff_image(&[]), None);
    }
}
