//! PDF backend built on `printpdf`.

use printpdf::image_crate::{self, DynamicImage};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Rgb,
};
use std::io::BufWriter;

use super::{Element, Ink, LaidOutDocument, PdfRenderer};
use crate::constants::BRAND_COLOUR;
use crate::{CertError, CertResult};

const LAYER_NAME: &str = "Layer 1";
/// Baseline position within a text slot, as a fraction of the slot height.
const BASELINE: f32 = 0.78;

#[derive(Debug, Default, Clone, Copy)]
pub struct PrintPdfRenderer;

impl PrintPdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn ink_colour(ink: Ink) -> Color {
    let (r, g, b) = match ink {
        Ink::Black => (0.0, 0.0, 0.0),
        Ink::Brand => BRAND_COLOUR,
        Ink::Link => (0.0, 0.40, 0.27),
    };
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Builtin PDF fonts only cover Latin-1; map common typography and replace the rest.
pub(crate) fn pdf_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\u{2022}' => out.push('*'),
            '\u{2026}' => out.push_str("..."),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c if (c as u32) <= 0xFF => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn render_err(context: &str, e: impl std::fmt::Display) -> CertError {
    CertError::RenderFailed(format!("{context}: {e}"))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PdfRenderer for PrintPdfRenderer {
    fn render(&self, document: &LaidOutDocument) -> CertResult<Vec<u8>> {
        let geometry = document.geometry;
        let (doc, first_page, first_layer) = PdfDocument::new(
            pdf_safe(&document.title),
            Mm(geometry.width),
            Mm(geometry.height),
            LAYER_NAME,
        );

        let fonts = Fonts {
            regular: doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| render_err("PDF font error", e))?,
            bold: doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| render_err("PDF font error", e))?,
        };

        let mut layers: Vec<PdfLayerReference> =
            vec![doc.get_page(first_page).get_layer(first_layer)];
        for _ in 1..document.page_count.max(1) {
            let (page, layer) = doc.add_page(Mm(geometry.width), Mm(geometry.height), LAYER_NAME);
            layers.push(doc.get_page(page).get_layer(layer));
        }

        // Layout coordinates run down from the top; PDF coordinates run up from the bottom.
        let flip = |y: f32| geometry.height - y;

        for element in &document.elements {
            let layer = layers
                .get(element.page())
                .ok_or_else(|| render_err("layout error", "element placed past the last page"))?;

            match element {
                Element::Text {
                    slot,
                    text,
                    size,
                    bold,
                    ink,
                } => {
                    if text.is_empty() {
                        continue;
                    }
                    let baseline = flip(slot.rect.y + slot.rect.height * BASELINE);
                    let font = if *bold { &fonts.bold } else { &fonts.regular };
                    layer.set_fill_color(ink_colour(*ink));
                    layer.use_text(pdf_safe(text), *size, Mm(slot.rect.x), Mm(baseline), font);
                }
                Element::Rule { y, x1, x2, .. } => {
                    layer.set_outline_color(ink_colour(Ink::Brand));
                    layer.set_outline_thickness(1.0);
                    layer.add_line(Line {
                        points: vec![
                            (Point::new(Mm(*x1), Mm(flip(*y))), false),
                            (Point::new(Mm(*x2), Mm(flip(*y))), false),
                        ],
                        is_closed: false,
                    });
                }
                Element::Image { slot, asset } => {
                    let decoded = match image_crate::load_from_memory(&asset.bytes) {
                        Ok(decoded) => decoded,
                        Err(e) => {
                            tracing::warn!(error = %e, "image could not be decoded, skipping");
                            continue;
                        }
                    };
                    // Alpha channels are not embedded reliably; flatten to RGB.
                    let rgb = decoded.to_rgb8();
                    let dpi = rgb.width() as f32 * 25.4 / slot.rect.width.max(1.0);
                    let rgb = DynamicImage::ImageRgb8(rgb);
                    Image::from_dynamic_image(&rgb).add_to_layer(
                        layer.clone(),
                        ImageTransform {
                            translate_x: Some(Mm(slot.rect.x)),
                            translate_y: Some(Mm(flip(slot.rect.bottom()))),
                            dpi: Some(dpi),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| render_err("PDF save error", e))?;
        buf.into_inner()
            .map_err(|e| render_err("PDF buffer error", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{Attachment, Derived, FormType, Submission};
    use crate::render::tests::png;
    use crate::render::{compose, CertificateContent};
    use chrono::Utc;
    use trialcert_uuid::CertificateId;

    #[test]
    fn pdf_safe_maps_typography_and_drops_unsupported() {
        assert_eq!(pdf_safe("2\u{2013}15 cm\u{b2}"), "2-15 cm\u{b2}");
        assert_eq!(pdf_safe("\u{2265} 18"), ">= 18");
        assert_eq!(pdf_safe("ok \u{2705}"), "ok ?");
        assert_eq!(pdf_safe("a\tb\u{7}"), "a b");
    }

    #[test]
    fn renders_a_multi_page_pdf_with_images() {
        let id = CertificateId::new();
        let submission = Submission::new(FormType::Consent)
            .with_field("patient_code", "P-01")
            .with_attachment(
                "sig_patient",
                Attachment {
                    filename: "sig.png".into(),
                    bytes: png(120, 40),
                },
            );
        let derived = Derived::compute(&submission);
        let qr = png(33, 33);
        let consent = "Clause of the agreement. ".repeat(600);
        let document = compose(&CertificateContent {
            brand: "TrialCert",
            id: &id,
            created_at: Utc::now(),
            verification_url: "http://localhost:8080/verify/abc",
            submission: &submission,
            derived: &derived,
            consent_text: &consent,
            qr_png: &qr,
        });
        assert!(document.page_count > 1);

        let bytes = PrintPdfRenderer::new().render(&document).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.len() > 1_000);
    }
}
