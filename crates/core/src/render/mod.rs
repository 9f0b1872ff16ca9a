//! Certificate composition.
//!
//! [`compose`] turns a submission into a [`LaidOutDocument`]: a flat list of positioned text,
//! rules and images produced by the [`LayoutAllocator`]. Backends behind [`PdfRenderer`] and
//! [`QrRenderer`] only draw what they are given.

mod pdf;
mod qr;

pub use pdf::PrintPdfRenderer;
pub use qr::QrCodeRenderer;

use chrono::{DateTime, Utc};
use std::io::Cursor;
use trialcert_files::{sniff_image, ImageMediaType};
use trialcert_uuid::CertificateId;

use crate::constants::QR_SIZE_MM;
use crate::forms::{AttachmentKind, Derived, FieldKind, Submission};
use crate::layout::{LayoutAllocator, PageGeometry, Slot};
use crate::CertResult;

/// Millimetres per typographic point.
const PT_TO_MM: f32 = 0.352_8;
/// Mean Helvetica glyph advance as a fraction of the font size, rounded up.
const GLYPH_WIDTH_EM: f32 = 0.55;
const LINE_SPACING: f32 = 1.35;

const BODY_SIZE: f32 = 10.5;
const SMALL_SIZE: f32 = 9.5;
const HEADING_SIZE: f32 = 12.0;
const TITLE_SIZE: f32 = 16.0;
const BRAND_SIZE: f32 = 20.0;

const SIGNATURE_WIDTH_MM: f32 = 70.0;
const PHOTO_MAX_WIDTH_MM: f32 = 78.0;
const PHOTO_MAX_HEIGHT_MM: f32 = 56.0;

/// Placeholder printed for missing values.
pub const MISSING_VALUE: &str = "-";

/// Text colours used on certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ink {
    Black,
    Brand,
    Link,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text {
        slot: Slot,
        text: String,
        size: f32,
        bold: bool,
        ink: Ink,
    },
    Rule {
        page: usize,
        y: f32,
        x1: f32,
        x2: f32,
    },
    Image {
        slot: Slot,
        asset: ImageAsset,
    },
}

impl Element {
    pub fn page(&self) -> usize {
        match self {
            Element::Text { slot, .. } | Element::Image { slot, .. } => slot.page,
            Element::Rule { page, .. } => *page,
        }
    }
}

/// A decoded-enough image: the format is known and the pixel size is probed.
#[derive(Clone, PartialEq)]
pub struct ImageAsset {
    pub media_type: ImageMediaType,
    pub width_px: u32,
    pub height_px: u32,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("media_type", &self.media_type)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageAsset {
    /// Checks that `bytes` is a PNG or JPEG and reads its dimensions.
    pub fn probe(bytes: &[u8]) -> Result<Self, String> {
        let media_type = sniff_image(bytes).ok_or("unsupported image format")?;
        let (width_px, height_px) = printpdf::image_crate::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())?;
        if width_px == 0 || height_px == 0 {
            return Err("image has no pixels".into());
        }
        Ok(Self {
            media_type,
            width_px,
            height_px,
            bytes: bytes.to_vec(),
        })
    }

    /// Size on the page at `width_mm`, preserving aspect ratio.
    fn size_at_width(&self, width_mm: f32) -> (f32, f32) {
        let ratio = self.height_px as f32 / self.width_px as f32;
        (width_mm, width_mm * ratio)
    }

    /// Largest size that fits inside the box, preserving aspect ratio.
    fn size_within(&self, max_width: f32, max_height: f32) -> (f32, f32) {
        let (w, h) = self.size_at_width(max_width);
        if h <= max_height {
            (w, h)
        } else {
            (max_width * max_height / h, max_height)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutDocument {
    pub title: String,
    pub geometry: PageGeometry,
    pub page_count: usize,
    pub elements: Vec<Element>,
}

impl LaidOutDocument {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|element| match element {
            Element::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Everything printed on one certificate.
#[derive(Debug, Clone, Copy)]
pub struct CertificateContent<'a> {
    pub brand: &'a str,
    pub id: &'a CertificateId,
    pub created_at: DateTime<Utc>,
    pub verification_url: &'a str,
    pub submission: &'a Submission,
    pub derived: &'a Derived,
    pub consent_text: &'a str,
    pub qr_png: &'a [u8],
}

/// Renders a laid-out certificate to PDF bytes.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, document: &LaidOutDocument) -> CertResult<Vec<u8>>;
}

/// Renders a QR code encoding `data` as PNG bytes.
pub trait QrRenderer: Send + Sync {
    fn render_png(&self, data: &str) -> CertResult<Vec<u8>>;
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn line_height(size: f32) -> f32 {
    size * PT_TO_MM * LINE_SPACING
}

/// Greedy word wrap to the number of glyphs that fit in `width_mm`. Words longer than a line
/// (URLs, hashes) are split.
pub fn wrap_text(text: &str, width_mm: f32, size: f32) -> Vec<String> {
    let max_chars = ((width_mm / (size * PT_TO_MM * GLYPH_WIDTH_EM)) as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let current_len = current.chars().count();
            if current_len > 0 && current_len + 1 + word.len() > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct Composer {
    layout: LayoutAllocator,
    elements: Vec<Element>,
}

impl Composer {
    fn new() -> Self {
        Self {
            layout: LayoutAllocator::default(),
            elements: Vec::new(),
        }
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, ink: Ink) {
        let height = line_height(size);
        // Reservations only ever sit at or above the cursor, so the first line is the narrowest.
        let mut slot = self.layout.line(height);
        for (i, line) in wrap_text(text, slot.rect.width, size).into_iter().enumerate() {
            if i > 0 {
                slot = self.layout.line(height);
            }
            self.elements.push(Element::Text {
                slot,
                text: line,
                size,
                bold,
                ink,
            });
        }
    }

    fn paragraphs(&mut self, text: &str, size: f32) {
        for paragraph in text.lines() {
            if paragraph.trim().is_empty() {
                self.layout.gap(line_height(size) / 2.0);
            } else {
                self.text(paragraph, size, false, Ink::Black);
            }
        }
    }

    fn heading(&mut self, text: &str) {
        self.layout.gap(2.0);
        self.layout.ensure(line_height(HEADING_SIZE) + line_height(BODY_SIZE));
        self.text(text, HEADING_SIZE, true, Ink::Black);
    }

    fn rule(&mut self) {
        self.layout.gap(1.0);
        let geometry = self.layout.geometry();
        self.elements.push(Element::Rule {
            page: self.layout.current_page(),
            y: self.layout.cursor(),
            x1: geometry.margin,
            x2: geometry.width - geometry.margin,
        });
        self.layout.gap(2.5);
    }

    fn image(&mut self, asset: ImageAsset, width: f32, height: f32) {
        let slot = self.layout.block(width, height);
        self.elements.push(Element::Image { slot, asset });
        self.layout.gap(1.0);
    }

    fn finish(self, title: String) -> LaidOutDocument {
        LaidOutDocument {
            title,
            geometry: self.layout.geometry(),
            page_count: self.layout.page_count(),
            elements: self.elements,
        }
    }
}

fn field_value(submission: &Submission, name: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::Checkbox => {
            if submission.field(name).is_some() {
                "Yes".to_string()
            } else {
                "No".to_string()
            }
        }
        _ => submission
            .field(name)
            .unwrap_or(MISSING_VALUE)
            .to_string(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Lays out a certificate.
pub fn compose(content: &CertificateContent<'_>) -> LaidOutDocument {
    let descriptor = content.submission.descriptor();
    let mut c = Composer::new();

    c.text(content.brand, BRAND_SIZE, true, Ink::Brand);
    c.text(descriptor.certificate_title, TITLE_SIZE, true, Ink::Black);
    c.rule();

    match ImageAsset::probe(content.qr_png) {
        Ok(qr) => {
            let slot = c.layout.reserve_right(QR_SIZE_MM, QR_SIZE_MM);
            c.elements.push(Element::Image { slot, asset: qr });
        }
        Err(e) => {
            tracing::warn!(id = %content.id, error = %e, "QR image could not be embedded");
        }
    }

    c.text(&format!("ID: {}", content.id), BODY_SIZE, false, Ink::Black);
    c.text(
        &format!("Date/time (UTC): {}", format_timestamp(&content.created_at)),
        BODY_SIZE,
        false,
        Ink::Black,
    );
    c.text(
        &format!("Form: {}", descriptor.form),
        BODY_SIZE,
        false,
        Ink::Black,
    );
    c.layout.gap(1.5);
    c.text("Public verification:", BODY_SIZE, true, Ink::Black);
    c.text(content.verification_url, SMALL_SIZE, false, Ink::Link);

    for section in descriptor.sections {
        c.heading(section.title);
        for field in section.fields {
            let value = field_value(content.submission, field.name, field.kind);
            c.text(
                &format!("{}: {}", field.label, value),
                BODY_SIZE,
                false,
                Ink::Black,
            );
        }
    }

    match content.derived {
        Derived::None => {}
        Derived::Eligibility(verdict) => {
            c.heading("Result");
            c.text(
                &format!(
                    "Eligibility: {}",
                    if verdict.eligible {
                        "ELIGIBLE"
                    } else {
                        "NOT ELIGIBLE"
                    }
                ),
                BODY_SIZE,
                true,
                Ink::Black,
            );
            c.text(
                &format!(
                    "All inclusion criteria met: {}; immediate exclusion present: {}; secondary exclusions: {} of 6",
                    yes_no(verdict.inclusion_met),
                    yes_no(verdict.immediate_exclusion),
                    verdict.secondary_exclusions
                ),
                SMALL_SIZE,
                false,
                Ink::Black,
            );
        }
        Derived::Sf36(summary) => {
            c.heading("Result");
            let raw: Vec<&str> = summary
                .scores
                .iter()
                .map(|score| score.as_deref().unwrap_or(MISSING_VALUE))
                .collect();
            c.text(
                &format!("Domain scores: {}", raw.join(", ")),
                BODY_SIZE,
                false,
                Ink::Black,
            );
            c.text(
                &format!("Average score: {}", summary.formatted()),
                BODY_SIZE,
                true,
                Ink::Black,
            );
        }
    }

    if descriptor.includes_consent_text {
        c.heading("Consent text");
        c.paragraphs(content.consent_text, SMALL_SIZE);
    }

    let present = descriptor
        .attachments
        .iter()
        .filter(|spec| spec.required || content.submission.attachment(spec.name).is_some())
        .collect::<Vec<_>>();
    if !present.is_empty() {
        c.heading("Signatures and images");
    }
    for spec in present {
        let Some(attachment) = content.submission.attachment(spec.name) else {
            c.text(
                &format!("{}: {}", spec.label, MISSING_VALUE),
                BODY_SIZE,
                false,
                Ink::Black,
            );
            continue;
        };

        match ImageAsset::probe(&attachment.bytes) {
            Ok(asset) => {
                let (w, h) = match spec.kind {
                    AttachmentKind::Signature => asset.size_within(SIGNATURE_WIDTH_MM, PHOTO_MAX_HEIGHT_MM),
                    AttachmentKind::Photo => asset.size_within(PHOTO_MAX_WIDTH_MM, PHOTO_MAX_HEIGHT_MM),
                };
                c.layout.ensure(h + line_height(BODY_SIZE));
                c.image(asset, w, h);
                c.text(spec.label, BODY_SIZE, false, Ink::Black);
            }
            Err(e) => {
                tracing::warn!(
                    id = %content.id,
                    attachment = spec.name,
                    filename = %attachment.filename,
                    error = %e,
                    "image could not be embedded, skipping"
                );
                c.text(
                    &format!("{}: [image could not be embedded]", spec.label),
                    BODY_SIZE,
                    false,
                    Ink::Black,
                );
            }
        }
        c.layout.gap(2.0);
    }

    c.finish(descriptor.certificate_title.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::forms::{Attachment, FormType};
    use crate::layout::Rect;
    use printpdf::image_crate::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([20, 40, 60]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn compose_for(submission: &Submission) -> LaidOutDocument {
        let id = CertificateId::new();
        let derived = Derived::compute(submission);
        let qr = png(64, 64);
        let content = CertificateContent {
            brand: "TrialCert",
            id: &id,
            created_at: Utc::now(),
            verification_url: "https://trials.example.org/verify/0123456789abcdef0123456789abcdef",
            submission,
            derived: &derived,
            consent_text: "I agree.\n\nI may withdraw at any time.",
            qr_png: &qr,
        };
        compose(&content)
    }

    fn qr_rect(doc: &LaidOutDocument) -> Slot {
        doc.elements
            .iter()
            .find_map(|e| match e {
                Element::Image { slot, asset } if asset.width_px == 64 => Some(*slot),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn wrap_text_splits_words_and_long_tokens() {
        let lines = wrap_text("alpha beta gamma delta", 20.0, 10.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "alpha beta gamma delta");

        let long = "x".repeat(200);
        let lines = wrap_text(&long, 50.0, 10.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), long);
    }

    #[test]
    fn wrap_text_keeps_paragraphs() {
        let lines = wrap_text("one\n\ntwo", 100.0, 10.0);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn text_never_overlaps_the_qr_code() {
        let mut submission = Submission::new(FormType::Efficacy)
            .with_field("patient_code", "P-07")
            .with_field("observations", "a very long observation ".repeat(40));
        submission = submission.with_field("investigator", "Dr. Okafor");
        let doc = compose_for(&submission);
        let qr = qr_rect(&doc);

        for element in &doc.elements {
            if let Element::Text { slot, .. } = element {
                if slot.page == qr.page {
                    assert!(!slot.rect.intersects(&qr.rect), "{:?} overlaps QR", slot);
                }
            }
        }
    }

    #[test]
    fn missing_values_print_placeholder_and_checkboxes_print_yes_no() {
        let submission = Submission::new(FormType::Adverse)
            .with_field("patient_code", "P-01")
            .with_field("check_2", "on");
        let doc = compose_for(&submission);
        let texts: Vec<&str> = doc.texts().collect();

        assert!(texts.contains(&"Patient code: P-01"));
        assert!(texts.contains(&"Group: -"));
        assert!(texts.contains(&"Before and after photos: Yes"));
        assert!(texts.contains(&"Healing rate: No"));
    }

    #[test]
    fn eligibility_verdict_is_printed() {
        let mut submission = Submission::new(FormType::Eligibility);
        for field in crate::forms::rules::INCLUSION_FIELDS {
            submission = submission.with_field(field, "Yes");
        }
        let doc = compose_for(&submission);
        assert!(doc.texts().any(|t| t == "Eligibility: ELIGIBLE"));
    }

    #[test]
    fn sf36_average_is_printed_with_raw_scores() {
        let mut submission = Submission::new(FormType::Sf36After);
        for (i, score) in ["0", "25", "50", "75", "100", "0", "25", "50"].iter().enumerate() {
            submission = submission.with_field(format!("domain_{}", i + 1), *score);
        }
        let doc = compose_for(&submission);
        assert!(doc.texts().any(|t| t == "Average score: 40.6"));
        assert!(doc
            .texts()
            .any(|t| t == "Domain scores: 0, 25, 50, 75, 100, 0, 25, 50"));
    }

    #[test]
    fn consent_text_and_verification_url_are_printed() {
        let submission = Submission::new(FormType::Consent).with_field("patient_code", "P-02");
        let doc = compose_for(&submission);
        assert!(doc.texts().any(|t| t == "I agree."));
        assert!(doc.texts().any(|t| t.contains("/verify/0123456789abcdef")));
    }

    #[test]
    fn attachments_are_embedded_and_bad_images_are_skipped() {
        let submission = Submission::new(FormType::Consent)
            .with_field("patient_code", "P-03")
            .with_attachment(
                "sig_patient",
                Attachment {
                    filename: "sig.png".into(),
                    bytes: png(300, 100),
                },
            )
            .with_attachment(
                "sig_investigator",
                Attachment {
                    filename: "sig.txt".into(),
                    bytes: b"not an image".to_vec(),
                },
            );
        let doc = compose_for(&submission);

        let images: Vec<&ImageAsset> = doc
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Image { asset, .. } => Some(asset),
                _ => None,
            })
            .collect();
        // QR code plus the one readable signature
        assert_eq!(images.len(), 2);
        assert!(doc
            .texts()
            .any(|t| t == "Investigator signature: [image could not be embedded]"));
    }

    #[test]
    fn every_element_stays_inside_the_content_box() {
        let submission = Submission::new(FormType::Consent)
            .with_field("patient_code", "P-04")
            .with_attachment(
                "sig_patient",
                Attachment {
                    filename: "tall.png".into(),
                    bytes: png(50, 800),
                },
            );
        let id = CertificateId::new();
        let derived = Derived::None;
        let qr = png(64, 64);
        let consent = "Clause. ".repeat(2_000);
        let content = CertificateContent {
            brand: "TrialCert",
            id: &id,
            created_at: Utc::now(),
            verification_url: "http://localhost:8080/verify/x",
            submission: &submission,
            derived: &derived,
            consent_text: &consent,
            qr_png: &qr,
        };
        let doc = compose(&content);
        let content_box: Rect = doc.geometry.content_box();

        assert!(doc.page_count > 1);
        for element in &doc.elements {
            if let Element::Text { slot, .. } | Element::Image { slot, .. } = element {
                assert!(slot.rect.y >= content_box.y - 0.001);
                assert!(slot.rect.bottom() <= content_box.bottom() + 0.001);
                assert!(slot.rect.right() <= content_box.right() + 0.001);
            }
        }
    }
}
