//! Server-rendered HTML pages.
//!
//! Pages are plain strings assembled from the form descriptors; every interpolated value goes
//! through [`escape`].

use std::fmt::Write as _;
use trialcert_core::forms::{FieldKind, FieldSpec, FormDescriptor};
use trialcert_core::{
    CertificationRecord, FormType, SignatureStatus, ValidationError, VerificationResult,
    VerificationStatus,
};

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem;color:#222}\
header{border-bottom:3px solid #009eb5;margin-bottom:1.5rem}header a{color:#009eb5;text-decoration:none}\
fieldset{border:1px solid #ccd;border-radius:6px;margin:1rem 0;padding:1rem}\
label{display:block;margin:.5rem 0 .2rem}input,select,textarea{width:100%;padding:.4rem;box-sizing:border-box}\
input[type=checkbox]{width:auto}button{background:#009eb5;color:#fff;border:0;padding:.7rem 1.4rem;border-radius:4px}\
.consent{white-space:pre-wrap;background:#f5f7f8;padding:1rem;border-radius:6px}\
.status{font-size:1.4rem;font-weight:bold;padding:.8rem;border-radius:6px}\
.valid{background:#e3f6e8;color:#146c2e}.altered,.missing{background:#fde8e8;color:#9b1c1c}.unknown{background:#eee}\
code{word-break:break-all}table{border-collapse:collapse;width:100%}td,th{text-align:left;padding:.3rem;border-bottom:1px solid #eee}";

/// Escapes text for use in element content and quoted attributes.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(brand: &str, title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>{title} - {brand}</title><style>{STYLE}</style></head>\
         <body><header><h2><a href=\"/\">{brand}</a></h2></header><main>{body}</main></body></html>",
        title = escape(title),
        brand = escape(brand),
    )
}

pub fn index_page(brand: &str, recent: &[CertificationRecord]) -> String {
    let mut body = String::from("<h1>Trial questionnaires</h1><ul>");
    for form in FormType::ALL {
        let _ = write!(
            body,
            "<li><a href=\"/{}\">{}</a></li>",
            form.as_str(),
            escape(form.descriptor().title)
        );
    }
    body.push_str("</ul>");

    body.push_str("<h2>Recent certificates</h2>");
    if recent.is_empty() {
        body.push_str("<p>No certificates issued yet.</p>");
    } else {
        body.push_str("<table><tr><th>Date (UTC)</th><th>Form</th><th>Patient code</th><th>Certificate</th></tr>");
        for record in recent {
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td><a href=\"/verify/{}\"><code>{}</code></a></td></tr>",
                record.created_at.format("%Y-%m-%d %H:%M"),
                escape(record.form.descriptor().title),
                escape(&record.patient_code),
                record.id,
                record.id
            );
        }
        body.push_str("</table>");
    }
    page(brand, "Home", &body)
}

fn field_input(field: &FieldSpec) -> String {
    let name = escape(field.name);
    let required = if field.required { " required" } else { "" };
    match field.kind {
        FieldKind::Text => format!("<input type=\"text\" id=\"{name}\" name=\"{name}\"{required}>"),
        FieldKind::TextArea => {
            format!("<textarea id=\"{name}\" name=\"{name}\" rows=\"4\"{required}></textarea>")
        }
        FieldKind::Date => format!("<input type=\"date\" id=\"{name}\" name=\"{name}\"{required}>"),
        FieldKind::Number { min, max, step } => {
            let mut input = format!("<input type=\"number\" id=\"{name}\" name=\"{name}\" step=\"{step}\"");
            if let Some(min) = min {
                let _ = write!(input, " min=\"{min}\"");
            }
            if let Some(max) = max {
                let _ = write!(input, " max=\"{max}\"");
            }
            input.push_str(required);
            input.push('>');
            input
        }
        FieldKind::Select(options) => {
            let mut select = format!("<select id=\"{name}\" name=\"{name}\"{required}><option value=\"\"></option>");
            for option in options {
                let option = escape(option);
                let _ = write!(select, "<option value=\"{option}\">{option}</option>");
            }
            select.push_str("</select>");
            select
        }
        FieldKind::YesNo { default_yes } => {
            let (first, second) = if default_yes { ("Yes", "No") } else { ("No", "Yes") };
            format!(
                "<select id=\"{name}\" name=\"{name}\"{required}><option value=\"{first}\">{first}</option>\
                 <option value=\"{second}\">{second}</option></select>"
            )
        }
        FieldKind::Checkbox => {
            format!("<input type=\"checkbox\" id=\"{name}\" name=\"{name}\" value=\"on\"{required}>")
        }
    }
}

pub fn form_page(brand: &str, descriptor: &FormDescriptor, consent_text: &str) -> String {
    let mut body = format!("<h1>{}</h1>", escape(descriptor.title));
    if descriptor.includes_consent_text {
        let _ = write!(body, "<div class=\"consent\">{}</div>", escape(consent_text));
    }

    let enctype = if descriptor.needs_multipart() {
        " enctype=\"multipart/form-data\""
    } else {
        ""
    };
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/{}/submit\"{}>",
        descriptor.form.as_str(),
        enctype
    );

    for section in descriptor.sections {
        let _ = write!(body, "<fieldset><legend>{}</legend>", escape(section.title));
        for field in section.fields {
            let input = field_input(field);
            if field.kind == FieldKind::Checkbox {
                let _ = write!(body, "<label>{} {}</label>", input, escape(field.label));
            } else {
                let _ = write!(
                    body,
                    "<label for=\"{}\">{}</label>{}",
                    escape(field.name),
                    escape(field.label),
                    input
                );
            }
        }
        body.push_str("</fieldset>");
    }

    if !descriptor.attachments.is_empty() {
        body.push_str("<fieldset><legend>Signatures and images</legend>");
        for attachment in descriptor.attachments {
            let _ = write!(
                body,
                "<label for=\"{name}\">{label}</label><input type=\"file\" id=\"{name}\" name=\"{name}\" accept=\"{accept}\"{required}>",
                accept = "image/png,image/jpeg",
                name = escape(attachment.name),
                label = escape(attachment.label),
                required = if attachment.required { " required" } else { "" },
            );
        }
        body.push_str("</fieldset>");
    }

    body.push_str("<button type=\"submit\">Generate certificate</button></form>");
    page(brand, descriptor.title, &body)
}

pub fn validation_page(brand: &str, descriptor: &FormDescriptor, error: &ValidationError) -> String {
    let mut body = format!(
        "<h1>{}</h1><p>The submission could not be accepted.</p>",
        escape(descriptor.title)
    );
    if !error.missing.is_empty() {
        body.push_str("<h3>Missing</h3><ul>");
        for label in &error.missing {
            let _ = write!(body, "<li>{}</li>", escape(label));
        }
        body.push_str("</ul>");
    }
    if !error.invalid.is_empty() {
        body.push_str("<h3>Invalid</h3><ul>");
        for problem in &error.invalid {
            let _ = write!(body, "<li>{}</li>", escape(problem));
        }
        body.push_str("</ul>");
    }
    let _ = write!(body, "<p><a href=\"/{}\">Back to the form</a></p>", descriptor.form.as_str());
    page(brand, descriptor.title, &body)
}

pub fn verify_page(brand: &str, id: &str, result: &VerificationResult) -> String {
    let (class, headline) = match result.status {
        VerificationStatus::Valid => ("valid", "VALID - the document has not been modified"),
        VerificationStatus::Altered => ("altered", "ALTERED - the document does not match its certificate"),
        VerificationStatus::ArtifactMissing => ("missing", "MISSING - the certified document is no longer available"),
        VerificationStatus::NotFound => ("unknown", "NOT FOUND - no certificate with this identifier"),
    };

    let mut body = format!(
        "<h1>Certificate verification</h1><p class=\"status {class}\">{headline}</p>",
    );
    if result.signature == SignatureStatus::Invalid {
        body.push_str(
            "<p class=\"status altered\">WARNING - the ledger entry is not signed by this site's key, \
             so its stored hash cannot be trusted</p>",
        );
    }
    let _ = write!(body, "<p>Identifier: <code>{}</code></p>", escape(id));

    if let Some(record) = &result.record {
        let _ = write!(
            body,
            "<table>\
             <tr><th>Form</th><td>{form}</td></tr>\
             <tr><th>Patient code</th><td>{code}</td></tr>\
             <tr><th>Issued (UTC)</th><td>{issued}</td></tr>\
             <tr><th>Stored hash</th><td><code>{stored}</code></td></tr>\
             <tr><th>Current hash</th><td><code>{current}</code></td></tr>\
             <tr><th>Site signature</th><td>{signature}</td></tr>\
             </table>",
            form = escape(record.form.descriptor().title),
            code = escape(&record.patient_code),
            issued = record.created_at.format("%Y-%m-%d %H:%M:%S"),
            stored = record.content_hash,
            current = result
                .current_hash
                .as_ref()
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "-".into()),
            signature = signature_label(result.signature),
        );
        if result.status != VerificationStatus::ArtifactMissing {
            let _ = write!(
                body,
                "<p><a href=\"{}\">Download PDF</a></p>",
                escape(&record.pdf_ref)
            );
        }
    }
    page(brand, "Verification", &body)
}

fn signature_label(status: SignatureStatus) -> &'static str {
    match status {
        SignatureStatus::Unsigned => "not signed",
        SignatureStatus::Valid => "valid (site key)",
        SignatureStatus::Invalid => "INVALID",
        SignatureStatus::Unverified => "present, but no trusted site key is configured",
    }
}

pub fn message_page(brand: &str, title: &str, message: &str) -> String {
    page(
        brand,
        title,
        &format!("<h1>{}</h1><p>{}</p>", escape(title), escape(message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_markup() {
        assert_eq!(
            escape("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn form_page_lists_every_field_and_attachment() {
        for form in FormType::ALL {
            let descriptor = form.descriptor();
            let html = form_page("TrialCert", descriptor, "Consent text");
            for field in descriptor.fields() {
                assert!(html.contains(&format!("name=\"{}\"", field.name)), "{} in {}", field.name, form);
            }
            for attachment in descriptor.attachments {
                assert!(html.contains(&format!("name=\"{}\"", attachment.name)));
            }
            assert_eq!(html.contains("multipart/form-data"), descriptor.needs_multipart());
            assert!(html.contains(&format!("action=\"/{}/submit\"", form)));
        }
    }

    #[test]
    fn signature_inputs_accept_png_and_jpeg() {
        let html = form_page("TrialCert", FormType::Consent.descriptor(), "");
        assert!(html.contains("name=\"sig_patient\" accept=\"image/png,image/jpeg\""));
        assert!(!html.contains("accept=\"image/png\""));
    }

    #[test]
    fn forged_signature_is_flagged_on_valid_hash() {
        let record: CertificationRecord = serde_json::from_value(serde_json::json!({
            "id": "0123456789abcdef0123456789abcdef",
            "form": "adverse",
            "created_at": "2025-04-10T09:00:00.000Z",
            "content_hash": "ab".repeat(32),
            "pdf_ref": "/certs/0123456789abcdef0123456789abcdef.pdf",
            "qr_ref": "/certs/0123456789abcdef0123456789abcdef.png",
            "patient_code": "P-44",
        }))
        .unwrap();
        let result = VerificationResult {
            status: VerificationStatus::Valid,
            current_hash: Some(record.content_hash.clone()),
            record: Some(record),
            signature: SignatureStatus::Invalid,
        };
        let html = verify_page("TrialCert", "abc", &result);
        assert!(html.contains("WARNING"));
        assert!(html.contains("INVALID"));
    }

    #[test]
    fn consent_text_shown_only_on_consent_form() {
        let consent = form_page("TrialCert", FormType::Consent.descriptor(), "I <agree>");
        assert!(consent.contains("I &lt;agree&gt;"));
        let adverse = form_page("TrialCert", FormType::Adverse.descriptor(), "I <agree>");
        assert!(!adverse.contains("agree"));
    }

    #[test]
    fn validation_page_lists_problems() {
        let error = ValidationError {
            missing: vec!["Patient code".into()],
            invalid: vec!["Age is out of range".into()],
        };
        let html = validation_page("TrialCert", FormType::Eligibility.descriptor(), &error);
        assert!(html.contains("<li>Patient code</li>"));
        assert!(html.contains("<li>Age is out of range</li>"));
    }
}
