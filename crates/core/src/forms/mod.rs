//! Questionnaire descriptors.
//!
//! Every supported questionnaire is described by one static [`FormDescriptor`]: its sections
//! and fields, the attachments it collects, and the derived-value rule applied at generation
//! time. The HTML form, the submission validation, the certificate layout and the ledger record
//! are all produced from the descriptor, so the seven questionnaires share one pipeline.

mod catalogue;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CertError;

pub use rules::{evaluate_eligibility, sf36_summary, Derived, EligibilityVerdict, Sf36Summary};

/// The closed set of questionnaires this system certifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    Consent,
    Eligibility,
    Patient,
    #[serde(rename = "sf36-before")]
    Sf36Before,
    #[serde(rename = "sf36-after")]
    Sf36After,
    Adverse,
    Efficacy,
}

impl FormType {
    pub const ALL: [FormType; 7] = [
        FormType::Consent,
        FormType::Eligibility,
        FormType::Patient,
        FormType::Sf36Before,
        FormType::Sf36After,
        FormType::Adverse,
        FormType::Efficacy,
    ];

    /// Wire name, also the URL slug (`/<slug>`, `/<slug>/submit`).
    pub const fn as_str(self) -> &'static str {
        match self {
            FormType::Consent => "consent",
            FormType::Eligibility => "eligibility",
            FormType::Patient => "patient",
            FormType::Sf36Before => "sf36-before",
            FormType::Sf36After => "sf36-after",
            FormType::Adverse => "adverse",
            FormType::Efficacy => "efficacy",
        }
    }

    /// Collection that mirrored records of this form are written to.
    pub fn mirror_collection(self) -> String {
        format!("trials_{}", self.as_str())
    }

    pub fn descriptor(self) -> &'static FormDescriptor {
        catalogue::descriptor(self)
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormType::ALL
            .into_iter()
            .find(|form| form.as_str() == s)
            .ok_or_else(|| CertError::InvalidFormType(s.to_string()))
    }
}

/// Input control and display semantics of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    TextArea,
    Date,
    Number { min: Option<f64>, max: Option<f64>, step: f64 },
    Select(&'static [&'static str]),
    /// Select between `Yes` and `No`; the first option is the default shown.
    YesNo { default_yes: bool },
    /// Present in the submission (any non-empty value) means checked.
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionSpec {
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Signature,
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: AttachmentKind,
    pub required: bool,
}

/// Which derived value, if any, a form computes from its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedRule {
    None,
    Eligibility,
    Sf36Average,
}

/// Static description of one questionnaire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormDescriptor {
    pub form: FormType,
    /// Heading of the HTML form.
    pub title: &'static str,
    /// Heading of the PDF certificate.
    pub certificate_title: &'static str,
    /// Field holding the subject code shown on the verification page.
    pub patient_code_field: &'static str,
    /// Optional field holding the subject's name.
    pub patient_name_field: Option<&'static str>,
    pub sections: &'static [SectionSpec],
    pub attachments: &'static [AttachmentSpec],
    /// Whether the consent text is shown on the form and printed on the certificate.
    pub includes_consent_text: bool,
    pub derived: DerivedRule,
}

impl FormDescriptor {
    /// Iterates over every field of every section.
    pub fn fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.sections.iter().flat_map(|section| section.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().find(|field| field.name == name)
    }

    /// Whether the HTML form must be submitted as `multipart/form-data`.
    pub fn needs_multipart(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Checks required fields and attachments.
    ///
    /// This is the form layer's responsibility; the generator itself trusts its input and
    /// renders a placeholder for anything missing.
    pub fn validate(&self, submission: &Submission) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        for field in self.fields() {
            let value = submission.field(field.name);
            if field.required && value.is_none() {
                missing.push(field.label.to_string());
                continue;
            }
            if let (Some(value), FieldKind::Number { min, max, .. }) = (value, field.kind) {
                match value.parse::<f64>() {
                    Ok(n) if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) => {
                        invalid.push(format!("{} is out of range", field.label));
                    }
                    Ok(n) if n.is_finite() => {}
                    _ => invalid.push(format!("{} must be a number", field.label)),
                }
            }
            if let (Some(value), FieldKind::Select(options)) = (value, field.kind) {
                if !options.contains(&value) {
                    invalid.push(format!("{} has an unknown option", field.label));
                }
            }
        }

        for attachment in self.attachments {
            if attachment.required && submission.attachment(attachment.name).is_none() {
                missing.push(attachment.label.to_string());
            }
        }

        if missing.is_empty() && invalid.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing, invalid })
        }
    }
}

/// Required fields that were absent, or values that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("submission rejected: missing [{}], invalid [{}]", missing.join(", "), invalid.join(", "))]
pub struct ValidationError {
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

/// An uploaded file (signature or photo).
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A completed questionnaire as received from the form layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub form: FormType,
    pub fields: BTreeMap<String, String>,
    pub attachments: BTreeMap<String, Attachment>,
}

impl Submission {
    pub fn new(form: FormType) -> Self {
        Self {
            form,
            fields: BTreeMap::new(),
            attachments: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.insert(name.into(), attachment);
        self
    }

    /// Trimmed value of a field; blank values count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Non-empty attachment, if uploaded.
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments
            .get(name)
            .filter(|attachment| !attachment.bytes.is_empty())
    }

    pub fn descriptor(&self) -> &'static FormDescriptor {
        self.form.descriptor()
    }

    pub fn patient_code(&self) -> String {
        self.field(self.descriptor().patient_code_field)
            .unwrap_or_default()
            .to_string()
    }

    pub fn patient_name(&self) -> Option<String> {
        self.descriptor()
            .patient_name_field
            .and_then(|name| self.field(name))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_type_round_trips_through_wire_names() {
        for form in FormType::ALL {
            assert_eq!(form.as_str().parse::<FormType>().unwrap(), form);
            let json = serde_json::to_string(&form).unwrap();
            assert_eq!(json, format!("\"{}\"", form.as_str()));
        }
    }

    #[test]
    fn unknown_form_type_is_rejected() {
        let err = "discharge".parse::<FormType>().unwrap_err();
        assert!(matches!(err, CertError::InvalidFormType(name) if name == "discharge"));
    }

    #[test]
    fn mirror_collection_is_prefixed() {
        assert_eq!(FormType::Sf36After.mirror_collection(), "trials_sf36-after");
    }

    #[test]
    fn every_descriptor_matches_its_form_and_has_patient_code_field() {
        for form in FormType::ALL {
            let descriptor = form.descriptor();
            assert_eq!(descriptor.form, form);
            let code = descriptor
                .field(descriptor.patient_code_field)
                .expect("patient code field must be declared");
            assert!(code.required);
        }
    }

    #[test]
    fn field_names_are_unique_within_each_form() {
        for form in FormType::ALL {
            let descriptor = form.descriptor();
            let mut names: Vec<&str> = descriptor.fields().map(|f| f.name).collect();
            names.extend(descriptor.attachments.iter().map(|a| a.name));
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), total, "duplicate field name in {}", form);
        }
    }

    #[test]
    fn validate_reports_missing_required_fields_and_attachments() {
        let submission = Submission::new(FormType::Consent).with_field("patient_code", "P-01");
        let err = FormType::Consent.descriptor().validate(&submission).unwrap_err();

        assert!(err.missing.iter().any(|m| m == "Responsible investigator"));
        assert!(err.missing.iter().any(|m| m == "Patient signature"));
        assert!(!err.missing.iter().any(|m| m == "Patient code"));
    }

    #[test]
    fn validate_treats_blank_values_as_missing() {
        let submission = Submission::new(FormType::Sf36Before).with_field("patient_code", "   ");
        let err = FormType::Sf36Before
            .descriptor()
            .validate(&submission)
            .unwrap_err();
        assert!(err.missing.iter().any(|m| m == "Patient code"));
    }

    #[test]
    fn validate_rejects_out_of_range_scores() {
        let mut submission = Submission::new(FormType::Sf36After)
            .with_field("patient_code", "P-01")
            .with_field("date", "2025-01-01")
            .with_field("investigator", "Dr. Rivera");
        for i in 1..=8 {
            submission = submission.with_field(format!("domain_{}", i), "50");
        }
        submission = submission.with_field("domain_3", "140");

        let err = FormType::Sf36After
            .descriptor()
            .validate(&submission)
            .unwrap_err();
        assert!(err.missing.is_empty());
        assert_eq!(err.invalid, vec!["Bodily pain is out of range".to_string()]);
    }

    #[test]
    fn validate_rejects_unknown_select_option() {
        let submission = Submission::new(FormType::Eligibility).with_field("sex", "Other");
        let err = FormType::Eligibility
            .descriptor()
            .validate(&submission)
            .unwrap_err();
        assert!(err.invalid.iter().any(|m| m == "Sex has an unknown option"));
    }

    #[test]
    fn empty_attachment_counts_as_missing() {
        let submission = Submission::new(FormType::Adverse).with_attachment(
            "sig_investigator",
            Attachment {
                filename: "sig.png".into(),
                bytes: Vec::new(),
            },
        );
        assert!(submission.attachment("sig_investigator").is_none());
    }

    #[test]
    fn patient_name_only_for_forms_that_declare_it() {
        let consent = Submission::new(FormType::Consent).with_field("patient_name", "Ana");
        assert_eq!(consent.patient_name().as_deref(), Some("Ana"));

        let adverse = Submission::new(FormType::Adverse).with_field("patient_name", "Ana");
        assert_eq!(adverse.patient_name(), None);
    }
}
