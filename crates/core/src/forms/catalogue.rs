use super::{
    AttachmentKind, AttachmentSpec, DerivedRule, FieldKind, FieldSpec, FormDescriptor, FormType,
    SectionSpec,
};

const fn text(name: &'static str, label: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Text,
        required,
    }
}

const fn date(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Date,
        required: true,
    }
}

const fn number(
    name: &'static str,
    label: &'static str,
    min: Option<f64>,
    max: Option<f64>,
    step: f64,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Number { min, max, step },
        required,
    }
}

const fn select(
    name: &'static str,
    label: &'static str,
    options: &'static [&'static str],
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Select(options),
        required,
    }
}

const fn yes_no(name: &'static str, label: &'static str, default_yes: bool) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::YesNo { default_yes },
        required: true,
    }
}

const fn checkbox(name: &'static str, label: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Checkbox,
        required,
    }
}

const fn signature(name: &'static str, label: &'static str, required: bool) -> AttachmentSpec {
    AttachmentSpec {
        name,
        label,
        kind: AttachmentKind::Signature,
        required,
    }
}

const fn photo(name: &'static str, label: &'static str) -> AttachmentSpec {
    AttachmentSpec {
        name,
        label,
        kind: AttachmentKind::Photo,
        required: true,
    }
}

const SEX: &[&str] = &["Female", "Male"];
const SAINT_ELIAN: &[&str] = &["<10", "10-15", "15-20"];

static CONSENT: FormDescriptor = FormDescriptor {
    form: FormType::Consent,
    title: "Informed consent",
    certificate_title: "Informed consent - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: Some("patient_name"),
    sections: &[
        SectionSpec {
            title: "Participant",
            fields: &[
                text("patient_code", "Patient code", true),
                text("patient_name", "Patient name", false),
                text("investigator", "Responsible investigator", true),
                date("date", "Date"),
                text("place", "Place", false),
                checkbox("accept", "I have read and accept the terms", true),
                text("witness_name", "Witness name", false),
            ],
        },
    ],
    attachments: &[
        signature("sig_patient", "Patient signature", true),
        signature("sig_investigator", "Investigator signature", true),
        signature("sig_witness", "Witness signature", false),
    ],
    includes_consent_text: true,
    derived: DerivedRule::None,
};

static ELIGIBILITY: FormDescriptor = FormDescriptor {
    form: FormType::Eligibility,
    title: "Eligibility screening",
    certificate_title: "Eligibility screening - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: &[
        SectionSpec {
            title: "Participant",
            fields: &[
                text("patient_code", "Patient code", true),
                number("age", "Age", Some(0.0), Some(130.0), 1.0, true),
                select("sex", "Sex", SEX, true),
                number("weight_kg", "Weight (kg)", Some(0.0), None, 0.1, true),
                number("height_cm", "Height (cm)", Some(0.0), None, 0.1, true),
                number("bmi", "BMI", Some(0.0), None, 0.1, true),
            ],
        },
        SectionSpec {
            title: "Inclusion criteria",
            fields: &[
                yes_no("inclusion_1", "Age 18 or older", true),
                yes_no("inclusion_2", "Venous or neuropathic diabetic foot ulcer", true),
                yes_no("inclusion_3", "Saint Elian score below 20", true),
                yes_no("inclusion_4", "Critical colonisation without acute infection", true),
                yes_no("inclusion_5", "Ulcer area between 2 and 15 cm2", true),
                yes_no("inclusion_6", "Signed informed consent", true),
            ],
        },
        SectionSpec {
            title: "Immediate exclusion criteria",
            fields: &[
                yes_no("immediate_exclusion_1", "Ankle-brachial index below 0.9", false),
                yes_no("immediate_exclusion_2", "Ulcer area below 2 or above 15 cm2", false),
                yes_no("immediate_exclusion_3", "100% granulation tissue", false),
                yes_no("immediate_exclusion_4", "Evident infection", false),
                yes_no("immediate_exclusion_5", "Systemic antibiotic therapy", false),
            ],
        },
        SectionSpec {
            title: "Exclusion criteria (three or more)",
            fields: &[
                yes_no("secondary_exclusion_1", "BMI 35 or higher", false),
                yes_no("secondary_exclusion_2", "Oncological disease in the last year", false),
                yes_no("secondary_exclusion_3", "Chronic kidney disease (Cr > 2.0 mg/dL)", false),
                yes_no("secondary_exclusion_4", "Corticosteroids 5 mg or more for over a month", false),
                yes_no("secondary_exclusion_5", "HbA1c above 10", false),
                yes_no("secondary_exclusion_6", "Blood pressure 140/90 or higher", false),
            ],
        },
        SectionSpec {
            title: "Investigator",
            fields: &[
                text("investigator", "Investigator", true),
                date("date", "Date"),
            ],
        },
    ],
    attachments: &[signature("sig_investigator", "Investigator signature", true)],
    includes_consent_text: false,
    derived: DerivedRule::Eligibility,
};

static PATIENT: FormDescriptor = FormDescriptor {
    form: FormType::Patient,
    title: "Patient intake record",
    certificate_title: "Patient intake record - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: &[
        SectionSpec {
            title: "Participant",
            fields: &[
                text("patient_code", "Patient code", true),
                number("age", "Age", Some(0.0), Some(130.0), 1.0, true),
                select("sex", "Sex", SEX, false),
                date("date", "Date"),
                number("weight_kg", "Weight (kg)", Some(0.0), None, 0.1, true),
                number("height_cm", "Height (cm)", Some(0.0), None, 0.1, true),
                select(
                    "marital_status",
                    "Marital status",
                    &["Single", "Married", "Divorced", "Widowed"],
                    false,
                ),
                select(
                    "education",
                    "Education level",
                    &["Primary", "Secondary", "Technical", "University"],
                    false,
                ),
            ],
        },
        SectionSpec {
            title: "Medical history",
            fields: &[
                yes_no("diabetes", "Diabetes", false),
                yes_no("hypertension", "Hypertension", false),
                yes_no("kidney_disease", "Chronic kidney disease", false),
                yes_no("obesity", "Obesity", false),
                text("other_conditions", "Other conditions", false),
                select("diabetes_duration", "Diabetes duration (years)", &["<10", ">10"], false),
                select("diabetes_type", "Diabetes type", &["Type 1", "Type 2", "Other"], false),
                number("hba1c", "HbA1c (%)", Some(0.0), None, 0.1, false),
                text("previous_treatments", "Previous treatments", false),
                text("abi", "Ankle-brachial index", false),
                yes_no("corticosteroids", "Corticosteroids", false),
                number("creatinine", "Creatinine (mg/dL)", Some(0.0), None, 0.01, false),
                text("blood_pressure", "Blood pressure", false),
            ],
        },
        SectionSpec {
            title: "Initial wound",
            fields: &[
                select(
                    "diagnosis",
                    "Diagnosis",
                    &["Diabetic foot ulcer", "Venous ulcer"],
                    true,
                ),
                select(
                    "location",
                    "Location",
                    &["Right foot", "Left foot", "Other"],
                    true,
                ),
                number("wound_area", "Initial area (cm2)", Some(0.0), None, 0.01, true),
                select("depth", "Depth", &["Superficial", "Deep"], true),
                select(
                    "healing_phase",
                    "Healing phase",
                    &["Epithelialisation", "Granulation", "Inflammatory"],
                    true,
                ),
                select("saint_elian", "Saint Elian score", SAINT_ELIAN, true),
                yes_no("critical_colonisation", "Critical colonisation", false),
            ],
        },
        SectionSpec {
            title: "Investigator",
            fields: &[text("investigator", "Investigator", true)],
        },
    ],
    attachments: &[
        photo("wound_photo", "Wound photo"),
        signature("sig_investigator", "Investigator signature", true),
    ],
    includes_consent_text: false,
    derived: DerivedRule::None,
};

const SF36_FIELDS: &[FieldSpec] = &[
    text("patient_code", "Patient code", true),
    date("date", "Date"),
    text("investigator", "Investigator", true),
];

const SF36_DOMAINS: &[FieldSpec] = &[
    number("domain_1", "Physical functioning", Some(0.0), Some(100.0), 1.0, true),
    number("domain_2", "Role physical", Some(0.0), Some(100.0), 1.0, true),
    number("domain_3", "Bodily pain", Some(0.0), Some(100.0), 1.0, true),
    number("domain_4", "General health", Some(0.0), Some(100.0), 1.0, true),
    number("domain_5", "Vitality", Some(0.0), Some(100.0), 1.0, true),
    number("domain_6", "Social functioning", Some(0.0), Some(100.0), 1.0, true),
    number("domain_7", "Role emotional", Some(0.0), Some(100.0), 1.0, true),
    number("domain_8", "Mental health", Some(0.0), Some(100.0), 1.0, true),
];

const SF36_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        title: "Assessment",
        fields: SF36_FIELDS,
    },
    SectionSpec {
        title: "Domain scores (0-100)",
        fields: SF36_DOMAINS,
    },
];

static SF36_BEFORE: FormDescriptor = FormDescriptor {
    form: FormType::Sf36Before,
    title: "SF-36 - Before therapy",
    certificate_title: "SF-36 (Before therapy) - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: SF36_SECTIONS,
    attachments: &[],
    includes_consent_text: false,
    derived: DerivedRule::Sf36Average,
};

static SF36_AFTER: FormDescriptor = FormDescriptor {
    form: FormType::Sf36After,
    title: "SF-36 - After therapy",
    certificate_title: "SF-36 (After therapy) - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: SF36_SECTIONS,
    attachments: &[],
    includes_consent_text: false,
    derived: DerivedRule::Sf36Average,
};

static ADVERSE: FormDescriptor = FormDescriptor {
    form: FormType::Adverse,
    title: "Adverse reactions checklist",
    certificate_title: "Adverse reactions checklist - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: &[
        SectionSpec {
            title: "Session",
            fields: &[
                text("patient_code", "Patient code", true),
                select(
                    "session",
                    "Session number",
                    &["1", "2", "3", "4", "5", "6", "7", "8", "Other"],
                    true,
                ),
                date("date", "Date"),
                select(
                    "group",
                    "Group",
                    &["Experimental (Virgilio Rays)", "Control"],
                    true,
                ),
            ],
        },
        SectionSpec {
            title: "Completed items",
            fields: &[
                checkbox("check_1", "Detailed wound assessment", false),
                checkbox("check_2", "Before and after photos", false),
                checkbox("check_3", "Start time and duration recorded", false),
                checkbox("check_4", "UVC exposure documented", false),
                checkbox("check_5", "Adverse reactions and side effects recorded", false),
                checkbox("check_6", "Sterilisation results", false),
                checkbox("check_7", "Healing rate", false),
                checkbox("check_8", "Metabolic complications", false),
                checkbox("check_9", "Ethical considerations", false),
                checkbox("check_10", "Additional observations documented", false),
            ],
        },
        SectionSpec {
            title: "Investigator",
            fields: &[text("investigator", "Investigator", true)],
        },
    ],
    attachments: &[signature("sig_investigator", "Investigator signature", true)],
    includes_consent_text: false,
    derived: DerivedRule::None,
};

const VAS: &[&str] = &["0", "1-3", "4-6", "7-9", "10"];

static EFFICACY: FormDescriptor = FormDescriptor {
    form: FormType::Efficacy,
    title: "Clinical efficacy checklist",
    certificate_title: "Clinical efficacy session - Certificate",
    patient_code_field: "patient_code",
    patient_name_field: None,
    sections: &[
        SectionSpec {
            title: "Session",
            fields: &[
                text("patient_code", "Patient code", true),
                select(
                    "protocol",
                    "Protocol",
                    &["1", "2", "3", "4", "5", "6", "7", "8", "9", "Other"],
                    true,
                ),
                date("date", "Date"),
                select("group", "Group", &["Virgilio Rays", "Control"], true),
                select("uvc_dose", "UVC dose (min)", &["1", "2", "5"], true),
            ],
        },
        SectionSpec {
            title: "Wound",
            fields: &[
                number("wound_area", "Current area (cm2)", Some(0.0), None, 0.01, true),
                select(
                    "exudate",
                    "Exudate",
                    &["None", "Serous", "Purulent"],
                    true,
                ),
                select(
                    "tissue",
                    "Tissue quality",
                    &["Granulation", "Epithelialisation"],
                    true,
                ),
                select("vas_before", "Pain VAS before", VAS, true),
                select("vas_after", "Pain VAS after", VAS, true),
                select("saint_elian", "Saint Elian score", SAINT_ELIAN, true),
            ],
        },
        SectionSpec {
            title: "Reactions",
            fields: &[
                text("local_reactions", "Local reactions", false),
                text("systemic_reactions", "Systemic reactions", false),
                select(
                    "severity",
                    "Severity",
                    &["None", "Mild", "Moderate", "Severe"],
                    true,
                ),
                text("onset_time", "Time of onset", false),
                text("interventions", "Interventions required", false),
                select("adherence", "Adherence", &["Complied", "Did not comply"], true),
                yes_no("complications", "Complications", false),
                text("complication_type", "Complication type", false),
                FieldSpec {
                    name: "observations",
                    label: "Observations",
                    kind: FieldKind::TextArea,
                    required: false,
                },
            ],
        },
        SectionSpec {
            title: "Investigator",
            fields: &[text("investigator", "Investigator", true)],
        },
    ],
    attachments: &[
        photo("wound_photo", "Wound photo"),
        signature("sig_investigator", "Investigator signature", true),
    ],
    includes_consent_text: false,
    derived: DerivedRule::None,
};

pub(super) fn descriptor(form: FormType) -> &'static FormDescriptor {
    match form {
        FormType::Consent => &CONSENT,
        FormType::Eligibility => &ELIGIBILITY,
        FormType::Patient => &PATIENT,
        FormType::Sf36Before => &SF36_BEFORE,
        FormType::Sf36After => &SF36_AFTER,
        FormType::Adverse => &ADVERSE,
        FormType::Efficacy => &EFFICACY,
    }
}
