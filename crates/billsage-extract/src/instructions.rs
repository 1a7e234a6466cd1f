//! Instruction text sent alongside the OCR output.

use serde_json::Value;

pub const PATIENT_NAME_RULES: &str = "\
PATIENT NAME:
- Return only the patient's given and family name.
- Stop at labels such as Account Number, DOB, Date, ID or '#'; never include them in the name.
- Do not confuse the guarantor, insured party or provider with the patient.";

pub const AMOUNT_RULES: &str = "\
AMOUNTS:
- totalAmount is the balance the patient owes, not total charges before adjustments.
- 'Charges', 'Adjustments', 'Insurance Paid' and 'Patient Responsibility' are different figures; do not mix them.
- Report amounts as plain numbers without currency symbols.";

pub const DATE_RULES: &str = "\
DATES:
- serviceDates are the dates care was delivered.
- dueDate is the payment due date; statement or print dates are neither.
- dateOfBirth belongs to the patient only.";

pub const SERVICE_CODE_RULES: &str = "\
SERVICES:
- Emit one entry per billed line with description, code, amount and diagnosticCode.
- code is the CPT (5 digits) or HCPCS (letter + 4 digits) procedure code for that line.
- diagnosticCode is the ICD-10 code (letter, digits, optional decimal) when printed on the line.
- Keep modifiers such as -26 or -TC attached to the code.";

pub const VERIFICATION_RULES: &str = "\
VERIFICATION:
- Every value must appear in the source text. Use \"Not found\" rather than guessing.
- Do not invent services, codes or amounts.";

pub const DOMAIN_KNOWLEDGE: &str = "\
DOMAIN KNOWLEDGE:
- DRG codes are 3-digit inpatient grouping codes, not procedure codes.
- CPT 80000-89999 are laboratory and pathology services.
- CPT 70000-79999 are radiology; 99201-99499 are evaluation and management visits.
- HCPCS Level II codes start with a letter (e.g. J-codes for drugs, A-codes for supplies).
- Revenue codes are 4 digits (e.g. 0450 emergency room) and identify facility departments.";

const RESPONSE_SHAPE: &str = "\
Respond with JSON: {\"patientInfo\": {fullName, dateOfBirth, accountNumber, insuranceInfo}, \
\"billInfo\": {totalAmount, serviceDates, dueDate, facilityName, providerName, facilityType, \
billType, placeOfService, patientType}, \"services\": [{description, code, amount, diagnosticCode}]}";

/// The fixed instruction block: five rule categories plus domain knowledge.
pub fn base_instructions() -> String {
    [
        PATIENT_NAME_RULES,
        AMOUNT_RULES,
        DATE_RULES,
        SERVICE_CODE_RULES,
        VERIFICATION_RULES,
        DOMAIN_KNOWLEDGE,
        RESPONSE_SHAPE,
    ]
    .join("\n\n")
}

/// Extra guidance for a re-extraction that can see the previous pass.
pub fn enhanced_instructions(previous: &Value) -> String {
    let mut hints = vec![
        "ENHANCED EXTRACTION:".to_string(),
        "- A previous pass over this document is attached as previousResults.".to_string(),
        "- Re-check every field against the text; correct values that are not traceable.".to_string(),
    ];

    let missing = missing_fields(previous);
    if !missing.is_empty() {
        hints.push(format!(
            "- The previous pass could not find: {}. Look for them again.",
            missing.join(", ")
        ));
    }

    let services = previous
        .get("services")
        .and_then(|s| s.as_array())
        .map(|s| s.len())
        .unwrap_or(0);
    if services == 0 {
        hints.push("- The previous pass found no services; scan every line item.".to_string());
    } else {
        hints.push(format!(
            "- The previous pass found {} services; keep those that are correct and add any missed lines.",
            services
        ));
    }

    hints.join("\n")
}

/// Full instruction text for one extraction call.
pub fn build_instructions(previous: Option<&Value>) -> String {
    let mut text = base_instructions();
    if let Some(prev) = previous {
        text.push_str("\n\n");
        text.push_str(&enhanced_instructions(prev));
    }
    text
}

fn missing_fields(previous: &Value) -> Vec<String> {
    let mut missing = Vec::new();
    for section in ["patientInfo", "billInfo"] {
        if let Some(obj) = previous.get(section).and_then(|v| v.as_object()) {
            for (key, value) in obj {
                let absent = match value {
                    Value::Null => true,
                    Value::String(s) => s.trim().is_empty() || s.eq_ignore_ascii_case("not found"),
                    _ => false,
                };
                if absent {
                    missing.push(key.clone());
                }
            }
        }
    }
    missing
}
