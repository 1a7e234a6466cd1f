//! Local fallback used when the extraction service is unreachable.
//!
//! Produces a structurally valid bill with every text field "Not found",
//! then recovers what it safely can from the raw text: line items carrying
//! both a procedure code and a dollar amount, and a labelled total.

use billsage_core::{parse_amount, Service, StructuredBill};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

/// CPT (5 digits, optional modifier) or HCPCS Level II (letter + 4 digits).
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{5}|[A-Z]\d{4})(?:-(?:26|TC|\d{2}))?\b").unwrap());
static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?-?\$\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?\)?|\b\d+\.\d{2}\b").unwrap());
static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:amount due|balance due|total due|patient responsibility|total)\b").unwrap()
});
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap());
static ICD10_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-TV-Z]\d{2}\.\d{1,4})\b").unwrap());

pub fn extract_offline(text: &str) -> StructuredBill {
    let mut bill = StructuredBill::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if TOTAL_RE.is_match(line) && !CODE_RE.is_match(line) {
            if let Some(amount) = last_amount(line) {
                bill.bill_info.total_amount = Some(amount);
            }
            continue;
        }

        if let Some(service) = service_line(line) {
            bill.services.push(service);
        }
    }

    info!(
        "Offline extraction recovered {} service lines",
        bill.services.len()
    );
    bill
}

fn last_amount(line: &str) -> Option<f64> {
    AMOUNT_RE
        .find_iter(line)
        .last()
        .and_then(|m| parse_amount(m.as_str()))
}

fn service_line(line: &str) -> Option<Service> {
    let code = CODE_RE.find(line)?;
    let amount = last_amount(&line[code.end()..])?;

    let mut description = DATE_RE.replace_all(&line[..code.start()], "").into_owned();
    let after_code = AMOUNT_RE.replace_all(&line[code.end()..], "");
    let after_code = ICD10_RE.replace_all(&after_code, "");
    description.push(' ');
    description.push_str(&after_code);

    let description = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == ':' || c == '|' || c.is_whitespace())
        .to_string();

    let mut service = Service::new(if description.is_empty() {
        format!("Service {}", code.as_str())
    } else {
        description
    });
    service.code = Some(code.as_str().to_string());
    service.amount = Some(amount);
    service.diagnostic_code = ICD10_RE
        .captures(line)
        .map(|c| c[1].to_string());
    service.service_date = DATE_RE.find(line).map(|m| m.as_str().to_string());
    Some(service)
}
