//! External references sent to the gateway
//!
//! Each payment attempt gets `<order number>-R<unix millis>` so that paying
//! the same order twice never reuses a reference at the gateway. The suffix
//! is stripped again when the gateway echoes the reference back.

use regex::Regex;
use std::sync::OnceLock;

fn retry_suffix() -> &'static Regex {
    static RETRY_SUFFIX: OnceLock<Regex> = OnceLock::new();
    RETRY_SUFFIX.get_or_init(|| Regex::new(r"-R\d+$").expect("retry suffix pattern is valid"))
}

/// Reference for a new payment attempt on `order_number`
pub fn attempt_reference(order_number: &str, timestamp_millis: i64) -> String {
    format!("{}-R{}", order_number, timestamp_millis)
}

/// Reference for a payment attempt starting now
pub fn new_attempt_reference(order_number: &str) -> String {
    attempt_reference(order_number, chrono::Utc::now().timestamp_millis())
}

/// Recover the merchant order number from an echoed reference
pub fn canonical_order_number(reference: &str) -> &str {
    match retry_suffix().find(reference) {
        Some(m) => &reference[..m.start()],
        None => reference,
    }
}
