// src/heuristics/generic.rs

use regex::Regex;
use std::sync::LazyLock;

use super::{LabelFields, sender};

/// A named extraction rule. Rules run in table order, the first hit wins.
pub struct Rule {
    pub name: &'static str,
    pattern: LazyLock<Regex>,
    /// Captured value must contain a letter (guards numeric-only false positives).
    needs_letter: bool,
}

impl Rule {
    fn apply(&self, text: &str) -> Option<String> {
        self.pattern
            .captures_iter(text)
            .map(|c| c[1].trim().to_string())
            .find(|v| !self.needs_letter || v.chars().any(|ch| ch.is_ascii_alphabetic()))
    }
}

macro_rules! rule {
    ($name:expr, $re:expr) => {
        rule!($name, $re, false)
    };
    ($name:expr, $re:expr, $letter:expr) => {
        Rule {
            name: $name,
            pattern: LazyLock::new(|| Regex::new($re).expect("valid rule regex")),
            needs_letter: $letter,
        }
    };
}

fn first_match(rules: &[Rule], text: &str) -> Option<String> {
    rules.iter().find_map(|r| r.apply(text))
}

/// Every scalar field of one label region, from keyword-anchored rules.
pub fn extract(text: &str) -> LabelFields {
    LabelFields {
        invoice_number: extract_invoice_number(text),
        order_number: extract_order_number(text),
        tracking: extract_tracking(text),
        sender_name: sender::extract_sender_name(text),
    }
}

// ---------------------------------------------------------------------------
// Scalar field extractors
// ---------------------------------------------------------------------------

static INVOICE_RULES: [Rule; 3] = [
    // "Emissão:" on its own line followed by the number on the next one
    rule!("emission-line", r"Emiss.o:[ \t]*\n[ \t]*(\d+)[ \t]*\n"),
    // number, series digit, issue date
    rule!("number-series-date", r"(\d{4,6})\s+\d\s+\d{2}-\d{2}-\d{4}"),
    rule!("nf-tag", r"(?i)\bNF\s*:\s*(\d+)"),
];

pub fn extract_invoice_number(text: &str) -> Option<String> {
    let raw = first_match(&INVOICE_RULES, text)?;
    let trimmed = raw.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

static ORDER_RULES: [Rule; 3] = [
    rule!("pedido", r"(?:Pedido|PEDIDO)[:\s]*\n?\s*([A-Z0-9]{12,20})\b"),
    rule!("order-id", r"(?i:order)(?:\s*(?i:id|sn|no\.?))?\s*[:#]?\s*([A-Z0-9]{12,20})\b"),
    rule!("bare-order-sn", r"\b(\d{5,7}[A-Z0-9]{5,15})\b", true),
];

pub fn extract_order_number(text: &str) -> Option<String> {
    first_match(&ORDER_RULES, text)
}

static TRACKING_RULES: [Rule; 2] = [
    rule!("br-tracking", r"\b(BR[A-Z0-9]{10,20})\b"),
    rule!("carrier-tracking", r"\b([A-Z]{2}\d{9,}[A-Z]{0,2})\b"),
];

pub fn extract_tracking(text: &str) -> Option<String> {
    first_match(&TRACKING_RULES, text)
}

/// All tracking codes on a page, in order of appearance.
pub fn extract_all_tracking(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for cap in TRACKING_RULES[0].pattern.captures_iter(text) {
        let code = cap[1].to_string();
        if !found.contains(&code) {
            found.push(code);
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

static TAX_LABEL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDANFE\b").expect("valid marker regex"));
static ORDER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpedido\s*[:\n]|\border\s*(?:id|sn)?\s*[:#]").expect("valid marker regex")
});
static SENDER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:REMETENTE|SENDER)\b").expect("valid marker regex"));
static DECLARATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)DECLARA[ÇC][ÃA]O\s+DE\s+CONTE[ÚU]DO").expect("valid marker regex")
});

pub fn has_tax_label_marker(text: &str) -> bool {
    TAX_LABEL_MARKER.is_match(text)
}

pub fn has_order_marker(text: &str) -> bool {
    ORDER_MARKER.is_match(text)
}

pub fn has_sender_marker(text: &str) -> bool {
    SENDER_MARKER.is_match(text)
}

pub fn has_declaration_marker(text: &str) -> bool {
    DECLARATION_MARKER.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_number_rules_in_order() {
        assert_eq!(
            extract_invoice_number("DANFE\nEmissão:\n1234\n15-03-2024").as_deref(),
            Some("1234")
        );
        assert_eq!(
            extract_invoice_number("Chave\n004567\n1\n15-03-2024\n").as_deref(),
            Some("4567")
        );
        assert_eq!(extract_invoice_number("Pedido NF: 987").as_deref(), Some("987"));
        assert!(extract_invoice_number("nothing numeric here").is_none());
    }

    #[test]
    fn test_order_number_rules() {
        assert_eq!(
            extract_order_number("Pedido:\n250301ABCD1234").as_deref(),
            Some("250301ABCD1234")
        );
        assert_eq!(
            extract_order_number("Order ID: 576512345678901").as_deref(),
            Some("576512345678901")
        );
        assert_eq!(
            extract_order_number("ref 2503019KQWERTY end").as_deref(),
            Some("2503019KQWERTY")
        );
        // A long digit run without letters is not an order number.
        assert!(extract_order_number("35240311222333000144550010000012341000012345").is_none());
    }

    #[test]
    fn test_tracking_rules() {
        assert_eq!(
            extract_tracking("x BR2512345678901 y").as_deref(),
            Some("BR2512345678901")
        );
        assert_eq!(extract_tracking("Rastreio AB123456789BR").as_deref(), Some("AB123456789BR"));
        assert_eq!(
            extract_all_tracking("BR1111111111A BR2222222222B BR1111111111A"),
            vec!["BR1111111111A", "BR2222222222B"]
        );
    }

    #[test]
    fn test_markers() {
        assert!(has_tax_label_marker("DANFE SIMPLIFICADO - ETIQUETA"));
        assert!(!has_tax_label_marker("DANFES"));
        assert!(has_order_marker("Pedido: 123"));
        assert!(has_sender_marker("REMETENTE"));
        assert!(has_declaration_marker("DECLARAÇÃO DE CONTEÚDO"));
        assert!(has_declaration_marker("declaracao de conteudo"));
    }
}
