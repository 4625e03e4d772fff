// src/heuristics/label_type.rs

use regex::Regex;
use std::sync::LazyLock;

use super::generic::{extract_invoice_number, has_tax_label_marker};
use crate::model::LabelKind;

static PICKUP_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRETIRADA\s*(PELO)?\s*COMPRADOR\b").expect("valid pickup regex")
});
static ALT_FORMAT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PUDO-PGK|Ref\.?\s*No\s*:\s*G(?:SH|C)").expect("valid alt-format regex")
});

/// One row of the classification table.
pub struct KindRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub kind: LabelKind,
}

/// Evaluated top to bottom; the first matching row decides.
pub const KIND_RULES: &[KindRule] = &[
    KindRule {
        name: "pickup-phrase",
        matches: |t| PICKUP_PHRASE.is_match(t),
        kind: LabelKind::Pickup,
    },
    KindRule {
        name: "alt-format-marker",
        matches: is_alt_format,
        kind: LabelKind::AltFormat,
    },
    KindRule {
        name: "tax-label-with-invoice",
        matches: |t| has_tax_label_marker(t) && extract_invoice_number(t).is_some(),
        kind: LabelKind::None,
    },
    KindRule {
        name: "tax-label-without-invoice",
        matches: has_tax_label_marker,
        kind: LabelKind::Cpf,
    },
    KindRule {
        name: "no-tax-label",
        matches: |_| true,
        kind: LabelKind::Cpf,
    },
];

pub fn is_alt_format(text: &str) -> bool {
    ALT_FORMAT_MARKER.is_match(text)
}

/// Classify label text, returning the decisive rule name with the kind.
pub fn classify(text: &str) -> (LabelKind, &'static str) {
    KIND_RULES
        .iter()
        .find(|r| (r.matches)(text))
        .map(|r| (r.kind, r.name))
        .unwrap_or((LabelKind::Cpf, "no-tax-label"))
}

/// Id for a label that carries no invoice number: stem, page and region.
pub fn synthetic_invoice_id(file_stem: &str, page_index: usize, region_index: usize) -> String {
    format!("{file_stem}-p{}-r{}", page_index + 1, region_index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order() {
        assert_eq!(classify("RETIRADA PELO COMPRADOR\nDANFE\nNF: 12").0, LabelKind::Pickup);
        assert_eq!(classify("PUDO-PGK 123\nDANFE").0, LabelKind::AltFormat);
        assert_eq!(classify("Ref.No:GSH99887766").0, LabelKind::AltFormat);
        assert_eq!(
            classify("DANFE SIMPLIFICADO - ETIQUETA\nNF: 4455"),
            (LabelKind::None, "tax-label-with-invoice")
        );
        assert_eq!(
            classify("DANFE SIMPLIFICADO - ETIQUETA\nsem numero"),
            (LabelKind::Cpf, "tax-label-without-invoice")
        );
        assert_eq!(classify("DECLARAÇÃO DE CONTEÚDO"), (LabelKind::Cpf, "no-tax-label"));
    }

    #[test]
    fn test_synthetic_id_is_one_based() {
        assert_eq!(synthetic_invoice_id("lote", 0, 3), "lote-p1-r4");
    }
}
