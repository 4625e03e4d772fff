// src/heuristics/mod.rs

mod generic;
pub mod label_type;
mod sender;

use serde::Serialize;

pub use generic::{
    extract_all_tracking, extract_invoice_number, extract_order_number, extract_tracking,
    has_declaration_marker, has_order_marker, has_sender_marker, has_tax_label_marker,
};
pub use sender::extract_sender_name;

/// Identifying fields read off one label's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelFields {
    pub invoice_number: Option<String>,
    pub order_number: Option<String>,
    pub tracking: Option<String>,
    pub sender_name: Option<String>,
}

impl LabelFields {
    /// How many fields were found.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.invoice_number.is_some(),
            self.order_number.is_some(),
            self.tracking.is_some(),
            self.sender_name.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, 4)
    }
}

/// Extract label fields from region text.
pub fn extract_fields(text: &str) -> LabelFields {
    generic::extract(text)
}

/// Whether a page region holds a label worth cutting out.
pub fn region_has_label(text: &str, min_chars: usize) -> bool {
    let text = text.trim();
    if text.chars().count() < min_chars {
        return false;
    }
    extract_invoice_number(text).is_some()
        || has_order_marker(text)
        || (has_sender_marker(text) && has_tax_label_marker(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fields_coverage() {
        let text = "DANFE SIMPLIFICADO - ETIQUETA\nNF: 321\nPedido: 250301ABCD1234\nBR2512345678901X\nLoja Azul\n";
        let fields = extract_fields(text);
        assert_eq!(fields.invoice_number.as_deref(), Some("321"));
        assert_eq!(fields.order_number.as_deref(), Some("250301ABCD1234"));
        assert_eq!(fields.tracking.as_deref(), Some("BR2512345678901X"));
        assert_eq!(fields.sender_name.as_deref(), Some("Loja Azul"));
        assert_eq!(fields.coverage(), (4, 4));
    }

    #[test]
    fn test_region_has_label() {
        assert!(!region_has_label("NF: 1", 10));
        assert!(region_has_label("Pedido: 250301ABCD1234", 10));
        assert!(region_has_label("REMETENTE Loja\nDANFE simples", 10));
        assert!(!region_has_label("REMETENTE somente aqui", 10));
    }
}
