// src/drivers/declaration.rs

use regex::Regex;
use std::sync::LazyLock;

use crate::model::ProductLine;

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+(\S+)\s+(.+)$").expect("valid row regex"));
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.,]?\d*").expect("valid number regex"));
static TRAILING_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\s+(\S+,\S+)\s*$").expect("valid variant regex"));

const MAX_DESCRIPTION: usize = 80;

fn is_header(upper: &str) -> bool {
    let code = upper.contains("CODIGO") || upper.contains("CÓDIGO");
    let desc = upper.contains("DESCRICAO") || upper.contains("DESCRIÇÃO");
    let qty = upper.contains("QTD") || upper.contains("Q.");
    code && desc && (qty || upper.contains("Nº"))
}

fn is_footer(upper: &str) -> bool {
    upper.starts_with("P.") || upper.contains("ASSINATURA")
}

/// Product rows of a declaration-of-contents page.
///
/// Rows follow the `CODIGO … DESCRICAO … QTD` header: item number, code,
/// then a description tail ending in quantity and value. A trailing token
/// with a comma is the variant.
pub fn parse_declaration(text: &str) -> Vec<ProductLine> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let Some(header) = lines.iter().position(|l| is_header(&l.to_uppercase())) else {
        return Vec::new();
    };

    let mut products = Vec::new();
    for line in &lines[header + 1..] {
        if is_footer(&line.to_uppercase()) {
            break;
        }
        let Some(caps) = ROW.captures(line) else {
            continue;
        };
        let code = caps[2].trim();
        let tail = caps[3].trim();

        let numbers: Vec<regex::Match<'_>> = NUMBER.find_iter(tail).collect();
        let (quantity, description) = match numbers.as_slice() {
            [.., qty, _value] => (parse_quantity(qty.as_str()), tail[..qty.start()].trim()),
            _ => (1, tail),
        };

        let (description, variant) = match TRAILING_VARIANT.captures(description) {
            Some(v) => (
                v.get(1).map_or("", |m| m.as_str()).trim().to_string(),
                v.get(2).map_or("", |m| m.as_str()).to_string(),
            ),
            None => (description.to_string(), String::new()),
        };
        let description: String = description.chars().take(MAX_DESCRIPTION).collect();

        products.push(ProductLine::new(code, description, variant, quantity));
    }
    products
}

fn parse_quantity(raw: &str) -> u32 {
    raw.replace(',', ".")
        .parse::<f64>()
        .map(|q| q.trunc().max(1.0) as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "DECLARAÇÃO DE CONTEÚDO
REMETENTE Loja Azul
Nº CÓDIGO DESCRIÇÃO QTD VALOR
1 CAM-01 Camiseta Basica Preto,M 2 59,90
2 TEN-7 Tenis Corrida Branco,41 1 199,00
3 MEIA Meia soquete 3 9,90
Observações gerais
P. Assinatura do declarante";

    #[test]
    fn test_parse_rows() {
        let rows = parse_declaration(PAGE);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ProductLine::new("CAM-01", "Camiseta Basica", "Preto,M", 2));
        assert_eq!(rows[1], ProductLine::new("TEN-7", "Tenis Corrida", "Branco,41", 1));
        assert_eq!(rows[2], ProductLine::new("MEIA", "Meia soquete", "", 3));
    }

    #[test]
    fn test_no_header_no_rows() {
        assert!(parse_declaration("1 CAM-01 Camiseta 2 59,90").is_empty());
    }

    #[test]
    fn test_long_description_truncated() {
        let long = "x".repeat(120);
        let page = format!("CODIGO DESCRICAO QTD\n1 SKU {long} 1 10,00");
        let rows = parse_declaration(&page);
        assert_eq!(rows[0].description.chars().count(), MAX_DESCRIPTION);
    }
}
