// src/heuristics/sender.rs

use regex::Regex;
use std::sync::LazyLock;

const BRAZILIAN_STATES: &[&str] = &[
    "acre", "alagoas", "amapa", "amazonas", "bahia", "ceara", "distrito federal",
    "espirito santo", "goias", "maranhao", "mato grosso", "mato grosso do sul", "minas gerais",
    "para", "paraiba", "parana", "pernambuco", "piaui", "rio de janeiro",
    "rio grande do norte", "rio grande do sul", "rondonia", "roraima", "santa catarina",
    "sao paulo", "sergipe", "tocantins",
];

macro_rules! re {
    ($re:expr) => {
        LazyLock::new(|| Regex::new($re).expect("valid sender regex"))
    };
}

static NUMERIC_ONLY: LazyLock<Regex> = re!(r"^[\d\s.,/-]+$");
static POSTAL_CODE_PREFIX: LazyLock<Regex> = re!(r"^\d{5}-?\d{3}");
static POSTAL_CODE_ANYWHERE: LazyLock<Regex> = re!(r"\d{5}-?\d{3}");
static STREET: LazyLock<Regex> =
    re!(r"(?i)^(Rua|Avenida|Travessa|Alameda|Estrada|Rodovia|Praca|Praça|Largo|R\.|Av\.|Rod\.|Est\.)\s");
static COMPLEMENT: LazyLock<Regex> =
    re!(r"(?i)^(Bloco|Lote|Quadra|Qd|Lt|Sl|Sala|Apto|Apt|Conj|Casa|Galpao|Galpão|N[°º]?\s)");
static STATE_CODE: LazyLock<Regex> = re!(r"^[A-Z]{2}$");
static CITY_STATE: LazyLock<Regex> = re!(r"^[\p{L}\s]+,\s*[\p{L}\s]+$");
static KEYWORD: LazyLock<Regex> = re!(r"(?i)^(envio previsto|peso|volume|frete|destinat|remet|cep)");

static AFTER_BR_TRACKING: LazyLock<Regex> = re!(r"BR\d{10,}[A-Z]\s*\n((?:[^\n]+\n?){1,5})");
static AFTER_ANY_TRACKING: LazyLock<Regex> = re!(r"[A-Z]{2}\d{9,}[A-Z]{0,2}\s*\n((?:[^\n]+\n?){1,5})");

/// Named predicates; a line matching any of them is not a store name.
const NOT_A_NAME: &[(&str, fn(&str) -> bool)] = &[
    ("too-short", |l| l.chars().count() < 3),
    ("numeric", |l| NUMERIC_ONLY.is_match(l)),
    ("postal-code", |l| POSTAL_CODE_PREFIX.is_match(l)),
    ("street", |l| STREET.is_match(l)),
    ("complement", |l| COMPLEMENT.is_match(l)),
    ("state-code", |l| STATE_CODE.is_match(l)),
    ("city-state", is_city_state),
    ("embedded-postal-code", |l| POSTAL_CODE_ANYWHERE.is_match(l)),
    ("label-keyword", |l| KEYWORD.is_match(l)),
];

fn is_city_state(line: &str) -> bool {
    if !CITY_STATE.is_match(line) {
        return false;
    }
    let Some((_, state)) = line.split_once(',') else {
        return false;
    };
    let state = fold_accents(state.trim()).to_lowercase();
    state.chars().count() == 2 || BRAZILIAN_STATES.contains(&state.as_str())
}

fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' => 'A',
            'é' | 'ê' => 'e',
            'É' | 'Ê' => 'E',
            'í' => 'i',
            'Í' => 'I',
            'ó' | 'ô' | 'õ' => 'o',
            'Ó' | 'Ô' | 'Õ' => 'O',
            'ú' => 'u',
            'Ú' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

pub fn is_address_like(line: &str) -> bool {
    let l = line.trim();
    l.is_empty() || NOT_A_NAME.iter().any(|(_, pred)| pred(l))
}

/// The store name printed under the tracking code: the first of the next
/// five lines that does not look like an address, postal code or keyword.
pub fn extract_sender_name(text: &str) -> Option<String> {
    [&AFTER_BR_TRACKING, &AFTER_ANY_TRACKING]
        .iter()
        .filter_map(|re| re.captures(text))
        .find_map(|cap| {
            cap[1]
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .find(|l| !is_address_like(l))
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_after_tracking() {
        let text = "DESTINATARIO\nFulano\nBR261920610412I\n01310-100\nLoja Da Maria\nRua das Flores 10\n";
        assert_eq!(extract_sender_name(text).as_deref(), Some("Loja Da Maria"));
    }

    #[test]
    fn test_sender_skips_city_state_and_keywords() {
        let text = "AB123456789BR\nItalva, Rio de Janeiro\nPeso: 0,3kg\nSP\nModas Bela\n";
        assert_eq!(extract_sender_name(text).as_deref(), Some("Modas Bela"));
    }

    #[test]
    fn test_no_tracking_no_sender() {
        assert!(extract_sender_name("REMETENTE\nLoja X\n").is_none());
    }

    #[test]
    fn test_address_predicates() {
        assert!(is_address_like("12345-678"));
        assert!(is_address_like("Av. Paulista 1000"));
        assert!(is_address_like("Bloco B"));
        assert!(is_address_like("Campinas, São Paulo"));
        assert!(is_address_like("Centro - CEP 13000000"));
        assert!(!is_address_like("Bonita Presentes Ltda"));
        assert!(!is_address_like("Atelie Sol"));
    }
}
