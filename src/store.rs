// src/store.rs

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::heuristics::extract_sender_name;
use crate::model::{Label, LabelKind};

pub const UNKNOWN_STORE: &str = "Unknown_Store";
pub const CATCH_ALL_ID: &str = "NO_IDENTITY";

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d[\d.]+\s+").expect("valid regex"));
static TRAILING_CPF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d{11}$").expect("valid regex"));
static LEGAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(LTDA|ME|MEI|EPP|EIRELI)\.?\s*$").expect("valid regex"));
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));

/// Turn a raw company or sender name into a filesystem-safe display name.
pub fn sanitize_store_name(raw: &str) -> String {
    let mut name = raw.trim().to_string();
    name = LEADING_NUMBER.replace(&name, "").into_owned();
    name = TRAILING_CPF.replace(&name, "").into_owned();
    // "ACME ME LTDA" carries two suffixes
    for _ in 0..2 {
        name = LEGAL_SUFFIX.replace(&name, "").into_owned();
    }
    name = title_case(name.trim());
    folder_safe(&name)
}

/// Strip characters a folder name cannot hold.
pub fn folder_safe(name: &str) -> String {
    let cleaned = ILLEGAL_CHARS.replace_all(name, "");
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        UNKNOWN_STORE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Upper-case the first letter of each alphabetic run, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Deterministic id for a store known only by name.
pub fn synthetic_store_id(name: &str, kind: LabelKind) -> String {
    let prefix = if kind == LabelKind::Cpf { "CPF" } else { "NAME" };
    let mut hasher = Sha256::new();
    hasher.update(name.to_lowercase().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{prefix}-{}-{}", slug(name), &digest[..8])
}

/// How a store came to be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreIdentity {
    TaxId,
    Synthetic,
    CatchAll,
}

#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    pub identity: StoreIdentity,
    pub labels: Vec<Label>,
}

/// Stores of one run. Constructed per run and discarded afterwards.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    issuer_names: HashMap<String, String>,
    sender_names: HashMap<String, String>,
    stores: BTreeMap<String, Store>,
}

impl StoreRegistry {
    /// Seed with tax id → sanitized issuer name from the invoice index.
    pub fn new(issuers: &HashMap<String, String>) -> Self {
        Self {
            issuer_names: issuers.clone(),
            ..Self::default()
        }
    }

    fn display_name_for_tax_id(&self, tax_id: &str) -> String {
        self.sender_names
            .get(tax_id)
            .or_else(|| self.issuer_names.get(tax_id))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_STORE.to_string())
    }

    /// Real store whose sender or issuer name equals `name`, ignoring case.
    fn real_store_named(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        let mut tax_ids: Vec<&String> = self
            .sender_names
            .iter()
            .chain(self.issuer_names.iter())
            .filter(|(_, n)| n.to_lowercase() == wanted)
            .map(|(t, _)| t)
            .collect();
        tax_ids.sort();
        tax_ids.first().map(|t| t.to_string())
    }

    /// Assign every label to exactly one store.
    pub fn partition(mut self, labels: Vec<Label>) -> Vec<Store> {
        // Sender names printed on labels with a known tax id name that store.
        for label in &labels {
            if let (Some(tax_id), Some(sender)) = (&label.tax_id, &label.sender_name) {
                self.sender_names
                    .entry(tax_id.clone())
                    .or_insert_with(|| sanitize_store_name(sender));
            }
        }

        for mut label in labels {
            let sender = label
                .sender_name
                .clone()
                .or_else(|| extract_sender_name(&label.text))
                .map(|s| sanitize_store_name(&s))
                .filter(|s| s != UNKNOWN_STORE);

            let (id, name, identity) = if let Some(tax_id) = label.tax_id.clone() {
                let name = self.display_name_for_tax_id(&tax_id);
                (tax_id, name, StoreIdentity::TaxId)
            } else if let Some(sender) = sender {
                match self.real_store_named(&sender) {
                    Some(tax_id) => {
                        debug!(store = %sender, tax_id = %tax_id, "Label attached to known store by name");
                        let name = self.display_name_for_tax_id(&tax_id);
                        (tax_id, name, StoreIdentity::TaxId)
                    }
                    None => (
                        synthetic_store_id(&sender, label.kind),
                        sender,
                        StoreIdentity::Synthetic,
                    ),
                }
            } else {
                (
                    CATCH_ALL_ID.to_string(),
                    UNKNOWN_STORE.to_string(),
                    StoreIdentity::CatchAll,
                )
            };

            label.store_id = Some(id.clone());
            self.stores
                .entry(id.clone())
                .or_insert_with(|| Store {
                    id,
                    name,
                    identity,
                    labels: Vec::new(),
                })
                .labels
                .push(label);
        }

        let mut stores: Vec<Store> = self.stores.into_values().collect();
        disambiguate_names(&mut stores);
        info!(stores = stores.len(), "Labels partitioned into stores");
        stores
    }
}

/// Distinct stores sharing a display name get the id tail appended.
fn disambiguate_names(stores: &mut [Store]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for store in stores.iter() {
        *seen.entry(store.name.to_lowercase()).or_default() += 1;
    }
    for store in stores.iter_mut() {
        if seen.get(&store.name.to_lowercase()).copied().unwrap_or(0) > 1 {
            let tail: String = store
                .id
                .chars()
                .rev()
                .take(6)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            store.name = format!("{}_{tail}", store.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;
    use std::path::PathBuf;

    fn label(kind: LabelKind, tax_id: Option<&str>, text: &str) -> Label {
        let mut l = Label::new(PathBuf::from("in.pdf"), 0, 0, Rect::new(0.0, 0.0, 1.0, 1.0));
        l.kind = kind;
        l.tax_id = tax_id.map(str::to_string);
        l.text = text.to_string();
        l
    }

    #[test]
    fn test_sanitize_store_name() {
        assert_eq!(sanitize_store_name("12.345.678 ACME MODAS LTDA"), "Acme Modas");
        assert_eq!(sanitize_store_name("MARIA DA SILVA 12345678901"), "Maria Da Silva");
        assert_eq!(sanitize_store_name("Loja: <Top>/Vendas?"), "Loja TopVendas");
        assert_eq!(sanitize_store_name("   "), UNKNOWN_STORE);
        assert_eq!(sanitize_store_name("BELA ME EPP"), "Bela");
    }

    #[test]
    fn test_synthetic_ids_are_stable_and_prefixed() {
        let a = synthetic_store_id("Loja Azul", LabelKind::Cpf);
        let b = synthetic_store_id("Loja Azul", LabelKind::Cpf);
        let c = synthetic_store_id("Loja Azul", LabelKind::None);
        assert_eq!(a, b);
        assert!(a.starts_with("CPF-Loja_Azul-"));
        assert!(c.starts_with("NAME-Loja_Azul-"));
        assert_ne!(a, c);
    }

    #[test]
    fn test_cpf_label_attaches_to_real_store_by_name() {
        let mut issuers = HashMap::new();
        issuers.insert("11222333000144".to_string(), "Loja Azul".to_string());
        let registry = StoreRegistry::new(&issuers);
        let stores = registry.partition(vec![
            label(LabelKind::None, Some("11222333000144"), ""),
            label(LabelKind::Cpf, None, "BR2512345678901X\nLOJA AZUL\n"),
            label(LabelKind::Cpf, None, "BR2512345678902X\nOutra Loja\n"),
            label(LabelKind::Cpf, None, "nothing here"),
        ]);
        assert_eq!(stores.len(), 3);
        let real = stores.iter().find(|s| s.id == "11222333000144").unwrap();
        assert_eq!(real.labels.len(), 2);
        assert_eq!(real.name, "Loja Azul");
        let synthetic = stores
            .iter()
            .find(|s| s.identity == StoreIdentity::Synthetic)
            .unwrap();
        assert!(synthetic.id.starts_with("CPF-Outra_Loja-"));
        let catch_all = stores.iter().find(|s| s.id == CATCH_ALL_ID).unwrap();
        assert_eq!(catch_all.labels.len(), 1);
        let total: usize = stores.iter().map(|s| s.labels.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_sender_name_overrides_issuer_name() {
        let mut issuers = HashMap::new();
        issuers.insert("11222333000144".to_string(), "Razao Social".to_string());
        let mut l = label(LabelKind::None, Some("11222333000144"), "");
        l.sender_name = Some("Loja Fantasia".to_string());
        let stores = StoreRegistry::new(&issuers).partition(vec![l]);
        assert_eq!(stores[0].name, "Loja Fantasia");
    }

    #[test]
    fn test_colliding_display_names_are_disambiguated() {
        let mut issuers = HashMap::new();
        issuers.insert("11111111000111".to_string(), "Mesma".to_string());
        issuers.insert("22222222000122".to_string(), "Mesma".to_string());
        let stores = StoreRegistry::new(&issuers).partition(vec![
            label(LabelKind::None, Some("11111111000111"), ""),
            label(LabelKind::None, Some("22222222000122"), ""),
        ]);
        assert_ne!(stores[0].name, stores[1].name);
        assert!(stores[0].name.starts_with("Mesma_"));
    }
}
