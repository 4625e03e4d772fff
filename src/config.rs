use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

use crate::error::Result;

/// Points per millimetre.
pub const MM: f32 = 72.0 / 25.4;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Remove everything under `output_dir` before a run.
    #[serde(default)]
    pub clean_output: bool,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub groups: Vec<StoreGroup>,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// What the first column of a manifest table shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductDisplay {
    #[default]
    Sku,
    Title,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_page_width_mm")]
    pub page_width_mm: f32,
    #[serde(default = "default_page_height_mm")]
    pub page_height_mm: f32,
    #[serde(default = "default_cpf_page_height_mm")]
    pub cpf_page_height_mm: f32,
    #[serde(default = "default_margin_side")]
    pub margin_left: f32,
    #[serde(default = "default_margin_side")]
    pub margin_right: f32,
    #[serde(default = "default_margin_vertical")]
    pub margin_top: f32,
    #[serde(default = "default_margin_vertical")]
    pub margin_bottom: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: usize,
    #[serde(default)]
    pub display: ProductDisplay,
}

fn default_page_width_mm() -> f32 {
    150.0
}

fn default_page_height_mm() -> f32 {
    230.0
}

fn default_cpf_page_height_mm() -> f32 {
    225.0
}

fn default_margin_side() -> f32 {
    8.0
}

fn default_margin_vertical() -> f32 {
    5.0
}

fn default_font_size() -> f32 {
    7.0
}

fn default_rows_per_page() -> usize {
    10
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width_mm: default_page_width_mm(),
            page_height_mm: default_page_height_mm(),
            cpf_page_height_mm: default_cpf_page_height_mm(),
            margin_left: default_margin_side(),
            margin_right: default_margin_side(),
            margin_top: default_margin_vertical(),
            margin_bottom: default_margin_vertical(),
            font_size: default_font_size(),
            rows_per_page: default_rows_per_page(),
            display: ProductDisplay::default(),
        }
    }
}

impl LayoutConfig {
    pub fn page_width(&self) -> f32 {
        self.page_width_mm * MM
    }

    pub fn page_height(&self) -> f32 {
        self.page_height_mm * MM
    }

    pub fn cpf_page_height(&self) -> f32 {
        self.cpf_page_height_mm * MM
    }
}

/// File-name based routing of input documents.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_pickup_files")]
    pub pickup_files: Vec<String>,
    #[serde(default = "default_cpf_prefix")]
    pub cpf_prefix: String,
    #[serde(default = "default_alt_format_files")]
    pub alt_format_files: Vec<String>,
    #[serde(default = "default_cost_sheet")]
    pub cost_sheet: String,
    #[serde(default = "default_pickup_sheet_markers")]
    pub pickup_sheet_markers: Vec<String>,
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

fn default_pickup_files() -> Vec<String> {
    vec!["beka.pdf".to_string()]
}

fn default_cpf_prefix() -> String {
    "lanim".to_string()
}

fn default_alt_format_files() -> Vec<String> {
    vec!["shein crua.pdf".to_string(), "shein.pdf".to_string()]
}

fn default_cost_sheet() -> String {
    "planilha_custos.xlsx".to_string()
}

fn default_pickup_sheet_markers() -> Vec<String> {
    vec!["pickup".to_string(), "retirada".to_string()]
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["_".to_string(), "~".to_string(), "etiquetas_prontas".to_string()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pickup_files: default_pickup_files(),
            cpf_prefix: default_cpf_prefix(),
            alt_format_files: default_alt_format_files(),
            cost_sheet: default_cost_sheet(),
            pickup_sheet_markers: default_pickup_sheet_markers(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl RoutingConfig {
    /// Files that are never ingested (temporary, hidden, or previous outputs).
    pub fn is_skipped(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.skip_prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }

    pub fn is_cost_sheet(&self, file_name: &str) -> bool {
        file_name.eq_ignore_ascii_case(&self.cost_sheet)
    }

    pub fn is_pickup_sheet(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.pickup_sheet_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }

    pub fn is_pickup_pdf(&self, file_name: &str) -> bool {
        self.pickup_files
            .iter()
            .any(|f| f.eq_ignore_ascii_case(file_name))
    }

    pub fn is_cpf_pdf(&self, file_name: &str) -> bool {
        !self.cpf_prefix.is_empty()
            && file_name
                .to_lowercase()
                .starts_with(&self.cpf_prefix.to_lowercase())
    }

    pub fn is_alt_format_pdf(&self, file_name: &str) -> bool {
        self.alt_format_files
            .iter()
            .any(|f| f.eq_ignore_ascii_case(file_name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterConfig {
    /// Pages narrower than this (points) always hold a single label.
    #[serde(default = "default_small_format_width")]
    pub small_format_width: f32,
    #[serde(default = "default_min_region_chars")]
    pub min_region_chars: usize,
}

fn default_small_format_width() -> f32 {
    400.0
}

fn default_min_region_chars() -> usize {
    10
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            small_format_width: default_small_format_width(),
            min_region_chars: default_min_region_chars(),
        }
    }
}

/// A named set of stores composed together into one extra output folder.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreGroup {
    pub name: String,
    pub stores: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            clean_output: false,
            layout: LayoutConfig::default(),
            routing: RoutingConfig::default(),
            segmenter: SegmenterConfig::default(),
            groups: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path` when it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("INPUT_DIR") {
            self.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            input_dir = "in"
            [layout]
            display = "both"
            rows_per_page = 6
            "#,
        )
        .unwrap();
        assert_eq!(cfg.input_dir, PathBuf::from("in"));
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.layout.display, ProductDisplay::Both);
        assert_eq!(cfg.layout.rows_per_page, 6);
        assert_eq!(cfg.layout.margin_left, 8.0);
        assert_eq!(cfg.routing.cpf_prefix, "lanim");
        assert!(cfg.groups.is_empty());
    }

    #[test]
    fn test_page_size_in_points() {
        let layout = LayoutConfig::default();
        assert!((layout.page_width() - 425.197).abs() < 0.01);
        assert!((layout.page_height() - 651.969).abs() < 0.01);
        assert!((layout.cpf_page_height() - 637.795).abs() < 0.01);
    }

    #[test]
    fn test_routing_rules() {
        let r = RoutingConfig::default();
        assert!(r.is_skipped("~lock.xlsx"));
        assert!(r.is_skipped("_draft.pdf"));
        assert!(r.is_cost_sheet("Planilha_Custos.xlsx"));
        assert!(r.is_pickup_sheet("pedidos_retirada.xlsx"));
        assert!(r.is_pickup_pdf("BEKA.pdf"));
        assert!(r.is_cpf_pdf("lanim_semana.pdf"));
        assert!(r.is_alt_format_pdf("Shein Crua.pdf"));
        assert!(!r.is_cpf_pdf("shopee.pdf"));
    }

    #[test]
    fn test_groups_parse() {
        let cfg: Config = toml::from_str(
            r#"
            [[groups]]
            name = "Matriz"
            stores = ["11222333000144", "NAME-Loja-abc"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].stores.len(), 2);
    }
}
