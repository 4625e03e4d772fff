mod barcode;
mod compose;
mod config;
mod dedup;
mod drivers;
mod error;
mod heuristics;
mod invoice_index;
mod model;
mod order_index;
mod ordering;
mod pdf_extract;
mod pipeline;
mod report;
mod resolve;
mod segmenter;
mod store;
mod text_layout;

use std::path::PathBuf;
use tracing::{info, warn};

use drivers::Registry;
use pipeline::CancelToken;

const DEFAULT_CONFIG: &str = "labels.toml";

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LABELS_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
        .into()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let path = config_path();
    let cfg = config::Config::load_or_default(&path)?.with_env_overrides();
    info!(config = %path.display(), input = %cfg.input_dir.display(), "Configuration loaded");

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let registry = Registry::with_default_drivers();
    let report =
        tokio::task::spawn_blocking(move || pipeline::run(&cfg, &registry, &cancel)).await??;

    info!(
        labels = report.labels,
        duplicates = report.duplicates.len(),
        unresolved = report.unresolved.len(),
        stores = report.stores.len(),
        output = %report.output_dir.display(),
        "Labels ready"
    );
    for store in &report.stores {
        info!(
            store = %store.summary.name,
            labels = store.summary.labels,
            units = store.summary.units,
            pages = store.output.pages,
            "Store output"
        );
    }

    Ok(())
}
