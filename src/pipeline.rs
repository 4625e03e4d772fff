// src/pipeline.rs

use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{debug, info, info_span, warn};

use crate::compose::{ComposeStats, Format, compose};
use crate::config::{Config, LayoutConfig, StoreGroup};
use crate::dedup::deduplicate;
use crate::drivers::Registry;
use crate::error::{Error, Result};
use crate::invoice_index::InvoiceIndex;
use crate::model::Label;
use crate::order_index::OrderIndex;
use crate::ordering::order_labels;
use crate::pdf_extract::SourcePdf;
use crate::report::{StoreSummary, write_global_summary, write_store_summary};
use crate::resolve::{ResolutionStats, Resolver};
use crate::segmenter::Segmenter;
use crate::store::{Store, StoreRegistry, folder_safe};

pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Cooperative cancellation flag, checked between documents and stores.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A label as it appears in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct LabelRef {
    pub invoice_number: String,
    pub file: String,
    pub page: usize,
    pub store: Option<String>,
}

impl LabelRef {
    fn of(label: &Label) -> Self {
        Self {
            invoice_number: label.invoice_number.clone(),
            file: file_name(&label.source),
            page: label.page_index + 1,
            store: label.store_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub file: String,
    pub driver: &'static str,
    pub confidence: f32,
    pub labels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub file: String,
    pub reason: String,
}

/// Files written for one store or group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputFiles {
    pub directory: PathBuf,
    pub pdfs: Vec<PathBuf>,
    pub summary: Option<PathBuf>,
    pub pages: usize,
    pub without_manifest: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreReport {
    #[serde(flatten)]
    pub summary: StoreSummary,
    pub output: OutputFiles,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub stores: Vec<String>,
    pub labels: usize,
    pub output: OutputFiles,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub scope: String,
    pub error: String,
}

/// Everything one run did, written next to its outputs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub invoices: usize,
    pub orders: usize,
    pub documents: Vec<DocumentReport>,
    pub skipped: Vec<SkippedDocument>,
    pub labels: usize,
    pub resolution: ResolutionStats,
    pub duplicates: Vec<LabelRef>,
    pub unresolved: Vec<LabelRef>,
    pub stores: Vec<StoreReport>,
    pub groups: Vec<GroupReport>,
    pub failures: Vec<Failure>,
}

/// One full reconciliation over `config.input_dir`.
///
/// Indices and the store registry are built fresh and dropped on return.
/// Every output file is written atomically, so a cancelled run leaves only
/// complete files behind.
pub fn run(config: &Config, registry: &Registry, cancel: &CancelToken) -> Result<RunReport> {
    let now = now();
    let ts = file_timestamp(now);
    let mut report = RunReport {
        started_at: now.format(&Rfc3339).unwrap_or_default(),
        input_dir: config.input_dir.clone(),
        output_dir: config.output_dir.clone(),
        ..RunReport::default()
    };
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        drivers = ?registry.driver_names(),
        "Run started"
    );

    prepare_output(config)?;

    let invoices = InvoiceIndex::load_dir(&config.input_dir)?;
    let orders = OrderIndex::load_dir(&config.input_dir, &config.routing)?;
    report.invoices = invoices.len();
    report.orders = orders.len();

    let mut labels = scan_documents(config, registry, cancel, &mut report)?;
    report.labels = labels.len();

    report.resolution = Resolver::new(&orders, &invoices).resolve_all(&mut labels);
    let deduped = deduplicate(labels);
    report.duplicates = deduped.removed.iter().map(LabelRef::of).collect();

    let mut stores = StoreRegistry::new(invoices.issuers()).partition(deduped.kept);
    report.unresolved = stores
        .iter()
        .flat_map(|s| &s.labels)
        .filter(|l| l.is_unresolved())
        .map(LabelRef::of)
        .collect();

    for store in stores.iter_mut() {
        cancel.check()?;
        let _span = info_span!("store", store = %store.name).entered();
        order_labels(&mut store.labels);
        let dir = config.output_dir.join(folder_safe(&store.name));
        let (output, failures) = write_outputs(&store.labels, &dir, &file_tag(&store.name), &ts, &config.layout);
        report.failures.extend(failures);
        report.stores.push(StoreReport {
            summary: StoreSummary::of(store),
            output,
        });
    }

    for group in &config.groups {
        cancel.check()?;
        if let Some(group_report) = write_group(group, &stores, config, &ts, &mut report.failures) {
            report.groups.push(group_report);
        }
    }

    if !stores.is_empty() {
        let path = config.output_dir.join(format!("summary_{ts}.xlsx"));
        if let Err(e) = write_global_summary(&stores, &path) {
            warn!(error = %e, "Global summary failed");
            report.failures.push(Failure {
                scope: "global summary".into(),
                error: e.to_string(),
            });
        }
    }

    remove_empty_dirs(&config.output_dir)?;
    report.finished_at = now_rfc3339();
    write_run_report(&report, &config.output_dir.join(RUN_REPORT_FILE))?;

    info!(
        documents = report.documents.len(),
        skipped = report.skipped.len(),
        labels = report.labels,
        duplicates = report.duplicates.len(),
        unresolved = report.unresolved.len(),
        stores = report.stores.len(),
        failures = report.failures.len(),
        "Run finished"
    );
    Ok(report)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn now_rfc3339() -> String {
    now().format(&Rfc3339).unwrap_or_default()
}

fn file_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Store name as it appears inside output file names.
fn file_tag(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Create the output directory, emptying it first when configured.
fn prepare_output(config: &Config) -> Result<()> {
    let output = &config.output_dir;
    if config.clean_output && output.exists() {
        let input = fs::canonicalize(&config.input_dir).unwrap_or_else(|_| config.input_dir.clone());
        let target = fs::canonicalize(output)?;
        if input.starts_with(&target) {
            warn!(output = %output.display(), "Output directory holds the input, not cleaning");
        } else {
            for entry in fs::read_dir(&target)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
            info!(output = %output.display(), "Output directory cleaned");
        }
    }
    fs::create_dir_all(output)?;
    Ok(())
}

fn input_pdfs(config: &Config) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(&config.input_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = file_name(p);
            name.to_lowercase().ends_with(".pdf") && !config.routing.is_skipped(&name)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Classify and extract every input PDF. Unusable documents are skipped.
fn scan_documents(
    config: &Config,
    registry: &Registry,
    cancel: &CancelToken,
    report: &mut RunReport,
) -> Result<Vec<Label>> {
    let segmenter = Segmenter::new(&config.segmenter);
    let mut labels = Vec::new();

    for path in input_pdfs(config)? {
        cancel.check()?;
        let file = file_name(&path);
        let _span = info_span!("pdf", file = %file).entered();

        let pdf = match SourcePdf::open(&path) {
            Ok(pdf) => pdf,
            Err(Error::NoTextLayer(_)) => {
                warn!("Image-only PDF skipped");
                report.skipped.push(SkippedDocument {
                    file,
                    reason: "no text layer".into(),
                });
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Unreadable PDF skipped");
                report.skipped.push(SkippedDocument {
                    file,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let Some((driver, found)) = registry.classify(&pdf, &config.routing) else {
            warn!("No driver recognised the document");
            report.skipped.push(SkippedDocument {
                file,
                reason: "unrecognised layout".into(),
            });
            continue;
        };

        match driver.extract(&found, &pdf, &segmenter) {
            Ok(found_labels) => {
                info!(driver = driver.name(), labels = found_labels.len(), "Document read");
                report.documents.push(DocumentReport {
                    file,
                    driver: driver.name(),
                    confidence: found.confidence,
                    labels: found_labels.len(),
                });
                labels.extend(found_labels);
            }
            Err(e) => {
                warn!(driver = driver.name(), error = %e, "Extraction failed");
                report.failures.push(Failure {
                    scope: file,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(labels)
}

/// One PDF per output format present plus the summary sheet. A failing
/// file is recorded and the remaining ones are still written.
fn write_outputs(
    labels: &[Label],
    dir: &Path,
    tag: &str,
    ts: &str,
    layout: &LayoutConfig,
) -> (OutputFiles, Vec<Failure>) {
    let mut output = OutputFiles {
        directory: dir.to_path_buf(),
        ..OutputFiles::default()
    };
    let mut failures = Vec::new();

    for format in [Format::Regular, Format::Cpf, Format::AltFormat] {
        let batch: Vec<Label> = labels
            .iter()
            .filter(|l| Format::for_kind(l.kind) == format)
            .cloned()
            .collect();
        if batch.is_empty() {
            continue;
        }
        let path = dir.join(format!("{}_{tag}_{ts}.pdf", format.file_prefix()));
        match compose(&batch, format, layout, &path) {
            Ok(ComposeStats {
                pages,
                without_manifest,
                ..
            }) => {
                output.pages += pages;
                output.without_manifest += without_manifest;
                output.pdfs.push(path);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Composing failed");
                failures.push(Failure {
                    scope: file_name(&path),
                    error: e.to_string(),
                });
            }
        }
    }

    if !labels.is_empty() {
        let path = dir.join(format!("summary_{tag}_{ts}.xlsx"));
        match write_store_summary(labels, &path) {
            Ok(_) => output.summary = Some(path),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Store summary failed");
                failures.push(Failure {
                    scope: file_name(&path),
                    error: e.to_string(),
                });
            }
        }
    }
    (output, failures)
}

/// Stores named by id or display name, ignoring case.
fn group_members<'a>(group: &StoreGroup, stores: &'a [Store]) -> Vec<&'a Store> {
    let wanted: Vec<String> = group.stores.iter().map(|s| s.trim().to_lowercase()).collect();
    stores
        .iter()
        .filter(|s| wanted.contains(&s.id.to_lowercase()) || wanted.contains(&s.name.to_lowercase()))
        .collect()
}

fn write_group(
    group: &StoreGroup,
    stores: &[Store],
    config: &Config,
    ts: &str,
    failures: &mut Vec<Failure>,
) -> Option<GroupReport> {
    let _span = info_span!("group", group = %group.name).entered();
    let members = group_members(group, stores);
    if members.is_empty() {
        warn!(wanted = ?group.stores, "No store of the group took part in this run");
        return None;
    }

    let labels: Vec<Label> = members.iter().flat_map(|s| s.labels.iter().cloned()).collect();
    let mut labels = deduplicate(labels).kept;
    order_labels(&mut labels);

    let name = folder_safe(&group.name);
    let dir = config.output_dir.join(&name);
    let (output, group_failures) = write_outputs(&labels, &dir, &file_tag(&name), ts, &config.layout);
    failures.extend(group_failures);
    debug!(stores = members.len(), labels = labels.len(), "Group written");
    Some(GroupReport {
        name,
        stores: members.iter().map(|s| s.name.clone()).collect(),
        labels: labels.len(),
        output,
    })
}

/// Drop store folders that ended up without any file.
fn remove_empty_dirs(root: &Path) -> Result<()> {
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && fs::read_dir(&path)?.next().is_none() {
            fs::remove_dir(&path)?;
            debug!(dir = %path.display(), "Empty directory removed");
        }
    }
    Ok(())
}

fn write_run_report(report: &RunReport, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice_index::tests::sample_xml;
    use crate::text_layout::tests::doc_with_pages;

    fn write_orders(path: &Path) {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        let sheet = book.new_sheet("Orders").unwrap();
        let rows = [
            ["order_sn", "tracking_number", "product_info"],
            [
                "250301ABCD1234",
                "BR2512345678901SPX",
                "[1] Product Name: Saia Midi; Variation Name: Azul,P; Quantity: 2; Parent SKU Reference No.: SAIA; ",
            ],
        ];
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet.get_cell_mut((c as u32 + 1, r as u32 + 1)).set_value(*value);
            }
        }
        umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
    }

    /// One sheet, three labels: invoice 1234 twice and a store-printed label
    /// without invoice number that matches the order export by tracking.
    fn write_batch(path: &Path) {
        let mut doc = doc_with_pages(
            600.0,
            800.0,
            &[&[
                (10.0, 780.0, 8.0, "DANFE SIMPLIFICADO - ETIQUETA"),
                (10.0, 768.0, 8.0, "NF: 1234"),
                (310.0, 780.0, 8.0, "DANFE SIMPLIFICADO - ETIQUETA"),
                (310.0, 768.0, 8.0, "NF: 1234"),
                (10.0, 380.0, 8.0, "DANFE SIMPLIFICADO - ETIQUETA"),
                (10.0, 368.0, 8.0, "REMETENTE"),
                (10.0, 356.0, 8.0, "BR2512345678901"),
                (10.0, 344.0, 8.0, "Loja Verde"),
            ]],
        );
        doc.save(path).unwrap();
    }

    fn config(root: &Path) -> Config {
        let input = root.join("input");
        fs::create_dir_all(&input).unwrap();
        Config {
            input_dir: input,
            output_dir: root.join("output"),
            ..Config::default()
        }
    }

    fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(prefix))
            .collect()
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(token.check().is_ok());
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_file_tag_and_timestamp() {
        assert_eq!(file_tag("Loja  Verde"), "Loja_Verde");
        let at = time::macros::datetime!(2025-03-01 09:05:07 UTC);
        assert_eq!(file_timestamp(at), "20250301_090507");
    }

    #[test]
    fn test_end_to_end_run() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.groups = vec![StoreGroup {
            name: "Matriz".into(),
            stores: vec!["acme modas".into(), "Loja Verde".into()],
        }];
        fs::write(
            cfg.input_dir.join("nfe_1234.xml"),
            sample_xml("1234", "11222333000144", "ACME MODAS LTDA"),
        )
        .unwrap();
        write_orders(&cfg.input_dir.join("pedidos.xlsx"));
        write_batch(&cfg.input_dir.join("lote.pdf"));

        let report = run(&cfg, &Registry::with_default_drivers(), &CancelToken::new()).unwrap();
        assert_eq!(report.invoices, 1);
        assert_eq!(report.orders, 1);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].driver, "shopee");
        assert_eq!(report.labels, 3);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].invoice_number, "1234");
        assert_eq!(report.resolution.by_invoice, 2);
        assert_eq!(report.resolution.partial_tracking, 1);
        assert!(report.unresolved.is_empty());
        assert!(report.failures.is_empty());

        let mut names: Vec<&str> = report.stores.iter().map(|s| s.summary.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Acme Modas", "Loja Verde"]);
        let acme = report.stores.iter().find(|s| s.summary.name == "Acme Modas").unwrap();
        assert_eq!(acme.summary.id, "11222333000144");
        assert_eq!((acme.summary.skus, acme.summary.units), (2, 3));

        let out = &cfg.output_dir;
        assert_eq!(files_with_prefix(&out.join("Acme Modas"), "labels_Acme_Modas_").len(), 1);
        assert_eq!(files_with_prefix(&out.join("Loja Verde"), "cpf_Loja_Verde_").len(), 1);
        assert_eq!(files_with_prefix(&out.join("Loja Verde"), "summary_").len(), 1);
        assert_eq!(files_with_prefix(out, "summary_").len(), 1);

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].labels, 2);
        assert_eq!(report.groups[0].output.pdfs.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(RUN_REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(json["duplicates"].as_array().unwrap().len(), 1);
        assert_eq!(json["stores"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_clean_output_and_cancelled_run() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.clean_output = true;
        fs::create_dir_all(cfg.output_dir.join("Old Store")).unwrap();
        fs::write(cfg.output_dir.join("stale.pdf"), b"x").unwrap();
        write_batch(&cfg.input_dir.join("lote.pdf"));

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run(&cfg, &Registry::with_default_drivers(), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(cfg.output_dir.exists());
        assert!(!cfg.output_dir.join("stale.pdf").exists());
        assert!(!cfg.output_dir.join("Old Store").exists());
        assert!(!cfg.output_dir.join(RUN_REPORT_FILE).exists());
    }
}
