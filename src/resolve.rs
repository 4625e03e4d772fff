// src/resolve.rs

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::invoice_index::InvoiceIndex;
use crate::model::{DataSource, Label, LabelKind, ProductLine};
use crate::order_index::OrderIndex;

/// How many labels each source resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub by_order: usize,
    pub by_tracking: usize,
    pub partial_tracking: usize,
    pub by_invoice: usize,
    pub by_pickup: usize,
    pub by_document: usize,
    pub unresolved: usize,
    pub invoice_details: usize,
}

impl ResolutionStats {
    fn count(&mut self, source: DataSource) {
        match source {
            DataSource::Order => self.by_order += 1,
            DataSource::Tracking { partial } => {
                self.by_tracking += 1;
                if partial {
                    self.partial_tracking += 1;
                }
            }
            DataSource::Invoice => self.by_invoice += 1,
            DataSource::Pickup => self.by_pickup += 1,
            DataSource::Document => self.by_document += 1,
            DataSource::Unresolved => self.unresolved += 1,
        }
    }
}

/// Fills label manifests from the indices, highest-priority source first.
pub struct Resolver<'a> {
    orders: &'a OrderIndex,
    invoices: &'a InvoiceIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(orders: &'a OrderIndex, invoices: &'a InvoiceIndex) -> Self {
        Self { orders, invoices }
    }

    /// Resolve one label and record where its manifest came from.
    pub fn resolve(&self, label: &mut Label) -> DataSource {
        self.attach_invoice_details(label);
        let source = self.find_manifest(label);
        label.data_source = Some(source);
        source
    }

    pub fn resolve_all(&self, labels: &mut [Label]) -> ResolutionStats {
        let mut stats = ResolutionStats::default();
        for label in labels.iter_mut() {
            let source = self.resolve(label);
            stats.count(source);
            if !label.synthetic_id && self.invoices.get(&label.invoice_number).is_some() {
                stats.invoice_details += 1;
            }
        }
        info!(
            order = stats.by_order,
            tracking = stats.by_tracking,
            partial = stats.partial_tracking,
            invoice = stats.by_invoice,
            pickup = stats.by_pickup,
            document = stats.by_document,
            unresolved = stats.unresolved,
            "Label data resolved"
        );
        stats
    }

    /// Invoice metadata and issuer for labels carrying a known invoice number.
    fn attach_invoice_details(&self, label: &mut Label) {
        if label.synthetic_id {
            return;
        }
        let Some(record) = self.invoices.get(&label.invoice_number) else {
            return;
        };
        let mut meta = record.meta();
        if meta.access_key.is_none() {
            meta.access_key = label.invoice.as_ref().and_then(|m| m.access_key.clone());
        }
        label.invoice = Some(meta);
        if record.issuer_tax_id.is_some() {
            label.tax_id = record.issuer_tax_id.clone();
        }
    }

    fn find_manifest(&self, label: &mut Label) -> DataSource {
        if let Some(order) = label.order_number.as_deref().and_then(|o| self.orders.get(o)) {
            label.manifest = order.products.clone();
            return DataSource::Order;
        }

        if let Some(hit) = label
            .tracking
            .as_deref()
            .and_then(|t| self.orders.find_by_tracking(t))
        {
            if hit.partial {
                info!(
                    invoice = %label.invoice_number,
                    tracking = label.tracking.as_deref().unwrap_or_default(),
                    order = %hit.value.order_number,
                    "Resolved by partial tracking"
                );
            }
            if label.order_number.is_none() {
                label.order_number = Some(hit.value.order_number.clone());
            }
            label.manifest = hit.value.products.clone();
            return DataSource::Tracking { partial: hit.partial };
        }

        if label.kind == LabelKind::None && !label.synthetic_id {
            if let Some(record) = self.invoices.get(&label.invoice_number) {
                if !record.products.is_empty() {
                    label.manifest = record.products.clone();
                    return DataSource::Invoice;
                }
            }
        }

        if label.kind == LabelKind::Pickup {
            if let Some(lines) = self.pickup_lines(label) {
                label.manifest = lines;
                return DataSource::Pickup;
            }
            warn!(
                invoice = %label.invoice_number,
                page = label.page_index + 1,
                "Pickup label has no pickup sheet entry"
            );
        }

        if !label.embedded.is_empty() {
            label.manifest = label.embedded.clone();
            return DataSource::Document;
        }

        warn!(
            invoice = %label.invoice_number,
            file = %label.source.display(),
            page = label.page_index + 1,
            "Label without data source"
        );
        DataSource::Unresolved
    }

    fn pickup_lines(&self, label: &Label) -> Option<Vec<ProductLine>> {
        if let Some(lines) = label
            .order_number
            .as_deref()
            .and_then(|o| self.orders.pickup_by_order(o))
        {
            return Some(lines.clone());
        }
        let hit = self.orders.pickup_by_tracking(label.tracking.as_deref()?)?;
        debug!(partial = hit.partial, "Pickup resolved by tracking");
        Some(hit.value.clone())
    }
}
