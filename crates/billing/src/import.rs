//! Bulk product import
//!
//! Drives multi-row product creation through the entitlement guard. Rows
//! are processed strictly in input order; the guard runs once before the
//! first row and again after every successful insert, so a large import
//! self-limits to exactly the ceiling without pre-knowing the final usage
//! count, and a ceiling reached mid-batch by concurrent creation elsewhere
//! is still caught. Only an entitlement denial halts the batch; per-row
//! validation failures are collected and the batch continues.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_shared::slug::{generate_slug, slug_from_url};
use storefront_shared::ResourceKind;

use crate::entitlement::{EntitlementService, LimitDecision};
use crate::error::{BillingError, BillingResult};
use crate::store::{BillingStore, NewProduct, ResourceStore};

/// Stock arrives from spreadsheets as either a number or text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StockValue {
    Number(f64),
    Text(String),
}

/// One parsed spreadsheet row. All fields optional; validation happens per
/// row during the import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRow {
    pub row_number: Option<u32>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub price_text: Option<String>,
    pub stock: Option<StockValue>,
    pub catalog_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub row_number: u32,
    pub message: String,
}

/// Batch outcome. Successes are implicit: `imported` counts them, and any
/// row not in `failures` before a halt succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub imported: u32,
    pub failed: u32,
    pub failures: Vec<RowFailure>,
}

pub struct BulkImporter {
    store: Arc<dyn BillingStore>,
    resources: Arc<dyn ResourceStore>,
}

impl BulkImporter {
    pub fn new(store: Arc<dyn BillingStore>, resources: Arc<dyn ResourceStore>) -> Self {
        Self { store, resources }
    }

    fn entitlements(&self) -> EntitlementService {
        EntitlementService::new(self.store.clone(), self.resources.clone())
    }

    /// Import rows in order, re-checking the plan ceiling between rows.
    pub async fn import_products(
        &self,
        store_id: Uuid,
        tenant_id: Uuid,
        rows: Vec<ImportRow>,
    ) -> BillingResult<ImportReport> {
        let entitlements = self.entitlements();

        if let LimitDecision::Denied { reason } = entitlements
            .check_allowed(store_id, tenant_id, ResourceKind::Products)
            .await?
        {
            let failures = fail_remaining(&rows, 0, &reason);
            return Ok(report(0, failures));
        }

        let catalog_map = self.resources.catalogs_by_slug(store_id).await?;
        let mut used_slugs: HashSet<String> = self
            .resources
            .product_slugs(store_id)
            .await?
            .into_iter()
            .collect();

        let mut failures: Vec<RowFailure> = Vec::new();
        let mut imported: u32 = 0;

        for (index, row) in rows.iter().enumerate() {
            let row_number = row_number_at(row, index);

            let Some(name) = row.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
            else {
                failures.push(RowFailure {
                    row_number,
                    message: "Product name is required".to_string(),
                });
                continue;
            };

            let explicit_slug = row.slug.as_deref().map(str::trim).filter(|s| !s.is_empty());
            let from_url = row
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(slug_from_url);

            let candidate = from_url
                .as_deref()
                .or(explicit_slug)
                .map(generate_slug)
                .filter(|s| !s.is_empty());
            let mut slug = candidate.unwrap_or_else(|| generate_slug(name));

            if slug.is_empty() {
                failures.push(RowFailure {
                    row_number,
                    message: "Could not derive a slug for this row".to_string(),
                });
                continue;
            }

            if explicit_slug.is_some() {
                if used_slugs.contains(&slug) {
                    failures.push(RowFailure {
                        row_number,
                        message: format!("Slug '{}' already exists", slug),
                    });
                    continue;
                }
            } else {
                // Generated slugs dedupe with a numeric suffix instead of failing.
                let base = slug.clone();
                let mut counter = 1;
                while used_slugs.contains(&slug) {
                    slug = format!("{}-{}", base, counter);
                    counter += 1;
                }
            }

            let mut catalog_id = None;
            if let Some(catalog_slug) = row
                .catalog_slug
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                let normalized = catalog_slug.to_lowercase();
                match catalog_map.get(&normalized) {
                    Some(id) => catalog_id = Some(*id),
                    None => {
                        failures.push(RowFailure {
                            row_number,
                            message: format!("Catalog '{}' not found", normalized),
                        });
                        continue;
                    }
                }
            }

            let stock = match parse_stock(row.stock.as_ref()) {
                Ok(stock) => stock,
                Err(message) => {
                    failures.push(RowFailure {
                        row_number,
                        message,
                    });
                    continue;
                }
            };

            let product = NewProduct {
                name: name.to_string(),
                slug: slug.clone(),
                description: trimmed(row.description.as_deref()),
                price_text: trimmed(row.price_text.as_deref()),
                stock,
                catalog_id,
                sort_order: 0,
            };

            match self.resources.insert_product(store_id, &product).await {
                Ok(_) => {}
                Err(BillingError::DuplicateSlug(slug)) => {
                    failures.push(RowFailure {
                        row_number,
                        message: format!("Slug '{}' already exists", slug),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            }

            used_slugs.insert(slug);
            imported += 1;

            // Re-check the ceiling before touching the next row. A denial
            // here fails every remaining row with the same reason.
            if let LimitDecision::Denied { reason } = entitlements
                .check_allowed(store_id, tenant_id, ResourceKind::Products)
                .await?
            {
                failures.extend(fail_remaining(&rows, index + 1, &reason));
                break;
            }
        }

        tracing::info!(
            store_id = %store_id,
            tenant_id = %tenant_id,
            imported = imported,
            failed = failures.len(),
            "Bulk product import finished"
        );

        Ok(report(imported, failures))
    }
}

fn report(imported: u32, failures: Vec<RowFailure>) -> ImportReport {
    ImportReport {
        imported,
        failed: failures.len() as u32,
        failures,
    }
}

fn row_number_at(row: &ImportRow, index: usize) -> u32 {
    // Spreadsheet rows start at 2: row 1 is the header.
    row.row_number.unwrap_or(index as u32 + 2)
}

fn fail_remaining(rows: &[ImportRow], from_index: usize, reason: &str) -> Vec<RowFailure> {
    rows.iter()
        .enumerate()
        .skip(from_index)
        .map(|(index, row)| RowFailure {
            row_number: row_number_at(row, index),
            message: reason.to_string(),
        })
        .collect()
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn parse_stock(value: Option<&StockValue>) -> Result<i32, String> {
    let parsed = match value {
        None => return Ok(0),
        Some(StockValue::Number(n)) => *n,
        Some(StockValue::Text(text)) => {
            let normalized = text.replace(',', "");
            let normalized = normalized.trim();
            if normalized.is_empty() {
                return Ok(0);
            }
            normalized
                .parse::<f64>()
                .map_err(|_| "Invalid stock value".to_string())?
        }
    };

    if parsed.is_nan() || parsed < 0.0 {
        return Err("Invalid stock value".to_string());
    }
    Ok(parsed.floor() as i32)
}
